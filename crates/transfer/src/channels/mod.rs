//! Concrete peer channel implementations.

pub mod tcp;

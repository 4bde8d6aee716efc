pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{seeded_bytes, write_source};
#[allow(unused_imports)]
pub use mocks::{MockBridge, MockConnector, storage_key};

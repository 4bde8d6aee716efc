//! Download pointers and farmer descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;

/// Identifies a storage peer.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FarmerDescriptor {
    /// Host name or IP address.
    pub address: String,
    /// TCP port.
    pub port: u16,
    /// Node identifier on the network.
    #[serde(rename = "nodeID")]
    pub node_id: String,
}

impl FarmerDescriptor {
    /// Create a new descriptor.
    pub fn new(address: impl Into<String>, port: u16, node_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            node_id: node_id.into(),
        }
    }

    /// `address:port` suitable for connecting. IPv6 literals are bracketed.
    pub fn socket_addr(&self) -> String {
        if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Debug for FarmerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Farmer({}@{}:{})", self.node_id, self.address, self.port)
    }
}

/// Where and how to fetch one shard of a file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pointer {
    /// Position of the shard in the file.
    pub index: u32,
    /// Shard size in bytes.
    pub size: u64,
    /// Farmer holding the shard.
    pub farmer: FarmerDescriptor,
    /// Retrieval token to present to the farmer.
    #[serde(default)]
    pub token: String,
    /// Hex content hash of the shard, when the bridge reports it.
    #[serde(default)]
    pub hash: Option<String>,
}

/// A pointer as returned by the bridge.
///
/// Older bridges omit `index` and list pointers in shard order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PointerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub size: u64,
    pub farmer: FarmerDescriptor,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub hash: Option<String>,
}

impl PointerRecord {
    /// Resolve into a [`Pointer`], taking `position` when no index was sent.
    pub fn into_pointer(self, position: u32) -> Pointer {
        Pointer {
            index: self.index.unwrap_or(position),
            size: self.size,
            farmer: self.farmer,
            token: self.token,
            hash: self.hash,
        }
    }
}

/// Resolve a bridge pointer list, indexing by list position where needed.
pub fn pointers_from_records(records: Vec<PointerRecord>) -> Vec<Pointer> {
    records
        .into_iter()
        .zip(0u32..)
        .map(|(record, position)| record.into_pointer(position))
        .collect()
}

/// Check that pointer indices are exactly `0..len`, in any order.
pub fn validate_pointer_indices(pointers: &[Pointer]) -> crate::Result<()> {
    let mut seen = vec![false; pointers.len()];
    for pointer in pointers {
        let slot = seen.get_mut(pointer.index as usize).ok_or_else(|| {
            crate::Error::InvalidPointers(format!(
                "pointer index {} out of range for {} pointers",
                pointer.index,
                pointers.len()
            ))
        })?;
        if *slot {
            return Err(crate::Error::InvalidPointers(format!(
                "duplicate pointer index {}",
                pointer.index
            )));
        }
        *slot = true;
    }
    Ok(())
}

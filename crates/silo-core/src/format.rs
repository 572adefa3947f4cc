//! Reference container byte format: a small header plus a MessagePack
//! encoding of the root group.
//!
//! This is what [`crate::engine::mem::MemEngine`] publishes and what the
//! remote chunk cache serves byte ranges of.

use silo_types::{Result, SiloError};

use crate::tree::Group;

/// Magic bytes at the start of every encoded container.
pub const MAGIC: &[u8; 4] = b"SILO";

/// Version byte written by this binary.
pub const FORMAT_VERSION: u8 = 1;

/// Header length: magic + version byte.
pub const HEADER_LEN: usize = 5;

pub fn encode_root(root: &Group) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + 64);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    let body = rmp_serde::to_vec(root)?;
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_root(bytes: &[u8]) -> Result<Group> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(SiloError::Other(
            "not a silo container (bad magic)".to_string(),
        ));
    }
    let version = bytes[4];
    if version != FORMAT_VERSION {
        return Err(SiloError::Other(format!(
            "unsupported container format version: {version}"
        )));
    }
    Ok(rmp_serde::from_slice(&bytes[HEADER_LEN..])?)
}

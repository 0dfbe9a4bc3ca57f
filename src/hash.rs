//! Keccak-256 helpers for references and fingerprints

use sha3::{Digest, Keccak256};

/// Hash the given parts with a separator byte between them, returning `0x`-prefixed hex
pub fn keccak_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Keccak256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part);
    }
    format!("0x{}", hex::encode(hasher.finalize()))
}

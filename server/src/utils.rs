//! Utility functions

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Version information for the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate `length` random alphanumeric characters from a CSPRNG
pub fn random_alphanumeric(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| ALPHANUMERIC[(*b as usize) % ALPHANUMERIC.len()] as char)
        .collect()
}

/// Generate `length` random hex characters
pub fn random_hex(length: usize) -> String {
    let mut bytes = vec![0u8; length.div_ceil(2)];
    OsRng.fill_bytes(&mut bytes);
    let mut encoded = hex::encode(&bytes);
    encoded.truncate(length);
    encoded
}

/// Generate `length` characters of base64-encoded random bytes
pub fn random_base64(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    let mut encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    encoded.truncate(length);
    encoded
}

/// Pick a random port in [30000, 60000)
pub fn random_port() -> u16 {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    30000 + (u32::from_le_bytes(bytes) % 30000) as u16
}

/// Hex encoding utilities
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(data: impl AsRef<[u8]>) -> String {
        let data = data.as_ref();
        let mut result = String::with_capacity(data.len() * 2);
        for byte in data {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_alphanumeric_length() {
        assert_eq!(random_alphanumeric(12).len(), 12);
        assert_eq!(random_alphanumeric(0).len(), 0);
    }

    #[test]
    fn test_random_hex_length_and_charset() {
        let h = random_hex(9);
        assert_eq!(h.len(), 9);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_base64_length() {
        assert_eq!(random_base64(16).len(), 16);
    }

    #[test]
    fn test_random_port_range() {
        for _ in 0..100 {
            let p = random_port();
            assert!((30000..60000).contains(&p));
        }
    }
}

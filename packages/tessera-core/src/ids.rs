//! Temporary identifiers for optimistic placeholders.
//!
//! Server ids never carry the `tmp-` prefix, so any entity whose id starts
//! with it is a placeholder that has not been confirmed yet.

use std::sync::atomic::{AtomicU64, Ordering};

pub const TEMP_ID_PREFIX: &str = "tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new temporary id (`tmp-` + 16 hex chars).
/// Combines an atomic counter with a nanosecond timestamp, hashed via SHA-256
/// so ids from different clients do not share a visible sequence.
pub fn generate_temp_id() -> String {
    use sha2::{Digest, Sha256};
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(ts.to_le_bytes());
    let hash = hasher.finalize();
    format!("{}{}", TEMP_ID_PREFIX, hex::encode(&hash[..8]))
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_temp_id_format() {
        let id = generate_temp_id();
        assert!(is_temp_id(&id));
        let suffix = &id[TEMP_ID_PREFIX.len()..];
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_temp_id_unique() {
        let a = generate_temp_id();
        let b = generate_temp_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_real_ids_are_not_temp() {
        assert!(!is_temp_id("c_42"));
        assert!(!is_temp_id(""));
    }
}

// Core library for confit - a single-master replicated configuration service.
// Configuration values are authored on the master, replicated to slaves and
// evaluated per client request against rule expressions.

use rand::Rng;

pub mod api; // HTTP handlers for client, operator and peer traffic
pub mod cluster; // Replication protocol, reconciler and role guard
pub mod entity; // Database entities
pub mod error; // Error handling and response codes
pub mod model; // Data models and wire types
pub mod resolver; // Per-client config resolution
pub mod rules; // Rule expression language
pub mod service; // Write pipeline services
pub mod settings; // Process settings
pub mod snapshot; // In-memory state and locks
pub mod store; // Durable store adapter
pub mod version; // Data version oracle

// Random identifier for new rows. Hex so keys stay URL- and JSON-safe.
pub fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| format!("{:02x}", rng.gen_range(0..=255u8))).collect()
}

// Seconds since the UNIX epoch; every persisted timestamp uses this.
pub fn now_utc() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_shape() {
        let key = generate_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_key_unique() {
        assert_ne!(generate_key(), generate_key());
    }

    #[test]
    fn test_now_utc_positive() {
        assert!(now_utc() > 1_700_000_000);
    }
}

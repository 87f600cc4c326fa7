// Data version oracle. Each committed mutation advances the singleton
// triple: the new sign chains over the previous one, so replicas can
// verify they apply updates in exactly the master's commit order.

use sha2::{Digest, Sha256};

use crate::model::{common::DataVersion, replication::ReplicatedRow};

// Next version for a mutation described by `descriptor`. Pure; the caller
// persists the result inside its transaction and installs it into the
// snapshot only after commit.
pub fn advance(current: &DataVersion, descriptor: &str) -> DataVersion {
    let mut hasher = Sha256::new();
    hasher.update(current.sign.as_bytes());
    hasher.update(descriptor.as_bytes());
    let sign = format!("{:x}", hasher.finalize());

    DataVersion {
        version: current.version + 1,
        sign,
        old_sign: current.sign.clone(),
    }
}

// Canonical mutation descriptor: the kind-tagged row serialization.
pub fn descriptor(row: &ReplicatedRow) -> anyhow::Result<String> {
    Ok(serde_json::to_string(row)?)
}

// Chain check a slave applies to an incoming SyncSlave: the update must
// be the immediate successor of the local state.
pub fn chain_extends(local: &DataVersion, incoming: &DataVersion) -> bool {
    incoming.version == local.version + 1 && incoming.old_sign == local.sign
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ver(version: i64, sign: &str) -> DataVersion {
        DataVersion {
            version,
            sign: sign.to_string(),
            old_sign: String::new(),
        }
    }

    #[test]
    fn test_advance_links_chain() {
        let v0 = DataVersion::default();
        let v1 = advance(&v0, "mutation-a");
        assert_eq!(v1.version, 1);
        assert_eq!(v1.old_sign, v0.sign);
        assert_eq!(v1.sign.len(), 64);

        let v2 = advance(&v1, "mutation-b");
        assert_eq!(v2.version, 2);
        assert_eq!(v2.old_sign, v1.sign);
        assert_ne!(v2.sign, v1.sign);
    }

    #[test]
    fn test_advance_is_deterministic() {
        let base = ver(10, "base-sign");
        assert_eq!(advance(&base, "same"), advance(&base, "same"));
        assert_ne!(advance(&base, "one").sign, advance(&base, "two").sign);
    }

    #[test]
    fn test_chain_extends() {
        let local = ver(10, "S");
        let mut incoming = advance(&local, "m");
        assert!(chain_extends(&local, &incoming));

        // Wrong predecessor sign.
        incoming.old_sign = "other".to_string();
        assert!(!chain_extends(&local, &incoming));

        // Version gap.
        let mut gap = advance(&local, "m");
        gap.version = 12;
        assert!(!chain_extends(&local, &gap));

        // Replay of an already-applied update.
        let applied = advance(&local, "m");
        assert!(!chain_extends(&applied, &applied));
    }
}

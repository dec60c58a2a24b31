//! Run fingerprints: content hashes identifying a (config, scenario) pair.
//!
//! Canonical form is the compact JSON serialization; both structs have a
//! fixed field order, so equal inputs always hash equal.

use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfig;
use crate::scenario::Scenario;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub config_hash: String,
    pub scenario_hash: String,
    /// Hash over both component hashes.
    pub run_id: String,
}

impl RunFingerprint {
    pub fn of(config: &ProtocolConfig, scenario: &Scenario) -> Result<Self, serde_json::Error> {
        let config_hash = hash_json(config)?;
        let scenario_hash = hash_json(scenario)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(config_hash.as_bytes());
        hasher.update(b"+");
        hasher.update(scenario_hash.as_bytes());
        Ok(Self {
            run_id: hasher.finalize().to_hex().to_string(),
            config_hash,
            scenario_hash,
        })
    }

    /// First 12 hex characters, for directory names and logs.
    pub fn short(&self) -> &str {
        &self.run_id[..12.min(self.run_id.len())]
    }
}

fn hash_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let config = ProtocolConfig::default();
        let scenario = Scenario::new("s");
        let a = RunFingerprint::of(&config, &scenario).unwrap();
        let b = RunFingerprint::of(&config, &scenario).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.run_id.len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn changes_with_inputs() {
        let config = ProtocolConfig::default();
        let base = RunFingerprint::of(&config, &Scenario::new("s")).unwrap();

        let renamed = RunFingerprint::of(&config, &Scenario::new("t")).unwrap();
        assert_eq!(base.config_hash, renamed.config_hash);
        assert_ne!(base.run_id, renamed.run_id);

        let mut tweaked = config.clone();
        tweaked.policy.rebase_fee_bps = 0;
        let other = RunFingerprint::of(&tweaked, &Scenario::new("s")).unwrap();
        assert_eq!(base.scenario_hash, other.scenario_hash);
        assert_ne!(base.run_id, other.run_id);
    }
}

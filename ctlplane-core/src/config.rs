// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The proposed configuration payload a transaction carries.
//!
//! The concrete domain schema and its semantic validation rules are
//! explicitly out of scope (spec §1); this is the minimal, opaque value the
//! pipeline itself needs — a version tag (the one axis the pipeline *does*
//! own, since schema evolution beyond a single supported version is a
//! Non-goal) plus an opaque byte payload nobody here interprets.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only version this control plane accepts. Schema evolution beyond a
/// single supported version string is an explicit Non-goal.
pub const SUPPORTED_VERSION: &str = "v1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported config version {0:?}, expected {SUPPORTED_VERSION:?}")]
    UnsupportedVersion(String),
}

/// A proposed configuration. Opaque beyond its version tag: `payload` is
/// whatever the domain schema (out of scope here) encodes it as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub payload: Vec<u8>,
}

impl Config {
    pub fn new(version: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            version: version.into(),
            payload,
        }
    }

    /// The one piece of validation this crate owns: the version tag.
    /// Everything else about "is this configuration semantically valid" is
    /// the domain schema's job, outside this crate's scope.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version.clone()));
        }
        Ok(())
    }

    pub fn equals(&self, other: &Config) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_supported_version() {
        let cfg = Config::new(SUPPORTED_VERSION, vec![1, 2, 3]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unsupported_version() {
        let cfg = Config::new("v2", vec![]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::UnsupportedVersion("v2".to_string()))
        );
    }

    #[test]
    fn equals_is_structural() {
        let a = Config::new(SUPPORTED_VERSION, vec![1]);
        let b = Config::new(SUPPORTED_VERSION, vec![1]);
        let c = Config::new(SUPPORTED_VERSION, vec![2]);
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    /// P6: Deserialize(Serialize(C)).Equals(C) holds.
    #[test]
    fn round_trips_through_serde_json() {
        let cfg = Config::new(SUPPORTED_VERSION, vec![9, 8, 7, 6]);
        let encoded = serde_json::to_vec(&cfg).unwrap();
        let decoded: Config = serde_json::from_slice(&encoded).unwrap();
        assert!(decoded.equals(&cfg));
    }
}

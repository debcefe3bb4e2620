//! Device configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes:
//!
//! ```json
//! { "device_name": "randomness_generator", "read_contract": "legacy_zero" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_MAX_ALLOCATION;
use crate::pipeline::ReadContract;
use crate::registry::DeviceNames;

pub const DEFAULT_DEVICE_NAME: &str = "randomness_generator";
pub const DEFAULT_CLASS_NAME: &str = "first_project";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Node name callers open.
    pub device_name: String,
    /// Class the node is created under.
    pub class_name: String,
    pub minor: u32,
    pub read_contract: ReadContract,
    /// Largest single read the device will allocate a buffer for.
    pub max_read_len: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            class_name: DEFAULT_CLASS_NAME.to_string(),
            minor: 0,
            read_contract: ReadContract::default(),
            max_read_len: DEFAULT_MAX_ALLOCATION,
        }
    }
}

impl DeviceConfig {
    /// Read and parse a JSON config; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse errors come back as `InvalidData`.
    pub fn from_json_str(raw: &str) -> std::io::Result<Self> {
        serde_json::from_str::<Self>(raw).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("failed to parse device config JSON: {e}"),
            )
        })
    }

    /// Names the registry registers under.
    pub fn names(&self) -> DeviceNames {
        DeviceNames {
            device: self.device_name.clone(),
            class: self.class_name.clone(),
            minor: self.minor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = DeviceConfig::default();
        assert_eq!(c.device_name, "randomness_generator");
        assert_eq!(c.class_name, "first_project");
        assert_eq!(c.minor, 0);
        assert_eq!(c.read_contract, ReadContract::ByteCount);
        assert_eq!(c.max_read_len, 4 * 1024 * 1024);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c = DeviceConfig::from_json_str(r#"{"read_contract": "legacy_zero"}"#).unwrap();
        assert_eq!(c.read_contract, ReadContract::LegacyZero);
        assert_eq!(c.device_name, DEFAULT_DEVICE_NAME);
    }

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(DeviceConfig::from_json_str("{}").unwrap(), DeviceConfig::default());
    }

    #[test]
    fn test_bad_json_is_invalid_data() {
        let err = DeviceConfig::from_json_str("{ nope").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_unknown_contract_rejected() {
        assert!(DeviceConfig::from_json_str(r#"{"read_contract": "sometimes"}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("device.json");
        std::fs::write(&path, r#"{"device_name": "rng0", "minor": 3}"#).unwrap();
        let c = DeviceConfig::from_json_file(&path).unwrap();
        assert_eq!(c.device_name, "rng0");
        assert_eq!(c.names().minor, 3);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = DeviceConfig::from_json_file(Path::new("/nonexistent/rngdev.json")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}

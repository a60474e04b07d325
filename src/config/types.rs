use serde::{Deserialize, Serialize};

use crate::device::constants::{DEFAULT_BRIGHTNESS, DEFAULT_DEVICE_NAME, DEFAULT_TIMEOUT, SCAN_DURATION};
use crate::device::types::PeripheralIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    pub name: Option<String>,
    /// Takes precedence over the name. Separators and case do not matter.
    pub address: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: Some(DEFAULT_DEVICE_NAME.to_string()),
            address: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayConfig {
    pub brightness: u8,
    pub timeout: u8, // tenths of a second
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            brightness: DEFAULT_BRIGHTNESS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub device: DeviceConfig,
    pub display: DisplayConfig,
    pub scan_duration_ms: u64,
}

impl Config {
    pub fn identity(&self) -> PeripheralIdentity {
        PeripheralIdentity::new(self.device.name.clone(), self.device.address.as_deref())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: DeviceConfig::default(),
            display: DisplayConfig::default(),
            scan_duration_ms: SCAN_DURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"device": {"address": "D3:B4:8A:8B:91:AC"}}"#).unwrap();

        assert_eq!(config.device.name, Some("Nuimo".to_string()));
        assert_eq!(config.display, DisplayConfig::default());
        assert_eq!(config.scan_duration_ms, SCAN_DURATION);
        assert_eq!(config.identity().address(), Some("d3b48a8b91ac"));
    }

    #[test]
    fn test_camel_case_keys() {
        let json = serde_json::to_value(Config::default()).unwrap();

        assert_eq!(json["scanDurationMs"], 3000);
        assert_eq!(json["display"]["brightness"], 255);
        assert_eq!(json["display"]["timeout"], 20);
    }
}

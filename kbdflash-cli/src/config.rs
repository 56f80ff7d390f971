//! Configuration file support for kbdflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (KBDFLASH_*)
//! 3. Local config file (./kbdflash.toml)
//! 4. Global config file (~/.config/kbdflash/config.toml)
//!
//! ```toml
//! [device]
//! vid = 0x04d9
//! pid = 0x0141
//! out_endpoint = 0x04
//! in_endpoint = 0x83
//! interfaces = [0, 1, 2]
//! timeout_ms = 1000
//!
//! [dump]
//! output = "flash.img"
//! ```

use directories::ProjectDirs;
use kbdflash::UsbConfig;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "kbdflash.toml";

/// USB device settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// USB Vendor ID.
    pub vid: Option<u16>,
    /// USB Product ID.
    pub pid: Option<u16>,
    /// Bulk OUT endpoint.
    pub out_endpoint: Option<u8>,
    /// Bulk IN endpoint.
    pub in_endpoint: Option<u8>,
    /// Interfaces to detach and claim.
    pub interfaces: Option<Vec<u8>>,
    /// Bulk read timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Dump settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DumpConfig {
    /// Output image path.
    pub output: Option<PathBuf>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Dump configuration.
    #[serde(default)]
    pub dump: DumpConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// Unlike the implicit global and local files, an explicitly named file
    /// must exist and parse.
    pub fn load_from_path(path: &Path) -> kbdflash::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            kbdflash::Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            kbdflash::Error::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "kbdflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set fields in `other` win.
    fn merge(&mut self, other: Self) {
        let device = other.device;
        if device.vid.is_some() {
            self.device.vid = device.vid;
        }
        if device.pid.is_some() {
            self.device.pid = device.pid;
        }
        if device.out_endpoint.is_some() {
            self.device.out_endpoint = device.out_endpoint;
        }
        if device.in_endpoint.is_some() {
            self.device.in_endpoint = device.in_endpoint;
        }
        if device.interfaces.is_some() {
            self.device.interfaces = device.interfaces;
        }
        if device.timeout_ms.is_some() {
            self.device.timeout_ms = device.timeout_ms;
        }

        if other.dump.output.is_some() {
            self.dump.output = other.dump.output;
        }
    }

    /// Build the USB link configuration, with `vid`/`pid` from the command
    /// line or environment taking precedence over the file.
    pub fn usb_config(&self, vid: Option<u16>, pid: Option<u16>) -> UsbConfig {
        let defaults = UsbConfig::default();
        let device = &self.device;

        let mut usb = UsbConfig::new(
            vid.or(device.vid).unwrap_or(defaults.vid),
            pid.or(device.pid).unwrap_or(defaults.pid),
        )
        .with_endpoints(
            device.out_endpoint.unwrap_or(defaults.out_endpoint),
            device.in_endpoint.unwrap_or(defaults.in_endpoint),
        );
        if let Some(interfaces) = &device.interfaces {
            usb = usb.with_interfaces(interfaces.clone());
        }
        if let Some(ms) = device.timeout_ms {
            usb = usb.with_timeout(Duration::from_millis(ms));
        }
        usb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.device.vid.is_none());
        assert!(config.device.interfaces.is_none());
        assert!(config.dump.output.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[device]
vid = 0x04d9
pid = 0x0141
out_endpoint = 0x04
in_endpoint = 0x83
interfaces = [0, 1]
timeout_ms = 2500

[dump]
output = "backup.img"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.vid, Some(0x04D9));
        assert_eq!(config.device.pid, Some(0x0141));
        assert_eq!(config.device.out_endpoint, Some(0x04));
        assert_eq!(config.device.in_endpoint, Some(0x83));
        assert_eq!(config.device.interfaces, Some(vec![0, 1]));
        assert_eq!(config.device.timeout_ms, Some(2500));
        assert_eq!(config.dump.output, Some(PathBuf::from("backup.img")));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_merge_overrides_set_fields() {
        let mut config = Config::default();
        config.device.vid = Some(0x1111);
        config.device.pid = Some(0x2222);

        let mut local = Config::default();
        local.device.pid = Some(0x3333);
        local.dump.output = Some(PathBuf::from("local.img"));
        config.merge(local);

        assert_eq!(config.device.vid, Some(0x1111));
        assert_eq!(config.device.pid, Some(0x3333));
        assert_eq!(config.dump.output, Some(PathBuf::from("local.img")));
    }

    #[test]
    fn test_usb_config_defaults() {
        let usb = Config::default().usb_config(None, None);
        assert_eq!(usb, UsbConfig::default());
    }

    #[test]
    fn test_usb_config_precedence() {
        let mut config = Config::default();
        config.device.vid = Some(0x1111);
        config.device.pid = Some(0x2222);
        config.device.interfaces = Some(vec![1]);
        config.device.timeout_ms = Some(300);

        let usb = config.usb_config(Some(0xAAAA), None);
        assert_eq!(usb.vid, 0xAAAA);
        assert_eq!(usb.pid, 0x2222);
        assert_eq!(usb.interfaces, vec![1]);
        assert_eq!(usb.timeout, Duration::from_millis(300));
        assert_eq!(usb.out_endpoint, 0x04);
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        fs::write(
            &path,
            r#"
[device]
pid = 0x0142
[dump]
output = "out.img"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.device.pid, Some(0x0142));
        assert_eq!(config.dump.output, Some(PathBuf::from("out.img")));
    }

    #[test]
    fn test_load_from_path_invalid_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "invalid toml [[[").unwrap();
        let err = Config::load_from_path(&path).unwrap_err();
        assert_eq!(err.kind(), kbdflash::ErrorKind::Config);
    }

    #[test]
    fn test_load_from_path_nonexistent_is_config_error() {
        let err = Config::load_from_path(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(matches!(err, kbdflash::Error::Config(_)));
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            let s = p.to_string_lossy();
            assert!(s.contains("kbdflash"));
            assert!(s.ends_with("config.toml"));
        }
    }
}

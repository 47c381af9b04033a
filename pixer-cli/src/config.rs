//! Configuration file support for pixer.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (PIXER_*)
//! 3. Local config file (./pixer.toml)
//! 4. Global config file (~/.config/pixer/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use pixer::{TcpConfig, UpgradePlan, UpgradeTargets};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Device address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host name or IP address.
    pub host: Option<String>,
    /// TCP port.
    pub port: Option<u16>,
}

/// Firmware binary locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Directory holding `ble.bin`, `ite.bin` and `pixer.bin`.
    pub dir: Option<PathBuf>,
    /// BLE binary, overrides `dir`.
    pub ble: Option<PathBuf>,
    /// ITE binary, overrides `dir`.
    pub ite: Option<PathBuf>,
    /// BSP binary, overrides `dir`.
    pub bsp: Option<PathBuf>,
}

/// Target build numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsConfig {
    /// BLE target build.
    pub ble: Option<u32>,
    /// ITE target build.
    pub ite: Option<u32>,
    /// BSP target build.
    pub bsp: Option<u32>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device address.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Firmware files.
    #[serde(default)]
    pub firmware: FirmwareConfig,
    /// Target builds.
    #[serde(default)]
    pub targets: TargetsConfig,
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
        if let Some(local_config) = Self::load_from_file(Path::new("pixer.toml")) {
            debug!("Loaded local config from pixer.toml");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
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
        ProjectDirs::from("", "", "pixer").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.device.host, other.device.host);
        take(&mut self.device.port, other.device.port);

        take(&mut self.firmware.dir, other.firmware.dir);
        take(&mut self.firmware.ble, other.firmware.ble);
        take(&mut self.firmware.ite, other.firmware.ite);
        take(&mut self.firmware.bsp, other.firmware.bsp);

        take(&mut self.targets.ble, other.targets.ble);
        take(&mut self.targets.ite, other.targets.ite);
        take(&mut self.targets.bsp, other.targets.bsp);
    }

    /// Device address, with CLI values taking precedence.
    pub fn tcp_config(&self, host: Option<&str>, port: Option<u16>) -> TcpConfig {
        let defaults = TcpConfig::default();
        TcpConfig::new(
            host.map(str::to_string)
                .or_else(|| self.device.host.clone())
                .unwrap_or(defaults.host),
            port.or(self.device.port).unwrap_or(defaults.port),
        )
    }

    /// Upgrade plan, with CLI values taking precedence.
    ///
    /// Individual file paths override the firmware directory, which defaults
    /// to the current directory.
    pub fn upgrade_plan(&self, dir: Option<&Path>, targets: &TargetsConfig) -> UpgradePlan {
        let dir = dir
            .map(Path::to_path_buf)
            .or_else(|| self.firmware.dir.clone())
            .unwrap_or_default();
        let defaults = UpgradeTargets::default();

        let mut plan = UpgradePlan::in_dir(&dir).with_targets(UpgradeTargets {
            ble: targets.ble.or(self.targets.ble).unwrap_or(defaults.ble),
            ite: targets.ite.or(self.targets.ite).unwrap_or(defaults.ite),
            bsp: targets.bsp.or(self.targets.bsp).unwrap_or(defaults.bsp),
        });
        if let Some(ref ble) = self.firmware.ble {
            plan.ble_bin.clone_from(ble);
        }
        if let Some(ref ite) = self.firmware.ite {
            plan.ite_bin.clone_from(ite);
        }
        if let Some(ref bsp) = self.firmware.bsp {
            plan.bsp_bin.clone_from(bsp);
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.device.host.is_none());
        assert!(config.device.port.is_none());
        assert!(config.firmware.dir.is_none());
        assert!(config.targets.bsp.is_none());
    }

    #[test]
    fn test_default_tcp_config() {
        let tcp = Config::default().tcp_config(None, None);
        assert_eq!(tcp.addr(), "192.168.1.1:6000");
    }

    // ---- merge ----

    #[test]
    fn test_config_merge_overrides() {
        let mut base = Config::default();
        base.device.host = Some("10.0.0.2".into());
        base.device.port = Some(7000);

        let mut other = Config::default();
        other.device.host = Some("10.0.0.3".into());
        other.targets.ble = Some(20);
        base.merge(other);

        assert_eq!(base.device.host.as_deref(), Some("10.0.0.3"));
        assert_eq!(base.device.port, Some(7000));
        assert_eq!(base.targets.ble, Some(20));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.firmware.dir = Some(PathBuf::from("/opt/fw"));
        base.merge(Config::default());
        assert_eq!(base.firmware.dir, Some(PathBuf::from("/opt/fw")));
    }

    // ---- TOML ----

    #[test]
    fn test_config_from_toml() {
        let config: Config = toml::from_str(
            r#"
[device]
host = "pixer.local"
port = 6001

[firmware]
dir = "/srv/pixer"
bsp = "/srv/pixer/custom.bin"

[targets]
ble = 15
bsp = 1703000
"#,
        )
        .unwrap();

        assert_eq!(config.device.host.as_deref(), Some("pixer.local"));
        assert_eq!(config.device.port, Some(6001));
        assert_eq!(config.firmware.dir, Some(PathBuf::from("/srv/pixer")));
        assert_eq!(config.targets.ble, Some(15));
        assert!(config.targets.ite.is_none());
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.device.host.is_none());
    }

    // ---- resolution ----

    #[test]
    fn test_tcp_config_cli_wins() {
        let mut config = Config::default();
        config.device.host = Some("10.0.0.2".into());
        config.device.port = Some(7000);

        assert_eq!(config.tcp_config(None, None).addr(), "10.0.0.2:7000");
        assert_eq!(
            config.tcp_config(Some("127.0.0.1"), None).addr(),
            "127.0.0.1:7000"
        );
        assert_eq!(
            config.tcp_config(None, Some(6000)).addr(),
            "10.0.0.2:6000"
        );
    }

    #[test]
    fn test_upgrade_plan_resolution() {
        let mut config = Config::default();
        config.firmware.dir = Some(PathBuf::from("/srv/pixer"));
        config.firmware.bsp = Some(PathBuf::from("/tmp/bsp.bin"));
        config.targets.ite = Some(40);

        let cli_targets = TargetsConfig {
            ble: Some(16),
            ..TargetsConfig::default()
        };
        let plan = config.upgrade_plan(None, &cli_targets);
        assert_eq!(plan.ble_bin, Path::new("/srv/pixer/ble.bin"));
        assert_eq!(plan.bsp_bin, Path::new("/tmp/bsp.bin"));
        assert_eq!(plan.targets, UpgradeTargets {
            ble: 16,
            ite: 40,
            bsp: pixer::upgrade::plan::DEFAULT_BSP_TARGET,
        });

        let plan = config.upgrade_plan(Some(Path::new("/other")), &TargetsConfig::default());
        assert_eq!(plan.ite_bin, Path::new("/other/ite.bin"));
    }

    // ---- load_from_path with tempfile ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixer.toml");
        fs::write(&path, "[device]\nhost = \"192.168.4.1\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.device.host.as_deref(), Some("192.168.4.1"));
    }

    #[test]
    fn test_load_from_path_invalid_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixer.toml");
        fs::write(&path, "[device\nhost =").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.device.host.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.device.host.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_str().unwrap().contains("pixer"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}

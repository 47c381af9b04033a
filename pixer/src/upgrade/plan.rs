//! Upgrade decisions.
//!
//! Everything here is pure: given the device's build numbers and the replies
//! gathered so far, decide what to push where and what to do afterwards.

use std::path::{Path, PathBuf};

/// Default BLE target build.
pub const DEFAULT_BLE_TARGET: u32 = 14;

/// Default ITE target build.
pub const DEFAULT_ITE_TARGET: u32 = 35;

/// Default BSP target build.
pub const DEFAULT_BSP_TARGET: u32 = 1702061;

/// Default BLE binary file name.
pub const DEFAULT_BLE_BIN: &str = "ble.bin";

/// Default ITE binary file name.
pub const DEFAULT_ITE_BIN: &str = "ite.bin";

/// Default BSP binary file name.
pub const DEFAULT_BSP_BIN: &str = "pixer.bin";

/// Highest battery percentage that still blocks an upgrade.
pub const LOW_BATTERY_THRESHOLD: u32 = 15;

/// First BSP build that applies BLE/ITE updates live and reboots with `reset`.
pub const LIVE_UPDATE_BSP_BUILD: u32 = 1_700_000;

/// Device path of the OTA marker file.
pub const OTA_INFO_PATH: &str = "ota_info.bin";

/// OTA marker contents: a little-endian `1`.
pub const OTA_INFO_FLAG: u32 = 1;

/// Primary MCU image slot.
pub const BSP_PRIMARY_PATH: &str = "/sys/mcuimg2.bin";

/// Alternate MCU image slot.
pub const BSP_ALTERNATE_PATH: &str = "/sys/mcuimg3.bin";

/// Firmware component that can be upgraded over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Component {
    /// Bluetooth module.
    Ble,
    /// Secondary (display) controller.
    Ite,
    /// Main board support package.
    Bsp,
}

impl Component {
    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ble => "BLE",
            Self::Ite => "ITE",
            Self::Bsp => "BSP",
        }
    }

    /// Fixed upload path on the device. The BSP path depends on the active
    /// slot, see [`bsp_device_path`].
    pub fn device_path(self) -> Option<&'static str> {
        match self {
            Self::Ble => Some("ble_new.bin"),
            Self::Ite => Some("ite_new.bin"),
            Self::Bsp => None,
        }
    }

    /// Query that re-reads the component's version after a live update.
    pub fn refresh_command(self) -> Option<&'static str> {
        match self {
            Self::Ble => Some(crate::device::commands::BLE_VERSION_REFRESH),
            Self::Ite => Some(crate::device::commands::ITE_VERSION_REFRESH),
            Self::Bsp => None,
        }
    }
}

/// Target build numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpgradeTargets {
    /// BLE target build.
    pub ble: u32,
    /// ITE target build.
    pub ite: u32,
    /// BSP target build.
    pub bsp: u32,
}

impl Default for UpgradeTargets {
    fn default() -> Self {
        Self {
            ble: DEFAULT_BLE_TARGET,
            ite: DEFAULT_ITE_TARGET,
            bsp: DEFAULT_BSP_TARGET,
        }
    }
}

/// What to upgrade to, and from which files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePlan {
    /// Target build numbers.
    pub targets: UpgradeTargets,
    /// BLE firmware binary.
    pub ble_bin: PathBuf,
    /// ITE firmware binary.
    pub ite_bin: PathBuf,
    /// BSP firmware binary.
    pub bsp_bin: PathBuf,
}

impl Default for UpgradePlan {
    fn default() -> Self {
        Self::in_dir(Path::new(""))
    }
}

impl UpgradePlan {
    /// Plan using the default file names inside `dir` and default targets.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            targets: UpgradeTargets::default(),
            ble_bin: dir.join(DEFAULT_BLE_BIN),
            ite_bin: dir.join(DEFAULT_ITE_BIN),
            bsp_bin: dir.join(DEFAULT_BSP_BIN),
        }
    }

    /// Set the target builds.
    #[must_use]
    pub fn with_targets(mut self, targets: UpgradeTargets) -> Self {
        self.targets = targets;
        self
    }

    /// Binary and target for a component.
    pub fn component(&self, component: Component) -> (&Path, u32) {
        match component {
            Component::Ble => (&self.ble_bin, self.targets.ble),
            Component::Ite => (&self.ite_bin, self.targets.ite),
            Component::Bsp => (&self.bsp_bin, self.targets.bsp),
        }
    }

    /// Firmware binaries that do not exist.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        [&self.ble_bin, &self.ite_bin, &self.bsp_bin]
            .into_iter()
            .filter(|path| !path.is_file())
            .cloned()
            .collect()
    }
}

/// Decision state accumulated over one upgrade session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionOutcome {
    /// ITE image transferred.
    pub ite_pushed: bool,
    /// BLE image transferred.
    pub ble_pushed: bool,
    /// BSP image transferred.
    pub bsp_pushed: bool,
    /// The device must restart to apply what was pushed.
    pub needs_reboot: bool,
    /// The OTA marker file must be written.
    pub needs_ota_info: bool,
}

impl SessionOutcome {
    /// Record a successful transfer of `component`.
    ///
    /// BLE/ITE updates are applied live by BSP builds from
    /// [`LIVE_UPDATE_BSP_BUILD`] on; older builds stage them for the next
    /// boot. A BSP image always needs a reboot.
    pub fn record_push(&mut self, component: Component, bsp_build: u32) {
        match component {
            Component::Ble => self.ble_pushed = true,
            Component::Ite => self.ite_pushed = true,
            Component::Bsp => {
                self.bsp_pushed = true;
                self.needs_reboot = true;
                return;
            },
        }
        if !applies_live(bsp_build) {
            self.needs_reboot = true;
            self.needs_ota_info = true;
        }
    }

    /// Control command to send once all stages are done.
    pub fn final_command(&self, bsp_build: u32) -> Option<ControlCommand> {
        if !self.needs_reboot {
            return None;
        }
        Some(if bsp_build < LIVE_UPDATE_BSP_BUILD {
            ControlCommand::Off
        } else {
            ControlCommand::Reset
        })
    }
}

/// Whether the running BSP applies BLE/ITE updates without a reboot.
pub fn applies_live(bsp_build: u32) -> bool {
    bsp_build >= LIVE_UPDATE_BSP_BUILD
}

/// Post-upgrade control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlCommand {
    /// Power off; older BSPs apply staged updates on the next power-up.
    Off,
    /// Reboot.
    Reset,
}

impl ControlCommand {
    /// Wire command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => crate::device::commands::OFF,
            Self::Reset => crate::device::commands::RESET,
        }
    }
}

/// Whether the battery is charged enough to upgrade.
pub fn battery_allows_upgrade(percent: u32) -> bool {
    percent > LOW_BATTERY_THRESHOLD
}

/// Whether a component is below its target build.
pub fn needs_upgrade(current: u32, target: u32) -> bool {
    current < target
}

/// MCU image slot to write the BSP to.
///
/// Live-update BSPs report the active slot via `mcuImage`; when slot `1` is
/// active the alternate image is written.
pub fn bsp_device_path(bsp_build: u32, mcu_image_reply: &str) -> &'static str {
    if bsp_build > LIVE_UPDATE_BSP_BUILD && mcu_image_reply.trim() == "1" {
        BSP_ALTERNATE_PATH
    } else {
        BSP_PRIMARY_PATH
    }
}

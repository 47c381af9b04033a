//! Device version and battery parsing.
//!
//! The device reports its firmware versions as free-form strings:
//!
//! | Component | Example            | Build number              |
//! |-----------|--------------------|---------------------------|
//! | BLE       | `1.0.14`           | third `.` field: `14`     |
//! | ITE       | `1.0.35`           | third `.` field: `35`     |
//! | MCU (BSP) | `14_2024-06-01_2`  | second `_` field without `-`: `20240601` |
//!
//! Anything that does not parse is reported as build `0`, which simply makes
//! the component look outdated. A malformed reply never aborts a session.

use crate::error::{Error, Result};
use log::warn;

/// BLE version assumed when the device does not answer.
pub const DEFAULT_BLE_VERSION: &str = "0.0.0";

/// ITE version assumed when the device does not answer.
pub const DEFAULT_ITE_VERSION: &str = "0.0.0";

/// MCU version assumed when the device does not answer.
pub const DEFAULT_MCU_VERSION: &str = "0_0000-00-00_0";

/// Battery level assumed when the device does not answer.
pub const DEFAULT_BATTERY: &str = "0";

/// Firmware versions and battery level reported by a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceVersionInfo {
    /// Raw BLE version string.
    pub ble_version: String,
    /// Raw ITE version string.
    pub ite_version: String,
    /// Raw MCU version string.
    pub mcu_version: String,
    /// Battery charge in percent.
    pub battery_percent: u32,
    /// BLE build number.
    pub ble_build: u32,
    /// ITE build number.
    pub ite_build: u32,
    /// BSP build number.
    pub bsp_build: u32,
}

impl DeviceVersionInfo {
    /// Build from raw replies, defaulting every field that fails to parse.
    pub fn from_replies(ble: &str, ite: &str, mcu: &str, battery: &str) -> Self {
        let ble = ble.trim();
        let ite = ite.trim();
        let mcu = mcu.trim();

        Self {
            ble_version: ble.to_string(),
            ite_version: ite.to_string(),
            mcu_version: mcu.to_string(),
            battery_percent: or_zero(parse_battery(battery)),
            ble_build: or_zero(parse_dotted_build("BLE build", ble)),
            ite_build: or_zero(parse_dotted_build("ITE build", ite)),
            bsp_build: or_zero(parse_bsp_build(mcu)),
        }
    }
}

fn or_zero(result: Result<u32>) -> u32 {
    result.unwrap_or_else(|e| {
        warn!("{e}, using 0");
        0
    })
}

fn parse_number(what: &'static str, input: &str, field: &str) -> Result<u32> {
    field.trim().parse().map_err(|_| Error::Parse {
        what,
        input: input.to_string(),
    })
}

/// Third `.`-separated field of an `a.b.c` version.
pub fn parse_dotted_build(what: &'static str, version: &str) -> Result<u32> {
    let field = version.split('.').nth(2).ok_or_else(|| Error::Parse {
        what,
        input: version.to_string(),
    })?;
    parse_number(what, version, field)
}

/// BSP build from an MCU version (`n_YYYY-MM-DD_n`).
///
/// Hyphens are removed from the second `_` field before parsing. Values that
/// do not fit a `u32` are parse failures.
pub fn parse_bsp_build(mcu_version: &str) -> Result<u32> {
    const WHAT: &str = "BSP build";

    let field = mcu_version.split('_').nth(1).ok_or_else(|| Error::Parse {
        what: WHAT,
        input: mcu_version.to_string(),
    })?;
    let digits: String = field.chars().filter(|c| *c != '-').collect();
    parse_number(WHAT, mcu_version, &digits)
}

/// Battery percentage from a decimal reply.
pub fn parse_battery(reply: &str) -> Result<u32> {
    parse_number("battery level", reply, reply)
}

//! Device-level queries: handshake, version/battery readout and control
//! commands.

use crate::error::{Error, Result};
use crate::port::{Port, TcpConfig, TcpPort};
use crate::protocol::command::{CommandChannel, Reply};
use crate::version::{
    DEFAULT_BATTERY, DEFAULT_BLE_VERSION, DEFAULT_ITE_VERSION, DEFAULT_MCU_VERSION,
    DeviceVersionInfo,
};
use log::{debug, info, warn};
use std::time::Duration;

/// Command vocabulary understood by the device.
pub mod commands {
    /// Handshake.
    pub const HANDSHAKE: &str = "#TEST#";
    /// BLE version query.
    pub const BLE_VERSION: &str = "bleVersion";
    /// ITE version query.
    pub const ITE_VERSION: &str = "iteVersion";
    /// MCU version query.
    pub const MCU_VERSION: &str = "mcuVersion";
    /// Battery level query.
    pub const BATTERY_LEVEL: &str = "batteryLevel";
    /// Active MCU image slot query.
    pub const MCU_IMAGE: &str = "mcuImage";
    /// BLE version query after an update.
    pub const BLE_VERSION_REFRESH: &str = "bleversion";
    /// ITE version query after an update.
    pub const ITE_VERSION_REFRESH: &str = "iteversion";
    /// Power off.
    pub const OFF: &str = "off";
    /// Reboot.
    pub const RESET: &str = "reset";
}

/// Greeting sent by a healthy device.
pub const GREETING: &str = "Hello PC!";

/// Timeout for the handshake and for queries.
pub const QUERY_TIMEOUT: Duration = Duration::from_millis(2000);

/// How the device answered the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// Exactly [`GREETING`].
    Greeting,
    /// A reply longer than the greeting.
    ///
    /// Some firmware builds prepend or append status text to the greeting, so
    /// any reply longer than nine characters is accepted as-is.
    Extended(String),
    /// A short reply that is not the greeting; accepted with a warning.
    Unexpected(String),
}

impl Handshake {
    /// Classify a handshake reply. `None` means the device stayed silent.
    pub fn classify(reply: &Reply) -> Option<Self> {
        let text = reply.as_str()?;
        Some(if text == GREETING {
            Self::Greeting
        } else if text.chars().count() > GREETING.len() {
            Self::Extended(text.to_string())
        } else {
            Self::Unexpected(text.to_string())
        })
    }
}

/// Send the handshake; a silent device is a protocol error.
pub fn handshake<P: Port>(port: &mut P) -> Result<Handshake> {
    let reply = query(port, commands::HANDSHAKE)?;
    let handshake = Handshake::classify(&reply).ok_or_else(|| {
        Error::Protocol(format!(
            "no response to {} - device may not be responding",
            commands::HANDSHAKE
        ))
    })?;

    match handshake {
        Handshake::Greeting => debug!("Handshake OK"),
        Handshake::Extended(ref text) => debug!("Handshake reply with extra text: '{text}'"),
        Handshake::Unexpected(ref text) => {
            warn!("Unexpected handshake response: '{text}', continuing anyway");
        },
    }
    Ok(handshake)
}

/// Send one command with the query timeout.
pub fn query<P: Port>(port: &mut P, command: &str) -> Result<Reply> {
    port.set_timeout(QUERY_TIMEOUT)?;
    CommandChannel::new(port).send_str(command)
}

/// Read versions and battery level.
///
/// Each query falls back to its default independently when the device does
/// not answer.
pub fn query_versions<P: Port>(port: &mut P) -> Result<DeviceVersionInfo> {
    let ble = query(port, commands::BLE_VERSION)?.or_default(DEFAULT_BLE_VERSION);
    let ite = query(port, commands::ITE_VERSION)?.or_default(DEFAULT_ITE_VERSION);
    let mcu = query(port, commands::MCU_VERSION)?.or_default(DEFAULT_MCU_VERSION);
    let battery = query(port, commands::BATTERY_LEVEL)?.or_default(DEFAULT_BATTERY);

    info!(
        "Device info - BLE: {}, ITE: {}, MCU: {}, Battery: {}%",
        ble.trim(),
        ite.trim(),
        mcu.trim(),
        battery.trim()
    );

    let info = DeviceVersionInfo::from_replies(&ble, &ite, &mcu, &battery);
    info!(
        "Parsed versions - BLE: {}, ITE: {}, BSP: {}, Battery: {}%",
        info.ble_build, info.ite_build, info.bsp_build, info.battery_percent
    );
    Ok(info)
}

/// Connect, handshake and read the device's versions.
pub fn read_device_info(config: &TcpConfig) -> Result<DeviceVersionInfo> {
    let mut port = TcpPort::connect(config)?;
    let result = handshake(&mut port).and_then(|_| query_versions(&mut port));
    let _ = port.close();
    result
}

/// Connect and ask the device to reboot.
///
/// The reset is only sent when the device answers the handshake with the
/// exact greeting. Returns whether it was sent.
pub fn reset_device(config: &TcpConfig) -> Result<bool> {
    let mut port = TcpPort::connect(config)?;
    let result = reset_session(&mut port);
    let _ = port.close();
    result
}

fn reset_session<P: Port>(port: &mut P) -> Result<bool> {
    if handshake(port)? != Handshake::Greeting {
        warn!("Device did not greet, reset not sent");
        return Ok(false);
    }
    query(port, commands::RESET)?;
    info!("Reset sent");
    Ok(true)
}

//! Firmware upgrade orchestration.
//!
//! One upgrade is one linear pass over a single connection:
//!
//! 1. Preflight: all firmware binaries present (no network otherwise)
//! 2. Connect and handshake
//! 3. Read versions and battery; stop if the battery is at or below 15%
//! 4. ITE, then BLE, then BSP: push each image whose build is below target
//! 5. Write the OTA marker if a staged update needs it
//! 6. Send `off` or `reset` if anything needs a restart
//!
//! A failed image transfer is logged and the next stage still runs, and so
//! does a failed query once the battery gate has passed. The connection is
//! closed on every exit path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pixer::{TcpConfig, UpgradePlan, upgrade_device};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let plan = UpgradePlan::in_dir(std::path::Path::new("firmware"));
//!     let report = upgrade_device(&TcpConfig::default(), &plan, &mut |path, current, total| {
//!         println!("{}: {}/{}", path, current, total);
//!     })?;
//!     println!("{:?}", report.outcome);
//!     Ok(())
//! }
//! ```

pub mod plan;

pub use plan::{
    Component, ControlCommand, SessionOutcome, UpgradePlan, UpgradeTargets,
    battery_allows_upgrade, bsp_device_path, needs_upgrade,
};

use crate::device::{self, commands};
use crate::error::{Error, Result};
use crate::port::{Port, TcpConfig, TcpPort};
use crate::protocol::command::Reply;
use crate::protocol::transfer::{FileTransfer, TransferConfig};
use crate::version::DeviceVersionInfo;
use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, error, info, warn};
use plan::{LOW_BATTERY_THRESHOLD, OTA_INFO_FLAG, OTA_INFO_PATH};
use std::fs;
use std::path::Path;

/// Result of a completed upgrade session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpgradeReport {
    /// Versions read at the start of the session.
    pub device: DeviceVersionInfo,
    /// What was pushed and what it requires.
    pub outcome: SessionOutcome,
    /// Control command sent at the end, if any.
    pub control: Option<ControlCommand>,
}

/// Check the firmware files, connect and run the upgrade.
///
/// # Arguments
///
/// * `config` - Device address; its timeout is used for connecting
/// * `plan` - Targets and firmware files
/// * `progress` - Progress callback (device_path, bytes_sent, total_bytes)
pub fn upgrade_device(
    config: &TcpConfig,
    plan: &UpgradePlan,
    progress: &mut dyn FnMut(&str, usize, usize),
) -> Result<UpgradeReport> {
    preflight(plan)?;
    info!("Firmware files found, checking device at {}", config.addr());

    let mut port = TcpPort::connect(config).inspect_err(|e| error!("{e}"))?;
    info!("Connected to {}", config.addr());

    run_and_close(&mut port, plan, progress)
}

/// Run a session and close the port whatever the outcome.
fn run_and_close<P: Port>(
    port: &mut P,
    plan: &UpgradePlan,
    progress: &mut dyn FnMut(&str, usize, usize),
) -> Result<UpgradeReport> {
    let result = Upgrader::new(port, plan).run(progress);

    if let Err(e) = port.close() {
        debug!("Close failed (ignoring): {e}");
    }
    result
}

/// Verify every firmware binary exists.
pub fn preflight(plan: &UpgradePlan) -> Result<()> {
    let missing = plan.missing_files();
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::MissingFirmware(
        missing
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    ))
}

/// Runs the upgrade stages over an already connected port.
pub struct Upgrader<'a, P: Port> {
    port: &'a mut P,
    plan: &'a UpgradePlan,
    transfer_config: TransferConfig,
}

impl<'a, P: Port> Upgrader<'a, P> {
    /// Create an upgrader with default transfer timing.
    pub fn new(port: &'a mut P, plan: &'a UpgradePlan) -> Self {
        Self {
            port,
            plan,
            transfer_config: TransferConfig::default(),
        }
    }

    /// Set the transfer timing.
    #[must_use]
    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.transfer_config = config;
        self
    }

    /// Run handshake, queries, battery gate and all upgrade stages.
    ///
    /// Does not close the port.
    pub fn run(&mut self, progress: &mut dyn FnMut(&str, usize, usize)) -> Result<UpgradeReport> {
        device::handshake(self.port)?;
        let device = device::query_versions(self.port)?;

        if !battery_allows_upgrade(device.battery_percent) {
            warn!(
                "Battery level too low ({}% <= {LOW_BATTERY_THRESHOLD}%), skipping upgrade",
                device.battery_percent
            );
            return Err(Error::BatteryTooLow {
                percent: device.battery_percent,
                threshold: LOW_BATTERY_THRESHOLD,
            });
        }

        let bsp_build = device.bsp_build;
        let mut outcome = SessionOutcome::default();

        self.upgrade_module(Component::Ite, device.ite_build, bsp_build, &mut outcome, progress);
        self.upgrade_module(Component::Ble, device.ble_build, bsp_build, &mut outcome, progress);
        self.upgrade_bsp(bsp_build, &mut outcome, progress);

        if outcome.needs_ota_info {
            self.send_ota_info(progress);
        }

        let control = outcome.final_command(bsp_build);
        if let Some(command) = control {
            info!("Sending '{}' (BSP build {bsp_build})", command.as_str());
            // The device may drop the connection as it restarts.
            let reply = self.query_best_effort(command.as_str());
            debug!("'{}' reply: {reply:?}", command.as_str());
        }

        info!("Firmware upgrade process completed");
        Ok(UpgradeReport {
            device,
            outcome,
            control,
        })
    }

    /// ITE or BLE stage.
    fn upgrade_module(
        &mut self,
        component: Component,
        current: u32,
        bsp_build: u32,
        outcome: &mut SessionOutcome,
        progress: &mut dyn FnMut(&str, usize, usize),
    ) {
        let Some(device_path) = component.device_path() else {
            return;
        };
        let (bin, target) = self.plan.component(component);
        if !self.stage_wanted(component, current, target, bin) {
            return;
        }

        if !self.push(component, bin, device_path, progress) {
            return;
        }
        outcome.record_push(component, bsp_build);

        if plan::applies_live(bsp_build) {
            if let Some(command) = component.refresh_command() {
                let version = self.query_best_effort(command);
                info!(
                    "{} updated to version: {}",
                    component.name(),
                    version.as_str().map_or("unknown", str::trim)
                );
            }
        }
    }

    fn upgrade_bsp(
        &mut self,
        bsp_build: u32,
        outcome: &mut SessionOutcome,
        progress: &mut dyn FnMut(&str, usize, usize),
    ) {
        let (bin, target) = self.plan.component(Component::Bsp);
        if !self.stage_wanted(Component::Bsp, bsp_build, target, bin) {
            return;
        }

        let slot = self.query_best_effort(commands::MCU_IMAGE).or_default("0");
        let device_path = bsp_device_path(bsp_build, &slot);
        debug!("Active MCU image '{}', writing {device_path}", slot.trim());

        if self.push(Component::Bsp, bin, device_path, progress) {
            info!("BSP transfer successful, reboot required");
            outcome.record_push(Component::Bsp, bsp_build);
        }
    }

    /// Query after the gating steps; a failure is logged and reads as silence.
    fn query_best_effort(&mut self, command: &str) -> Reply {
        device::query(self.port, command).unwrap_or_else(|e| {
            warn!("'{command}' failed (continuing): {e}");
            Reply::NoResponse
        })
    }

    fn stage_wanted(&self, component: Component, current: u32, target: u32, bin: &Path) -> bool {
        let name = component.name();
        if !needs_upgrade(current, target) {
            debug!("{name} up to date ({current} >= {target})");
            return false;
        }
        if !bin.is_file() {
            warn!("{name} upgrade needed but file not found: {}", bin.display());
            return false;
        }
        info!(
            "{name} upgrade needed: {current} -> {target}, using file: {}",
            bin.display()
        );
        true
    }

    /// Transfer one image; failures are logged and reported as `false`.
    fn push(
        &mut self,
        component: Component,
        bin: &Path,
        device_path: &str,
        progress: &mut dyn FnMut(&str, usize, usize),
    ) -> bool {
        let name = component.name();
        let payload = match fs::read(bin) {
            Ok(data) => data,
            Err(e) => {
                error!("{name}: cannot read {}: {e}", bin.display());
                return false;
            },
        };

        match self.transfer(device_path, &payload, progress) {
            Ok(()) => {
                info!("{name} file transfer successful");
                true
            },
            Err(e) => {
                error!("{name} file transfer failed: {e}");
                false
            },
        }
    }

    fn send_ota_info(&mut self, progress: &mut dyn FnMut(&str, usize, usize)) {
        info!("Sending OTA info file");
        let mut payload = Vec::with_capacity(4);
        // Writing into a Vec cannot fail.
        let _ = payload.write_u32::<LittleEndian>(OTA_INFO_FLAG);

        if let Err(e) = self.transfer(OTA_INFO_PATH, &payload, progress) {
            error!("OTA info file transfer failed: {e}");
        }
    }

    fn transfer(
        &mut self,
        device_path: &str,
        payload: &[u8],
        progress: &mut dyn FnMut(&str, usize, usize),
    ) -> Result<()> {
        FileTransfer::with_config(self.port, self.transfer_config.clone()).send_file(
            device_path,
            payload,
            |current, total| progress(device_path, current, total),
        )
    }
}

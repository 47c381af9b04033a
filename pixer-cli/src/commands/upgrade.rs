//! Firmware check and upgrade.

use {
    crate::{commands::info::device_error, percent, transfer_bar},
    anyhow::Result,
    console::style,
    log::{info, warn},
    pixer::{Error, TcpConfig, UpgradePlan, UpgradeReport, upgrade_device},
};

/// Upgrade command implementation.
///
/// Only an unreachable device is an error; every other abort is reported
/// and the caller continues.
pub(crate) fn cmd_upgrade(tcp: &TcpConfig, plan: &UpgradePlan, quiet: bool) -> Result<()> {
    let pb = transfer_bar(quiet);
    let mut current_path = String::new();

    let result = upgrade_device(tcp, plan, &mut |path: &str, current: usize, total: usize| {
        if path != current_path {
            current_path = path.to_string();
            pb.set_message(format!("Sending {path}"));
            pb.set_position(0);
        }
        pb.set_position(percent(current, total));
    });
    pb.finish_and_clear();

    match result {
        Ok(report) => {
            if !quiet {
                print_report(&report);
            }
            Ok(())
        },
        Err(err) => classify(err),
    }
}

fn classify(err: Error) -> Result<()> {
    match err {
        Error::MissingFirmware(ref files) => {
            info!(
                "Firmware files not found ({}), skipping upgrade",
                files.join(", ")
            );
            Ok(())
        },
        Error::Connection { .. } => Err(device_error(err)),
        other => {
            warn!("Firmware upgrade aborted: {other}");
            Ok(())
        },
    }
}

fn print_report(report: &UpgradeReport) {
    let outcome = &report.outcome;
    let pushed: Vec<&str> = [
        (outcome.ite_pushed, "ITE"),
        (outcome.ble_pushed, "BLE"),
        (outcome.bsp_pushed, "BSP"),
    ]
    .iter()
    .filter_map(|(pushed, name)| pushed.then_some(*name))
    .collect();

    if pushed.is_empty() {
        eprintln!("{} Firmware is up to date", style("✓").green());
        return;
    }

    eprintln!(
        "{} Updated: {}",
        style("✓").green(),
        style(pushed.join(", ")).cyan()
    );
    if let Some(command) = report.control {
        eprintln!(
            "{} Sent '{}', the device is restarting",
            style("🔄").cyan(),
            command.as_str()
        );
    }
}

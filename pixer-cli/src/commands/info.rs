//! Device info and reset command implementations.

use {
    crate::CliError,
    anyhow::Result,
    console::style,
    pixer::{DeviceVersionInfo, TcpConfig, read_device_info, reset_device},
};

/// Map an unreachable device to its exit code, keep everything else.
pub(crate) fn device_error(err: pixer::Error) -> anyhow::Error {
    match err {
        pixer::Error::Connection { .. } => CliError::Unreachable(err.to_string()).into(),
        other => other.into(),
    }
}

/// Info command implementation.
pub(crate) fn cmd_info(tcp: &TcpConfig, json: bool) -> Result<()> {
    if !json {
        eprintln!(
            "{} Connecting to {}",
            style("🔌").cyan(),
            style(tcp.addr()).green()
        );
    }

    let info = read_device_info(tcp).map_err(device_error)?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": info_json(&info),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("\n{}", style("Device Information").bold().underlined());
    eprintln!("  BLE:     {} (build {})", info.ble_version, info.ble_build);
    eprintln!("  ITE:     {} (build {})", info.ite_version, info.ite_build);
    eprintln!("  MCU:     {} (build {})", info.mcu_version, info.bsp_build);

    let battery = format!("{}%", info.battery_percent);
    let battery = if pixer::upgrade::battery_allows_upgrade(info.battery_percent) {
        style(battery).green()
    } else {
        style(battery).red()
    };
    eprintln!("  Battery: {battery}");

    Ok(())
}

/// JSON body for `info --json`.
fn info_json(info: &DeviceVersionInfo) -> serde_json::Value {
    serde_json::json!({
        "ble_version": info.ble_version,
        "ite_version": info.ite_version,
        "mcu_version": info.mcu_version,
        "ble_build": info.ble_build,
        "ite_build": info.ite_build,
        "bsp_build": info.bsp_build,
        "battery_percent": info.battery_percent,
        "upgrade_allowed": pixer::upgrade::battery_allows_upgrade(info.battery_percent),
    })
}

/// Reset command implementation.
pub(crate) fn cmd_reset(tcp: &TcpConfig, quiet: bool) -> Result<()> {
    if reset_device(tcp).map_err(device_error)? {
        if !quiet {
            eprintln!("{} Reset sent to {}", style("🔄").cyan(), tcp.addr());
        }
    } else {
        eprintln!(
            "{} Device did not greet, reset not sent",
            style("⚠").yellow()
        );
    }
    Ok(())
}

//! pixer CLI - Command-line tool for Pixer e-ink displays.
//!
//! ## Features
//!
//! - Check firmware versions and upgrade BLE, ITE and BSP over Wi-Fi
//! - Convert and upload images
//! - Show device versions and battery level
//! - Reset the device
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::env;
use std::path::PathBuf;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use config::{Config, TargetsConfig};

/// CLI error categories with stable exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid configuration.
    #[error("{0}")]
    Config(String),
    /// The device could not be reached.
    #[error("{0}")]
    Unreachable(String),
    /// The image could not be loaded or converted.
    #[error("{0}")]
    Image(String),
}

impl CliError {
    /// Process exit code.
    pub(crate) fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 3,
            Self::Unreachable(_) => 4,
            Self::Image(_) => 1,
        }
    }
}

/// Exit code for any error returned from a command.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    match err.downcast_ref::<pixer::Error>() {
        Some(pixer::Error::Connection { .. }) => 4,
        _ => 1,
    }
}

/// pixer - Upgrade and feed Pixer e-ink displays over Wi-Fi.
///
/// Without a subcommand, the firmware is checked and upgraded if needed,
/// then IMAGE (if given) is shown on the display.
///
/// Environment variables:
///   PIXER_HOST           - Device address (default: 192.168.1.1)
///   PIXER_PORT           - Device port (default: 6000)
///   PIXER_FIRMWARE_DIR   - Directory with ble.bin, ite.bin and pixer.bin
#[derive(Parser)]
#[command(name = "pixer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Image to display after the firmware check.
    #[arg(value_name = "IMAGE")]
    image: Option<PathBuf>,

    /// Device host name or IP address.
    #[arg(long, global = true, env = "PIXER_HOST")]
    host: Option<String>,

    /// Device TCP port.
    #[arg(short, long, global = true, env = "PIXER_PORT")]
    port: Option<u16>,

    /// Enable debug logging (same as -v).
    #[arg(long, global = true)]
    debug: bool,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Directory containing ble.bin, ite.bin and pixer.bin.
    #[arg(long, env = "PIXER_FIRMWARE_DIR", value_name = "DIR")]
    firmware_dir: Option<PathBuf>,

    /// Target BLE build.
    #[arg(long, value_name = "BUILD")]
    ble_target: Option<u32>,

    /// Target ITE build.
    #[arg(long, value_name = "BUILD")]
    ite_target: Option<u32>,

    /// Target BSP build.
    #[arg(long, value_name = "BUILD")]
    bsp_target: Option<u32>,

    /// Skip the firmware check and only upload IMAGE.
    #[arg(long, requires = "image")]
    skip_upgrade: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Effective verbosity; `--debug` counts as `-v`.
    fn verbosity(&self) -> u8 {
        if self.debug {
            self.verbose.max(1)
        } else {
            self.verbose
        }
    }

    fn targets(&self) -> TargetsConfig {
        TargetsConfig {
            ble: self.ble_target,
            ite: self.ite_target,
            bsp: self.bsp_target,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Show firmware versions and battery level.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Reboot the device.
    Reset,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Default log filter for the given flags.
fn log_level(quiet: bool, verbosity: u8) -> &'static str {
    if quiet {
        "warn"
    } else {
        match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let verbosity = cli.verbosity();
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level(cli.quiet, verbosity)))
        .format_target(verbosity >= 2)
        .format_timestamp(if verbosity >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "pixer v{} (verbose level: {verbosity})",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = match cli.config_path {
        Some(ref path) if !path.is_file() => {
            return Err(CliError::Config(format!(
                "config file not found: {}",
                path.display()
            ))
            .into());
        },
        Some(ref path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let tcp = config.tcp_config(cli.host.as_deref(), cli.port);

    match cli.command {
        Some(Commands::Info { json }) => commands::info::cmd_info(&tcp, json),
        Some(Commands::Reset) => commands::info::cmd_reset(&tcp, cli.quiet),
        Some(Commands::Completions { shell }) => {
            commands::completions::cmd_completions(shell);
            Ok(())
        },
        None => {
            if !cli.skip_upgrade {
                let plan = config.upgrade_plan(cli.firmware_dir.as_deref(), &cli.targets());
                commands::upgrade::cmd_upgrade(&tcp, &plan, cli.quiet)?;
            }
            if let Some(ref image) = cli.image {
                commands::upload::cmd_upload(&tcp, image, cli.quiet)?;
            }
            Ok(())
        },
    }
}

/// Progress bar for a transfer, hidden in quiet or plain output mode.
pub(crate) fn transfer_bar(quiet: bool) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Percentage for a progress bar.
pub(crate) fn percent(current: usize, total: usize) -> u64 {
    if total == 0 {
        return 100;
    }
    (current * 100 / total) as u64
}

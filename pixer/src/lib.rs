//! # pixer
//!
//! A library for upgrading and feeding Pixer e-ink displays over TCP.
//!
//! This crate provides the host side of the device's plain-text TCP protocol:
//!
//! - Command/reply exchange with retrying reads
//! - File transfer with completion polling (`sendFile`)
//! - Version and battery parsing
//! - Firmware upgrade decisions and orchestration (BLE, ITE, BSP)
//! - 4-bit grayscale bitmap encoding and image upload
//!
//! ## Features
//!
//! - `codec` (default): decode image files into device bitmaps via `image`
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use pixer::{TcpConfig, UpgradePlan, bitmap, upgrade_device, upload_to_device};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TcpConfig::default();
//!
//!     // Bring the firmware up to date
//!     let plan = UpgradePlan::in_dir(std::path::Path::new("firmware"));
//!     let report = upgrade_device(&config, &plan, &mut |path, current, total| {
//!         println!("Sending {}: {}/{}", path, current, total);
//!     })?;
//!     println!("Control command: {:?}", report.control);
//!
//!     // Show a picture
//!     #[cfg(feature = "codec")]
//!     {
//!         let frame = bitmap::convert_image(
//!             std::path::Path::new("photo.jpg"),
//!             bitmap::DEFAULT_WIDTH,
//!             bitmap::DEFAULT_HEIGHT,
//!         )?;
//!         upload_to_device(&config, &frame, |_, _| {})?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitmap;
pub mod device;
pub mod error;
pub mod port;
pub mod protocol;
pub mod upgrade;
pub mod version;

// Re-exports for convenience
pub use {
    device::{Handshake, read_device_info, reset_device},
    error::{Error, Result},
    port::{Port, TcpConfig, TcpPort},
    protocol::{CommandChannel, FileTransfer, Reply, TransferConfig, upload_image, upload_to_device},
    upgrade::{
        Component, ControlCommand, SessionOutcome, UpgradePlan, UpgradeReport, UpgradeTargets,
        Upgrader, upgrade_device,
    },
    version::DeviceVersionInfo,
};

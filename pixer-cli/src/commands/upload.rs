//! Image conversion and upload.

use {
    crate::{CliError, commands::info::device_error, percent, transfer_bar},
    anyhow::Result,
    console::style,
    log::debug,
    pixer::{
        TcpConfig,
        bitmap::{DEFAULT_HEIGHT, DEFAULT_WIDTH, convert_image},
        upload_to_device,
    },
    std::path::Path,
};

/// Convert `image` into the device format.
pub(crate) fn load_frame(image: &Path) -> Result<Vec<u8>> {
    convert_image(image, DEFAULT_WIDTH, DEFAULT_HEIGHT)
        .map_err(|e| CliError::Image(e.to_string()).into())
}

/// Upload command implementation.
///
/// The image is converted before the device is contacted.
pub(crate) fn cmd_upload(tcp: &TcpConfig, image: &Path, quiet: bool) -> Result<()> {
    if !quiet {
        eprintln!(
            "{} Converting {}",
            style("🖼").cyan(),
            image.display()
        );
    }
    let frame = load_frame(image)?;
    debug!("Frame ready ({} bytes)", frame.len());

    let pb = transfer_bar(quiet);
    pb.set_message(format!("Uploading to {}", tcp.addr()));
    upload_to_device(tcp, &frame, |current, total| {
        pb.set_position(percent(current, total));
    })
    .map_err(device_error)?;
    pb.finish_and_clear();

    if !quiet {
        eprintln!("{} Image uploaded", style("🎉").green().bold());
    }
    Ok(())
}

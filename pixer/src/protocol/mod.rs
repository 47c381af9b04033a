//! Protocol implementations.

pub mod command;
pub mod transfer;
pub mod upload;

// Re-export common types
pub use command::{CommandChannel, Reply};
pub use transfer::{FileTransfer, TransferConfig};
pub use upload::{upload_image, upload_to_device};

//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("USB error: {0}")]
    Usb(#[from] zerousb::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Whether the underlying failure means the device went away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::Usb(e) if e.is_disconnect())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

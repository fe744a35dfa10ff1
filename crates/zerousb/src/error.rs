//! Session layer error types

use crate::id::Id;
use thiserror::Error;

/// Errors surfaced by the connection and transfer layer
#[derive(Debug, Error)]
pub enum Error {
    /// The host-controller context could not be created
    #[error("Failed to initialize USB context: {0}")]
    Initialization(#[source] rusb::Error),

    /// No enumerated device matched the requested identifiers and endpoint shape
    #[error("No device found for {vendor_id}:{product_id}")]
    NotFound { vendor_id: Id, product_id: Id },

    /// The configured interface could not be claimed
    #[error("Failed to claim interface {interface}: {source}")]
    Claim {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// The session was closed before or during the operation
    #[error("Device closed")]
    DeviceClosed,

    /// The device went away (I/O, no-device, pipe or unclassified failure)
    #[error("Device disconnected")]
    DeviceDisconnected,

    /// Any other host-controller failure, unchanged
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

impl Error {
    /// Classify a raw transfer failure
    ///
    /// Io, NoDevice, Pipe and Other collapse into [`Error::DeviceDisconnected`];
    /// every other code passes through as [`Error::Usb`].
    pub fn from_transfer(err: rusb::Error) -> Self {
        if is_disconnect(err) {
            Error::DeviceDisconnected
        } else {
            Error::Usb(err)
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::DeviceDisconnected)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Error::DeviceClosed)
    }
}

/// Whether a host-controller failure code means the device is gone
pub fn is_disconnect(err: rusb::Error) -> bool {
    matches!(
        err,
        rusb::Error::Io | rusb::Error::NoDevice | rusb::Error::Pipe | rusb::Error::Other
    )
}

pub type Result<T> = std::result::Result<T, Error>;

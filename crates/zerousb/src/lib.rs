//! Host-side session layer for generic USB devices
//!
//! Opens a device by vendor/product id and exchanges binary payloads over its
//! bulk or interrupt endpoints. The layering, leaf first:
//!
//! - [`endpoint`]: confirms or discovers the IN/OUT endpoint pair
//! - [`matcher`]: filters an enumerated device list down to candidates
//! - [`ConnectionManager`]: owns the host-controller context and opens sessions
//! - [`Session`]: serialized per-direction transfers, disconnect detection and
//!   orderly teardown
//!
//! The host controller itself sits behind the [`host`] traits; [`LibUsb`] is
//! the `rusb`-backed implementation.
//!
//! ```no_run
//! use std::time::Duration;
//! use zerousb::{ConnectionManager, Id, Options};
//!
//! # fn main() -> zerousb::Result<()> {
//! let manager = ConnectionManager::new(Options::default())?;
//! let session = manager.connect(Id(0x0483), Id(0xa27e), false)?;
//!
//! session.write(&[0x3f, 0x23, 0x23])?;
//! let mut buf = [0u8; 64];
//! let n = session.read(&mut buf, Duration::ZERO)?;
//! println!("{:02x?}", &buf[..n]);
//!
//! session.close(false)?;
//! manager.close();
//! # Ok(())
//! # }
//! ```

pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod id;
pub mod libusb;
pub mod manager;
pub mod matcher;
pub mod options;
pub mod session;

pub use descriptor::{AltSetting, ConfigLayout, DeviceDetails, EndpointDescriptor};
pub use endpoint::{EndpointMatch, EndpointSpec, TransferKind};
pub use error::{Error, Result};
pub use host::{HandleOf, HostDevice, HostHandle, UsbHost};
pub use id::Id;
pub use libusb::LibUsb;
pub use manager::ConnectionManager;
pub use options::{DEFAULT_READ_TIMEOUT, Options};
pub use session::{Session, SessionState};

pub use rusb;

//! Host-controller seam
//!
//! The session layer never talks to libusb directly. It consumes these three
//! traits, which [`crate::LibUsb`] implements on top of `rusb` and which tests
//! implement with scripted in-memory devices.
//!
//! Failure codes are `rusb::Error` throughout so that disconnect
//! classification is the same no matter which host sits underneath.

use crate::descriptor::{ConfigLayout, DeviceDetails};
use std::time::Duration;

/// Host-controller context: owns enumeration
pub trait UsbHost: Send + Sync {
    type Device: HostDevice;

    /// Snapshot the attached devices in enumeration order
    ///
    /// Dropping the returned list releases it.
    fn devices(&self) -> rusb::Result<Vec<Self::Device>>;
}

/// An enumerated, not yet opened, device
pub trait HostDevice {
    type Handle: HostHandle;

    fn details(&self) -> rusb::Result<DeviceDetails>;

    /// Layout of the device's active configuration
    fn active_config(&self) -> rusb::Result<ConfigLayout>;

    fn open(&self) -> rusb::Result<Self::Handle>;
}

/// An opened device; dropping it closes the handle
///
/// Transfers take `&self` so that one IN and one OUT transfer may run at the
/// same time. Everything that changes device state takes `&mut self`.
pub trait HostHandle: Send + Sync + 'static {
    fn reset(&mut self) -> rusb::Result<()>;

    fn active_configuration(&self) -> rusb::Result<u8>;
    fn set_active_configuration(&mut self, config: u8) -> rusb::Result<()>;

    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool>;
    fn detach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()>;

    fn claim_interface(&mut self, iface: u8) -> rusb::Result<()>;
    fn release_interface(&mut self, iface: u8) -> rusb::Result<()>;

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;
    fn read_interrupt(&self, endpoint: u8, buf: &mut [u8], timeout: Duration)
    -> rusb::Result<usize>;
    fn write_interrupt(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;

    /// Abort synchronous transfers still pending on this handle
    fn cancel_transfers(&self) -> rusb::Result<()>;
}

/// Handle type produced by a host's devices
pub type HandleOf<H> = <<H as UsbHost>::Device as HostDevice>::Handle;

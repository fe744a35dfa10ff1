//! Connection manager
//!
//! Owns the host-controller context and turns a vendor/product pair into an
//! open [`Session`]: enumerate, match, open, optionally reset, select the
//! configuration, detach the kernel driver where the platform allows it, and
//! claim the interface.

use crate::descriptor::DeviceDetails;
use crate::error::{Error, Result};
use crate::host::{HandleOf, HostDevice, HostHandle, UsbHost};
use crate::id::Id;
use crate::libusb::LibUsb;
use crate::matcher::{self, Candidate};
use crate::options::Options;
use crate::session::Session;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Serializes enumeration across every manager in the process; libusb does
/// not document device-list enumeration as thread-safe.
static ENUMERATION_LOCK: Mutex<()> = Mutex::new(());

/// Entry point: one host-controller context, any number of connects
pub struct ConnectionManager<U: UsbHost = LibUsb> {
    host: U,
    options: Options,
    /// Windows' driver model forbids detaching kernel drivers
    can_detach: bool,
}

impl ConnectionManager<LibUsb> {
    /// Open a libusb context
    ///
    /// Fails with [`Error::Initialization`] when no backend is available.
    pub fn new(options: Options) -> Result<Self> {
        Ok(Self::with_host(LibUsb::new()?, options))
    }
}

impl<U: UsbHost> ConnectionManager<U> {
    /// Build a manager around an existing host-controller context
    pub fn with_host(host: U, options: Options) -> Self {
        Self {
            host,
            options,
            can_detach: cfg!(not(target_os = "windows")),
        }
    }

    /// Override whether kernel driver detachment is attempted
    pub fn with_kernel_driver_detach(mut self, enabled: bool) -> Self {
        self.can_detach = enabled;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn host(&self) -> &U {
        &self.host
    }

    /// Descriptors of attached non-HID devices matching the ids
    ///
    /// [`Id::ANY`] for either id matches every value.
    pub fn find(&self, vendor_id: Id, product_id: Id) -> Result<Vec<DeviceDetails>> {
        let _guard = enumeration_lock();
        let devices = self.host.devices()?;

        let found = matcher::list(&devices, vendor_id, product_id);
        debug!(
            "Found {} of {} devices matching {}:{}",
            found.len(),
            devices.len(),
            vendor_id,
            product_id
        );
        Ok(found)
    }

    /// Open a session on the first matching device that accepts one
    ///
    /// Candidates are tried in enumeration order. With no candidate this is
    /// [`Error::NotFound`]; when every candidate fails, the last failure is
    /// returned and the earlier ones are logged.
    pub fn connect(
        &self,
        vendor_id: Id,
        product_id: Id,
        reset: bool,
    ) -> Result<Session<HandleOf<U>>> {
        let _guard = enumeration_lock();
        let devices = self.host.devices()?;
        debug!("Enumerated {} devices", devices.len());

        let mut last_error = None;
        for candidate in matcher::find(&devices, vendor_id, product_id, &self.options) {
            match self.connect_device(&candidate, reset) {
                Ok(session) => {
                    info!(
                        "Connected to {}:{} at bus={} addr={} (interface {}, in={:#04x}, out={:#04x})",
                        vendor_id,
                        product_id,
                        candidate.details.bus_number,
                        candidate.details.address,
                        session.interface(),
                        session.endpoint_in().address,
                        session.endpoint_out().address
                    );
                    return Ok(session);
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to {}:{} at bus={} addr={}: {}",
                        vendor_id,
                        product_id,
                        candidate.details.bus_number,
                        candidate.details.address,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        debug!("Freeing device list");
        Err(last_error.unwrap_or(Error::NotFound {
            vendor_id,
            product_id,
        }))
    }

    /// Release the host-controller context
    ///
    /// Sessions still open keep their own handles and must be closed by
    /// their owners.
    pub fn close(self) {
        info!("Closing USB context");
        drop(self.host);
    }

    fn connect_device(
        &self,
        candidate: &Candidate<'_, U::Device>,
        reset: bool,
    ) -> Result<Session<HandleOf<U>>> {
        let mut handle = candidate.device.open()?;

        if reset && let Err(e) = handle.reset() {
            warn!("Device reset failed: {}", e);
        }

        self.select_configuration(&mut handle)?;

        let interface = candidate.endpoints.interface;
        let detached = self.detach_kernel_driver(&mut handle, interface);

        if let Err(source) = handle.claim_interface(interface) {
            error!("Failed to claim interface {}: {}", interface, source);
            if detached && let Err(e) = handle.attach_kernel_driver(interface) {
                debug!("Could not reattach kernel driver to interface {}: {}", interface, e);
            }
            // Dropping the handle closes it
            return Err(Error::Claim { interface, source });
        }
        debug!("Claimed interface {}", interface);

        Ok(Session::new(
            handle,
            candidate.endpoints,
            candidate.details.clone(),
            self.options.clone(),
            detached,
        ))
    }

    /// Select the configured configuration unless it is already active
    ///
    /// Setting the active configuration again resets some devices.
    fn select_configuration(&self, handle: &mut HandleOf<U>) -> Result<()> {
        let Some(wanted) = self.options.configuration else {
            return Ok(());
        };

        match handle.active_configuration() {
            Ok(current) if current == wanted => {
                debug!("Configuration {} already active", wanted);
                return Ok(());
            }
            Ok(current) => debug!("Switching configuration {} -> {}", current, wanted),
            Err(e) => warn!("Failed to read current configuration: {}", e),
        }

        handle.set_active_configuration(wanted).map_err(|e| {
            error!("Failed to set configuration {}: {}", wanted, e);
            Error::Usb(e)
        })
    }

    /// Detach the kernel driver from `interface`, returning whether this
    /// session is responsible for reattaching it
    ///
    /// Failure is tolerated: newer OS driver stacks forbid detaching yet
    /// still allow the claim.
    fn detach_kernel_driver(&self, handle: &mut HandleOf<U>, interface: u8) -> bool {
        if !self.can_detach {
            return false;
        }

        match handle.kernel_driver_active(interface) {
            Ok(false) => {
                debug!("No kernel driver active on interface {}", interface);
                false
            }
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", interface);
                if let Err(e) = handle.detach_kernel_driver(interface) {
                    warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface, e
                    );
                }
                true
            }
            // Status unknown: only a detach that worked proves a driver was bound
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface, e
                );
                match handle.detach_kernel_driver(interface) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            "Failed to detach kernel driver from interface {}: {}",
                            interface, e
                        );
                        false
                    }
                }
            }
        }
    }
}

fn enumeration_lock() -> MutexGuard<'static, ()> {
    ENUMERATION_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

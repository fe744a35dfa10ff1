//! Device session
//!
//! A [`Session`] owns one opened device handle with a claimed interface. It
//! dispatches reads to the IN endpoint and writes to the OUT endpoint using
//! the transfer primitive bound at connect time.
//!
//! Concurrency:
//! - one lock per direction, so one read and one write may be in flight at
//!   once but never two of the same direction
//! - the handle sits behind an `RwLock`: transfers share it, teardown takes it
//!   exclusively once in-flight transfers have returned
//! - the session state is atomic and flips to `Closing` before any teardown
//!   step, so new transfers fail fast with [`Error::DeviceClosed`]

use crate::descriptor::DeviceDetails;
use crate::endpoint::{EndpointMatch, EndpointSpec, InEndpoint, OutEndpoint};
use crate::error::{Error, Result};
use crate::host::HostHandle;
use crate::options::Options;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Packet size used when draining stale input on close
const DRAIN_PACKET_SIZE: usize = 64;
/// Per-read timeout while draining
const DRAIN_TIMEOUT: Duration = Duration::from_millis(50);
/// Upper bound on drain reads for devices that never go quiet
const MAX_DRAIN_READS: usize = 256;

const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle of a session: `Open -> Closing -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

/// Exclusive, live handle to a claimed device interface
pub struct Session<H: HostHandle> {
    /// `None` once teardown has closed the handle
    handle: RwLock<Option<H>>,
    endpoint_in: InEndpoint<H>,
    endpoint_out: OutEndpoint<H>,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
    state: AtomicU8,
    interface: u8,
    /// Whether connect detached a kernel driver that close must give back
    detached_kernel_driver: bool,
    details: DeviceDetails,
    options: Options,
}

impl<H: HostHandle> Session<H> {
    pub(crate) fn new(
        handle: H,
        endpoints: EndpointMatch,
        details: DeviceDetails,
        options: Options,
        detached_kernel_driver: bool,
    ) -> Self {
        Self {
            handle: RwLock::new(Some(handle)),
            endpoint_in: InEndpoint::bind(endpoints.endpoint_in),
            endpoint_out: OutEndpoint::bind(endpoints.endpoint_out),
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            state: AtomicU8::new(STATE_OPEN),
            interface: endpoints.interface,
            detached_kernel_driver,
            details,
            options,
        }
    }

    /// Send `buf` to the OUT endpoint
    ///
    /// Blocks without a timeout until the transfer completes or fails.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let _guard = lock(&self.write_lock);
        let endpoint = &self.endpoint_out;

        if self.options.debug {
            debug!(
                "Write to {:#04x}: {} bytes {:02x?}",
                endpoint.spec().address,
                buf.len(),
                buf
            );
        }

        self.dispatch(buf.len(), Duration::ZERO, |handle, timeout| {
            endpoint.write(handle, buf, timeout)
        })
    }

    /// Fill `buf` from the IN endpoint
    ///
    /// A zero `timeout` is replaced by the default read timeout (5000 ms
    /// unless overridden in [`Options::read_timeout`]).
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let timeout = if timeout.is_zero() {
            self.options.default_read_timeout()
        } else {
            timeout
        };

        let _guard = lock(&self.read_lock);
        let endpoint = &self.endpoint_in;
        let len = buf.len();

        let read = self.dispatch(len, timeout, |handle, timeout| {
            endpoint.read(handle, buf, timeout)
        })?;

        if self.options.debug {
            debug!(
                "Read from {:#04x}: {} bytes {:02x?}",
                endpoint.spec().address,
                read,
                &buf[..read]
            );
        }

        Ok(read)
    }

    /// Device descriptor captured at connect time
    pub fn details(&self) -> &DeviceDetails {
        &self.details
    }

    pub fn endpoint_in(&self) -> EndpointSpec {
        self.endpoint_in.spec()
    }

    pub fn endpoint_out(&self) -> EndpointSpec {
        self.endpoint_out.spec()
    }

    /// Claimed interface number
    pub fn interface(&self) -> u8 {
        self.interface
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_OPEN => SessionState::Open,
            STATE_CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    /// Tear the session down
    ///
    /// Unless `disconnected`, pending transfers are cancelled and stale input
    /// is drained first so the next session on this device starts clean.
    /// Release, kernel driver re-attachment and handle close always run;
    /// their failures are logged, never returned. Repeated calls are no-ops.
    ///
    /// Blocks until transfers already in flight return. Writes carry no
    /// timeout and libusb cannot cancel synchronous transfers, so a write
    /// stuck on an unresponsive device holds up `close` until it fails.
    pub fn close(&self, disconnected: bool) -> Result<()> {
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Session already closed");
            return Ok(());
        }

        info!(
            "Closing session on {}:{} (disconnected={})",
            self.details.vendor_id, self.details.product_id, disconnected
        );

        if !disconnected {
            if let Some(handle) = read_guard(&self.handle).as_ref()
                && let Err(e) = handle.cancel_transfers()
            {
                debug!("Could not cancel pending transfers: {}", e);
            }

            let drained = self.drain();
            trace!("Drain issued {} reads", drained);
        }

        // Waits for in-flight transfers to return
        let handle = self
            .handle
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut handle) = handle {
            if let Err(e) = handle.release_interface(self.interface) {
                warn!("Failed to release interface {}: {}", self.interface, e);
            }

            if self.detached_kernel_driver {
                match handle.attach_kernel_driver(self.interface) {
                    Ok(()) => debug!("Reattached kernel driver to interface {}", self.interface),
                    Err(e) => warn!(
                        "Failed to reattach kernel driver to interface {}: {}",
                        self.interface, e
                    ),
                }
            }

            drop(handle);
            debug!("Closed device handle");
        }

        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        Ok(())
    }

    /// Read until the IN endpoint fails, discarding whatever arrives
    fn drain(&self) -> usize {
        let _guard = lock(&self.read_lock);
        let handle = read_guard(&self.handle);
        let Some(handle) = handle.as_ref() else {
            return 0;
        };

        let mut buf = [0u8; DRAIN_PACKET_SIZE];
        let mut reads = 0;

        while reads < MAX_DRAIN_READS {
            reads += 1;
            match self.endpoint_in.read(handle, &mut buf, DRAIN_TIMEOUT) {
                Ok(n) => trace!("Drained {} stale bytes", n),
                Err(e) => {
                    trace!("Drain finished: {}", e);
                    break;
                }
            }
        }

        reads
    }

    fn is_closing(&self) -> bool {
        self.state.load(Ordering::SeqCst) != STATE_OPEN
    }

    /// Run one transfer against the shared handle
    ///
    /// A zero `timeout` means "no timeout". With
    /// [`Options::retry_zero_length`], a zero-byte result for a non-empty
    /// buffer is retried until data arrives, the session closes, or the
    /// overall timeout is spent.
    fn dispatch<F>(&self, len: usize, timeout: Duration, mut transfer: F) -> Result<usize>
    where
        F: FnMut(&H, Duration) -> rusb::Result<usize>,
    {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let mut remaining = timeout;

        loop {
            if self.is_closing() {
                return Err(Error::DeviceClosed);
            }

            let result = {
                let guard = read_guard(&self.handle);
                let Some(handle) = guard.as_ref() else {
                    return Err(Error::DeviceClosed);
                };
                transfer(handle, remaining)
            };

            match result {
                Ok(0) if self.options.retry_zero_length && len > 0 => {
                    if let Some(deadline) = deadline {
                        remaining = deadline.saturating_duration_since(Instant::now());
                        // A zero timeout would mean "wait forever"
                        if remaining < Duration::from_millis(1) {
                            return Err(Error::Usb(rusb::Error::Timeout));
                        }
                    }
                    trace!("Zero-length transfer, retrying");
                }
                Ok(n) => return Ok(n),
                Err(e) => return Err(self.transfer_failed(e)),
            }
        }
    }

    fn transfer_failed(&self, err: rusb::Error) -> Error {
        match err {
            rusb::Error::Timeout => debug!("Transfer timed out"),
            _ => warn!(
                "Transfer failed on {}:{} interface {}: {}",
                self.details.vendor_id, self.details.product_id, self.interface, err
            ),
        }

        let err = Error::from_transfer(err);
        if err.is_disconnect() {
            info!(
                "Device {}:{} disconnected",
                self.details.vendor_id, self.details.product_id
            );
        }
        err
    }
}

impl<H: HostHandle> Drop for Session<H> {
    fn drop(&mut self) {
        if self.state() == SessionState::Open {
            debug!("Session dropped while open, releasing device");
            // Nobody is left to read, so skip draining
            let _ = self.close(true);
        }
    }
}

impl<H: HostHandle> std::fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("details", &self.details)
            .field("interface", &self.interface)
            .field("endpoint_in", &self.endpoint_in.spec())
            .field("endpoint_out", &self.endpoint_out.spec())
            .field("state", &self.state())
            .finish()
    }
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

//! Scripted in-memory host controller
//!
//! Implements the `zerousb` host traits over devices whose descriptors,
//! failures and inbound data are scripted by each test. Every call made
//! against a device is recorded so tests can assert on the exact sequence.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;
use zerousb::rusb::{self, TransferType};
use zerousb::{
    AltSetting, ConfigLayout, DeviceDetails, EndpointDescriptor, HostDevice, HostHandle, Id,
    TransferKind, UsbHost,
};

pub const VENDOR: Id = Id(0x0483);
pub const PRODUCT: Id = Id(0xa27e);
pub const VENDOR_CLASS: u8 = 0xff;

/// Longest a scripted read blocks, whatever the requested timeout
const MAX_READ_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Open,
    Reset,
    GetConfiguration,
    SetConfiguration(u8),
    KernelDriverActive(u8),
    DetachKernelDriver(u8),
    AttachKernelDriver(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    Read {
        endpoint: u8,
        kind: TransferKind,
        timeout: Duration,
    },
    Write {
        endpoint: u8,
        kind: TransferKind,
        timeout: Duration,
    },
    Cancel,
    Close,
}

impl Call {
    pub fn is_read(&self) -> bool {
        matches!(self, Call::Read { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Call::Write { .. })
    }
}

/// Scripted behaviour of one device
#[derive(Debug, Clone)]
pub struct Script {
    pub kernel_driver_active: bool,
    pub active_configuration: u8,
    pub open_error: Option<rusb::Error>,
    pub reset_error: Option<rusb::Error>,
    pub get_configuration_error: Option<rusb::Error>,
    pub set_configuration_error: Option<rusb::Error>,
    pub kernel_driver_error: Option<rusb::Error>,
    pub detach_error: Option<rusb::Error>,
    pub attach_error: Option<rusb::Error>,
    pub claim_error: Option<rusb::Error>,
    pub release_error: Option<rusb::Error>,
    pub write_error: Option<rusb::Error>,
    /// Number of upcoming writes that report zero bytes
    pub zero_length_writes: usize,
    /// Written payloads become readable
    pub loopback: bool,
    /// Time spent inside each transfer
    pub transfer_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            kernel_driver_active: false,
            active_configuration: 1,
            open_error: None,
            reset_error: None,
            get_configuration_error: None,
            set_configuration_error: None,
            kernel_driver_error: None,
            detach_error: None,
            attach_error: None,
            claim_error: None,
            release_error: None,
            write_error: None,
            zero_length_writes: 0,
            loopback: false,
            transfer_delay: Duration::ZERO,
        }
    }
}

/// State shared by a device and every handle opened on it
#[derive(Default)]
pub struct DeviceState {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    inbound: Mutex<VecDeque<rusb::Result<Vec<u8>>>>,
    inbound_ready: Condvar,
    written: Mutex<Vec<Vec<u8>>>,
    open_handles: AtomicUsize,
    reads_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
    writes_in_flight: AtomicUsize,
    max_writes_in_flight: AtomicUsize,
}

impl DeviceState {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn script(&self) -> Script {
        self.script.lock().unwrap().clone()
    }

    pub fn update_script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn reads(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_read).collect()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    /// Queue data for the next read
    pub fn push_inbound(&self, data: &[u8]) {
        self.inbound.lock().unwrap().push_back(Ok(data.to_vec()));
        self.inbound_ready.notify_all();
    }

    /// Queue a failure for the next read
    pub fn push_inbound_error(&self, err: rusb::Error) {
        self.inbound.lock().unwrap().push_back(Err(err));
        self.inbound_ready.notify_all();
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.lock().unwrap().len()
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn max_reads_in_flight(&self) -> usize {
        self.max_reads_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_writes_in_flight(&self) -> usize {
        self.max_writes_in_flight.load(Ordering::SeqCst)
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        let _flight = InFlight::enter(&self.reads_in_flight, &self.max_reads_in_flight);
        self.delay();

        let wait = if timeout.is_zero() {
            MAX_READ_WAIT
        } else {
            timeout.min(MAX_READ_WAIT)
        };

        let queue = self.inbound.lock().unwrap();
        let (mut queue, _) = self
            .inbound_ready
            .wait_timeout_while(queue, wait, |q| q.is_empty())
            .unwrap();

        match queue.pop_front() {
            None => Err(rusb::Error::Timeout),
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
        }
    }

    fn write(&self, buf: &[u8]) -> rusb::Result<usize> {
        let _flight = InFlight::enter(&self.writes_in_flight, &self.max_writes_in_flight);
        self.delay();

        let loopback = {
            let mut script = self.script.lock().unwrap();
            if let Some(e) = script.write_error {
                return Err(e);
            }
            if script.zero_length_writes > 0 {
                script.zero_length_writes -= 1;
                return Ok(0);
            }
            script.loopback
        };

        self.written.lock().unwrap().push(buf.to_vec());
        if loopback {
            self.push_inbound(buf);
        }
        Ok(buf.len())
    }

    fn delay(&self) {
        let delay = self.script.lock().unwrap().transfer_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Tracks concurrent transfers in one direction
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

fn fail(err: Option<rusb::Error>) -> rusb::Result<()> {
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Counts device-list releases
struct ListToken(Arc<AtomicUsize>);

impl Drop for ListToken {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct MockDevice {
    details: rusb::Result<DeviceDetails>,
    config: rusb::Result<ConfigLayout>,
    state: Arc<DeviceState>,
    list: Option<Arc<ListToken>>,
}

impl MockDevice {
    /// Vendor-class device with one bulk IN/OUT pair (0x81/0x01) on interface 0
    pub fn new(vendor_id: Id, product_id: Id) -> Self {
        Self {
            details: Ok(DeviceDetails {
                vendor_id,
                product_id,
                class_code: 0,
                sub_class_code: 0,
                protocol_code: 0,
                max_packet_size: 64,
                num_configurations: 1,
                bus_number: 1,
                address: 1,
            }),
            config: Ok(ConfigLayout {
                number: 1,
                alt_settings: vec![alt_setting(
                    0,
                    VENDOR_CLASS,
                    &[(0x81, TransferType::Bulk), (0x01, TransferType::Bulk)],
                )],
            }),
            state: Arc::new(DeviceState::default()),
            list: None,
        }
    }

    pub fn at(mut self, bus_number: u8, address: u8) -> Self {
        if let Ok(details) = &mut self.details {
            details.bus_number = bus_number;
            details.address = address;
        }
        self
    }

    pub fn with_class(mut self, class_code: u8) -> Self {
        if let Ok(details) = &mut self.details {
            details.class_code = class_code;
        }
        self
    }

    pub fn with_alt_settings(mut self, alt_settings: Vec<AltSetting>) -> Self {
        self.config = Ok(ConfigLayout {
            number: 1,
            alt_settings,
        });
        self
    }

    pub fn with_details_error(mut self, err: rusb::Error) -> Self {
        self.details = Err(err);
        self
    }

    pub fn with_config_error(mut self, err: rusb::Error) -> Self {
        self.config = Err(err);
        self
    }

    pub fn with_script(self, f: impl FnOnce(&mut Script)) -> Self {
        self.state.update_script(f);
        self
    }

    pub fn state(&self) -> Arc<DeviceState> {
        self.state.clone()
    }
}

pub fn alt_setting(
    interface_number: u8,
    class_code: u8,
    endpoints: &[(u8, TransferType)],
) -> AltSetting {
    AltSetting {
        interface_number,
        setting_number: 0,
        class_code,
        endpoints: endpoints
            .iter()
            .map(|&(address, transfer_type)| EndpointDescriptor::new(address, transfer_type))
            .collect(),
    }
}

impl HostDevice for MockDevice {
    type Handle = MockHandle;

    fn details(&self) -> rusb::Result<DeviceDetails> {
        self.details.clone()
    }

    fn active_config(&self) -> rusb::Result<ConfigLayout> {
        self.config.clone()
    }

    fn open(&self) -> rusb::Result<MockHandle> {
        self.state.record(Call::Open);
        fail(self.state.script().open_error)?;

        self.state.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(MockHandle {
            state: self.state.clone(),
        })
    }
}

pub struct MockHandle {
    state: Arc<DeviceState>,
}

impl HostHandle for MockHandle {
    fn reset(&mut self) -> rusb::Result<()> {
        self.state.record(Call::Reset);
        fail(self.state.script().reset_error)
    }

    fn active_configuration(&self) -> rusb::Result<u8> {
        self.state.record(Call::GetConfiguration);
        let script = self.state.script();
        fail(script.get_configuration_error)?;
        Ok(script.active_configuration)
    }

    fn set_active_configuration(&mut self, config: u8) -> rusb::Result<()> {
        self.state.record(Call::SetConfiguration(config));
        fail(self.state.script().set_configuration_error)?;
        self.state.update_script(|s| s.active_configuration = config);
        Ok(())
    }

    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool> {
        self.state.record(Call::KernelDriverActive(iface));
        let script = self.state.script();
        fail(script.kernel_driver_error)?;
        Ok(script.kernel_driver_active)
    }

    fn detach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        self.state.record(Call::DetachKernelDriver(iface));
        fail(self.state.script().detach_error)
    }

    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        self.state.record(Call::AttachKernelDriver(iface));
        fail(self.state.script().attach_error)
    }

    fn claim_interface(&mut self, iface: u8) -> rusb::Result<()> {
        self.state.record(Call::ClaimInterface(iface));
        fail(self.state.script().claim_error)
    }

    fn release_interface(&mut self, iface: u8) -> rusb::Result<()> {
        self.state.record(Call::ReleaseInterface(iface));
        fail(self.state.script().release_error)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.state.record(Call::Read {
            endpoint,
            kind: TransferKind::Bulk,
            timeout,
        });
        self.state.read(buf, timeout)
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.state.record(Call::Write {
            endpoint,
            kind: TransferKind::Bulk,
            timeout,
        });
        self.state.write(buf)
    }

    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        self.state.record(Call::Read {
            endpoint,
            kind: TransferKind::Interrupt,
            timeout,
        });
        self.state.read(buf, timeout)
    }

    fn write_interrupt(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.state.record(Call::Write {
            endpoint,
            kind: TransferKind::Interrupt,
            timeout,
        });
        self.state.write(buf)
    }

    fn cancel_transfers(&self) -> rusb::Result<()> {
        self.state.record(Call::Cancel);
        Ok(())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.state.record(Call::Close);
        self.state.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Host whose enumeration returns the scripted devices in order
pub struct MockHost {
    devices: Vec<MockDevice>,
    enumerations: AtomicUsize,
    list_frees: Arc<AtomicUsize>,
    enumerate_error: Option<rusb::Error>,
    /// Time spent inside each enumeration
    enumerate_delay: Duration,
    enumerations_in_flight: AtomicUsize,
    max_enumerations_in_flight: AtomicUsize,
}

impl MockHost {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            enumerations: AtomicUsize::new(0),
            list_frees: Arc::new(AtomicUsize::new(0)),
            enumerate_error: None,
            enumerate_delay: Duration::ZERO,
            enumerations_in_flight: AtomicUsize::new(0),
            max_enumerations_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_enumerate_delay(mut self, delay: Duration) -> Self {
        self.enumerate_delay = delay;
        self
    }

    pub fn failing(err: rusb::Error) -> Self {
        Self {
            enumerate_error: Some(err),
            ..Self::new(Vec::new())
        }
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn list_frees(&self) -> usize {
        self.list_frees.load(Ordering::SeqCst)
    }

    pub fn max_enumerations_in_flight(&self) -> usize {
        self.max_enumerations_in_flight.load(Ordering::SeqCst)
    }
}

impl UsbHost for MockHost {
    type Device = MockDevice;

    fn devices(&self) -> rusb::Result<Vec<MockDevice>> {
        let _flight = InFlight::enter(
            &self.enumerations_in_flight,
            &self.max_enumerations_in_flight,
        );
        if !self.enumerate_delay.is_zero() {
            thread::sleep(self.enumerate_delay);
        }

        if let Some(e) = self.enumerate_error {
            return Err(e);
        }
        self.enumerations.fetch_add(1, Ordering::SeqCst);

        let token = Arc::new(ListToken(self.list_frees.clone()));
        Ok(self
            .devices
            .iter()
            .map(|device| MockDevice {
                list: Some(token.clone()),
                ..device.clone()
            })
            .collect())
    }
}

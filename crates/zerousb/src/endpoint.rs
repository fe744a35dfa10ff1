//! Endpoint resolution and transfer binding
//!
//! Decides whether a device exposes the IN/OUT endpoint pair a session needs,
//! either by checking caller-declared addresses or by discovering the first
//! usable pair. Human Interface Device alt settings are always skipped since
//! the operating system's own HID stack owns them.

use crate::descriptor::{AltSetting, ConfigLayout};
use crate::host::{HostDevice, HostHandle};
use crate::options::Options;
use rusb::{Direction, TransferType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

/// Transfer types a session can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Bulk,
    Interrupt,
}

impl TransferKind {
    /// `None` for control and isochronous endpoints
    pub fn from_transfer_type(transfer_type: TransferType) -> Option<Self> {
        match transfer_type {
            TransferType::Bulk => Some(TransferKind::Bulk),
            TransferType::Interrupt => Some(TransferKind::Interrupt),
            _ => None,
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Bulk => f.write_str("bulk"),
            TransferKind::Interrupt => f.write_str("interrupt"),
        }
    }
}

/// A resolved endpoint; fixed for the life of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    pub address: u8,
    pub kind: TransferKind,
    pub direction: Direction,
}

/// Result of a successful resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointMatch {
    /// Interface to claim
    pub interface: u8,
    pub alt_setting: u8,
    pub endpoint_in: EndpointSpec,
    pub endpoint_out: EndpointSpec,
}

/// Whether the device's active configuration exposes the expected pair
///
/// An unreadable descriptor counts as "does not qualify".
pub fn has_expected_endpoints<D: HostDevice>(device: &D, options: &Options) -> bool {
    read_endpoints(device, options).is_some()
}

/// Read the active configuration and resolve it against `options`
pub fn read_endpoints<D: HostDevice>(device: &D, options: &Options) -> Option<EndpointMatch> {
    match device.active_config() {
        Ok(layout) => resolve(&layout, options),
        Err(e) => {
            debug!("Failed to read active config descriptor: {}", e);
            None
        }
    }
}

/// Resolve endpoints from an already-read configuration layout
pub fn resolve(layout: &ConfigLayout, options: &Options) -> Option<EndpointMatch> {
    let usable = layout.alt_settings.iter().filter(|alt| !alt.is_hid());

    let found = match options.declared_endpoints() {
        Some((ep_in, ep_out)) => usable
            .filter_map(|alt| match_declared(alt, ep_in, ep_out, options))
            .next(),
        None => usable.filter_map(discover).next(),
    };

    if let Some(m) = &found {
        trace!(
            "Resolved endpoints in={:#04x} ({}) out={:#04x} ({}) on interface {} alt {}",
            m.endpoint_in.address,
            m.endpoint_in.kind,
            m.endpoint_out.address,
            m.endpoint_out.kind,
            m.interface,
            m.alt_setting
        );
    }

    found
}

/// Alt setting of the configured interface with exactly the two declared
/// endpoints
fn match_declared(
    alt: &AltSetting,
    ep_in: u8,
    ep_out: u8,
    options: &Options,
) -> Option<EndpointMatch> {
    if alt.interface_number != options.interface || alt.endpoints.len() != 2 {
        return None;
    }

    let endpoint_in = find_endpoint(alt, ep_in, Direction::In, options.transfer_in)?;
    let endpoint_out = find_endpoint(alt, ep_out, Direction::Out, options.transfer_out)?;

    Some(EndpointMatch {
        interface: options.interface,
        alt_setting: alt.setting_number,
        endpoint_in,
        endpoint_out,
    })
}

fn find_endpoint(
    alt: &AltSetting,
    address: u8,
    direction: Direction,
    expected: Option<TransferKind>,
) -> Option<EndpointSpec> {
    let ep = alt
        .endpoints
        .iter()
        .find(|ep| ep.address == address && ep.direction == direction)?;
    let kind = TransferKind::from_transfer_type(ep.transfer_type)?;

    match expected {
        Some(expected) if expected != kind => None,
        _ => Some(EndpointSpec {
            address,
            kind,
            direction,
        }),
    }
}

/// First bulk/interrupt IN and OUT endpoints of an alt setting
fn discover(alt: &AltSetting) -> Option<EndpointMatch> {
    let mut endpoint_in = None;
    let mut endpoint_out = None;

    for ep in &alt.endpoints {
        let Some(kind) = TransferKind::from_transfer_type(ep.transfer_type) else {
            continue;
        };
        let slot = match ep.direction {
            Direction::In => &mut endpoint_in,
            Direction::Out => &mut endpoint_out,
        };
        if slot.is_none() {
            *slot = Some(EndpointSpec {
                address: ep.address,
                kind,
                direction: ep.direction,
            });
        }
    }

    Some(EndpointMatch {
        interface: alt.interface_number,
        alt_setting: alt.setting_number,
        endpoint_in: endpoint_in?,
        endpoint_out: endpoint_out?,
    })
}

type ReadFn<H> = fn(&H, u8, &mut [u8], Duration) -> rusb::Result<usize>;
type WriteFn<H> = fn(&H, u8, &[u8], Duration) -> rusb::Result<usize>;

/// IN endpoint bound to its transfer primitive at connect time
pub(crate) struct InEndpoint<H> {
    spec: EndpointSpec,
    transfer: ReadFn<H>,
}

impl<H: HostHandle> InEndpoint<H> {
    pub(crate) fn bind(spec: EndpointSpec) -> Self {
        let transfer: ReadFn<H> = match spec.kind {
            TransferKind::Bulk => H::read_bulk,
            TransferKind::Interrupt => H::read_interrupt,
        };
        Self { spec, transfer }
    }

    pub(crate) fn spec(&self) -> EndpointSpec {
        self.spec
    }

    pub(crate) fn read(&self, handle: &H, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        (self.transfer)(handle, self.spec.address, buf, timeout)
    }
}

/// OUT endpoint bound to its transfer primitive at connect time
pub(crate) struct OutEndpoint<H> {
    spec: EndpointSpec,
    transfer: WriteFn<H>,
}

impl<H: HostHandle> OutEndpoint<H> {
    pub(crate) fn bind(spec: EndpointSpec) -> Self {
        let transfer: WriteFn<H> = match spec.kind {
            TransferKind::Bulk => H::write_bulk,
            TransferKind::Interrupt => H::write_interrupt,
        };
        Self { spec, transfer }
    }

    pub(crate) fn spec(&self) -> EndpointSpec {
        self.spec
    }

    pub(crate) fn write(&self, handle: &H, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        (self.transfer)(handle, self.spec.address, buf, timeout)
    }
}

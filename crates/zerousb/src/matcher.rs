//! Device matching
//!
//! Filters an enumerated device list down to the devices a session could be
//! opened on: not HID-class, matching vendor/product, and exposing the
//! expected endpoint pair.

use crate::descriptor::DeviceDetails;
use crate::endpoint::{self, EndpointMatch};
use crate::host::HostDevice;
use crate::id::Id;
use crate::options::Options;
use tracing::{debug, error, trace};

/// A device that passed every filter, with what was learned about it
pub struct Candidate<'a, D> {
    pub device: &'a D,
    pub details: DeviceDetails,
    pub endpoints: EndpointMatch,
}

/// Candidates for `vendor_id:product_id`, lazily, in enumeration order
///
/// Devices whose descriptor cannot be read are logged and skipped.
pub fn find<'a, D: HostDevice + 'a>(
    devices: &'a [D],
    vendor_id: Id,
    product_id: Id,
    options: &'a Options,
) -> impl Iterator<Item = Candidate<'a, D>> + 'a {
    devices.iter().filter_map(move |device| {
        let details = read_details(device)?;

        // HID devices are handled directly by OS libraries
        if details.is_hid() {
            return None;
        }

        if details.vendor_id != vendor_id || details.product_id != product_id {
            return None;
        }

        let Some(endpoints) = endpoint::read_endpoints(device, options) else {
            debug!(
                "Device {}:{} at bus={} addr={} lacks the expected endpoints",
                vendor_id, product_id, details.bus_number, details.address
            );
            return None;
        };

        trace!(
            "Candidate {}:{} at bus={} addr={}",
            vendor_id, product_id, details.bus_number, details.address
        );

        Some(Candidate {
            device,
            details,
            endpoints,
        })
    })
}

/// Descriptor snapshots of non-HID devices matching the ids, where
/// [`Id::ANY`] matches every value
pub fn list<D: HostDevice>(devices: &[D], vendor_id: Id, product_id: Id) -> Vec<DeviceDetails> {
    devices
        .iter()
        .filter_map(read_details)
        .filter(|details| !details.is_hid())
        .filter(|details| {
            vendor_id.matches(details.vendor_id.0) && product_id.matches(details.product_id.0)
        })
        .collect()
}

fn read_details<D: HostDevice>(device: &D) -> Option<DeviceDetails> {
    match device.details() {
        Ok(details) => Some(details),
        Err(e) => {
            error!("Failed to get device descriptor: {}", e);
            None
        }
    }
}

//! Descriptor snapshots
//!
//! Owned copies of the descriptor data the session layer reasons about. The
//! host controller fills these in once; nothing here performs I/O.

use crate::id::Id;
use rusb::{Direction, TransferType};
use serde::Serialize;

/// USB class code for Human Interface Devices
pub const CLASS_HID: u8 = 0x03;

/// Direction bit of an endpoint address (set = device-to-host)
pub const ENDPOINT_IN: u8 = 0x80;

/// Cached device descriptor, returned by [`crate::Session::details`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDetails {
    pub vendor_id: Id,
    pub product_id: Id,
    pub class_code: u8,
    pub sub_class_code: u8,
    pub protocol_code: u8,
    /// Max packet size of endpoint 0
    pub max_packet_size: u8,
    pub num_configurations: u8,
    pub bus_number: u8,
    pub address: u8,
}

impl DeviceDetails {
    pub fn is_hid(&self) -> bool {
        self.class_code == CLASS_HID
    }
}

/// Active configuration, flattened to its alternate settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayout {
    pub number: u8,
    pub alt_settings: Vec<AltSetting>,
}

/// One alternate setting of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSetting {
    pub interface_number: u8,
    pub setting_number: u8,
    pub class_code: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl AltSetting {
    pub fn is_hid(&self) -> bool {
        self.class_code == CLASS_HID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub transfer_type: TransferType,
    pub direction: Direction,
}

impl EndpointDescriptor {
    /// Builds a descriptor from a raw address and transfer type; the direction
    /// comes from bit 7 of the address.
    pub fn new(address: u8, transfer_type: TransferType) -> Self {
        let direction = if address & ENDPOINT_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        };

        Self {
            address,
            transfer_type,
            direction,
        }
    }
}

//! libusb host via `rusb`

use crate::descriptor::{AltSetting, ConfigLayout, DeviceDetails, EndpointDescriptor};
use crate::error::Error;
use crate::host::{HostDevice, HostHandle, UsbHost};
use crate::id::Id;
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::debug;

/// Host-controller context backed by libusb
pub struct LibUsb {
    context: Context,
}

impl LibUsb {
    /// Initialize a fresh libusb context
    pub fn new() -> Result<Self, Error> {
        let context = Context::new().map_err(Error::Initialization)?;
        debug!("libusb context initialized");
        Ok(Self { context })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl UsbHost for LibUsb {
    type Device = Device<Context>;

    fn devices(&self) -> rusb::Result<Vec<Self::Device>> {
        // Each Device keeps its own reference, so the list is freed here.
        let list = self.context.devices()?;
        Ok(list.iter().collect())
    }
}

impl HostDevice for Device<Context> {
    type Handle = DeviceHandle<Context>;

    fn details(&self) -> rusb::Result<DeviceDetails> {
        let descriptor = self.device_descriptor()?;

        Ok(DeviceDetails {
            vendor_id: Id(descriptor.vendor_id()),
            product_id: Id(descriptor.product_id()),
            class_code: descriptor.class_code(),
            sub_class_code: descriptor.sub_class_code(),
            protocol_code: descriptor.protocol_code(),
            max_packet_size: descriptor.max_packet_size(),
            num_configurations: descriptor.num_configurations(),
            bus_number: self.bus_number(),
            address: self.address(),
        })
    }

    fn active_config(&self) -> rusb::Result<ConfigLayout> {
        let config = self.active_config_descriptor()?;

        let alt_settings = config
            .interfaces()
            .flat_map(|interface| interface.descriptors())
            .map(|alt| AltSetting {
                interface_number: alt.interface_number(),
                setting_number: alt.setting_number(),
                class_code: alt.class_code(),
                endpoints: alt
                    .endpoint_descriptors()
                    .map(|ep| EndpointDescriptor {
                        address: ep.address(),
                        transfer_type: ep.transfer_type(),
                        direction: ep.direction(),
                    })
                    .collect(),
            })
            .collect();

        Ok(ConfigLayout {
            number: config.number(),
            alt_settings,
        })
    }

    fn open(&self) -> rusb::Result<Self::Handle> {
        Device::open(self)
    }
}

impl HostHandle for DeviceHandle<Context> {
    fn reset(&mut self) -> rusb::Result<()> {
        DeviceHandle::reset(self)
    }

    fn active_configuration(&self) -> rusb::Result<u8> {
        DeviceHandle::active_configuration(self)
    }

    fn set_active_configuration(&mut self, config: u8) -> rusb::Result<()> {
        DeviceHandle::set_active_configuration(self, config)
    }

    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool> {
        DeviceHandle::kernel_driver_active(self, iface)
    }

    fn detach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::detach_kernel_driver(self, iface)
    }

    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, iface)
    }

    fn claim_interface(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::claim_interface(self, iface)
    }

    fn release_interface(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::release_interface(self, iface)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::read_bulk(self, endpoint, buf, timeout)
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::write_bulk(self, endpoint, buf, timeout)
    }

    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::read_interrupt(self, endpoint, buf, timeout)
    }

    fn write_interrupt(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::write_interrupt(self, endpoint, buf, timeout)
    }

    fn cancel_transfers(&self) -> rusb::Result<()> {
        // libusb has no public call for cancelling synchronous transfers.
        Err(rusb::Error::NotSupported)
    }
}

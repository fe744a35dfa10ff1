//! Support code for the `zerousb` command-line tool

pub mod config;
pub mod payload;

pub use config::{CliConfig, DeviceSettings, UsbOverrides};

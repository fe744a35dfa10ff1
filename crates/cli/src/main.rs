//! zerousb command-line tool
//!
//! Lists matching USB devices, inspects one, or sends it a payload and prints
//! the reply.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{LogFormat, setup_logging_with};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use zerousb::{ConnectionManager, DeviceDetails, HandleOf, HostHandle, Id, LibUsb, Session};
use zerousb_cli::{CliConfig, UsbOverrides};
use zerousb_cli::payload::{format_hex, parse_hex};

#[derive(Parser, Debug)]
#[command(name = "zerousb")]
#[command(author, version, about = "Talk to generic USB devices over bulk and interrupt endpoints")]
#[command(long_about = "
Opens USB devices by vendor/product id and exchanges raw payloads over their
bulk or interrupt endpoints. HID-class devices are never touched.

EXAMPLES:
    # List every non-HID device
    zerousb list

    # List devices from one vendor as JSON
    zerousb list --vendor 0x0483 --json

    # Connect, print descriptor and endpoints, disconnect
    zerousb inspect --vendor 0x0483 --product 0xa27e

    # Send three bytes and print the reply
    zerousb echo --vendor 0x0483 --product 0xa27e 3f2323

CONFIGURATION:
    Device ids and connection options are read from, in order:
    1. Path specified with --config
    2. ~/.config/zerousb/config.toml
    3. /etc/zerousb/config.toml
    4. Built-in defaults
    Command-line flags override file values.
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Single-line log output without targets
    #[arg(long, global = true)]
    compact_logs: bool,

    #[command(flatten)]
    usb: UsbArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the `[usb]` section of the configuration
#[derive(clap::Args, Debug)]
struct UsbArgs {
    /// Interface to claim when endpoints are given explicitly
    #[arg(long, global = true)]
    interface: Option<u8>,

    /// Configuration value to select before claiming
    #[arg(long, global = true)]
    configuration: Option<u8>,

    /// IN endpoint address (e.g. 0x81)
    #[arg(long, value_parser = parse_byte, global = true)]
    endpoint_in: Option<u8>,

    /// OUT endpoint address (e.g. 0x01)
    #[arg(long, value_parser = parse_byte, global = true)]
    endpoint_out: Option<u8>,

    /// Log every transfer buffer at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Retry transfers that complete with zero bytes
    #[arg(long, global = true)]
    retry_zero_length: bool,
}

impl UsbArgs {
    fn overrides(&self) -> UsbOverrides {
        UsbOverrides {
            interface: self.interface,
            configuration: self.configuration,
            endpoint_in: self.endpoint_in,
            endpoint_out: self.endpoint_out,
            debug: self.debug,
            retry_zero_length: self.retry_zero_length,
        }
    }
}

#[derive(clap::Args, Debug)]
struct DeviceArgs {
    /// Vendor id in hex (e.g. 0x0483)
    #[arg(short = 'v', long)]
    vendor: Option<Id>,

    /// Product id in hex (e.g. 0xa27e)
    #[arg(short = 'p', long)]
    product: Option<Id>,

    /// Reset the device before claiming it
    #[arg(long)]
    reset: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached non-HID devices; omitted ids match anything
    List {
        #[arg(short = 'v', long)]
        vendor: Option<Id>,
        #[arg(short = 'p', long)]
        product: Option<Id>,
    },
    /// Connect to a device, print what was claimed, then disconnect
    Inspect {
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Write a hex payload and print the reply
    Echo {
        #[command(flatten)]
        device: DeviceArgs,

        /// Payload to write, in hex
        payload: String,

        /// Size of the read buffer
        #[arg(long, default_value_t = 64)]
        read_size: usize,

        /// Read timeout in milliseconds (0 uses the configured default)
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },
    /// Write the default configuration file and exit
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig { force } = args.command {
        let path = args.config.clone().unwrap_or_else(CliConfig::default_path);
        if path.exists() && !force {
            anyhow::bail!(
                "{} already exists, pass --force to overwrite",
                path.display()
            );
        }
        CliConfig::default()
            .save(&path)
            .context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => {
            CliConfig::load(Some(path.clone())).context("Failed to load configuration")?
        }
        None => CliConfig::load_or_default(),
    };
    config
        .apply_overrides(&args.usb.overrides())
        .context("Invalid command-line options")?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    let format = if args.compact_logs {
        LogFormat::Compact
    } else {
        LogFormat::Full
    };
    setup_logging_with(&log_level, format).context("Failed to setup logging")?;

    info!("zerousb v{}", env!("CARGO_PKG_VERSION"));

    let manager =
        ConnectionManager::new(config.usb.clone()).context("Failed to initialize USB")?;

    let result = match args.command {
        Command::List { vendor, product } => list(
            &manager,
            vendor.unwrap_or(Id::ANY),
            product.unwrap_or(Id::ANY),
            args.json,
        ),
        Command::Inspect { device } => {
            apply_device(&mut config, &device);
            inspect(&manager, &config, args.json)
        }
        Command::Echo {
            device,
            payload,
            read_size,
            timeout,
        } => {
            apply_device(&mut config, &device);
            echo(
                &manager,
                &config,
                &payload,
                read_size,
                Duration::from_millis(timeout),
                args.json,
            )
        }
        Command::InitConfig { .. } => Ok(()),
    };

    manager.close();
    result
}

fn apply_device(config: &mut CliConfig, args: &DeviceArgs) {
    if let Some(vendor) = args.vendor {
        config.device.vendor_id = vendor;
    }
    if let Some(product) = args.product {
        config.device.product_id = product;
    }
    config.device.reset |= args.reset;
}

fn list(manager: &ConnectionManager, vendor: Id, product: Id, as_json: bool) -> Result<()> {
    let devices = manager
        .find(vendor, product)
        .context("Failed to enumerate USB devices")?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No matching USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for device in &devices {
        print_details(device);
    }
    Ok(())
}

fn print_details(device: &DeviceDetails) {
    println!(
        "  Bus {:03} Device {:03}: ID {}:{}",
        device.bus_number, device.address, device.vendor_id, device.product_id
    );
    println!(
        "      Class {:#04x}/{:#04x}/{:#04x}  MaxPacketSize0 {}  Configurations {}",
        device.class_code,
        device.sub_class_code,
        device.protocol_code,
        device.max_packet_size,
        device.num_configurations
    );
}

fn connect(manager: &ConnectionManager, config: &CliConfig) -> Result<Session<HandleOf<LibUsb>>> {
    let (vendor, product) = config.target()?;
    manager
        .connect(vendor, product, config.device.reset)
        .with_context(|| format!("Failed to connect to {}:{}", vendor, product))
}

fn inspect(manager: &ConnectionManager, config: &CliConfig, as_json: bool) -> Result<()> {
    let session = connect(manager, config)?;

    if as_json {
        let report = json!({
            "device": session.details(),
            "interface": session.interface(),
            "endpoint_in": {
                "address": session.endpoint_in().address,
                "transfer": session.endpoint_in().kind.to_string(),
            },
            "endpoint_out": {
                "address": session.endpoint_out().address,
                "transfer": session.endpoint_out().kind.to_string(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_details(session.details());
        println!("      Interface {}", session.interface());
        println!(
            "      IN  {:#04x} ({})",
            session.endpoint_in().address,
            session.endpoint_in().kind
        );
        println!(
            "      OUT {:#04x} ({})",
            session.endpoint_out().address,
            session.endpoint_out().kind
        );
    }

    session.close(false).context("Failed to close session")?;
    Ok(())
}

fn echo(
    manager: &ConnectionManager,
    config: &CliConfig,
    payload: &str,
    read_size: usize,
    timeout: Duration,
    as_json: bool,
) -> Result<()> {
    let payload = parse_hex(payload)?;
    let session = connect(manager, config)?;

    let outcome = exchange(&session, &payload, read_size, timeout);
    let disconnected = matches!(&outcome, Err(e) if e.is_disconnect());
    if disconnected {
        warn!("Device disconnected during exchange");
    }
    session.close(disconnected).context("Failed to close session")?;

    let reply = outcome.context("Transfer failed")?;
    if as_json {
        let report = json!({ "sent": payload.len(), "received": reply });
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", format_hex(&reply));
    }
    Ok(())
}

fn exchange<H: HostHandle>(
    session: &Session<H>,
    payload: &[u8],
    read_size: usize,
    timeout: Duration,
) -> zerousb::Result<Vec<u8>> {
    let written = session.write(payload)?;
    if written != payload.len() {
        warn!("Short write: {} of {} bytes", written, payload.len());
    }

    let mut buf = vec![0u8; read_size];
    let read = session.read(&mut buf, timeout)?;
    buf.truncate(read);
    Ok(buf)
}

fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

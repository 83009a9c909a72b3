use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bitbox_core::{
    ConfigStore, Device, DeviceEvent, DeviceObserver, DeviceStatus, FileConfig, NusbTransport,
    Transport, TracingObserver,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "BitBox02 host tool (Pure Rust)", long_about = None)]
struct Args {
    /// Pairing config file (created on first use)
    #[arg(long, default_value = "bitbox.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show name, firmware version and initialization state
    Info,
    /// Print 32 bytes from the device's random number generator
    Random,
    /// Set the device name
    SetName { name: String },
    /// Enable or disable the optional mnemonic passphrase
    Passphrase {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Check whether a microSD card is inserted
    Sdcard,
    /// Reboot into the bootloader to install new firmware
    Upgrade,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

/// Prints the pairing code for the user and forwards everything to tracing.
struct CliObserver;

impl DeviceObserver for CliObserver {
    fn on_event(&self, event: &DeviceEvent) {
        if let DeviceEvent::ChannelHashChanged {
            hash,
            device_verified: false,
        } = event
        {
            eprintln!("\nPairing code:\n\n{hash}\n");
            eprintln!("Compare it with the code on the device and confirm there.");
        }
        TracingObserver.on_event(event);
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = FileConfig::open(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let transport = NusbTransport::open().context("opening device")?;
    let descriptor = transport.descriptor();

    let mut device = Device::with_observer(
        transport,
        config,
        descriptor.version,
        descriptor.product,
        Arc::new(CliObserver),
    );

    let status = connect(&mut device)?;
    if status == DeviceStatus::RequireFirmwareUpgrade {
        info!("Device rebooted into the bootloader, install a newer firmware to continue");
        return Ok(());
    }

    match args.command {
        Command::Info => {
            let info = device.device_info()?;
            println!("Name:        {}", info.name);
            println!("Product:     {}", device.product());
            println!("Firmware:    {}", info.version);
            println!("Initialized: {}", info.initialized);
            println!("Passphrase:  {}", info.mnemonic_passphrase_enabled);
            if let Some(report) = device.attestation() {
                println!("Bootloader:  {}", hex::encode(report.bootloader_hash));
            }
        }
        Command::Random => {
            println!("{}", hex::encode(device.random_number()?));
        }
        Command::SetName { name } => {
            device.set_device_name(&name)?;
            info!(name = %name, "Device name set");
        }
        Command::Passphrase { state } => {
            device.set_mnemonic_passphrase_enabled(matches!(state, Toggle::On))?;
            info!(state = ?state, "Mnemonic passphrase updated");
        }
        Command::Sdcard => {
            let inserted = device.check_sd_card()?;
            println!("{}", if inserted { "inserted" } else { "not inserted" });
        }
        Command::Upgrade => {
            device.upgrade_firmware()?;
            info!("Device rebooted into the bootloader");
            return Ok(());
        }
    }

    device.close();
    Ok(())
}

/// Run the bootstrap and, if needed, ask the user to confirm the pairing code.
fn connect<T: Transport, C: ConfigStore, O: DeviceObserver>(
    device: &mut Device<T, C, O>,
) -> Result<DeviceStatus> {
    let mut status = device.init()?;

    if status == DeviceStatus::RequirePairingConfirmation {
        let confirmed = prompt("Does the code match the one on the device? [y/N] ")?;
        status = device.channel_hash_verify(confirmed)?;
    }

    match status {
        DeviceStatus::RequireAppUpgrade => bail!(
            "firmware {} is not supported by this tool, please update it",
            device.version()
        ),
        DeviceStatus::PairingRejected => bail!("pairing was rejected"),
        DeviceStatus::Unpaired => bail!("pairing was not confirmed on the device"),
        DeviceStatus::Uninitialized => {
            info!("Device is not initialized yet, set it up in the BitBoxApp first");
        }
        _ => {}
    }
    Ok(status)
}

fn prompt(question: &str) -> Result<bool> {
    eprint!("{question}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

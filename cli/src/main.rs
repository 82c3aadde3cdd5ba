use std::{fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;

use dfu::{DfuDevice, find_dfu_devices};
use error::CliError;
use flash::*;
use isp::*;
use list::*;
use pack::*;

mod error;
mod flash;
mod isp;
mod list;
mod pack;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// list DFU devices
    List {
        /// vendor ID (ex: "0483")
        #[clap(short, long, value_parser=hex_u16)]
        vendor: Option<u16>,
        /// product ID (ex: "df11")
        #[clap(short, long, value_parser=hex_u16)]
        product: Option<u16>,
    },
    /// flash firmware over USB DFU
    Flash {
        /// firmware to write (DfuSe .dfu container or raw binary)
        file: PathBuf,
        /// vendor ID (ex: "0483")
        #[clap(short, long, value_parser=hex_u16)]
        vendor: Option<u16>,
        /// product ID (ex: "df11")
        #[clap(short, long, value_parser=hex_u16)]
        product: Option<u16>,
        /// write address for raw binaries (ex: 0x08000000)
        #[clap(short, long, value_parser=maybe_hex::<u32>)]
        address: Option<u32>,
        /// erase the whole device instead of page by page
        #[clap(long)]
        mass_erase: bool,
    },
    /// flash an Intel HEX image over serial (STK500v2 bootloader)
    Isp {
        /// Intel HEX file
        file: PathBuf,
        /// serial port (ex: "COM4", "/dev/ttyUSB0"); auto-detected when
        /// omitted
        #[clap(short = 'P', long)]
        port: Option<String>,
        /// baudrate
        #[clap(short, long, default_value_t = 115200)]
        baud: u32,
    },
    /// inspect an Intel HEX image
    Hex {
        /// Intel HEX file
        file: PathBuf,
    },
    /// build a distributable bundle from a manifest
    Bundle {
        /// bundle manifest (TOML)
        manifest: PathBuf,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::List {
            vendor: None,
            product: None,
        }
    }
}

fn hex_u16(s: &str) -> Result<u16, String> {
    <u16>::from_str_radix(s, 16).map_err(|e| format!("{e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::init();

    if let Err(err) = match &cli.command.unwrap_or_default() {
        Commands::List { vendor, product } => {
            list_dfu_devices(*vendor, *product)
        }
        Commands::Flash {
            file,
            vendor,
            product,
            address,
            mass_erase,
        } => flash_file(file, vendor, product, address, *mass_erase),
        Commands::Isp { file, port, baud } => {
            flash_hex(file, port.as_deref(), *baud)
        }
        Commands::Hex { file } => show_hex(file),
        Commands::Bundle { manifest } => build_bundle_cmd(manifest),
    } {
        eprintln!("Error: {err}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn get_dfu_device(
    vid: &Option<u16>,
    pid: &Option<u16>,
) -> Result<DfuDevice, CliError> {
    let mut devices = find_dfu_devices(*vid, *pid)?;
    match devices.len() {
        0 => Err(CliError::NoDFUDevice),
        1 => Ok(devices.remove(0)),
        _ => Err(CliError::ManyDFUDevices),
    }
}

fn show_hex(file: &PathBuf) -> Result<(), CliError> {
    let image = ihex::parse_hex(&fs::read_to_string(file)?)?;
    let used = image.iter().filter(|b| **b != 0).count();
    println!("Image: {:7} bytes", image.len());
    println!("  non-zero: {used} bytes");
    Ok(())
}

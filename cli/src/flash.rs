use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use dfu::{DfuseElement, flash_elements, is_dfuse_file, parse_dfuse};

use crate::{CliError, get_dfu_device};

pub(crate) fn flash_file(
    file: &PathBuf,
    vid: &Option<u16>,
    pid: &Option<u16>,
    address: &Option<u32>,
    mass_erase: bool,
) -> Result<(), CliError> {
    let data = fs::read(file)?;

    let elements: Vec<DfuseElement> = if is_dfuse_file(&data) {
        let dfuse = parse_dfuse(&data)?;
        println!(
            "DfuSe file: usb {:04x}:{:04x}, device 0x{:04x}, {} bytes",
            dfuse.vendor,
            dfuse.product,
            dfuse.device_version,
            dfuse.total_bytes(),
        );
        dfuse.elements().cloned().collect()
    } else {
        let address = address.ok_or(CliError::AddressRequired)?;
        vec![DfuseElement { address, data }]
    };

    let device = get_dfu_device(vid, pid)?;
    let alt = device
        .alt_settings()
        .first()
        .ok_or(CliError::Dfu(dfu::DfuError::NoDfuInterfaces))?
        .clone();

    println!("Resetting device state...");
    let connection = device.connect(alt.interface(), alt.alt_setting())?;
    connection.reset_state()?;

    let mut progress = |addr: u32, written: usize, total: usize| {
        let percentage = if total > 0 { 100 * written / total } else { 100 };
        let filled = if total > 0 { 60 * written / total } else { 60 };
        print!(
            "\r  0x{:08x} {:3}% [{}]",
            addr,
            percentage,
            "#".repeat(filled) + &" ".repeat(60 - filled)
        );
        let _ = io::stdout().flush();
    };

    flash_elements(
        &connection,
        alt.layout(),
        &elements,
        mass_erase,
        &mut progress,
    )?;
    println!();

    println!("Leaving DFU...");
    connection.leave()?;
    Ok(())
}

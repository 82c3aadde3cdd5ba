use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    thread,
    time::Duration,
};

use crate::CliError;

// The bootloader port can take a moment to enumerate after the board is
// plugged in, and may be briefly held by another process.
const PORT_RETRIES: u32 = 20;
const PORT_RETRY_DELAY: Duration = Duration::from_millis(1000);

pub(crate) fn flash_hex(
    file: &PathBuf,
    port: Option<&str>,
    baud: u32,
) -> Result<(), CliError> {
    let image = ihex::parse_hex(&fs::read_to_string(file)?)?;
    println!("Image: {} bytes", image.len());

    let port = match port {
        Some(port) => port.to_string(),
        None => {
            let port =
                stk500::detect_port()?.ok_or(CliError::NoSerialPort)?;
            println!("Detected port: {port}");
            port
        }
    };

    println!("Connecting to {port} @ {baud}...");
    let mut programmer = connect(&port, baud)?;
    let chip = programmer.identify()?;
    println!("Found {} ({} bytes flash)", chip.name, chip.flash_bytes());

    println!("Programming...");
    let mut progress = |done: u32, total: u32| {
        let percentage = if total > 0 { 100 * done / total } else { 100 };
        let filled = if total > 0 { (60 * done / total) as usize } else { 60 };
        print!(
            "\r  {:3}% [{}]",
            percentage,
            "#".repeat(filled) + &" ".repeat(60 - filled)
        );
        let _ = io::stdout().flush();
    };
    let result = programmer.program(&image, &mut progress);
    println!();
    result?;

    programmer.leave()?;
    programmer.reset();
    println!("Done!");
    Ok(())
}

fn connect(port: &str, baud: u32) -> Result<stk500::Stk500v2, CliError> {
    let mut attempt = 0;
    loop {
        match stk500::open(port, baud) {
            Ok(programmer) => return Ok(programmer),
            Err(err) if err.is_port_error() && attempt < PORT_RETRIES => {
                attempt += 1;
                eprintln!(
                    "{err}, trying again ({attempt}/{PORT_RETRIES})..."
                );
                thread::sleep(PORT_RETRY_DELAY);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

use std::{
    io::{self, Read, Write},
    thread,
    time::{Duration, Instant},
};

use log::debug;
use serialport::SerialPort;

use crate::chips::{AvrChip, find_chip};
use crate::error::IspError;
use crate::frame::{self, FrameParser};

const CMD_SIGN_ON: u8 = 0x01;
const CMD_LOAD_ADDRESS: u8 = 0x06;
const CMD_ENTER_PROGMODE_ISP: u8 = 0x10;
const CMD_LEAVE_PROGMODE_ISP: u8 = 0x11;
const CMD_PROGRAM_FLASH_ISP: u8 = 0x13;
const CMD_READ_FLASH_ISP: u8 = 0x14;
const CMD_SPI_MULTI: u8 = 0x1D;

const SIGN_ON_ID: &[u8] = b"AVRISP_2";
const STATUS_CMD_OK: u8 = 0x00;

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const RECV_DEADLINE: Duration = Duration::from_millis(2000);
const VERIFY_BLOCK: usize = 0x100;

/// Open a serial port and synchronize with the STK500v2 bootloader.
///
/// The board is reset into its bootloader by pulsing DTR, then the
/// sign-on handshake and programming-mode entry are performed.
pub fn open(port: &str, baud: u32) -> Result<Stk500v2, IspError> {
    let serial = serialport::new(port, baud)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|source| IspError::Open {
            port: port.to_string(),
            source,
        })?;
    let mut programmer = Stk500v2 {
        port: serial,
        port_name: port.to_string(),
        seq: 1,
        chip: None,
    };
    programmer.enter_isp()?;
    Ok(programmer)
}

/// STK500v2 programmer session over a serial port.
pub struct Stk500v2 {
    port: Box<dyn SerialPort>,
    port_name: String,
    seq: u8,
    chip: Option<&'static AvrChip>,
}

impl Stk500v2 {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn chip(&self) -> Option<&'static AvrChip> {
        self.chip
    }

    fn enter_isp(&mut self) -> Result<(), IspError> {
        self.seq = 1;

        // Pulse DTR to reset the controller into its bootloader
        self.port.write_data_terminal_ready(true)?;
        thread::sleep(Duration::from_millis(100));
        self.port.write_data_terminal_ready(false)?;
        thread::sleep(Duration::from_millis(200));
        self.port.clear(serialport::ClearBuffer::All)?;

        let recv = self.command(&[CMD_SIGN_ON])?;
        if recv.get(3..) != Some(SIGN_ON_ID) {
            return Err(IspError::UnknownBootloader);
        }

        let recv = self.command(&[
            CMD_ENTER_PROGMODE_ISP,
            0xc8,
            0x64,
            0x19,
            0x20,
            0x00,
            0x53,
            0x03,
            0xac,
            0x53,
            0x00,
            0x00,
        ])?;
        if recv != [CMD_ENTER_PROGMODE_ISP, STATUS_CMD_OK] {
            return Err(IspError::CommandFailed {
                cmd: CMD_ENTER_PROGMODE_ISP,
            });
        }
        Ok(())
    }

    /// Read the device signature over SPI passthrough and look it up in
    /// the chip database.
    pub fn identify(&mut self) -> Result<&'static AvrChip, IspError> {
        let mut signature = [0u8; 3];
        for (i, byte) in signature.iter_mut().enumerate() {
            let recv = self.spi(&[0x30, 0x00, i as u8, 0x00])?;
            *byte = recv[3];
        }
        debug!(
            "device signature: {:02x} {:02x} {:02x}",
            signature[0], signature[1], signature[2]
        );
        let chip =
            find_chip(&signature).ok_or(IspError::UnknownChip(signature))?;
        self.chip = Some(chip);
        Ok(chip)
    }

    /// Program and verify a flat firmware image starting at address 0.
    ///
    /// `progress` is called with `(done, total)` where the total counts
    /// the write pass plus the verify pass.
    pub fn program(
        &mut self,
        image: &[u8],
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<(), IspError> {
        let chip = match self.chip {
            Some(chip) => chip,
            None => self.identify()?,
        };
        if image.len() > chip.flash_bytes() as usize {
            return Err(IspError::ImageTooLarge {
                size: image.len(),
                capacity: chip.flash_bytes() as usize,
            });
        }
        self.write_flash(chip, image, progress)?;
        self.verify_flash(chip, image, progress)
    }

    fn write_flash(
        &mut self,
        chip: &AvrChip,
        image: &[u8],
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<(), IspError> {
        let page_bytes = chip.page_bytes() as usize;
        self.load_address_zero(chip)?;

        let pages = image.len().div_ceil(page_bytes);
        for (nr, page) in image.chunks(page_bytes).enumerate() {
            let mut body = vec![
                CMD_PROGRAM_FLASH_ISP,
                (page_bytes >> 8) as u8,
                (page_bytes & 0xFF) as u8,
                0xc1,
                0x0a,
                0x40,
                0x4c,
                0x20,
                0x00,
                0x00,
            ];
            body.extend_from_slice(page);
            self.command(&body)?;
            progress((nr + 1) as u32, (pages * 2) as u32);
        }
        Ok(())
    }

    fn verify_flash(
        &mut self,
        chip: &AvrChip,
        image: &[u8],
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<(), IspError> {
        self.load_address_zero(chip)?;

        let blocks = image.len().div_ceil(VERIFY_BLOCK);
        for nr in 0..blocks {
            let recv = self.command(&[
                CMD_READ_FLASH_ISP,
                (VERIFY_BLOCK >> 8) as u8,
                (VERIFY_BLOCK & 0xFF) as u8,
                0x20,
            ])?;
            let readback = recv
                .get(2..2 + VERIFY_BLOCK)
                .ok_or(IspError::CommandFailed {
                    cmd: CMD_READ_FLASH_ISP,
                })?;
            progress((blocks + nr + 1) as u32, (blocks * 2) as u32);
            let offset = nr * VERIFY_BLOCK;
            for (i, byte) in readback.iter().enumerate() {
                if offset + i < image.len() && image[offset + i] != *byte {
                    return Err(IspError::VerifyMismatch {
                        addr: offset + i,
                    });
                }
            }
        }
        Ok(())
    }

    // Set the load address to 0; parts with more than 64K of flash need
    // the address-extension bit.
    fn load_address_zero(&mut self, chip: &AvrChip) -> Result<(), IspError> {
        let high = if chip.flash_bytes() > 0xFFFF { 0x80 } else { 0x00 };
        self.command(&[CMD_LOAD_ADDRESS, high, 0x00, 0x00, 0x00])?;
        Ok(())
    }

    /// Leave programming mode.
    pub fn leave(&mut self) -> Result<(), IspError> {
        let recv = self.command(&[CMD_LEAVE_PROGMODE_ISP])?;
        if recv != [CMD_LEAVE_PROGMODE_ISP, STATUS_CMD_OK] {
            return Err(IspError::CommandFailed {
                cmd: CMD_LEAVE_PROGMODE_ISP,
            });
        }
        Ok(())
    }

    /// Pulse DTR once more so the freshly flashed firmware boots.
    pub fn reset(&mut self) {
        thread::sleep(Duration::from_millis(50));
        let _ = self.port.write_data_terminal_ready(true);
        let _ = self.port.write_data_terminal_ready(false);
    }

    fn spi(&mut self, data: &[u8; 4]) -> Result<Vec<u8>, IspError> {
        let recv = self.command(&[
            CMD_SPI_MULTI,
            4,
            4,
            0,
            data[0],
            data[1],
            data[2],
            data[3],
        ])?;
        recv.get(2..6)
            .map(|answer| answer.to_vec())
            .ok_or(IspError::CommandFailed { cmd: CMD_SPI_MULTI })
    }

    fn command(&mut self, body: &[u8]) -> Result<Vec<u8>, IspError> {
        let msg = frame::encode(self.seq, body);
        self.port.write_all(&msg)?;
        self.port.flush()?;
        self.seq = self.seq.wrapping_add(1);
        self.recv()
    }

    fn recv(&mut self) -> Result<Vec<u8>, IspError> {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; 256];
        let deadline = Instant::now() + RECV_DEADLINE;
        loop {
            match self.port.read(&mut buf) {
                Ok(n) => {
                    for b in &buf[..n] {
                        if let Some(body) = parser.push(*b) {
                            return Ok(body);
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
                Err(err) => return Err(IspError::Io(err)),
            }
            if Instant::now() >= deadline {
                return Err(IspError::RecvTimeout);
            }
        }
    }
}

use std::{thread, time::Duration};

use log::debug;
use nusb::{
    MaybeFuture,
    transfer::{ControlIn, ControlOut, ControlType, Recipient},
};

use crate::REQUEST_TIMEOUT;
use crate::error::DfuError;

// DFU class requests
const DFU_DNLOAD: u8 = 1;
const DFU_GETSTATUS: u8 = 3;
const DFU_CLRSTATUS: u8 = 4;
const DFU_ABORT: u8 = 6;

const STATUS_LEN: u16 = 6;

// DfuSe command bytes (AN3156)
const DFUSE_SET_ADDRESS: u8 = 0x21;
const DFUSE_ERASE: u8 = 0x41;

// DFU states
pub(crate) const STATE_DFU_IDLE: u8 = 0x02;
pub(crate) const STATE_DFU_DOWNLOAD_BUSY: u8 = 0x04;
pub(crate) const STATE_DFU_DOWNLOAD_IDLE: u8 = 0x05;
pub(crate) const STATE_DFU_MANIFEST: u8 = 0x07;
pub(crate) const STATE_DFU_ERROR: u8 = 0x0A;

/// Human-readable name for a DFU state byte
pub fn state_name(state: u8) -> &'static str {
    match state {
        0x00 => "appIDLE",
        0x01 => "appDETACH",
        0x02 => "dfuIDLE",
        0x03 => "dfuDNLOAD-SYNC",
        0x04 => "dfuDNBUSY",
        0x05 => "dfuDNLOAD-IDLE",
        0x06 => "dfuMANIFEST-SYNC",
        0x07 => "dfuMANIFEST",
        0x08 => "dfuMANIFEST-WAIT-RESET",
        0x09 => "dfuUPLOAD-IDLE",
        0x0A => "dfuERROR",
        _ => "unknown",
    }
}

/// Result of DFU_GETSTATUS
#[derive(Clone, Debug)]
pub struct DfuStatus {
    pub status: u8,
    /// Minimum time in ms the host must wait before the next request
    pub poll_timeout: u32,
    pub state: u8,
}

impl DfuStatus {
    fn from_raw(data: &[u8]) -> Self {
        DfuStatus {
            status: data[0],
            poll_timeout: (data[3] as u32) << 16
                | (data[2] as u32) << 8
                | (data[1] as u32),
            state: data[4],
        }
    }

    pub fn ok(&self) -> Result<(), DfuError> {
        if self.status != 0 {
            Err(DfuError::Status {
                status: self.status,
                state: self.state,
            })
        } else {
            Ok(())
        }
    }

    fn expect_state(&self, state: u8) -> Result<(), DfuError> {
        if self.state != state {
            Err(DfuError::Status {
                status: self.status,
                state: self.state,
            })
        } else {
            Ok(())
        }
    }
}

/// Claimed DFU interface, ready for protocol requests
pub struct DfuConnection {
    interface: nusb::Interface,
    transfer_size: u16,
}

impl DfuConnection {
    pub(crate) fn new(interface: nusb::Interface, transfer_size: u16) -> Self {
        DfuConnection {
            interface,
            transfer_size: if transfer_size > 0 {
                transfer_size
            } else {
                crate::FALLBACK_TRANSFER_SIZE
            },
        }
    }

    pub fn transfer_size(&self) -> u16 {
        self.transfer_size
    }

    pub fn get_status(&self) -> Result<DfuStatus, DfuError> {
        let data = self.control_in(DFU_GETSTATUS, 0, STATUS_LEN)?;
        let status = DfuStatus::from_raw(&data);
        if status.poll_timeout > 0 {
            thread::sleep(Duration::from_millis(status.poll_timeout as u64));
        }
        Ok(status)
    }

    pub fn clear_status(&self) -> Result<(), DfuError> {
        self.control_out(DFU_CLRSTATUS, 0, &[])
    }

    pub fn abort(&self) -> Result<(), DfuError> {
        self.control_out(DFU_ABORT, 0, &[])
    }

    /// Drive the device back to dfuIDLE, clearing a sticky error state
    /// if needed.
    pub fn reset_state(&self) -> Result<(), DfuError> {
        let mut status = self.get_status()?;
        if status.state == STATE_DFU_ERROR || status.status != 0 {
            self.clear_status()?;
            status = self.get_status()?;
        }
        if status.state != STATE_DFU_IDLE {
            self.abort()?;
            status = self.get_status()?;
        }
        status.ok()?;
        status.expect_state(STATE_DFU_IDLE)
    }

    /// Set the DfuSe address pointer.
    pub fn set_address(&self, addr: u32) -> Result<(), DfuError> {
        debug!("set address {addr:#010x}");
        let mut cmd = vec![DFUSE_SET_ADDRESS];
        cmd.extend_from_slice(&addr.to_le_bytes());
        self.execute(&cmd)
    }

    /// Erase the flash page starting at `addr`.
    pub fn page_erase(&self, addr: u32) -> Result<(), DfuError> {
        debug!("page erase {addr:#010x}");
        let mut cmd = vec![DFUSE_ERASE];
        cmd.extend_from_slice(&addr.to_le_bytes());
        self.execute(&cmd)
    }

    /// Erase the whole device (DfuSe erase command without an address).
    pub fn mass_erase(&self) -> Result<(), DfuError> {
        debug!("mass erase");
        self.execute(&[DFUSE_ERASE])
    }

    /// Write one chunk at `addr` (set the address pointer, then download
    /// block 2, which DfuSe maps to offset 0 from the pointer).
    pub fn write_at(&self, addr: u32, data: &[u8]) -> Result<(), DfuError> {
        self.set_address(addr)?;
        self.control_out(DFU_DNLOAD, 2, data)?;
        self.sync_download()
    }

    /// Send a zero-length download to begin the manifestation phase and
    /// boot the freshly written firmware.
    pub fn leave(&self) -> Result<(), DfuError> {
        self.control_out(DFU_DNLOAD, 0, &[])?;
        // The bootloader may detach before answering; a transfer error
        // here means it already rebooted.
        if let Ok(status) = self.get_status() {
            if status.state != STATE_DFU_MANIFEST {
                return status.ok();
            }
        }
        Ok(())
    }

    // DfuSe command downloads signal completion by passing through
    // dfuDNBUSY before settling in dfuDNLOAD-IDLE.
    fn execute(&self, cmd: &[u8]) -> Result<(), DfuError> {
        self.control_out(DFU_DNLOAD, 0, cmd)?;
        let status = self.get_status()?;
        status.ok()?;
        status.expect_state(STATE_DFU_DOWNLOAD_BUSY)?;
        self.sync_download()
    }

    fn sync_download(&self) -> Result<(), DfuError> {
        let status = self.get_status()?;
        status.ok()?;
        match status.state {
            STATE_DFU_DOWNLOAD_IDLE => Ok(()),
            STATE_DFU_DOWNLOAD_BUSY => {
                // long erases report busy more than once
                let status = self.get_status()?;
                status.ok()?;
                status.expect_state(STATE_DFU_DOWNLOAD_IDLE)
            }
            _ => Err(DfuError::Status {
                status: status.status,
                state: status.state,
            }),
        }
    }

    fn control_out(
        &self,
        request: u8,
        value: u16,
        data: &[u8],
    ) -> Result<(), DfuError> {
        let index = self.interface.interface_number() as u16;
        Ok(self
            .interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request,
                    value,
                    index,
                    data,
                },
                REQUEST_TIMEOUT,
            )
            .wait()?)
    }

    fn control_in(
        &self,
        request: u8,
        value: u16,
        length: u16,
    ) -> Result<Vec<u8>, DfuError> {
        let index = self.interface.interface_number() as u16;
        Ok(self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request,
                    value,
                    index,
                    length,
                },
                REQUEST_TIMEOUT,
            )
            .wait()?)
    }
}

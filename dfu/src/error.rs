use crate::connection::state_name;

#[derive(Debug)]
pub enum DfuError {
    Usb(nusb::Error),
    Transfer(nusb::transfer::TransferError),
    /// Device reported a DFU error status, or an unexpected state
    Status { status: u8, state: u8 },
    NoDfuInterfaces,
    /// No memory segment covers the given address
    NoSegmentFor { addr: u32 },
    Timeout,
}

impl std::error::Error for DfuError {}

impl std::fmt::Display for DfuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DfuError::Usb(err) => write!(f, "USB error: {}", err),
            DfuError::Transfer(err) => write!(f, "transfer error: {}", err),
            DfuError::Status { status, state } => {
                write!(
                    f,
                    "DFU status error: code {} in {}",
                    status,
                    state_name(*state)
                )
            }
            DfuError::NoDfuInterfaces => {
                write!(f, "device has no usable DFU interface")
            }
            DfuError::NoSegmentFor { addr } => {
                write!(f, "no memory segment covers address {addr:#010x}")
            }
            DfuError::Timeout => write!(f, "timeout"),
        }
    }
}

impl From<nusb::Error> for DfuError {
    fn from(err: nusb::Error) -> Self {
        DfuError::Usb(err)
    }
}

impl From<nusb::transfer::TransferError> for DfuError {
    fn from(err: nusb::transfer::TransferError) -> Self {
        DfuError::Transfer(err)
    }
}

use std::io;

#[derive(Debug)]
pub enum IspError {
    /// Serial port could not be opened (missing, busy or access denied)
    Open {
        port: String,
        source: serialport::Error,
    },
    Serial(serialport::Error),
    Io(io::Error),
    UnknownBootloader,
    CommandFailed { cmd: u8 },
    UnknownChip([u8; 3]),
    ImageTooLarge { size: usize, capacity: usize },
    VerifyMismatch { addr: usize },
    RecvTimeout,
}

impl IspError {
    /// Port-level failures are transient (board still enumerating, port
    /// held by another process) and worth retrying.
    pub fn is_port_error(&self) -> bool {
        matches!(self, IspError::Open { .. })
    }
}

impl std::error::Error for IspError {}

impl std::fmt::Display for IspError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IspError::Open { port, source } => {
                write!(f, "serial port {port} failed to open: {source}")
            }
            IspError::Serial(err) => write!(f, "serial error: {err}"),
            IspError::Io(err) => write!(f, "serial I/O error: {err}"),
            IspError::UnknownBootloader => {
                write!(f, "unknown bootloader (no AVRISP_2 sign-on)")
            }
            IspError::CommandFailed { cmd } => {
                write!(f, "command {cmd:#04x} was not acknowledged")
            }
            IspError::UnknownChip(sig) => {
                write!(
                    f,
                    "unknown chip signature {:02x} {:02x} {:02x}",
                    sig[0], sig[1], sig[2]
                )
            }
            IspError::ImageTooLarge { size, capacity } => {
                write!(
                    f,
                    "firmware image ({size} bytes) exceeds flash size \
                     ({capacity} bytes)"
                )
            }
            IspError::VerifyMismatch { addr } => {
                write!(f, "verify error at: {addr:#x}")
            }
            IspError::RecvTimeout => write!(f, "serial recv timeout"),
        }
    }
}

impl From<serialport::Error> for IspError {
    fn from(err: serialport::Error) -> Self {
        IspError::Serial(err)
    }
}

impl From<io::Error> for IspError {
    fn from(err: io::Error) -> Self {
        IspError::Io(err)
    }
}

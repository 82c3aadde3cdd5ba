use std::{fmt::Display, io};

use bundle::BundleError;
use dfu::{DfuError, DfuseFormatError};
use ihex::HexFormatError;
use stk500::IspError;

pub enum CliError {
    IO(io::Error),
    Bundle(BundleError),
    Dfu(DfuError),
    DfuseFile(DfuseFormatError),
    Hex(HexFormatError),
    Isp(IspError),
    NoDFUDevice,
    ManyDFUDevices,
    NoSerialPort,
    AddressRequired,
}

impl From<io::Error> for CliError {
    fn from(value: io::Error) -> Self {
        CliError::IO(value)
    }
}

impl From<BundleError> for CliError {
    fn from(value: BundleError) -> Self {
        CliError::Bundle(value)
    }
}

impl From<DfuError> for CliError {
    fn from(value: DfuError) -> Self {
        CliError::Dfu(value)
    }
}

impl From<DfuseFormatError> for CliError {
    fn from(value: DfuseFormatError) -> Self {
        CliError::DfuseFile(value)
    }
}

impl From<HexFormatError> for CliError {
    fn from(value: HexFormatError) -> Self {
        CliError::Hex(value)
    }
}

impl From<IspError> for CliError {
    fn from(value: IspError) -> Self {
        CliError::Isp(value)
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::IO(err) => write!(f, "IO error: {err}"),
            CliError::Bundle(err) => write!(f, "bundle error: {err}"),
            CliError::Dfu(err) => write!(f, "DFU error: {err}"),
            CliError::DfuseFile(err) => write!(f, "DfuSe file error: {err}"),
            CliError::Hex(err) => write!(f, "hex error: {err}"),
            CliError::Isp(err) => write!(f, "ISP error: {err}"),
            CliError::NoDFUDevice => write!(f, "No DFU device"),
            CliError::ManyDFUDevices => write!(f, "More than one DFU device"),
            CliError::NoSerialPort => {
                write!(f, "No serial port found, use --port to name one")
            }
            CliError::AddressRequired => {
                write!(f, "raw binary needs --address")
            }
        }
    }
}

//! Serial port discovery
//!
//! The boards this tool programs enumerate as an Arduino Mega 2560 or
//! behind a CH340 USB-serial adapter. Detection prefers a port whose
//! USB product string names one of those, then falls back to any USB
//! serial port.

use serialport::{SerialPortInfo, SerialPortType};

use crate::error::IspError;

const KNOWN_PRODUCTS: &[&str] = &["Mega 2560", "CH340"];

/// Pick a port to program through without the user naming one.
pub fn detect_port() -> Result<Option<String>, IspError> {
    Ok(select_port(&serialport::available_ports()?))
}

fn select_port(ports: &[SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|info| product_of(info).is_some_and(is_known_board))
        .or_else(|| {
            ports.iter().find(|info| {
                matches!(info.port_type, SerialPortType::UsbPort(_))
            })
        })
        .map(|info| info.port_name.clone())
}

fn product_of(info: &SerialPortInfo) -> Option<&str> {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => usb.product.as_deref(),
        _ => None,
    }
}

fn is_known_board(product: &str) -> bool {
    KNOWN_PRODUCTS.iter().any(|known| product.contains(known))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb_port(name: &str, product: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x1a86,
                pid: 0x7523,
                serial_number: None,
                manufacturer: None,
                product: product.map(str::to_string),
            }),
        }
    }

    fn native_port(name: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::Unknown,
        }
    }

    #[test]
    fn test_prefers_known_board() {
        let ports = [
            usb_port("/dev/ttyUSB0", Some("Some Modem")),
            usb_port("/dev/ttyUSB1", Some("USB-SERIAL CH340")),
        ];
        assert_eq!(
            select_port(&ports),
            Some("/dev/ttyUSB1".to_string())
        );
    }

    #[test]
    fn test_falls_back_to_any_usb_port() {
        let ports = [
            native_port("/dev/ttyS0"),
            usb_port("/dev/ttyUSB0", Some("Some Modem")),
        ];
        assert_eq!(
            select_port(&ports),
            Some("/dev/ttyUSB0".to_string())
        );
    }

    #[test]
    fn test_ignores_non_usb_ports() {
        let ports = [native_port("/dev/ttyS0"), native_port("/dev/ttyS1")];
        assert_eq!(select_port(&ports), None);
    }

    #[test]
    fn test_mega_description_matches() {
        let ports = [usb_port("COM4", Some("Arduino Mega 2560"))];
        assert_eq!(select_port(&ports), Some("COM4".to_string()));
    }
}

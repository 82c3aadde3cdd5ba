//! AVR chip database
//!
//! Signatures and flash geometry from the AVR datasheets. Add entries
//! here to support more chips.

#[derive(Debug, PartialEq, Eq)]
pub struct AvrChip {
    pub name: &'static str,
    pub signature: [u8; 3],
    /// Page size in words
    pub page_size: u32,
    pub page_count: u32,
}

impl AvrChip {
    pub fn page_bytes(&self) -> u32 {
        self.page_size * 2
    }

    pub fn flash_bytes(&self) -> u32 {
        self.page_bytes() * self.page_count
    }
}

pub const AVR_CHIPS: &[AvrChip] = &[
    AvrChip {
        name: "ATMega1280",
        signature: [0x1E, 0x97, 0x03],
        page_size: 128,
        page_count: 512,
    },
    AvrChip {
        name: "ATMega2560",
        signature: [0x1E, 0x98, 0x01],
        page_size: 128,
        page_count: 1024,
    },
];

pub fn find_chip(signature: &[u8; 3]) -> Option<&'static AvrChip> {
    AVR_CHIPS.iter().find(|chip| &chip.signature == signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_signature() {
        let chip = find_chip(&[0x1E, 0x98, 0x01]).unwrap();
        assert_eq!(chip.name, "ATMega2560");
        assert_eq!(chip.flash_bytes(), 256 * 1024);
    }

    #[test]
    fn test_unknown_signature() {
        assert_eq!(find_chip(&[0x1E, 0x00, 0x00]), None);
    }
}

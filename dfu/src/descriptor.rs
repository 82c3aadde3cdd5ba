pub(crate) const DFU_DESC_TYPE: u8 = 0x21;
pub(crate) const DFU_DESC_LEN: usize = 9;

/// `bcdDFUVersion` reported by DfuSe-capable bootloaders
pub const DFUSE_VERSION_NUMBER: u16 = 0x011A;

/// DFU functional descriptor (DFU 1.1, section 4.1.3)
#[derive(Default)]
pub struct FunctionalDescriptor {
    attributes: u8,
    detach_timeout: u16,
    transfer_size: u16,
    dfu_version: u16,
}

impl FunctionalDescriptor {
    const BIT_CAN_DNLOAD: u8 = 1 << 0;
    const BIT_CAN_UPLOAD: u8 = 1 << 1;
    const BIT_MANIFESTATION_TOLERANT: u8 = 1 << 2;
    const BIT_WILL_DETACH: u8 = 1 << 3;

    pub(crate) fn new(raw: &[u8]) -> Self {
        Self {
            attributes: raw[2],
            detach_timeout: u16::from_le_bytes([raw[3], raw[4]]),
            transfer_size: u16::from_le_bytes([raw[5], raw[6]]),
            dfu_version: u16::from_le_bytes([raw[7], raw[8]]),
        }
    }

    pub fn can_download(&self) -> bool {
        self.attributes & Self::BIT_CAN_DNLOAD != 0
    }

    pub fn can_upload(&self) -> bool {
        self.attributes & Self::BIT_CAN_UPLOAD != 0
    }

    pub fn manifestation_tolerant(&self) -> bool {
        self.attributes & Self::BIT_MANIFESTATION_TOLERANT != 0
    }

    pub fn will_detach(&self) -> bool {
        self.attributes & Self::BIT_WILL_DETACH != 0
    }

    /// Time in milliseconds the device waits for a reset after DFU_DETACH
    pub fn detach_timeout(&self) -> u16 {
        self.detach_timeout
    }

    /// Maximum bytes per control-write transaction (`wTransferSize`)
    pub fn transfer_size(&self) -> u16 {
        self.transfer_size
    }

    pub fn dfu_version(&self) -> u16 {
        self.dfu_version
    }
}

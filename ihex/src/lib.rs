//! Intel HEX firmware image parsing
//!
//! Intel HEX files are the common distribution format for AVR firmware.
//! Each line is a record `:llaaaattdd..cc` (length, address, type, data,
//! checksum). Parsing produces a flat byte image starting at address 0,
//! ready to be written to flash.
//!
//! See: <https://en.wikipedia.org/wiki/Intel_HEX>

pub const REC_DATA: u8 = 0x00;
pub const REC_EOF: u8 = 0x01;
pub const REC_EXT_SEGMENT_ADDR: u8 = 0x02;
pub const REC_START_SEGMENT_ADDR: u8 = 0x03;
pub const REC_EXT_LINEAR_ADDR: u8 = 0x04;
pub const REC_START_LINEAR_ADDR: u8 = 0x05;

#[derive(Debug, PartialEq, Eq)]
pub enum HexFormatError {
    /// Record does not start with ':'
    MissingStartCode { line: usize },
    /// Record is shorter than the minimal record frame
    TruncatedRecord { line: usize },
    /// Declared record length does not match the line length
    LengthMismatch { line: usize },
    /// 8-bit record checksum did not add up to zero
    Checksum { line: usize },
    /// Non-hexadecimal character inside a record
    InvalidDigit { line: usize },
    UnsupportedRecordType { line: usize, rec_type: u8 },
}

impl std::error::Error for HexFormatError {}

impl std::fmt::Display for HexFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexFormatError::MissingStartCode { line } => {
                write!(f, "hex record must start with ':' @ line {line}")
            }
            HexFormatError::TruncatedRecord { line } => {
                write!(f, "truncated hex record @ line {line}")
            }
            HexFormatError::LengthMismatch { line } => {
                write!(f, "length error in hex record @ line {line}")
            }
            HexFormatError::Checksum { line } => {
                write!(f, "checksum error in hex record @ line {line}")
            }
            HexFormatError::InvalidDigit { line } => {
                write!(f, "invalid hex digit @ line {line}")
            }
            HexFormatError::UnsupportedRecordType { line, rec_type } => {
                write!(
                    f,
                    "unsupported record type {rec_type:02x} @ line {line}"
                )
            }
        }
    }
}

/// Parse an Intel HEX image into a flat byte vector.
///
/// Gaps between data records are zero-filled. Extended segment (type 02)
/// and extended linear (type 04) address records adjust the base address
/// of subsequent data records. Start-address records (types 03 and 05)
/// are not supported.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, HexFormatError> {
    let mut image: Vec<u8> = Vec::new();
    let mut base_addr: usize = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lineno = idx + 1;
        if !line.starts_with(':') {
            return Err(HexFormatError::MissingStartCode { line: lineno });
        }

        let bytes = decode_pairs(&line[1..], lineno)?;
        if bytes.len() < 5 {
            return Err(HexFormatError::TruncatedRecord { line: lineno });
        }
        let rec_len = bytes[0] as usize;
        if bytes.len() != rec_len + 5 {
            return Err(HexFormatError::LengthMismatch { line: lineno });
        }
        if bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)) != 0 {
            return Err(HexFormatError::Checksum { line: lineno });
        }

        let addr =
            ((bytes[1] as usize) << 8 | (bytes[2] as usize)) + base_addr;
        let rec_type = bytes[3];
        let payload = &bytes[4..4 + rec_len];

        match rec_type {
            REC_DATA => {
                if image.len() < addr + rec_len {
                    image.resize(addr + rec_len, 0);
                }
                image[addr..addr + rec_len].copy_from_slice(payload);
            }
            REC_EOF => {}
            REC_EXT_SEGMENT_ADDR => {
                base_addr = record_base(payload, lineno)? * 16;
            }
            REC_EXT_LINEAR_ADDR => {
                base_addr = record_base(payload, lineno)? << 16;
            }
            rec_type => {
                return Err(HexFormatError::UnsupportedRecordType {
                    line: lineno,
                    rec_type,
                });
            }
        }
    }

    Ok(image)
}

fn record_base(
    payload: &[u8],
    lineno: usize,
) -> Result<usize, HexFormatError> {
    if payload.len() != 2 {
        return Err(HexFormatError::LengthMismatch { line: lineno });
    }
    Ok((payload[0] as usize) << 8 | (payload[1] as usize))
}

fn decode_pairs(hex: &str, lineno: usize) -> Result<Vec<u8>, HexFormatError> {
    if hex.len() % 2 != 0 {
        return Err(HexFormatError::TruncatedRecord { line: lineno });
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let s = str::from_utf8(pair)
                .map_err(|_| HexFormatError::InvalidDigit { line: lineno })?;
            u8::from_str_radix(s, 16)
                .map_err(|_| HexFormatError::InvalidDigit { line: lineno })
        })
        .collect()
}

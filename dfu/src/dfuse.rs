//! DfuSe container file parsing (STMicroelectronics UM0391)
//!
//! A `.dfu` file is a prefix (`"DfuSe"`, version, total size, target
//! count), one image per target (`"Target"` prefix with alternate
//! setting, optional name and element count, then elements of address,
//! size and data), and a 16-byte suffix carrying version identifiers
//! and a CRC over everything before it. The stored CRC is the bitwise
//! complement of the standard CRC-32.

use flate2::Crc;

const PREFIX_LEN: usize = 11;
const TARGET_PREFIX_LEN: usize = 274;
const SUFFIX_LEN: usize = 16;

const PREFIX_SIGNATURE: &[u8] = b"DfuSe";
const TARGET_SIGNATURE: &[u8] = b"Target";
const SUFFIX_SIGNATURE: &[u8] = b"UFD";

#[derive(Debug)]
pub struct DfuseFile {
    pub targets: Vec<DfuseTarget>,
    /// Firmware version (`bcdDevice`) from the suffix
    pub device_version: u16,
    pub product: u16,
    pub vendor: u16,
}

#[derive(Debug)]
pub struct DfuseTarget {
    pub alt_setting: u8,
    pub name: String,
    pub elements: Vec<DfuseElement>,
}

/// A contiguous chunk of firmware and the address it must be written to
#[derive(Debug, Clone)]
pub struct DfuseElement {
    pub address: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DfuseFormatError {
    Truncated,
    BadPrefixSignature,
    BadTargetSignature,
    BadSuffix,
    UnsupportedVersion(u8),
    CrcMismatch { stored: u32, computed: u32 },
    TrailingBytes,
}

impl std::error::Error for DfuseFormatError {}

impl std::fmt::Display for DfuseFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DfuseFormatError::Truncated => write!(f, "truncated DfuSe file"),
            DfuseFormatError::BadPrefixSignature => {
                write!(f, "missing DfuSe signature")
            }
            DfuseFormatError::BadTargetSignature => {
                write!(f, "missing Target signature")
            }
            DfuseFormatError::BadSuffix => write!(f, "malformed DFU suffix"),
            DfuseFormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported DfuSe version {v}")
            }
            DfuseFormatError::CrcMismatch { stored, computed } => {
                write!(
                    f,
                    "CRC mismatch: file says {stored:#010x}, \
                     computed {computed:#010x}"
                )
            }
            DfuseFormatError::TrailingBytes => {
                write!(f, "trailing bytes after last target")
            }
        }
    }
}

/// Quick check whether a blob looks like a DfuSe container.
pub fn is_dfuse_file(data: &[u8]) -> bool {
    data.starts_with(PREFIX_SIGNATURE)
}

pub fn parse_dfuse(data: &[u8]) -> Result<DfuseFile, DfuseFormatError> {
    if data.len() < PREFIX_LEN + SUFFIX_LEN {
        return Err(DfuseFormatError::Truncated);
    }

    // Suffix first: it validates the whole file.
    let suffix = &data[data.len() - SUFFIX_LEN..];
    let device_version = u16::from_le_bytes([suffix[0], suffix[1]]);
    let product = u16::from_le_bytes([suffix[2], suffix[3]]);
    let vendor = u16::from_le_bytes([suffix[4], suffix[5]]);
    if &suffix[8..11] != SUFFIX_SIGNATURE
        || suffix[11] as usize != SUFFIX_LEN
    {
        return Err(DfuseFormatError::BadSuffix);
    }
    let stored_crc = u32::from_le_bytes([
        suffix[12], suffix[13], suffix[14], suffix[15],
    ]);
    let computed = file_crc(&data[..data.len() - 4]);
    if stored_crc != computed {
        return Err(DfuseFormatError::CrcMismatch {
            stored: stored_crc,
            computed,
        });
    }

    let mut rest = &data[..data.len() - SUFFIX_LEN];

    // Prefix
    let prefix = take(&mut rest, PREFIX_LEN)?;
    if !prefix.starts_with(PREFIX_SIGNATURE) {
        return Err(DfuseFormatError::BadPrefixSignature);
    }
    if prefix[5] != 0x01 {
        return Err(DfuseFormatError::UnsupportedVersion(prefix[5]));
    }
    let target_count = prefix[10];

    let mut targets = Vec::with_capacity(target_count as usize);
    for _ in 0..target_count {
        let header = take(&mut rest, TARGET_PREFIX_LEN)?;
        if !header.starts_with(TARGET_SIGNATURE) {
            return Err(DfuseFormatError::BadTargetSignature);
        }
        let alt_setting = header[6];
        let named = read_u32(header, 7) != 0;
        let name = if named {
            cstring(&header[11..266])
        } else {
            String::new()
        };
        let image_size = read_u32(header, 266) as usize;
        let element_count = read_u32(header, 270);

        let mut image = take(&mut rest, image_size)?;
        let mut elements = Vec::with_capacity(element_count as usize);
        for _ in 0..element_count {
            let elem_header = take(&mut image, 8)?;
            let address = read_u32(elem_header, 0);
            let size = read_u32(elem_header, 4) as usize;
            let elem_data = take(&mut image, size)?;
            elements.push(DfuseElement {
                address,
                data: elem_data.to_vec(),
            });
        }
        if !image.is_empty() {
            return Err(DfuseFormatError::TrailingBytes);
        }

        targets.push(DfuseTarget {
            alt_setting,
            name,
            elements,
        });
    }

    if !rest.is_empty() {
        return Err(DfuseFormatError::TrailingBytes);
    }

    Ok(DfuseFile {
        targets,
        device_version,
        product,
        vendor,
    })
}

impl DfuseFile {
    /// All elements of every target, in file order.
    pub fn elements(&self) -> impl Iterator<Item = &DfuseElement> {
        self.targets.iter().flat_map(|t| t.elements.iter())
    }

    pub fn total_bytes(&self) -> usize {
        self.elements().map(|e| e.data.len()).sum()
    }
}

// The suffix stores the complement of CRC-32 (IEEE).
fn file_crc(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    !crc.sum()
}

fn take<'a>(
    data: &mut &'a [u8],
    n: usize,
) -> Result<&'a [u8], DfuseFormatError> {
    if data.len() < n {
        return Err(DfuseFormatError::Truncated);
    }
    let (head, tail) = data.split_at(n);
    *data = tail;
    Ok(head)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4]))
}

fn cstring(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_file(elements: &[(u32, &[u8])]) -> Vec<u8> {
        let image_size: usize =
            elements.iter().map(|(_, d)| d.len() + 8).sum();

        let mut out = Vec::new();
        out.extend_from_slice(b"DfuSe");
        out.push(0x01);
        let total =
            PREFIX_LEN + TARGET_PREFIX_LEN + image_size;
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.push(1); // one target

        out.extend_from_slice(b"Target");
        out.push(0); // alt setting
        out.extend_from_slice(&1u32.to_le_bytes()); // named
        let mut name = [0u8; 255];
        name[..8].copy_from_slice(b"ST Flash");
        out.extend_from_slice(&name);
        out.extend_from_slice(&(image_size as u32).to_le_bytes());
        out.extend_from_slice(&(elements.len() as u32).to_le_bytes());

        for (addr, data) in elements {
            out.extend_from_slice(&addr.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }

        // suffix
        out.extend_from_slice(&0x0200u16.to_le_bytes()); // bcdDevice
        out.extend_from_slice(&0xdf11u16.to_le_bytes()); // product
        out.extend_from_slice(&0x0483u16.to_le_bytes()); // vendor
        out.extend_from_slice(&0x011Au16.to_le_bytes()); // bcdDFU
        out.extend_from_slice(b"UFD");
        out.push(16);
        let crc = file_crc(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    #[test]
    fn test_parse_roundtrip() {
        let file = build_file(&[
            (0x0800_0000, &[1, 2, 3, 4]),
            (0x0801_0000, &[5, 6]),
        ]);
        assert!(is_dfuse_file(&file));

        let parsed = parse_dfuse(&file).unwrap();
        assert_eq!(parsed.vendor, 0x0483);
        assert_eq!(parsed.product, 0xdf11);
        assert_eq!(parsed.targets.len(), 1);
        assert_eq!(parsed.targets[0].name, "ST Flash");
        assert_eq!(parsed.total_bytes(), 6);

        let elements: Vec<_> = parsed.elements().collect();
        assert_eq!(elements[0].address, 0x0800_0000);
        assert_eq!(elements[0].data, vec![1, 2, 3, 4]);
        assert_eq!(elements[1].address, 0x0801_0000);
    }

    #[test]
    fn test_crc_mismatch() {
        let mut file = build_file(&[(0x0800_0000, &[1, 2, 3, 4])]);
        let n = file.len();
        file[n - 20] ^= 0xFF; // corrupt payload, keep suffix intact
        assert!(matches!(
            parse_dfuse(&file),
            Err(DfuseFormatError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_signature() {
        let mut file = build_file(&[(0x0800_0000, &[1])]);
        file[0] = b'X';
        // signature is checked after the CRC, so fix the CRC up
        let n = file.len();
        let crc = file_crc(&file[..n - 4]);
        file[n - 4..].copy_from_slice(&crc.to_le_bytes());
        assert_eq!(
            parse_dfuse(&file).unwrap_err(),
            DfuseFormatError::BadPrefixSignature
        );
    }

    #[test]
    fn test_truncated() {
        assert_eq!(
            parse_dfuse(b"DfuSe").unwrap_err(),
            DfuseFormatError::Truncated
        );
    }
}

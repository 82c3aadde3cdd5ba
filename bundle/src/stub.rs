//! Bootstrap executable linking
//!
//! The linked "executable" is an overlay image: a fixed header with
//! launch flags, followed by length-framed blobs for the version
//! metadata, the icon and the payload archive. A launcher locates the
//! payload by the magic and framing; binaries and datas deliberately
//! stay outside so the collection step can lay them out next to it.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! "FWPK"  magic            4 bytes
//! u32     format version
//! u32     flags            console / stripped / compressed
//! u64     version-info length
//! u64     icon length
//! u64     payload length
//! [version-info][icon][payload]
//! ```

use std::{fs, path::Path};

use crate::descriptor::{BundleDescriptor, VersionInfo};
use crate::error::BundleError;

pub const STUB_MAGIC: &[u8; 4] = b"FWPK";
pub const STUB_FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 4 + 3 * 8;

pub const FLAG_CONSOLE: u32 = 1 << 0;
pub const FLAG_STRIPPED: u32 = 1 << 1;
pub const FLAG_COMPRESSED: u32 = 1 << 2;

pub struct BootstrapStub {
    pub flags: u32,
    pub version_info: Vec<u8>,
    pub icon: Vec<u8>,
    pub payload: Vec<u8>,
}

impl BootstrapStub {
    pub fn link(
        descriptor: &BundleDescriptor,
        payload: Vec<u8>,
    ) -> Result<Self, BundleError> {
        let mut flags = 0;
        if descriptor.console {
            flags |= FLAG_CONSOLE;
        }
        if descriptor.strip {
            flags |= FLAG_STRIPPED;
        }
        if descriptor.compress {
            flags |= FLAG_COMPRESSED;
        }

        let version_info = match &descriptor.version_info {
            Some(path) => {
                // normalize through the schema so junk fields never end
                // up inside the executable
                let info = VersionInfo::from_path(path)?;
                toml::to_string(&info)
                    .unwrap_or_default()
                    .into_bytes()
            }
            None => Vec::new(),
        };
        let icon = match &descriptor.icon {
            Some(path) => fs::read(path).map_err(BundleError::io(path))?,
            None => Vec::new(),
        };

        Ok(BootstrapStub {
            flags,
            version_info,
            icon,
            payload,
        })
    }

    pub fn console(&self) -> bool {
        self.flags & FLAG_CONSOLE != 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_LEN
                + self.version_info.len()
                + self.icon.len()
                + self.payload.len(),
        );
        out.extend_from_slice(STUB_MAGIC);
        out.extend_from_slice(&STUB_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&(self.version_info.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.icon.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.version_info);
        out.extend_from_slice(&self.icon);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, BundleError> {
        if data.len() < HEADER_LEN || &data[..4] != STUB_MAGIC {
            return Err(BundleError::InvalidStub);
        }
        let flags = read_u32(data, 8);
        let version_info_len = read_u64(data, 12);
        let icon_len = read_u64(data, 20);
        let payload_len = read_u64(data, 28);

        // lengths come from the file; they must add up to the file size
        // without overflowing
        let total = (HEADER_LEN as u64)
            .checked_add(version_info_len)
            .and_then(|n| n.checked_add(icon_len))
            .and_then(|n| n.checked_add(payload_len))
            .ok_or(BundleError::InvalidStub)?;
        if data.len() as u64 != total {
            return Err(BundleError::InvalidStub);
        }

        let version_end = HEADER_LEN + version_info_len as usize;
        let icon_end = version_end + icon_len as usize;
        Ok(BootstrapStub {
            flags,
            version_info: data[HEADER_LEN..version_end].to_vec(),
            icon: data[version_end..icon_end].to_vec(),
            payload: data[icon_end..].to_vec(),
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), BundleError> {
        fs::write(path, self.encode()).map_err(BundleError::io(path))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))
                .map_err(BundleError::io(path))?;
        }
        Ok(())
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap_or([0; 4]))
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap_or([0; 8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let stub = BootstrapStub {
            flags: FLAG_CONSOLE | FLAG_COMPRESSED,
            version_info: b"product_name = \"Installer\"\n".to_vec(),
            icon: vec![0u8; 16],
            payload: vec![1, 2, 3],
        };
        let decoded = BootstrapStub::decode(&stub.encode()).unwrap();
        assert!(decoded.console());
        assert_eq!(decoded.flags, stub.flags);
        assert_eq!(decoded.version_info, stub.version_info);
        assert_eq!(decoded.icon, stub.icon);
        assert_eq!(decoded.payload, stub.payload);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        assert!(matches!(
            BootstrapStub::decode(b"ELF\x7f0000000000000000000000000000"),
            Err(BundleError::InvalidStub)
        ));
    }

    #[test]
    fn test_decode_rejects_overflowing_lengths() {
        let mut data = Vec::new();
        data.extend_from_slice(STUB_MAGIC);
        data.extend_from_slice(&STUB_FORMAT_VERSION.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes());
        data.push(0);
        assert!(matches!(
            BootstrapStub::decode(&data),
            Err(BundleError::InvalidStub)
        ));
    }

    #[test]
    fn test_decode_rejects_bad_framing() {
        let stub = BootstrapStub {
            flags: 0,
            version_info: Vec::new(),
            icon: Vec::new(),
            payload: vec![9; 8],
        };
        let mut encoded = stub.encode();
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(
            BootstrapStub::decode(&encoded),
            Err(BundleError::InvalidStub)
        ));
    }
}

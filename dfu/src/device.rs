use std::{num::NonZeroU8, time::Duration};

use log::debug;
use nusb::{self, MaybeFuture};

use crate::connection::DfuConnection;
use crate::descriptor::{DFU_DESC_LEN, DFU_DESC_TYPE, FunctionalDescriptor};
use crate::error::DfuError;
use crate::memory::{DfuMemory, parse_memory_layout};
use crate::{DFUSE_VERSION_NUMBER, REQUEST_TIMEOUT};

const DFU_CLASS: u8 = 0xFE;
const DFU_SUBCLASS: u8 = 0x01;

/// A USB device currently in DFU mode
pub struct DfuDevice {
    info: nusb::DeviceInfo,
    alt_settings: Vec<DfuAltSetting>,
}

/// One DFU alternate setting and the memory it exposes
#[derive(Clone, Debug)]
pub struct DfuAltSetting {
    interface: u8,
    alt_setting: u8,
    layout: DfuMemory,
}

impl DfuAltSetting {
    pub fn interface(&self) -> u8 {
        self.interface
    }
    pub fn alt_setting(&self) -> u8 {
        self.alt_setting
    }
    pub fn layout(&self) -> &DfuMemory {
        &self.layout
    }
}

impl DfuDevice {
    fn from_device_info(
        info: nusb::DeviceInfo,
    ) -> Result<Option<Self>, DfuError> {
        let dev = info.open().wait()?;
        let mut alt_settings = Vec::new();

        for config in dev.configurations() {
            for alt in config.interface_alt_settings() {
                if alt.class() != DFU_CLASS || alt.subclass() != DFU_SUBCLASS
                {
                    continue;
                }
                let Some(name_idx) = alt.string_index() else {
                    continue;
                };
                let Some(desc) = read_string_descriptor(&dev, name_idx)
                else {
                    continue;
                };
                match parse_memory_layout(&desc) {
                    Some(layout) => alt_settings.push(DfuAltSetting {
                        interface: alt.interface_number(),
                        alt_setting: alt.alternate_setting(),
                        layout,
                    }),
                    None => {
                        debug!("unparseable memory layout: {desc:?}");
                    }
                }
            }
        }

        if alt_settings.is_empty() {
            Ok(None)
        } else {
            Ok(Some(DfuDevice { info, alt_settings }))
        }
    }

    pub fn device_info(&self) -> &nusb::DeviceInfo {
        &self.info
    }

    pub fn bus_id(&self) -> &str {
        self.info.bus_id()
    }

    pub fn device_address(&self) -> u8 {
        self.info.device_address()
    }

    pub fn vendor_id(&self) -> u16 {
        self.info.vendor_id()
    }

    pub fn product_id(&self) -> u16 {
        self.info.product_id()
    }

    /// DFU alternate settings with a parseable memory layout
    pub fn alt_settings(&self) -> &[DfuAltSetting] {
        &self.alt_settings
    }

    pub fn default_alt_setting(&self) -> &DfuAltSetting {
        &self.alt_settings[0]
    }

    pub fn is_dfuse(&self) -> bool {
        self.functional_descriptor()
            .ok()
            .unwrap_or_default()
            .dfu_version()
            == DFUSE_VERSION_NUMBER
    }

    /// Query the DFU functional descriptor. Devices without one get the
    /// conservative defaults.
    pub fn functional_descriptor(
        &self,
    ) -> Result<FunctionalDescriptor, DfuError> {
        let dev = self.info.open().wait()?;
        for config in dev.configurations() {
            for alt in config.interface_alt_settings() {
                for desc in alt.descriptors() {
                    if desc.descriptor_len() == DFU_DESC_LEN
                        && desc.descriptor_type() == DFU_DESC_TYPE
                    {
                        return Ok(FunctionalDescriptor::new(&desc));
                    }
                }
            }
        }
        Ok(FunctionalDescriptor::default())
    }

    /// Claim the interface and select the alternate setting, ready for
    /// protocol requests.
    pub fn connect(
        &self,
        interface: u8,
        alt_setting: u8,
    ) -> Result<DfuConnection, DfuError> {
        let transfer_size = self.functional_descriptor()?.transfer_size();
        let dev = self.info.open().wait()?;
        let intf = dev.claim_interface(interface).wait()?;
        intf.set_alt_setting(alt_setting).wait()?;
        Ok(DfuConnection::new(intf, transfer_size))
    }
}

fn read_string_descriptor(
    dev: &nusb::Device,
    index: NonZeroU8,
) -> Option<String> {
    let timeout: Duration = REQUEST_TIMEOUT;
    let language = dev
        .get_string_descriptor_supported_languages(timeout)
        .wait()
        .ok()?
        .next()
        .unwrap_or(nusb::descriptors::language_id::US_ENGLISH);
    dev.get_string_descriptor(index, language, timeout).wait().ok()
}

/// Enumerate USB devices currently in DFU mode (interface class 0xFE,
/// subclass 1), optionally narrowed by vendor and product ID.
pub fn find_dfu_devices(
    vid: Option<u16>,
    pid: Option<u16>,
) -> Result<Vec<DfuDevice>, DfuError> {
    let mut found = Vec::new();
    for info in nusb::list_devices().wait()? {
        if let Some(id) = vid
            && info.vendor_id() != id
        {
            continue;
        }
        if let Some(id) = pid
            && info.product_id() != id
        {
            continue;
        }
        let is_dfu = info
            .interfaces()
            .any(|i| i.class() == DFU_CLASS && i.subclass() == DFU_SUBCLASS);
        if !is_dfu {
            continue;
        }
        if let Some(device) = DfuDevice::from_device_info(info)? {
            found.push(device);
        }
    }
    Ok(found)
}

//! Element flashing
//!
//! Writes firmware elements through an established [`DfuConnection`],
//! erasing pages lazily as the write crosses into them. With mass erase
//! the per-page erases are skipped.

use std::cmp;

use log::info;

use crate::connection::DfuConnection;
use crate::dfuse::DfuseElement;
use crate::error::DfuError;
use crate::memory::DfuMemory;

/// Progress callback: `(element address, bytes written, element size)`
pub type Progress<'a> = &'a mut dyn FnMut(u32, usize, usize);

pub fn flash_elements(
    connection: &DfuConnection,
    layout: &DfuMemory,
    elements: &[DfuseElement],
    mass_erase: bool,
    progress: Progress,
) -> Result<(), DfuError> {
    if mass_erase {
        info!("mass erasing device");
        connection.mass_erase()?;
    }

    let transfer_size = connection.transfer_size() as usize;

    for element in elements {
        let total = element.data.len();
        info!(
            "writing element @ {:#010x} ({} bytes)",
            element.address, total
        );
        progress(element.address, 0, total);

        let mut written = 0usize;
        while written < total {
            let addr = element.address + written as u32;
            let mut span = total - written;

            if !mass_erase {
                let segment = layout
                    .segment_for(addr)
                    .ok_or(DfuError::NoSegmentFor { addr })?;
                let page = segment.page_base(addr);
                let page_end = page + segment.page_size();
                span = cmp::min(span, (page_end - addr) as usize);
                connection.page_erase(page)?;
            }

            // One erased page may take several transfers to fill.
            let page_data = &element.data[written..written + span];
            for chunk in page_data.chunks(transfer_size) {
                connection
                    .write_at(element.address + written as u32, chunk)?;
                written += chunk.len();
                progress(element.address, written, total);
            }
        }
    }
    Ok(())
}

//! DfuSe memory layout parsing
//!
//! DfuSe bootloaders describe the programmable memory in the interface
//! string descriptor of each alternate setting, e.g.
//! `@Internal Flash  /0x08000000/04*016Kg,01*064Kg,07*128Kg`.
//! Sections alternate between a base address and a comma-separated
//! segment list; segment attributes are a letter whose low bits encode
//! readable/erasable/writable.

use nonempty::NonEmpty;
use regex::Regex;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DfuMemory {
    pub name: String,
    pub segments: NonEmpty<DfuSegment>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DfuSegment {
    start: u32,
    /// Last address inside the segment (inclusive)
    last: u32,
    page_size: u32,
    attrs: u8,
}

impl DfuMemory {
    pub fn segment_for(&self, addr: u32) -> Option<&DfuSegment> {
        self.segments.iter().find(|s| s.contains(addr))
    }

    pub fn start(&self) -> u32 {
        self.segments.first().start
    }

    pub fn end(&self) -> u32 {
        self.segments.last().last
    }
}

impl DfuSegment {
    pub fn start(&self) -> u32 {
        self.start
    }
    pub fn last_addr(&self) -> u32 {
        self.last
    }
    pub fn page_size(&self) -> u32 {
        self.page_size
    }
    pub fn pages(&self) -> u32 {
        (self.last - self.start + 1) / self.page_size
    }
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr <= self.last
    }
    /// Base address of the page containing `addr`
    pub fn page_base(&self, addr: u32) -> u32 {
        addr & !(self.page_size - 1)
    }
    pub fn readable(&self) -> bool {
        self.attrs & 1 != 0
    }
    pub fn erasable(&self) -> bool {
        self.attrs & 2 != 0
    }
    pub fn writable(&self) -> bool {
        self.attrs & 4 != 0
    }
}

pub(crate) fn parse_memory_layout(desc: &str) -> Option<DfuMemory> {
    let mut sections = desc.split('/');
    let name = sections
        .next()?
        .trim_start_matches('@')
        .trim()
        .to_string();

    let seg_re = Regex::new(r"(\d+)\*(\d+)([KMB ]?)([a-g])").ok()?;
    let mut segments: Vec<DfuSegment> = Vec::new();

    while let (Some(addr_str), Some(seg_list)) =
        (sections.next(), sections.next())
    {
        let addr_str = addr_str.trim().trim_end_matches('U');
        let mut addr = u32::from_str_radix(
            addr_str.trim_start_matches("0x").trim_start_matches("0X"),
            16,
        )
        .ok()?;

        for segment in seg_list.split(',') {
            let caps = seg_re.captures(segment)?;
            let pages: u32 = caps[1].parse().ok()?;
            let mut page_size: u32 = caps[2].parse().ok()?;
            match &caps[3] {
                "K" => page_size *= 1024,
                "M" => page_size *= 1024 * 1024,
                _ => {}
            }
            let attrs = caps[4].as_bytes()[0] & 7;
            let size = pages * page_size;
            segments.push(DfuSegment {
                start: addr,
                last: addr + size - 1,
                page_size,
                attrs,
            });
            addr += size;
        }
    }

    NonEmpty::from_vec(segments).map(|segments| DfuMemory { name, segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stm32f4_layout() {
        let layout = parse_memory_layout(
            "@Internal Flash  /0x08000000/04*016Kg,01*064Kg,07*128Kg",
        )
        .unwrap();
        assert_eq!(layout.name, "Internal Flash");
        assert_eq!(layout.segments.len(), 3);

        let first = layout.segments.first();
        assert_eq!(first.start(), 0x0800_0000);
        assert_eq!(first.page_size(), 16 * 1024);
        assert_eq!(first.pages(), 4);
        assert!(first.readable() && first.erasable() && first.writable());

        // segments are laid out back to back
        assert_eq!(layout.segments[1].start(), 0x0801_0000);
        assert_eq!(layout.segments[2].start(), 0x0802_0000);
        assert_eq!(layout.end(), 0x080F_FFFF);
    }

    #[test]
    fn test_multiple_sections() {
        let layout = parse_memory_layout(
            "@Flash/0x08000000/2*1Kg/0x1FFF0000/1*29Ba",
        )
        .unwrap();
        assert_eq!(layout.segments.len(), 2);
        assert_eq!(layout.segments[1].start(), 0x1FFF_0000);
        assert_eq!(layout.segments[1].last_addr(), 0x1FFF_0000 + 28);
        assert!(layout.segments[1].readable());
        assert!(!layout.segments[1].writable());
    }

    #[test]
    fn test_segment_for() {
        let layout =
            parse_memory_layout("@Flash/0x08000000/2*1Kg").unwrap();
        assert!(layout.segment_for(0x0800_0400).is_some());
        assert!(layout.segment_for(0x0800_0800).is_none());
        let seg = layout.segment_for(0x0800_0555).unwrap();
        assert_eq!(seg.page_base(0x0800_0555), 0x0800_0400);
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(parse_memory_layout("not a layout"), None);
    }

    // alt settings carry their layout by value and get cloned around
    #[test]
    fn test_layout_is_cloneable() {
        let layout =
            parse_memory_layout("@Flash/0x08000000/2*1Kg").unwrap();
        let copy = layout.clone();
        assert_eq!(copy, layout);
    }
}

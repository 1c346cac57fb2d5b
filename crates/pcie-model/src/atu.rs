//! Address Translation Unit.
//!
//! A small table of address windows. Outbound bus transactions are matched against the table in
//! slot order and the first window containing the address translates it. Windows may overlap and
//! are not validated; an inverted window (`base > limit`) simply never matches.

use crate::error::{PcieError, Resource, Result};

pub const ATU_REGIONS: usize = 4;

/// Value returned by every bus read. The model has no backing memory.
pub const BUS_READ_SENTINEL: u32 = 0xdead_beef;

pub const DEFAULT_OUTBOUND_BASE: u32 = 0x8000_0000;
pub const DEFAULT_OUTBOUND_TARGET: u32 = 0x0000_0000;
pub const DEFAULT_OUTBOUND_WINDOW: u32 = 0x0010_0000;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum AtuDirection {
    #[default]
    Inbound,
    Outbound,
}

impl AtuDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// One translation window. `limit` is inclusive.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct AtuRegion {
    pub direction: AtuDirection,
    pub base: u32,
    pub limit: u32,
    pub target: u32,
}

impl AtuRegion {
    pub fn contains(&self, addr: u32) -> bool {
        self.base <= addr && addr <= self.limit
    }

    /// `target + (addr - base)`, wrapping at 32 bits.
    pub fn translate(&self, addr: u32) -> u32 {
        self.target.wrapping_add(addr.wrapping_sub(self.base))
    }
}

/// Result of a successful outbound lookup.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Translation {
    /// Slot of the matching region.
    pub region: usize,
    pub addr: u32,
    pub translated: u32,
}

/// Outcome of a bus read: the (placeholder) data plus whether a region matched.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BusRead {
    pub value: u32,
    pub translation: Option<Translation>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Atu {
    regions: [AtuRegion; ATU_REGIONS],
}

impl Atu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.regions = [AtuRegion::default(); ATU_REGIONS];
    }

    pub fn configure(
        &mut self,
        index: usize,
        direction: AtuDirection,
        base: u32,
        limit: u32,
        target: u32,
    ) -> Result<()> {
        let Some(region) = self.regions.get_mut(index) else {
            tracing::warn!(region = index, "ATU region index out of range");
            return Err(PcieError::index_out_of_range(
                Resource::AtuRegion,
                index,
                ATU_REGIONS,
            ));
        };
        *region = AtuRegion {
            direction,
            base,
            limit,
            target,
        };
        log_configured(index, region);
        Ok(())
    }

    /// Programs every slot as a contiguous 1 MiB outbound window starting at
    /// [`DEFAULT_OUTBOUND_BASE`].
    pub fn program_default_outbound(&mut self) {
        for (index, region) in self.regions.iter_mut().enumerate() {
            let offset = index as u32 * DEFAULT_OUTBOUND_WINDOW;
            let base = DEFAULT_OUTBOUND_BASE + offset;
            *region = AtuRegion {
                direction: AtuDirection::Outbound,
                base,
                limit: base + (DEFAULT_OUTBOUND_WINDOW - 1),
                target: DEFAULT_OUTBOUND_TARGET + offset,
            };
            log_configured(index, region);
        }
    }

    pub fn region(&self, index: usize) -> Option<&AtuRegion> {
        self.regions.get(index)
    }

    pub fn regions(&self) -> &[AtuRegion; ATU_REGIONS] {
        &self.regions
    }

    /// First outbound region, in slot order, whose window contains `addr`.
    pub fn translate_outbound(&self, addr: u32) -> Option<Translation> {
        self.regions
            .iter()
            .enumerate()
            .find(|(_, region)| region.direction == AtuDirection::Outbound && region.contains(addr))
            .map(|(index, region)| Translation {
                region: index,
                addr,
                translated: region.translate(addr),
            })
    }

    /// Traces an outbound write. The value is not stored anywhere.
    pub fn write(&self, addr: u32, value: u32) -> Option<Translation> {
        let translation = self.translate_outbound(addr);
        match translation {
            Some(t) => tracing::debug!(
                addr = format_args!("{addr:#010x}"),
                translated = format_args!("{:#010x}", t.translated),
                value = format_args!("{value:#010x}"),
                "bus write"
            ),
            None => tracing::debug!(
                addr = format_args!("{addr:#010x}"),
                value = format_args!("{value:#010x}"),
                "bus write (no ATU match)"
            ),
        }
        translation
    }

    /// Traces an outbound read. The returned value is always [`BUS_READ_SENTINEL`].
    pub fn read(&self, addr: u32) -> BusRead {
        let translation = self.translate_outbound(addr);
        match translation {
            Some(t) => tracing::debug!(
                addr = format_args!("{addr:#010x}"),
                translated = format_args!("{:#010x}", t.translated),
                "bus read"
            ),
            None => tracing::debug!(addr = format_args!("{addr:#010x}"), "bus read (no ATU match)"),
        }
        BusRead {
            value: BUS_READ_SENTINEL,
            translation,
        }
    }
}

fn log_configured(index: usize, region: &AtuRegion) {
    tracing::info!(
        region = index,
        direction = region.direction.as_str(),
        base = format_args!("{:#010x}", region.base),
        limit = format_args!("{:#010x}", region.limit),
        target = format_args!("{:#010x}", region.target),
        "ATU region configured"
    );
}

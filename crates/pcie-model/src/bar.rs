use crate::error::{PcieError, Resource, Result};

pub const BAR_COUNT: usize = 6;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Bar {
    pub address: u32,
    pub mask: u32,
}

impl Bar {
    pub fn is_mapped(&self) -> bool {
        *self != Self::default()
    }
}

/// Base address register slots. All zero after reset.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BarTable {
    bars: [Bar; BAR_COUNT],
}

impl BarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.bars = [Bar::default(); BAR_COUNT];
        tracing::info!("BARs reset");
    }

    pub fn map(&mut self, index: usize, address: u32, mask: u32) -> Result<()> {
        let Some(bar) = self.bars.get_mut(index) else {
            tracing::warn!(bar = index, "BAR index out of range");
            return Err(PcieError::index_out_of_range(Resource::Bar, index, BAR_COUNT));
        };
        *bar = Bar { address, mask };
        tracing::info!(
            bar = index,
            addr = format_args!("{address:#010x}"),
            mask = format_args!("{mask:#010x}"),
            "BAR mapped"
        );
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<Bar> {
        self.bars.get(index).copied()
    }

    pub fn as_slice(&self) -> &[Bar; BAR_COUNT] {
        &self.bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_then_reset() {
        let mut bars = BarTable::new();
        bars.map(5, 0xfe00_0000, 0xffff_f000).unwrap();
        assert_eq!(
            bars.get(5),
            Some(Bar {
                address: 0xfe00_0000,
                mask: 0xffff_f000,
            })
        );
        assert!(bars.get(5).unwrap().is_mapped());

        bars.reset();
        assert!(bars.as_slice().iter().all(|bar| !bar.is_mapped()));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut bars = BarTable::new();
        bars.map(0, 0x1000, 0xffff_f000).unwrap();
        let before = bars.clone();

        assert_eq!(
            bars.map(BAR_COUNT, 0x2000, 0xffff_f000),
            Err(PcieError::OutOfRange {
                resource: Resource::Bar,
                index: BAR_COUNT as i64,
                limit: BAR_COUNT,
            })
        );
        assert_eq!(bars, before);
        assert_eq!(bars.get(BAR_COUNT), None);
    }
}

#![cfg(not(target_arch = "wasm32"))]

use pcie_model::{AtuDirection, DeviceContext, DeviceKind, LaneWidth, LinkSpeed, BUS_READ_SENTINEL};
use proptest::prelude::*;

fn blank_device() -> DeviceContext<Vec<(u32, u32)>> {
    DeviceContext::new(Vec::new())
}

#[test]
fn lower_slot_wins_when_regions_overlap() {
    let mut dev = blank_device();
    dev.configure_atu_region(2, AtuDirection::Outbound, 0x1000, 0x1fff, 0xa000)
        .unwrap();
    dev.configure_atu_region(1, AtuDirection::Outbound, 0x1800, 0x27ff, 0xb000)
        .unwrap();

    let t = dev.bus_write(0x1900, 0x1234).unwrap();
    assert_eq!(t.region, 1);
    assert_eq!(t.translated, 0xb100);

    // Only slot 2 covers this address.
    let t = dev.bus_read_traced(0x1100).translation.unwrap();
    assert_eq!(t.region, 2);
    assert_eq!(t.translated, 0xa100);
}

#[test]
fn unmatched_traffic_is_reported_untranslated() {
    let mut dev = blank_device();
    dev.initialize(DeviceKind::Endpoint, LinkSpeed::Gen5, LaneWidth::X8);

    assert_eq!(dev.bus_write(0x7fff_ffff, 1), None);
    assert_eq!(dev.bus_write(0x8040_0000, 1), None);

    let read = dev.bus_read_traced(0x8040_0000);
    assert_eq!(read.value, BUS_READ_SENTINEL);
    assert!(read.translation.is_none());
    assert_eq!(dev.bus_read(0x8000_0000), BUS_READ_SENTINEL);
}

#[test]
fn bus_traffic_does_not_touch_board_or_tables() {
    let mut dev = blank_device();
    dev.initialize(DeviceKind::RootComplex, LinkSpeed::Gen4, LaneWidth::X4);
    let board_len = dev.board().len();
    let atu = dev.atu().clone();

    dev.bus_write(0x8000_0004, 0xcafe);
    dev.bus_read(0x8030_0000);

    assert_eq!(dev.board().len(), board_len);
    assert_eq!(dev.atu(), &atu);
}

proptest! {
    #[test]
    fn addresses_inside_a_region_translate_by_offset(
        base in any::<u32>(),
        len in 0u32..0x0100_0000,
        target in any::<u32>(),
        pick in any::<u32>(),
    ) {
        let limit = base.saturating_add(len);
        let addr = base + pick % (limit - base + 1);

        let mut dev = blank_device();
        dev.configure_atu_region(3, AtuDirection::Outbound, base, limit, target).unwrap();

        let expected = target.wrapping_add(addr - base);
        prop_assert_eq!(dev.bus_write(addr, 0).map(|t| t.translated), Some(expected));
        let read = dev.bus_read_traced(addr);
        prop_assert_eq!(read.value, BUS_READ_SENTINEL);
        prop_assert_eq!(read.translation.map(|t| t.translated), Some(expected));
    }

    #[test]
    fn first_configured_slot_wins(addr in any::<u32>(), t0 in any::<u32>(), t1 in any::<u32>()) {
        let mut dev = blank_device();
        dev.configure_atu_region(0, AtuDirection::Outbound, addr, addr, t0).unwrap();
        dev.configure_atu_region(1, AtuDirection::Outbound, 0, u32::MAX, t1).unwrap();

        let t = dev.bus_write(addr, 0).unwrap();
        prop_assert_eq!(t.region, 0);
        prop_assert_eq!(t.translated, t0);
    }

    #[test]
    fn addresses_outside_every_region_fall_back(addr in any::<u32>()) {
        let mut dev = blank_device();
        dev.initialize(DeviceKind::Endpoint, LinkSpeed::Gen1, LaneWidth::X1);
        prop_assume!(!(0x8000_0000..=0x803f_ffff).contains(&addr));

        prop_assert_eq!(dev.bus_write(addr, 0), None);
        prop_assert_eq!(dev.bus_read(addr), BUS_READ_SENTINEL);
    }
}

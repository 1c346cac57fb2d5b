#![cfg(not(target_arch = "wasm32"))]

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pcie-model"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn both_devices_come_up_and_receive_msi() {
    cli()
        .args(["--events", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "RC: link up Gen7 x16, 2 msi events on vector 0, 4 notifications",
        ))
        .stdout(predicate::str::contains(
            "EP: link up Gen7 x8, 2 msi events on vector 0, 4 notifications",
        ))
        .stdout(predicate::str::contains("board PCI status register: 0x02"));
}

#[test]
fn legacy_events_only_reach_the_registration() {
    cli()
        .args(["--role", "ep", "--kind", "legacy", "--vector", "5", "--events", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "EP: link up Gen7 x8, 3 legacy events on vector 5, 3 notifications",
        ))
        .stdout(predicate::str::contains("RC:").not());
}

#[test]
fn zero_events_leaves_link_up_status() {
    cli()
        .args(["--role", "rc", "--events", "0", "--speed", "3", "--rc-lanes", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RC: link up Gen3 x4, 0 msi events"))
        .stdout(predicate::str::contains("board PCI status register: 0x01"));
}

#[test]
fn invalid_lane_width_is_rejected() {
    cli()
        .args(["--ep-lanes", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid lane width x3"));
}

#[test]
fn out_of_range_msix_vector_is_rejected() {
    cli()
        .args(["--role", "ep", "--kind", "msix", "--vector", "8"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MSI-X vector index 8 out of range"));
}

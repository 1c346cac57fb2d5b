//! Behavioural model of a PCI-Express root complex or endpoint.
//!
//! A [`DeviceContext`] walks the link bring-up sequence, exposes a 256-byte configuration space
//! with a small capability list, translates outbound bus addresses through an ATU and fans
//! interrupts out to registered execution contexts. There is no electrical or TLP-level timing;
//! every operation completes synchronously.

#![forbid(unsafe_code)]

pub mod atu;
pub mod bar;
pub mod board;
pub mod capabilities;
pub mod config;
pub mod device;
pub mod error;
pub mod interrupts;
pub mod link;

pub use atu::{Atu, AtuDirection, AtuRegion, BusRead, Translation, BUS_READ_SENTINEL};
pub use bar::{Bar, BarTable};
pub use board::{BoardRegisterWrite, BoardRegisters};
pub use capabilities::{Capability, CapabilityList};
pub use config::{ConfigSpace, HeaderIdentity};
pub use device::{Device, DeviceConfig, DeviceContext, DeviceKind};
pub use error::{PcieError, Resource, Result, Table};
pub use interrupts::{
    notification_channel, ChannelNotifier, ContextHandle, InterruptController, InterruptDelivery,
    InterruptEvent, InterruptKind, Notify, TaskNotifier,
};
pub use link::{
    BringUpPhase, BringUpStep, LaneWidth, LinkController, LinkSpeed, LinkState, LtssmState,
    StepOutcome,
};

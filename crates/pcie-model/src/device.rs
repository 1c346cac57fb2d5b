use std::fmt;

use crate::atu::{Atu, AtuDirection, BusRead, Translation};
use crate::bar::{Bar, BarTable, BAR_COUNT};
use crate::board::BoardRegisterWrite;
use crate::capabilities::CapabilityList;
use crate::config::{ConfigSpace, HeaderIdentity};
use crate::error::{PcieError, Result};
use crate::interrupts::{ContextHandle, InterruptController, InterruptDelivery, InterruptKind};
use crate::link::{
    BringUpPhase, BringUpStep, LaneWidth, LinkController, LinkSpeed, LinkState, StepOutcome,
};

/// Payload returned by [`DeviceContext::receive`].
pub const RECEIVE_PAYLOAD: &[u8] = b"PCI_DATA";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DeviceKind {
    RootComplex,
    Endpoint,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RootComplex => "RC",
            Self::Endpoint => "EP",
        })
    }
}

/// Role and link parameters of an initialized device.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Device {
    pub kind: DeviceKind,
    pub link_speed: LinkSpeed,
    pub lane_width: LaneWidth,
}

/// Bring-up parameters for one simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    pub link_speed: LinkSpeed,
    pub lane_width: LaneWidth,
    /// Header register values seeded during bring-up.
    pub identity: HeaderIdentity,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Endpoint,
            link_speed: LinkSpeed::Gen5,
            lane_width: LaneWidth::X8,
            identity: HeaderIdentity::default(),
        }
    }
}

impl DeviceConfig {
    /// Root complex on a Gen7 x16 link.
    pub fn root_complex() -> Self {
        Self {
            kind: DeviceKind::RootComplex,
            link_speed: LinkSpeed::Gen7,
            lane_width: LaneWidth::X16,
            ..Self::default()
        }
    }

    /// Endpoint on a Gen7 x8 link.
    pub fn endpoint() -> Self {
        Self {
            kind: DeviceKind::Endpoint,
            link_speed: LinkSpeed::Gen7,
            lane_width: LaneWidth::X8,
            ..Self::default()
        }
    }
}

/// One simulated root complex or endpoint.
///
/// The context exclusively owns its config space, BARs, ATU, link state and interrupt tables.
/// It is not internally synchronized; give each concurrently running device its own instance.
/// Status codes go to the board register sink `B`, which may be shared between devices.
pub struct DeviceContext<B> {
    device: Option<Device>,
    identity: HeaderIdentity,
    config: ConfigSpace,
    bars: BarTable,
    atu: Atu,
    link: LinkController,
    interrupts: InterruptController,
    board: B,
}

impl<B: fmt::Debug> fmt::Debug for DeviceContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("device", &self.device)
            .field("phase", &self.link.phase())
            .field("link", self.link.state())
            .field("board", &self.board)
            .finish_non_exhaustive()
    }
}

impl<B: BoardRegisterWrite> DeviceContext<B> {
    /// Creates a powered-off device. Nothing is ready for traffic until [`Self::initialize`], or
    /// until [`Self::power_on`] followed by every [`Self::step`] up to link-up.
    pub fn new(board: B) -> Self {
        Self {
            device: None,
            identity: HeaderIdentity::default(),
            config: ConfigSpace::new(),
            bars: BarTable::new(),
            atu: Atu::new(),
            link: LinkController::new(),
            interrupts: InterruptController::new(),
            board,
        }
    }

    /// Creates a device and runs bring-up with `config`.
    pub fn with_config(config: &DeviceConfig, board: B) -> Self {
        let mut dev = Self::new(board);
        dev.initialize_with(config);
        dev
    }

    /// Runs the full bring-up sequence with the default header identity.
    pub fn initialize(&mut self, kind: DeviceKind, speed: LinkSpeed, width: LaneWidth) {
        let config = DeviceConfig {
            kind,
            link_speed: speed,
            lane_width: width,
            identity: HeaderIdentity::default(),
        };
        self.initialize_with(&config);
    }

    /// Clears all device state, then runs the full bring-up sequence: link steps, BAR reset,
    /// default outbound ATU windows and finally link-up.
    pub fn initialize_with(&mut self, config: &DeviceConfig) {
        self.power_on(config);

        let steps = [
            BringUpStep::ClockPllInit,
            BringUpStep::PerstDeassert,
            BringUpStep::FirmwareLoad,
            BringUpStep::CrParaWrite,
            BringUpStep::HeaderInit,
            BringUpStep::SetSpeedWidth {
                speed: config.link_speed,
                width: config.lane_width,
            },
            BringUpStep::LinkTraining,
            BringUpStep::LinkUp,
        ];
        for step in steps {
            // Always in sequence from a freshly reset controller.
            if let Err(err) = self.step(step) {
                tracing::warn!("bring-up step failed: {err}");
            }
        }
    }

    /// Clears all device state and records the device's role and identity, leaving the link in
    /// reset. Bring-up then proceeds one [`Self::step`] at a time.
    pub fn power_on(&mut self, config: &DeviceConfig) {
        self.reset();
        self.identity = config.identity;
        self.device = Some(Device {
            kind: config.kind,
            link_speed: config.link_speed,
            lane_width: config.lane_width,
        });
        tracing::info!(
            kind = %config.kind,
            speed = %config.link_speed,
            width = %config.lane_width,
            "initializing PCIe device"
        );
    }

    /// Runs a single bring-up step against a powered-on device.
    ///
    /// Header init seeds config space only the first time it runs; speed/width negotiation
    /// rewrites the device's link parameters. Before link-up is first asserted the BARs are
    /// reset and the default outbound ATU windows are programmed.
    pub fn step(&mut self, step: BringUpStep) -> Result<StepOutcome> {
        if self.device.is_none() {
            tracing::warn!(?step, "bring-up step on a device that is not powered on");
            return Err(PcieError::NotPoweredOn);
        }
        if step == BringUpStep::LinkUp && self.link.next_phase() == Some(BringUpPhase::LinkUp) {
            self.bars.reset();
            self.atu.program_default_outbound();
        }

        let outcome = self.link.advance(step, &mut self.board)?;
        if outcome == StepOutcome::Advanced {
            match step {
                BringUpStep::HeaderInit => self.config.init_header(&self.identity),
                BringUpStep::SetSpeedWidth { speed, width } => {
                    if let Some(device) = self.device.as_mut() {
                        device.link_speed = speed;
                        device.lane_width = width;
                    }
                }
                _ => {}
            }
        }
        Ok(outcome)
    }

    fn reset(&mut self) {
        self.device = None;
        self.config = ConfigSpace::new();
        self.bars = BarTable::new();
        self.atu.reset();
        self.link.reset();
        self.interrupts.reset();
    }

    pub fn device(&self) -> Option<Device> {
        self.device
    }

    pub fn link_state(&self) -> &LinkState {
        self.link.state()
    }

    pub fn phase(&self) -> BringUpPhase {
        self.link.phase()
    }

    pub fn is_link_up(&self) -> bool {
        self.link.is_link_up()
    }

    pub fn config_space(&self) -> &ConfigSpace {
        &self.config
    }

    pub fn read_register(&self, offset: usize) -> Result<u32> {
        self.config.read_register(offset)
    }

    pub fn write_register(&mut self, offset: usize, value: u32) -> Result<()> {
        self.config.write_register(offset, value)
    }

    pub fn capabilities(&self) -> &CapabilityList {
        self.config.capabilities()
    }

    /// Adds a capability and returns its slot.
    pub fn add_capability(&mut self, id: u8, payload: &[u8]) -> Result<usize> {
        self.config.add_capability(id, payload)
    }

    pub fn map_bar(&mut self, bar: usize, address: u32, mask: u32) -> Result<()> {
        self.bars.map(bar, address, mask)
    }

    pub fn bar(&self, bar: usize) -> Option<Bar> {
        self.bars.get(bar)
    }

    pub fn bars(&self) -> &[Bar; BAR_COUNT] {
        self.bars.as_slice()
    }

    pub fn atu(&self) -> &Atu {
        &self.atu
    }

    pub fn configure_atu_region(
        &mut self,
        index: usize,
        direction: AtuDirection,
        base: u32,
        limit: u32,
        target: u32,
    ) -> Result<()> {
        self.atu.configure(index, direction, base, limit, target)
    }

    /// Issues an outbound write. Returns the translation that applied, if any.
    pub fn bus_write(&self, addr: u32, value: u32) -> Option<Translation> {
        self.atu.write(addr, value)
    }

    /// Issues an outbound read. Always returns [`crate::atu::BUS_READ_SENTINEL`].
    pub fn bus_read(&self, addr: u32) -> u32 {
        self.atu.read(addr).value
    }

    /// Like [`Self::bus_read`] but also reports whether an ATU region matched.
    pub fn bus_read_traced(&self, addr: u32) -> BusRead {
        self.atu.read(addr)
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    /// Registers `context` for `(kind, vector)` and returns the registration slot.
    pub fn register_interrupt(
        &mut self,
        kind: InterruptKind,
        vector: i32,
        context: ContextHandle,
    ) -> Result<usize> {
        self.interrupts.register(kind, vector, context)
    }

    pub fn configure_msi(&mut self, vector: i32, context: ContextHandle) -> Result<()> {
        self.interrupts.configure_msi(vector, context)
    }

    pub fn configure_msix(&mut self, vector: i32, context: ContextHandle) -> Result<()> {
        self.interrupts.configure_msix(vector, context)
    }

    pub fn set_msi_mask(&mut self, vector: i32, masked: bool) -> Result<()> {
        self.interrupts.set_msi_mask(vector, masked)
    }

    pub fn set_msix_mask(&mut self, vector: i32, masked: bool) -> Result<()> {
        self.interrupts.set_msix_mask(vector, masked)
    }

    pub fn generate_interrupt(&mut self, kind: InterruptKind, vector: i32) -> InterruptDelivery {
        self.interrupts.generate(kind, vector, &mut self.board)
    }

    /// Injects an interrupt as if raised by the link partner.
    pub fn simulate_event(&mut self, kind: InterruptKind, vector: i32) -> InterruptDelivery {
        tracing::info!(%kind, vector, "simulated event");
        self.generate_interrupt(kind, vector)
    }

    pub fn send(&mut self, data: &[u8]) {
        tracing::debug!(data = %String::from_utf8_lossy(data), "send");
    }

    /// Fills `buf` with [`RECEIVE_PAYLOAD`], keeping the last byte of `buf` free, and returns the
    /// number of payload bytes written.
    pub fn receive(&mut self, buf: &mut [u8]) -> usize {
        let Some(room) = buf.len().checked_sub(1) else {
            return 0;
        };
        let len = room.min(RECEIVE_PAYLOAD.len());
        buf[..len].copy_from_slice(&RECEIVE_PAYLOAD[..len]);
        buf[len] = 0;
        tracing::debug!(data = %String::from_utf8_lossy(&buf[..len]), "receive");
        len
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn into_board(self) -> B {
        self.board
    }
}

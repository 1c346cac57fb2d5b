//! Link bring-up sequencing and the (reduced) LTSSM.
//!
//! Bring-up is a strictly ordered walk:
//!
//! `Reset -> ClockLocked -> PerstDeasserted -> FirmwareLoaded -> CrParaWritten -> HeaderInit ->
//! SpeedWidthSet -> Trained -> LinkUp`
//!
//! Every step except header init reports a fixed status code to the board's PCI register.

use std::fmt;

use crate::board::{
    BoardRegisterWrite, BOARD_REG_PCI, PCI_STATUS_CLOCK_LOCKED, PCI_STATUS_CR_PARA_WRITTEN,
    PCI_STATUS_FIRMWARE_LOADED, PCI_STATUS_LINK_TRAINED, PCI_STATUS_LINK_UP,
    PCI_STATUS_PERST_DEASSERTED, PCI_STATUS_SPEED_WIDTH_SET,
};
use crate::error::{PcieError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LinkSpeed {
    Gen1 = 1,
    Gen2,
    Gen3,
    Gen4,
    Gen5,
    Gen6,
    Gen7,
}

impl LinkSpeed {
    pub const fn generation(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for LinkSpeed {
    type Error = PcieError;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            1 => Self::Gen1,
            2 => Self::Gen2,
            3 => Self::Gen3,
            4 => Self::Gen4,
            5 => Self::Gen5,
            6 => Self::Gen6,
            7 => Self::Gen7,
            _ => return Err(PcieError::InvalidLinkSpeed(value)),
        })
    }
}

impl fmt::Display for LinkSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gen{}", self.generation())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LaneWidth {
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
    X16 = 16,
    X32 = 32,
}

impl LaneWidth {
    pub const fn lanes(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for LaneWidth {
    type Error = PcieError;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            1 => Self::X1,
            2 => Self::X2,
            4 => Self::X4,
            8 => Self::X8,
            16 => Self::X16,
            32 => Self::X32,
            _ => return Err(PcieError::InvalidLaneWidth(value)),
        })
    }
}

impl fmt::Display for LaneWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.lanes())
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum LtssmState {
    #[default]
    Reset,
    Training,
    L0,
}

/// Flags recorded as bring-up progresses.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LinkState {
    pub pll_locked: bool,
    pub perst_deasserted: bool,
    pub fw_loaded: bool,
    pub cr_para_written: bool,
    pub ltssm: LtssmState,
    pub link_up: bool,
}

/// Position in the bring-up sequence (the last completed step).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BringUpPhase {
    #[default]
    Reset,
    ClockLocked,
    PerstDeasserted,
    FirmwareLoaded,
    CrParaWritten,
    HeaderInit,
    SpeedWidthSet,
    Trained,
    LinkUp,
}

/// One bring-up action.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BringUpStep {
    ClockPllInit,
    PerstDeassert,
    FirmwareLoad,
    CrParaWrite,
    HeaderInit,
    SetSpeedWidth { speed: LinkSpeed, width: LaneWidth },
    LinkTraining,
    LinkUp,
}

impl BringUpStep {
    /// Phase reached once this step has completed.
    pub fn phase(self) -> BringUpPhase {
        match self {
            Self::ClockPllInit => BringUpPhase::ClockLocked,
            Self::PerstDeassert => BringUpPhase::PerstDeasserted,
            Self::FirmwareLoad => BringUpPhase::FirmwareLoaded,
            Self::CrParaWrite => BringUpPhase::CrParaWritten,
            Self::HeaderInit => BringUpPhase::HeaderInit,
            Self::SetSpeedWidth { .. } => BringUpPhase::SpeedWidthSet,
            Self::LinkTraining => BringUpPhase::Trained,
            Self::LinkUp => BringUpPhase::LinkUp,
        }
    }

    /// Code written to the board's PCI register when the step runs.
    pub fn status_code(self) -> Option<u32> {
        match self {
            Self::ClockPllInit => Some(PCI_STATUS_CLOCK_LOCKED),
            Self::PerstDeassert => Some(PCI_STATUS_PERST_DEASSERTED),
            Self::FirmwareLoad => Some(PCI_STATUS_FIRMWARE_LOADED),
            Self::CrParaWrite => Some(PCI_STATUS_CR_PARA_WRITTEN),
            Self::HeaderInit => None,
            Self::SetSpeedWidth { .. } => Some(PCI_STATUS_SPEED_WIDTH_SET),
            Self::LinkTraining => Some(PCI_STATUS_LINK_TRAINED),
            Self::LinkUp => Some(PCI_STATUS_LINK_UP),
        }
    }
}

/// Whether [`LinkController::advance`] moved the sequence forward or re-ran a completed step.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepOutcome {
    Advanced,
    Repeated,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LinkController {
    state: LinkState,
    phase: BringUpPhase,
    negotiated: Option<(LinkSpeed, LaneWidth)>,
}

impl LinkController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn phase(&self) -> BringUpPhase {
        self.phase
    }

    pub fn is_link_up(&self) -> bool {
        self.state.link_up
    }

    /// Speed and width recorded by the last `SetSpeedWidth` step.
    pub fn negotiated(&self) -> Option<(LinkSpeed, LaneWidth)> {
        self.negotiated
    }

    /// Phase the next in-order step would reach, if any.
    pub fn next_phase(&self) -> Option<BringUpPhase> {
        use BringUpPhase::*;
        Some(match self.phase {
            Reset => ClockLocked,
            ClockLocked => PerstDeasserted,
            PerstDeasserted => FirmwareLoaded,
            FirmwareLoaded => CrParaWritten,
            CrParaWritten => HeaderInit,
            HeaderInit => SpeedWidthSet,
            SpeedWidthSet => Trained,
            Trained => LinkUp,
            LinkUp => return None,
        })
    }

    /// Runs one bring-up step.
    ///
    /// The step must be either the next one in sequence or one that already completed; a
    /// completed step leaves the flags as they are but reports its status code again. Skipping
    /// ahead is rejected without touching any state.
    pub fn advance<B: BoardRegisterWrite + ?Sized>(
        &mut self,
        step: BringUpStep,
        board: &mut B,
    ) -> Result<StepOutcome> {
        let target = step.phase();
        let outcome = if target <= self.phase {
            StepOutcome::Repeated
        } else if Some(target) == self.next_phase() {
            StepOutcome::Advanced
        } else {
            tracing::warn!(?step, phase = ?self.phase, "bring-up step out of order");
            return Err(PcieError::OutOfOrder {
                phase: self.phase,
                requested: step,
            });
        };

        match step {
            BringUpStep::ClockPllInit => {
                self.state.pll_locked = true;
                tracing::info!("clock/PLL initialized and locked");
            }
            BringUpStep::PerstDeassert => {
                self.state.perst_deasserted = true;
                tracing::info!("PERST# deasserted");
            }
            BringUpStep::FirmwareLoad => {
                self.state.fw_loaded = true;
                tracing::info!("firmware loaded");
            }
            BringUpStep::CrParaWrite => {
                self.state.cr_para_written = true;
                tracing::info!("CR_PARA AXI config written");
            }
            BringUpStep::HeaderInit => {}
            BringUpStep::SetSpeedWidth { speed, width } => {
                if outcome == StepOutcome::Advanced {
                    self.negotiated = Some((speed, width));
                    tracing::info!(%speed, %width, "link speed and width set");
                } else if let Some((speed, width)) = self.negotiated {
                    tracing::info!(%speed, %width, "link speed and width already set");
                }
            }
            BringUpStep::LinkTraining => {
                // Training always succeeds; both sub-phases happen synchronously.
                self.state.ltssm = LtssmState::Training;
                tracing::info!("link training (LTSSM)");
                self.state.ltssm = LtssmState::L0;
                tracing::info!("LTSSM state: L0");
            }
            BringUpStep::LinkUp => {
                self.state.link_up = true;
                tracing::info!("link up");
            }
        }

        if let Some(code) = step.status_code() {
            board.write_reg(BOARD_REG_PCI, code);
        }
        if outcome == StepOutcome::Advanced {
            self.phase = target;
        }
        Ok(outcome)
    }
}

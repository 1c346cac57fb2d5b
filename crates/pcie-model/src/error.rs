use std::fmt;

use thiserror::Error;

use crate::link::{BringUpPhase, BringUpStep};

pub type Result<T> = std::result::Result<T, PcieError>;

/// Indexed resource named by an [`PcieError::OutOfRange`] rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    ConfigRegister,
    Bar,
    AtuRegion,
    MsiVector,
    MsixVector,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConfigRegister => "config register",
            Self::Bar => "BAR",
            Self::AtuRegion => "ATU region",
            Self::MsiVector => "MSI vector",
            Self::MsixVector => "MSI-X vector",
        })
    }
}

/// Fixed-capacity table named by a [`PcieError::TableFull`] rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Capability,
    InterruptRegistration,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Capability => "capability",
            Self::InterruptRegistration => "interrupt registration",
        })
    }
}

/// Rejections reported by the device model.
///
/// None of these are fatal: the operation that produced the error did not touch any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PcieError {
    #[error("{resource} index {index} out of range (limit {limit})")]
    OutOfRange {
        resource: Resource,
        index: i64,
        limit: usize,
    },

    #[error("{0} table full")]
    TableFull(Table),

    #[error("invalid capability id {0:#04x} (id 0 marks a free slot)")]
    InvalidCapabilityId(u8),

    #[error("invalid link speed Gen{0} (expected Gen1..=Gen7)")]
    InvalidLinkSpeed(u32),

    #[error("invalid lane width x{0} (expected x1, x2, x4, x8, x16 or x32)")]
    InvalidLaneWidth(u32),

    #[error("device is not powered on")]
    NotPoweredOn,

    #[error("bring-up step {requested:?} requested while link is in phase {phase:?}")]
    OutOfOrder {
        phase: BringUpPhase,
        requested: BringUpStep,
    },
}

impl PcieError {
    pub(crate) fn index_out_of_range(resource: Resource, index: usize, limit: usize) -> Self {
        Self::OutOfRange {
            resource,
            index: i64::try_from(index).unwrap_or(i64::MAX),
            limit,
        }
    }

    pub(crate) fn vector_out_of_range(resource: Resource, vector: i32, limit: usize) -> Self {
        Self::OutOfRange {
            resource,
            index: i64::from(vector),
            limit,
        }
    }
}

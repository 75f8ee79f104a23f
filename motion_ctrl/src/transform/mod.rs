//! # Coordinate Transformations
//!
//! Transformations map between chip space and stage space once built from user-supplied
//! coordinate pairings. Two variants exist:
//!
//! - [`SinglePointFixation`] - a constant offset pinned at one pairing. Quick to set up,
//!   accurate near the fixed point only.
//! - [`KabschRotation`] - a rigid-body registration fitted over many pairings with the Kabsch
//!   least-squares algorithm. Handles stages mounted at an angle to the chip.
//!
//! All variants are stateless after construction.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod kabsch;
mod single_point;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use kabsch::{KabschRotation, MIN_PAIRINGS_2D, MIN_PAIRINGS_3D};
pub use single_point::SinglePointFixation;

use crate::coords::{ChipCoordinate, StageCoordinate};
use std::fmt;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors raised when constructing a transformation.
#[derive(Debug, thiserror::Error)]
pub enum TransformationError {
    #[error("Expected equally many chip and stage coordinates, got {chip} and {stage}")]
    PairingMismatch { chip: usize, stage: usize },

    #[error("At least {required} coordinate pairings are required, got {actual}")]
    InsufficientPairings { required: usize, actual: usize },
}

/// A fixed mapping between chip space and stage space.
#[derive(Debug, Clone)]
pub enum Transformation {
    SinglePoint(SinglePointFixation),
    Kabsch(KabschRotation),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Transformation {
    /// Transform a coordinate in chip space to stage space.
    pub fn chip_to_stage(&self, chip_coordinate: &ChipCoordinate) -> StageCoordinate {
        match self {
            Transformation::SinglePoint(t) => t.chip_to_stage(chip_coordinate),
            Transformation::Kabsch(t) => t.chip_to_stage(chip_coordinate),
        }
    }

    /// Transform a coordinate in stage space to chip space.
    pub fn stage_to_chip(&self, stage_coordinate: &StageCoordinate) -> ChipCoordinate {
        match self {
            Transformation::SinglePoint(t) => t.stage_to_chip(stage_coordinate),
            Transformation::Kabsch(t) => t.stage_to_chip(stage_coordinate),
        }
    }

    /// Root-mean-square residual distance between the transformed chip points and their paired
    /// stage points, in micrometres. A measure of fit quality for display to the operator.
    pub fn mean_error(&self) -> f64 {
        match self {
            Transformation::SinglePoint(t) => t.mean_error(),
            Transformation::Kabsch(t) => t.mean_error(),
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transformation::SinglePoint(t) => write!(f, "{}", t),
            Transformation::Kabsch(t) => write!(f, "{}", t),
        }
    }
}

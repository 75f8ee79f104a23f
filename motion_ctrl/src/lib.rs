//! # Motion Control Library
//!
//! This library implements the positioning calibration engine for the probe station: it
//! establishes a mapping between the abstract chip coordinate frame and the physical coordinate
//! frames of one-to-many motorised stages, so that the control application can move a stage to a
//! location expressed in chip coordinates.
//!
//! The workflow runs bottom up:
//!
//! 1. Stages are registered with the [`mover::Mover`], one per orientation around the chip,
//!    yielding a [`calibration::Calibration`] each.
//! 2. Each calibration is connected and given an [`axes::AxesMapping`] fixing the stage's
//!    coordinate system (deriving a signed permutation rotation matrix).
//! 3. Coordinate pairings are collected and turned into a [`transform::Transformation`] (single
//!    point offset, or a least-squares Kabsch rotation), after which the calibration converts
//!    freely between chip and stage space.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod axes;
pub mod calibration;
pub mod coords;
pub mod mover;
pub mod params;
pub mod transform;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use axes::{AxesMapping, Axis, Direction};
pub use calibration::{Calibration, CalibrationError, DevicePosition, Orientation, State};
pub use coords::{ChipCoordinate, StageCoordinate};
pub use mover::{Mover, MoverError};
pub use transform::{KabschRotation, SinglePointFixation, Transformation, TransformationError};

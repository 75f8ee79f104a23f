//! # Stage Calibration
//!
//! This module implements the [`Calibration`] state machine. One calibration exists per
//! registered stage and walks through the following states, never moving backwards except on a
//! failed connection attempt:
//!
//! - `Uninitialized` - No connection to the stage has been established.
//! - `Connected` - The connection is open, the stage can be moved in its own frame.
//! - `CoordinateSystemFixed` - An axes mapping has been applied, chip-frame relative moves work.
//! - `SinglePointFixed` - A single point transformation is fixed, absolute conversions work
//!   with offset accuracy.
//! - `FullyCalibrated` - A full (Kabsch) transformation is fixed.
//!
//! A failed connection attempt resets the calibration to `Uninitialized`: the axes mapping and
//! transformations are meaningless without a live stage behind them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;

// Internal
use crate::axes::{AxesMapping, Axis};
use crate::coords::{ChipCoordinate, StageCoordinate};
use crate::transform::{KabschRotation, SinglePointFixation, Transformation};
use stage_if::{Stage, StageError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Time given to the operator to observe a wiggle motion before the stage moves back.
pub const WIGGLE_PAUSE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The physical slot a stage occupies around the chip.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum Orientation {
    Left,
    Right,
    Top,
    Bottom,
}

/// Whether a stage couples to a device's input or output port.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum DevicePosition {
    Input,
    Output,
}

/// Calibration progress states, ordered from no progress to fully calibrated.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Ord, PartialOrd, Copy, Clone)]
pub enum State {
    Uninitialized,
    Connected,
    CoordinateSystemFixed,
    SinglePointFixed,
    FullyCalibrated,
}

/// Possible errors that can occur during calibration operation.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("The given axes mapping is invalid")]
    InvalidAxesMapping,

    #[error("Failed to connect to stage: {0}")]
    Connection(StageError),

    #[error("No transformation has been fixed for this calibration")]
    NoTransformation,

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Calibration state of a single stage.
///
/// Owns the stage handle, the stage's role around the chip (orientation and device position),
/// the axes mapping with its derived rotation matrix, and the transformations once fixed.
pub struct Calibration {
    stage: Box<dyn Stage>,

    orientation: Orientation,
    device_position: DevicePosition,
    state: State,

    axes_mapping: AxesMapping,
    rotation_matrix: Matrix3<f64>,

    single_point_transformation: Option<Transformation>,
    full_transformation: Option<Transformation>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Calibration {
    /// Create a new calibration for a stage at the given slot.
    ///
    /// The coordinate system starts at the identity mapping (each chip axis to its same-named
    /// stage axis, positive direction).
    pub fn new(
        stage: Box<dyn Stage>,
        orientation: Orientation,
        device_position: DevicePosition,
    ) -> Self {
        let state = if stage.is_connected() {
            State::Connected
        } else {
            State::Uninitialized
        };

        let axes_mapping = AxesMapping::identity();
        let rotation_matrix = axes_mapping.matrix();

        Self {
            stage,
            orientation,
            device_position,
            state,
            axes_mapping,
            rotation_matrix,
            single_point_transformation: None,
            full_transformation: None,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn device_position(&self) -> DevicePosition {
        self.device_position
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_input_stage(&self) -> bool {
        self.device_position == DevicePosition::Input
    }

    pub fn stage(&self) -> &dyn Stage {
        self.stage.as_ref()
    }

    pub fn stage_mut(&mut self) -> &mut dyn Stage {
        self.stage.as_mut()
    }

    pub fn axes_mapping(&self) -> &AxesMapping {
        &self.axes_mapping
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation_matrix
    }

    /// A short label for status displays, e.g. `Left stage (Input)`.
    pub fn short_label(&self) -> String {
        format!("{} stage ({})", self.orientation, self.device_position)
    }

    /// Attempt to open the connection to the underlying stage.
    ///
    /// On success the state advances to at least [`State::Connected`], previously reached
    /// higher states are kept. On failure the state resets to [`State::Uninitialized`] and the
    /// underlying error is surfaced to the caller.
    pub fn connect(&mut self) -> Result<(), CalibrationError> {
        match self.stage.connect() {
            Ok(()) => {
                self.advance_state(State::Connected);
                info!("{} connected", self);
                Ok(())
            }
            Err(e) => {
                // Losing the stage invalidates all downstream calibration progress
                self.state = State::Uninitialized;
                Err(CalibrationError::Connection(e))
            }
        }
    }

    /// Fix the stage's coordinate system with the given axes mapping.
    ///
    /// The mapping is validated first; an invalid mapping is rejected without touching the
    /// previously stored mapping, matrix or state. On success the state advances to at least
    /// [`State::CoordinateSystemFixed`].
    pub fn fix_coordinate_system(
        &mut self,
        axes_mapping: AxesMapping,
    ) -> Result<(), CalibrationError> {
        if !axes_mapping.is_valid() {
            return Err(CalibrationError::InvalidAxesMapping);
        }

        self.rotation_matrix = axes_mapping.matrix();
        self.axes_mapping = axes_mapping;
        self.advance_state(State::CoordinateSystemFixed);

        info!("{} coordinate system fixed", self);
        Ok(())
    }

    /// Reset the coordinate system to the identity mapping.
    pub fn set_coordinate_system_to_default(&mut self) {
        self.axes_mapping = AxesMapping::identity();
        self.rotation_matrix = self.axes_mapping.matrix();
    }

    /// Fix a single point transformation. Advances the state to at least
    /// [`State::SinglePointFixed`].
    pub fn fix_single_point(&mut self, transformation: SinglePointFixation) {
        info!("{} single point fixed: {}", self, transformation);
        self.single_point_transformation = Some(Transformation::SinglePoint(transformation));
        self.advance_state(State::SinglePointFixed);
    }

    /// Fix a full transformation. Advances the state to at least [`State::FullyCalibrated`].
    pub fn fix_full_transformation(&mut self, transformation: KabschRotation) {
        info!("{} fully calibrated: {}", self, transformation);
        self.full_transformation = Some(Transformation::Kabsch(transformation));
        self.advance_state(State::FullyCalibrated);
    }

    /// The transformation conversions are currently delegated to.
    ///
    /// The full transformation takes precedence over the single point transformation when both
    /// are fixed, since it is accurate over the whole chip rather than near one point.
    pub fn active_transformation(&self) -> Option<&Transformation> {
        self.full_transformation
            .as_ref()
            .or_else(|| self.single_point_transformation.as_ref())
    }

    /// Convert a chip coordinate to this stage's frame through the active transformation.
    pub fn chip_to_stage(
        &self,
        chip_coordinate: &ChipCoordinate,
    ) -> Result<StageCoordinate, CalibrationError> {
        self.active_transformation()
            .map(|t| t.chip_to_stage(chip_coordinate))
            .ok_or(CalibrationError::NoTransformation)
    }

    /// Convert a coordinate in this stage's frame to chip space through the active
    /// transformation.
    pub fn stage_to_chip(
        &self,
        stage_coordinate: &StageCoordinate,
    ) -> Result<ChipCoordinate, CalibrationError> {
        self.active_transformation()
            .map(|t| t.stage_to_chip(stage_coordinate))
            .ok_or(CalibrationError::NoTransformation)
    }

    /// The stage's current position expressed in chip coordinates.
    pub fn current_chip_position(&self) -> Result<ChipCoordinate, CalibrationError> {
        let position = self.stage.get_current_position()?;
        self.stage_to_chip(&StageCoordinate::from(position))
    }

    /// Move the stage relative to its current position, with the offset given in the chip
    /// frame and rotated through the fixed coordinate system.
    pub fn move_relative(
        &mut self,
        x_um: f64,
        y_um: f64,
        z_um: f64,
    ) -> Result<(), CalibrationError> {
        let stage_offset = self.rotation_matrix * Vector3::new(x_um, y_um, z_um);

        debug!(
            "{} relative move: chip ({}, {}, {}) um -> stage ({:.3}, {:.3}, {:.3}) um",
            self, x_um, y_um, z_um, stage_offset.x, stage_offset.y, stage_offset.z
        );

        self.stage
            .move_relative(stage_offset.x, stage_offset.y, stage_offset.z)?;
        Ok(())
    }

    /// Wiggle a chip axis so the operator can confirm an axes mapping visually.
    ///
    /// The stage moves `wiggle_distance_um` along `axis` rotated through the given matrix,
    /// pauses for [`WIGGLE_PAUSE`], then moves back. The stage speed is overridden with
    /// `wiggle_speed_umps` for the duration and restored afterwards. Passing a candidate matrix
    /// rather than using the stored one lets the operator test a mapping before fixing it.
    ///
    /// Stage errors propagate unmodified; no retry is attempted since the operator is watching
    /// the hardware.
    pub fn wiggle_axis(
        &mut self,
        axis: Axis,
        rotation: Matrix3<f64>,
        wiggle_distance_um: f64,
        wiggle_speed_umps: f64,
    ) -> Result<(), CalibrationError> {
        let current_speed_xy = self.stage.get_speed_xy()?;
        let current_speed_z = self.stage.get_speed_z()?;

        self.stage.set_speed_xy(wiggle_speed_umps)?;
        self.stage.set_speed_z(wiggle_speed_umps)?;

        let mut chip_offset = Vector3::zeros();
        chip_offset[axis.index()] = wiggle_distance_um;
        let stage_offset = rotation * chip_offset;

        info!("Wiggling {} of {}", axis, self);

        self.stage
            .move_relative(stage_offset.x, stage_offset.y, stage_offset.z)?;

        // Give the operator time to observe the motion
        thread::sleep(WIGGLE_PAUSE);

        self.stage
            .move_relative(-stage_offset.x, -stage_offset.y, -stage_offset.z)?;

        self.stage.set_speed_xy(current_speed_xy)?;
        self.stage.set_speed_z(current_speed_z)?;

        Ok(())
    }

    /// Advance the state, never moving backwards.
    fn advance_state(&mut self, at_least: State) {
        self.state = self.state.max(at_least);
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage ({})", self.orientation, self.stage.id())
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Left => write!(f, "Left"),
            Orientation::Right => write!(f, "Right"),
            Orientation::Top => write!(f, "Top"),
            Orientation::Bottom => write!(f, "Bottom"),
        }
    }
}

impl fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePosition::Input => write!(f, "Input"),
            DevicePosition::Output => write!(f, "Output"),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Uninitialized => write!(f, "Uninitialized"),
            State::Connected => write!(f, "Connected"),
            State::CoordinateSystemFixed => write!(f, "Coordinate system fixed"),
            State::SinglePointFixed => write!(f, "Single point fixed"),
            State::FullyCalibrated => write!(f, "Fully calibrated"),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

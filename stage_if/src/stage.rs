//! # Stage Capability Interface
//!
//! This module provides a unified control interface which can abstract over different types of
//! motorised positioning stage. All calls are synchronous and blocking; drivers which talk to
//! hardware over a bus are expected to complete (or fail) the bus transaction before returning.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A position in a stage's native coordinate frame.
///
/// Units: micrometres
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct StagePosition {
    pub x_um: f64,
    pub y_um: f64,
    pub z_um: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors raised by a stage driver.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Could not connect to stage {0}")]
    ConnectionFailed(String),

    #[error("The stage is not connected")]
    NotConnected,

    #[error("Stage driver error: {0}")]
    Driver(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing motorised positioning stages.
///
/// All coordinates and distances are in the stage's native axis frame and in micrometres, speeds
/// are in micrometres per second and accelerations in micrometres per second squared.
pub trait Stage {
    /// The unique hardware identifier of this stage (bus address or serial number).
    ///
    /// Two `Stage` handles with the same id refer to the same physical device.
    fn id(&self) -> &str;

    /// Open the connection to the stage.
    ///
    /// Connecting an already connected stage is a no-op and succeeds.
    fn connect(&mut self) -> Result<(), StageError>;

    /// Close the connection to the stage.
    fn disconnect(&mut self) -> Result<(), StageError>;

    /// True if the connection to the stage is currently open.
    fn is_connected(&self) -> bool;

    /// Get the current speed of the xy axis pair.
    fn get_speed_xy(&self) -> Result<f64, StageError>;

    /// Set the speed of the xy axis pair.
    fn set_speed_xy(&mut self, umps: f64) -> Result<(), StageError>;

    /// Get the current speed of the z axis.
    fn get_speed_z(&self) -> Result<f64, StageError>;

    /// Set the speed of the z axis.
    fn set_speed_z(&mut self, umps: f64) -> Result<(), StageError>;

    /// Get the current acceleration of the xy axis pair.
    fn get_acceleration_xy(&self) -> Result<f64, StageError>;

    /// Set the acceleration of the xy axis pair.
    fn set_acceleration_xy(&mut self, umps2: f64) -> Result<(), StageError>;

    /// Get the current position of the stage in its native frame.
    fn get_current_position(&self) -> Result<StagePosition, StageError>;

    /// Move the stage relative to its current position.
    ///
    /// ## Arguments
    /// - `x_um`, `y_um`, `z_um` - The requested offsets along the stage's native axes.
    fn move_relative(&mut self, x_um: f64, y_um: f64, z_um: f64) -> Result<(), StageError>;
}

//! # Mover Parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Default shared motion parameters applied to a new [`crate::mover::Mover`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MoverParams {
    /// Default xy speed applied to connected stages.
    ///
    /// Units: micrometres/second
    pub default_speed_xy_umps: f64,

    /// Default z speed applied to connected stages.
    ///
    /// Units: micrometres/second
    pub default_speed_z_umps: f64,

    /// Default xy acceleration applied to connected stages.
    ///
    /// Units: micrometres/second^2
    pub default_acceleration_xy_umps2: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MoverParams {
    fn default() -> Self {
        Self {
            default_speed_xy_umps: crate::mover::Mover::DEFAULT_SPEED_XY_UMPS,
            default_speed_z_umps: crate::mover::Mover::DEFAULT_SPEED_Z_UMPS,
            default_acceleration_xy_umps2: crate::mover::Mover::DEFAULT_ACCELERATION_XY_UMPS2,
        }
    }
}

//! # Motion Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use motion_ctrl::params::MoverParams;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MotionExecParams {
    /// Addresses of the simulated stages to register, in registration order
    pub stage_addresses: Vec<String>,

    /// Distance of the axis confirmation wiggle
    ///
    /// Units: micrometres
    pub wiggle_distance_um: f64,

    /// Speed override during the axis confirmation wiggle
    ///
    /// Units: micrometres/second
    pub wiggle_speed_umps: f64,

    /// Default shared motion parameters for the mover
    pub mover: MoverParams,
}

//! # Motion Control Executable
//!
//! This executable wires the motion control core together against simulated stages and walks
//! through the full calibration workflow:
//! - Register one stage per orientation slot
//! - Connect the stages and push the shared motion parameters
//! - Fix each stage's coordinate system and confirm it with a wiggle
//! - Fix a single point transformation, then a full Kabsch transformation
//! - Convert between chip and stage coordinates
//!
//! The interactive calibration wizard drives the same library calls when real hardware is
//! attached.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Parameters for the motion executable.
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::info;

// Internal
use motion_ctrl::{
    AxesMapping, Axis, ChipCoordinate, DevicePosition, Direction, KabschRotation, Mover,
    Orientation, SinglePointFixation, StageCoordinate,
};
use params::MotionExecParams;
use stage_if::dummy::DummyStage;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Orientation slots filled in registration order.
const SLOTS: [(Orientation, DevicePosition); 4] = [
    (Orientation::Left, DevicePosition::Input),
    (Orientation::Right, DevicePosition::Output),
    (Orientation::Top, DevicePosition::Input),
    (Orientation::Bottom, DevicePosition::Output),
];

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("motion_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Motion Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: MotionExecParams = util::params::load("motion_exec.toml")?;

    info!("Parameters loaded");

    // ---- STAGE REGISTRATION ----

    let mut mover = Mover::with_params(params.mover.clone());

    for (address, (orientation, position)) in params.stage_addresses.iter().zip(SLOTS.iter()) {
        let stage = DummyStage::new(address);
        mover
            .add_stage_calibration(Box::new(stage), *orientation, *position)
            .wrap_err("Failed to register stage")?;
    }

    info!("{} stages registered", mover.calibrations().count());

    // ---- CONNECTION ----

    // The slots actually filled, in registration order
    let orientations: Vec<Orientation> = SLOTS
        .iter()
        .take(params.stage_addresses.len())
        .map(|(orientation, _)| *orientation)
        .collect();

    for orientation in &orientations {
        let calibration = mover
            .calibration_mut(*orientation)
            .expect("calibration was registered above");
        calibration
            .connect()
            .wrap_err("Failed to connect to stage")?;
    }

    // Reading the shared settings pushes the configured defaults out to any stage that differs
    let speed_xy = mover.speed_xy()?;
    let speed_z = mover.speed_z()?;
    let acceleration_xy = mover.acceleration_xy()?;
    info!(
        "Shared settings: xy speed {} um/s, z speed {} um/s, xy acceleration {} um/s^2",
        speed_xy, speed_z, acceleration_xy
    );

    // ---- CALIBRATION ----

    let first_orientation = *orientations
        .first()
        .ok_or_else(|| eyre!("No stages configured, nothing to calibrate"))?;
    let calibration = mover
        .calibration_mut(first_orientation)
        .expect("calibration was registered above");

    // This stage is mounted rotated by 90 degrees: chip x runs along stage y
    let mut mapping = AxesMapping::identity();
    mapping.assign(Axis::X, Direction::Positive, Axis::Y);
    mapping.assign(Axis::Y, Direction::Negative, Axis::X);

    // Let the operator confirm the candidate mapping before fixing it
    calibration
        .wiggle_axis(
            Axis::X,
            mapping.matrix(),
            params.wiggle_distance_um,
            params.wiggle_speed_umps,
        )
        .wrap_err("Axis wiggle failed")?;

    calibration
        .fix_coordinate_system(mapping)
        .wrap_err("Failed to fix the coordinate system")?;

    // Single point fixation: the operator landed the probe on the chip origin
    calibration.fix_single_point(SinglePointFixation::new(
        ChipCoordinate::new(0.0, 0.0, 0.0),
        StageCoordinate::new(1500.0, -800.0, 20.0),
    ));

    // Full transformation from three pairings across the chip
    let chip_points = [
        ChipCoordinate::new(0.0, 0.0, 0.0),
        ChipCoordinate::new(5000.0, 0.0, 0.0),
        ChipCoordinate::new(0.0, 3000.0, 0.0),
    ];
    let stage_points = [
        StageCoordinate::new(1500.0, -800.0, 20.0),
        StageCoordinate::new(1500.0, 4200.0, 20.0),
        StageCoordinate::new(-1500.0, -800.0, 20.0),
    ];
    let kabsch = KabschRotation::new(&chip_points, &stage_points, true)
        .wrap_err("Failed to fit the full transformation")?;
    info!("Fitted transformation: {}", kabsch);

    calibration.fix_full_transformation(kabsch);

    info!("Calibration complete: {}", calibration.short_label());

    // ---- COORDINATE CONVERSION ----

    let calibration = mover
        .calibration(first_orientation)
        .expect("calibration was registered above");

    let target = ChipCoordinate::new(2500.0, 1500.0, 0.0);
    let stage_target = calibration.chip_to_stage(&target)?;
    info!("{} -> {}", target, stage_target);

    let chip_position = calibration.current_chip_position()?;
    info!("Stage currently at {}", chip_position);

    info!("Mover state: {}", mover.state());

    Ok(())
}

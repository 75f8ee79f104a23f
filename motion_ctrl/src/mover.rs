//! # Mover module
//!
//! The [`Mover`] owns the full set of stage calibrations, one per orientation around the chip,
//! and the motion parameters shared by all of them. Registration enforces that no orientation
//! and no physical stage is assigned twice; shared speed and acceleration settings fan out to
//! every connected stage.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use std::collections::HashMap;

// Internal
use crate::calibration::{Calibration, DevicePosition, Orientation, State};
use crate::params::MoverParams;
use stage_if::{Stage, StageError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during mover operation.
#[derive(Debug, thiserror::Error)]
pub enum MoverError {
    #[error("Orientation {0} has already been assigned to a stage")]
    OrientationInUse(Orientation),

    #[error("Stage {0} has already been assigned")]
    StageInUse(String),

    #[error("{0} requires at least one connected stage, connect the stages first")]
    NoConnectedStages(&'static str),

    #[error("{name} of {value} is outside the valid range [{lower}, {upper}]")]
    ValueOutOfRange {
        name: &'static str,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Setting {setting} for stage {stage} failed: {source}")]
    SettingRejected {
        setting: &'static str,
        stage: String,
        source: StageError,
    },

    #[error("Querying {setting} from stage {stage} failed: {source}")]
    SettingQueryFailed {
        setting: &'static str,
        stage: String,
        source: StageError,
    },
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Registry of stage calibrations and shared motion parameters.
pub struct Mover {
    params: MoverParams,

    calibrations: HashMap<Orientation, Calibration>,

    speed_xy_umps: f64,
    speed_z_umps: f64,
    acceleration_xy_umps2: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Mover {
    // Range constants, see the stage controller guide for details. Both ranges are inclusive,
    // e.g. speed in [SPEED_LOWER_BOUND_UMPS, SPEED_UPPER_BOUND_UMPS].
    pub const SPEED_LOWER_BOUND_UMPS: f64 = 0.0;
    pub const SPEED_UPPER_BOUND_UMPS: f64 = 1e5;

    pub const ACCELERATION_LOWER_BOUND_UMPS2: f64 = 0.0;
    pub const ACCELERATION_UPPER_BOUND_UMPS2: f64 = 1e7;

    // Reasonable default values
    pub const DEFAULT_SPEED_XY_UMPS: f64 = 200.0;
    pub const DEFAULT_SPEED_Z_UMPS: f64 = 20.0;
    pub const DEFAULT_ACCELERATION_XY_UMPS2: f64 = 0.0;

    /// Create a new mover with the built-in default motion parameters.
    pub fn new() -> Self {
        Self::with_params(MoverParams::default())
    }

    /// Create a new mover with configured default motion parameters.
    pub fn with_params(params: MoverParams) -> Self {
        let speed_xy_umps = params.default_speed_xy_umps;
        let speed_z_umps = params.default_speed_z_umps;
        let acceleration_xy_umps2 = params.default_acceleration_xy_umps2;

        Self {
            params,
            calibrations: HashMap::new(),
            speed_xy_umps,
            speed_z_umps,
            acceleration_xy_umps2,
        }
    }

    /// Create a new calibration for a stage at the given slot and register it.
    ///
    /// Fails without modifying the registry if the orientation is already assigned or if the
    /// physical stage (identified by [`Stage::id`]) already holds a role. Device positions are
    /// not exclusive on their own: two input stages at different orientations are legal, the
    /// (orientation, position) pair is unique because the orientation is.
    pub fn add_stage_calibration(
        &mut self,
        stage: Box<dyn Stage>,
        orientation: Orientation,
        position: DevicePosition,
    ) -> Result<&mut Calibration, MoverError> {
        if self.calibrations.contains_key(&orientation) {
            return Err(MoverError::OrientationInUse(orientation));
        }

        if self
            .calibrations
            .values()
            .any(|c| c.stage().id() == stage.id())
        {
            return Err(MoverError::StageInUse(stage.id().to_string()));
        }

        // All conflict checks passed, the registry is only mutated from here on
        info!(
            "Registering stage {} as {} / {}",
            stage.id(),
            orientation,
            position
        );

        Ok(self
            .calibrations
            .entry(orientation)
            .or_insert_with(|| Calibration::new(stage, orientation, position)))
    }

    /// The calibration registered at an orientation, if any.
    pub fn calibration(&self, orientation: Orientation) -> Option<&Calibration> {
        self.calibrations.get(&orientation)
    }

    pub fn calibration_mut(&mut self, orientation: Orientation) -> Option<&mut Calibration> {
        self.calibrations.get_mut(&orientation)
    }

    /// All registered calibrations, in no particular order.
    pub fn calibrations(&self) -> impl Iterator<Item = &Calibration> {
        self.calibrations.values()
    }

    /// All calibrations coupling to the given device position.
    pub fn calibrations_at_position(
        &self,
        position: DevicePosition,
    ) -> impl Iterator<Item = &Calibration> {
        self.calibrations
            .values()
            .filter(move |c| c.device_position() == position)
    }

    /// The aggregate calibration state: the least-progressed state over all calibrations, or
    /// `Uninitialized` when no stage is registered.
    pub fn state(&self) -> State {
        self.calibrations
            .values()
            .map(|c| c.state())
            .min()
            .unwrap_or(State::Uninitialized)
    }

    /// All stages with a calibration.
    pub fn active_stages(&self) -> Vec<&dyn Stage> {
        self.calibrations.values().map(|c| c.stage()).collect()
    }

    /// All stages with a calibration whose connection is currently open.
    pub fn connected_stages(&self) -> Vec<&dyn Stage> {
        self.calibrations
            .values()
            .map(|c| c.stage())
            .filter(|s| s.is_connected())
            .collect()
    }

    pub fn has_connected_stages(&self) -> bool {
        !self.connected_stages().is_empty()
    }

    /// Drop all calibrations and restore the default shared settings.
    pub fn reset(&mut self) {
        info!("Resetting mover, dropping {} calibrations", self.calibrations.len());

        self.calibrations.clear();
        self.speed_xy_umps = self.params.default_speed_xy_umps;
        self.speed_z_umps = self.params.default_speed_z_umps;
        self.acceleration_xy_umps2 = self.params.default_acceleration_xy_umps2;
    }

    /// Set the xy speed of every connected stage.
    ///
    /// The bounds and the connected-stage precondition are checked before any stage is touched.
    /// The fan-out fails fast on the first stage which rejects the value; stages updated before
    /// that keep the new value (best effort, no rollback).
    pub fn set_speed_xy(&mut self, umps: f64) -> Result<(), MoverError> {
        self.assert_connected_stages("set_speed_xy")?;
        Self::check_in_range(
            "xy speed",
            umps,
            Self::SPEED_LOWER_BOUND_UMPS,
            Self::SPEED_UPPER_BOUND_UMPS,
        )?;

        self.apply_to_connected("xy speed", |stage| stage.set_speed_xy(umps))?;
        self.speed_xy_umps = umps;
        Ok(())
    }

    /// The shared xy speed.
    ///
    /// Any connected stage whose live value has drifted from the stored one is reset to the
    /// stored value first.
    pub fn speed_xy(&mut self) -> Result<f64, MoverError> {
        self.assert_connected_stages("speed_xy")?;

        let stored = self.speed_xy_umps;
        if !self.connected_stages_match("xy speed", stored, |stage| stage.get_speed_xy())? {
            info!("Mover and stage xy speed differ, resetting stages to the stored value");
            self.set_speed_xy(stored)?;
        }

        Ok(stored)
    }

    /// Set the z speed of every connected stage. See [`Mover::set_speed_xy`] for the failure
    /// behaviour.
    pub fn set_speed_z(&mut self, umps: f64) -> Result<(), MoverError> {
        self.assert_connected_stages("set_speed_z")?;
        Self::check_in_range(
            "z speed",
            umps,
            Self::SPEED_LOWER_BOUND_UMPS,
            Self::SPEED_UPPER_BOUND_UMPS,
        )?;

        self.apply_to_connected("z speed", |stage| stage.set_speed_z(umps))?;
        self.speed_z_umps = umps;
        Ok(())
    }

    /// The shared z speed, resynchronising drifted stages first.
    pub fn speed_z(&mut self) -> Result<f64, MoverError> {
        self.assert_connected_stages("speed_z")?;

        let stored = self.speed_z_umps;
        if !self.connected_stages_match("z speed", stored, |stage| stage.get_speed_z())? {
            info!("Mover and stage z speed differ, resetting stages to the stored value");
            self.set_speed_z(stored)?;
        }

        Ok(stored)
    }

    /// Set the xy acceleration of every connected stage. See [`Mover::set_speed_xy`] for the
    /// failure behaviour.
    pub fn set_acceleration_xy(&mut self, umps2: f64) -> Result<(), MoverError> {
        self.assert_connected_stages("set_acceleration_xy")?;
        Self::check_in_range(
            "xy acceleration",
            umps2,
            Self::ACCELERATION_LOWER_BOUND_UMPS2,
            Self::ACCELERATION_UPPER_BOUND_UMPS2,
        )?;

        self.apply_to_connected("xy acceleration", |stage| stage.set_acceleration_xy(umps2))?;
        self.acceleration_xy_umps2 = umps2;
        Ok(())
    }

    /// The shared xy acceleration, resynchronising drifted stages first.
    pub fn acceleration_xy(&mut self) -> Result<f64, MoverError> {
        self.assert_connected_stages("acceleration_xy")?;

        let stored = self.acceleration_xy_umps2;
        if !self.connected_stages_match("xy acceleration", stored, |stage| {
            stage.get_acceleration_xy()
        })? {
            info!("Mover and stage xy acceleration differ, resetting stages to the stored value");
            self.set_acceleration_xy(stored)?;
        }

        Ok(stored)
    }

    /// Check an operation requiring connected stages can go ahead.
    fn assert_connected_stages(&self, operation: &'static str) -> Result<(), MoverError> {
        if self.has_connected_stages() {
            Ok(())
        } else {
            Err(MoverError::NoConnectedStages(operation))
        }
    }

    /// Check a value lies within a closed range.
    fn check_in_range(
        name: &'static str,
        value: f64,
        lower: f64,
        upper: f64,
    ) -> Result<(), MoverError> {
        if value < lower || value > upper {
            Err(MoverError::ValueOutOfRange {
                name,
                value,
                lower,
                upper,
            })
        } else {
            Ok(())
        }
    }

    /// Apply a setter to every connected stage, failing fast on the first rejection.
    fn apply_to_connected<F>(&mut self, setting: &'static str, mut apply: F) -> Result<(), MoverError>
    where
        F: FnMut(&mut dyn Stage) -> Result<(), StageError>,
    {
        for calibration in self.calibrations.values_mut() {
            if !calibration.stage().is_connected() {
                continue;
            }

            let id = calibration.stage().id().to_string();
            apply(calibration.stage_mut()).map_err(|e| MoverError::SettingRejected {
                setting,
                stage: id,
                source: e,
            })?;
        }

        Ok(())
    }

    /// True if every connected stage reports the expected value for a setting.
    fn connected_stages_match<F>(
        &self,
        setting: &'static str,
        expected: f64,
        get: F,
    ) -> Result<bool, MoverError>
    where
        F: Fn(&dyn Stage) -> Result<f64, StageError>,
    {
        for calibration in self.calibrations.values() {
            if !calibration.stage().is_connected() {
                continue;
            }

            let value = get(calibration.stage()).map_err(|e| MoverError::SettingQueryFailed {
                setting,
                stage: calibration.stage().id().to_string(),
                source: e,
            })?;

            if value != expected {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl Default for Mover {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use stage_if::StagePosition;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Observable state of a [`TestStage`], shared with the test body.
    #[derive(Default)]
    struct SharedStage {
        connected: bool,
        reject_speed: bool,
        speed_xy: f64,
        speed_z: f64,
        acceleration_xy: f64,
    }

    /// Stage double with settable values and optional speed rejection.
    struct TestStage {
        id: String,
        shared: Rc<RefCell<SharedStage>>,
    }

    impl TestStage {
        fn new(id: &str) -> (Self, Rc<RefCell<SharedStage>>) {
            let shared = Rc::new(RefCell::new(SharedStage::default()));
            (
                Self {
                    id: String::from(id),
                    shared: Rc::clone(&shared),
                },
                shared,
            )
        }
    }

    impl Stage for TestStage {
        fn id(&self) -> &str {
            &self.id
        }

        fn connect(&mut self) -> Result<(), StageError> {
            self.shared.borrow_mut().connected = true;
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), StageError> {
            self.shared.borrow_mut().connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.shared.borrow().connected
        }

        fn get_speed_xy(&self) -> Result<f64, StageError> {
            Ok(self.shared.borrow().speed_xy)
        }

        fn set_speed_xy(&mut self, umps: f64) -> Result<(), StageError> {
            let mut shared = self.shared.borrow_mut();
            if shared.reject_speed {
                return Err(StageError::Driver(String::from("speed rejected")));
            }
            shared.speed_xy = umps;
            Ok(())
        }

        fn get_speed_z(&self) -> Result<f64, StageError> {
            Ok(self.shared.borrow().speed_z)
        }

        fn set_speed_z(&mut self, umps: f64) -> Result<(), StageError> {
            let mut shared = self.shared.borrow_mut();
            if shared.reject_speed {
                return Err(StageError::Driver(String::from("speed rejected")));
            }
            shared.speed_z = umps;
            Ok(())
        }

        fn get_acceleration_xy(&self) -> Result<f64, StageError> {
            Ok(self.shared.borrow().acceleration_xy)
        }

        fn set_acceleration_xy(&mut self, umps2: f64) -> Result<(), StageError> {
            self.shared.borrow_mut().acceleration_xy = umps2;
            Ok(())
        }

        fn get_current_position(&self) -> Result<StagePosition, StageError> {
            Ok(StagePosition::default())
        }

        fn move_relative(&mut self, _x_um: f64, _y_um: f64, _z_um: f64) -> Result<(), StageError> {
            Ok(())
        }
    }

    fn register(
        mover: &mut Mover,
        id: &str,
        orientation: Orientation,
        position: DevicePosition,
    ) -> Rc<RefCell<SharedStage>> {
        let (stage, shared) = TestStage::new(id);
        mover
            .add_stage_calibration(Box::new(stage), orientation, position)
            .unwrap();
        shared
    }

    #[test]
    fn test_duplicate_orientation_is_rejected() {
        let mut mover = Mover::new();
        register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);

        let (stage, _shared) = TestStage::new("usb:1");
        let result =
            mover.add_stage_calibration(Box::new(stage), Orientation::Left, DevicePosition::Output);

        assert!(matches!(
            result,
            Err(MoverError::OrientationInUse(Orientation::Left))
        ));
        assert_eq!(mover.calibrations().count(), 1);
    }

    #[test]
    fn test_duplicate_stage_is_rejected() {
        let mut mover = Mover::new();
        register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);

        // A second handle to the same physical device
        let (stage, _shared) = TestStage::new("usb:0");
        let result = mover.add_stage_calibration(
            Box::new(stage),
            Orientation::Right,
            DevicePosition::Output,
        );

        assert!(matches!(result, Err(MoverError::StageInUse(id)) if id == "usb:0"));
        assert_eq!(mover.calibrations().count(), 1);
    }

    #[test]
    fn test_device_positions_are_not_exclusive_on_their_own() {
        let mut mover = Mover::new();

        // Two input stages at different orientations are legal
        register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);
        register(&mut mover, "usb:1", Orientation::Right, DevicePosition::Output);
        register(&mut mover, "usb:2", Orientation::Top, DevicePosition::Input);
        assert_eq!(mover.calibrations().count(), 3);

        // But a second stage at an assigned orientation is not
        let (stage, _shared) = TestStage::new("usb:3");
        let result =
            mover.add_stage_calibration(Box::new(stage), Orientation::Left, DevicePosition::Output);

        assert!(matches!(
            result,
            Err(MoverError::OrientationInUse(Orientation::Left))
        ));
        assert_eq!(mover.calibrations().count(), 3);
    }

    #[test]
    fn test_calibration_views() {
        let mut mover = Mover::new();
        let left = register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);
        register(&mut mover, "usb:1", Orientation::Right, DevicePosition::Output);

        assert_eq!(mover.active_stages().len(), 2);
        assert_eq!(mover.connected_stages().len(), 0);
        assert!(!mover.has_connected_stages());

        left.borrow_mut().connected = true;
        assert_eq!(mover.connected_stages().len(), 1);
        assert!(mover.has_connected_stages());

        assert_eq!(
            mover
                .calibrations_at_position(DevicePosition::Input)
                .count(),
            1
        );
        assert!(mover.calibration(Orientation::Left).is_some());
        assert!(mover.calibration(Orientation::Bottom).is_none());
    }

    #[test]
    fn test_aggregate_state_is_least_progressed() {
        let mut mover = Mover::new();
        assert_eq!(mover.state(), State::Uninitialized);

        register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);
        register(&mut mover, "usb:1", Orientation::Right, DevicePosition::Output);

        mover
            .calibration_mut(Orientation::Left)
            .unwrap()
            .connect()
            .unwrap();
        assert_eq!(mover.state(), State::Uninitialized);

        mover
            .calibration_mut(Orientation::Right)
            .unwrap()
            .connect()
            .unwrap();
        assert_eq!(mover.state(), State::Connected);
    }

    #[test]
    fn test_setting_speed_requires_connected_stages() {
        let mut mover = Mover::new();
        register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);

        assert!(matches!(
            mover.set_speed_xy(500.0),
            Err(MoverError::NoConnectedStages(_))
        ));
        assert!(matches!(
            mover.speed_xy(),
            Err(MoverError::NoConnectedStages(_))
        ));
    }

    #[test]
    fn test_speed_out_of_range_is_rejected_without_mutation() {
        let mut mover = Mover::new();
        let shared = register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);
        shared.borrow_mut().connected = true;

        mover.set_speed_xy(500.0).unwrap();

        assert!(matches!(
            mover.set_speed_xy(2e5),
            Err(MoverError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            mover.set_speed_xy(-1.0),
            Err(MoverError::ValueOutOfRange { .. })
        ));

        // Stored and live values unchanged
        assert_eq!(mover.speed_xy().unwrap(), 500.0);
        assert_eq!(shared.borrow().speed_xy, 500.0);

        assert!(matches!(
            mover.set_acceleration_xy(2e7),
            Err(MoverError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_speed_fans_out_to_all_connected_stages() {
        let mut mover = Mover::new();
        let left = register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);
        let right = register(&mut mover, "usb:1", Orientation::Right, DevicePosition::Output);
        left.borrow_mut().connected = true;
        right.borrow_mut().connected = true;

        mover.set_speed_xy(750.0).unwrap();
        mover.set_speed_z(75.0).unwrap();
        mover.set_acceleration_xy(1000.0).unwrap();

        for shared in &[&left, &right] {
            assert_eq!(shared.borrow().speed_xy, 750.0);
            assert_eq!(shared.borrow().speed_z, 75.0);
            assert_eq!(shared.borrow().acceleration_xy, 1000.0);
        }
    }

    #[test]
    fn test_rejecting_stage_fails_the_fan_out() {
        let mut mover = Mover::new();
        let left = register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);
        let right = register(&mut mover, "usb:1", Orientation::Right, DevicePosition::Output);
        left.borrow_mut().connected = true;
        right.borrow_mut().connected = true;
        right.borrow_mut().reject_speed = true;

        let result = mover.set_speed_xy(750.0);
        assert!(
            matches!(result, Err(MoverError::SettingRejected { ref stage, .. }) if stage == "usb:1")
        );
    }

    #[test]
    fn test_getter_resynchronises_drifted_stages() {
        let mut mover = Mover::new();
        let shared = register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);
        shared.borrow_mut().connected = true;

        mover.set_speed_xy(300.0).unwrap();

        // Something changed the speed behind the mover's back
        shared.borrow_mut().speed_xy = 42.0;

        assert_eq!(mover.speed_xy().unwrap(), 300.0);
        assert_eq!(shared.borrow().speed_xy, 300.0);
    }

    #[test]
    fn test_reset_clears_calibrations_and_settings() {
        let mut mover = Mover::new();
        let shared = register(&mut mover, "usb:0", Orientation::Left, DevicePosition::Input);
        shared.borrow_mut().connected = true;
        mover.set_speed_xy(999.0).unwrap();

        mover.reset();

        assert_eq!(mover.calibrations().count(), 0);
        assert_eq!(mover.state(), State::Uninitialized);

        // The same orientation can be registered again after a reset
        let (stage, _shared) = TestStage::new("usb:0");
        assert!(mover
            .add_stage_calibration(Box::new(stage), Orientation::Left, DevicePosition::Input)
            .is_ok());
    }
}

//! # Simulated Stage
//!
//! [`DummyStage`] implements the [`Stage`] trait against an in-memory model rather than real
//! hardware. It is used by the demonstration executable and by tests which need a stage without
//! a lab attached.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;

use crate::stage::{Stage, StageError, StagePosition};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A simulated stage.
///
/// The stage starts disconnected at the origin with all speeds zeroed. Setting `fail_connect`
/// makes the next `connect()` call fail, which simulates an unreachable device.
pub struct DummyStage {
    id: String,
    connected: bool,
    position: StagePosition,
    speed_xy_umps: f64,
    speed_z_umps: f64,
    acceleration_xy_umps2: f64,

    /// Fault injection: when true `connect()` fails with a connection error.
    pub fail_connect: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DummyStage {
    /// Create a new simulated stage with the given address.
    pub fn new(address: &str) -> Self {
        Self {
            id: String::from(address),
            connected: false,
            position: StagePosition::default(),
            speed_xy_umps: 0.0,
            speed_z_umps: 0.0,
            acceleration_xy_umps2: 0.0,
            fail_connect: false,
        }
    }

    /// Check the connection is open, mapping a closed connection to the driver error.
    fn assert_connected(&self) -> Result<(), StageError> {
        if self.connected {
            Ok(())
        } else {
            Err(StageError::NotConnected)
        }
    }
}

impl Stage for DummyStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self) -> Result<(), StageError> {
        if self.fail_connect {
            return Err(StageError::ConnectionFailed(self.id.clone()));
        }

        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), StageError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_speed_xy(&self) -> Result<f64, StageError> {
        self.assert_connected()?;
        Ok(self.speed_xy_umps)
    }

    fn set_speed_xy(&mut self, umps: f64) -> Result<(), StageError> {
        self.assert_connected()?;
        self.speed_xy_umps = umps;
        Ok(())
    }

    fn get_speed_z(&self) -> Result<f64, StageError> {
        self.assert_connected()?;
        Ok(self.speed_z_umps)
    }

    fn set_speed_z(&mut self, umps: f64) -> Result<(), StageError> {
        self.assert_connected()?;
        self.speed_z_umps = umps;
        Ok(())
    }

    fn get_acceleration_xy(&self) -> Result<f64, StageError> {
        self.assert_connected()?;
        Ok(self.acceleration_xy_umps2)
    }

    fn set_acceleration_xy(&mut self, umps2: f64) -> Result<(), StageError> {
        self.assert_connected()?;
        self.acceleration_xy_umps2 = umps2;
        Ok(())
    }

    fn get_current_position(&self) -> Result<StagePosition, StageError> {
        self.assert_connected()?;
        Ok(self.position)
    }

    fn move_relative(&mut self, x_um: f64, y_um: f64, z_um: f64) -> Result<(), StageError> {
        self.assert_connected()?;

        self.position.x_um += x_um;
        self.position.y_um += y_um;
        self.position.z_um += z_um;

        debug!(
            "{} moved by ({}, {}, {}) um to ({}, {}, {}) um",
            self.id, x_um, y_um, z_um, self.position.x_um, self.position.y_um, self.position.z_um
        );

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_connect_lifecycle() {
        let mut stage = DummyStage::new("usb:sim:0");
        assert!(!stage.is_connected());

        // Driver calls fail while disconnected
        assert!(matches!(
            stage.get_speed_xy(),
            Err(StageError::NotConnected)
        ));

        stage.connect().unwrap();
        assert!(stage.is_connected());

        // Connecting twice is fine
        stage.connect().unwrap();

        stage.disconnect().unwrap();
        assert!(!stage.is_connected());
    }

    #[test]
    fn test_connect_fault_injection() {
        let mut stage = DummyStage::new("usb:sim:1");
        stage.fail_connect = true;

        assert!(matches!(
            stage.connect(),
            Err(StageError::ConnectionFailed(_))
        ));
        assert!(!stage.is_connected());
    }

    #[test]
    fn test_relative_moves_accumulate() {
        let mut stage = DummyStage::new("usb:sim:2");
        stage.connect().unwrap();

        stage.move_relative(10.0, -5.0, 1.0).unwrap();
        stage.move_relative(-4.0, 5.0, 0.0).unwrap();

        let pos = stage.get_current_position().unwrap();
        assert_eq!(pos.x_um, 6.0);
        assert_eq!(pos.y_um, 0.0);
        assert_eq!(pos.z_um, 1.0);
    }
}

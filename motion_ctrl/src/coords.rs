//! Typed coordinates for the chip and stage frames
//!
//! Keeping the two frames as distinct types makes mixing them a compile error rather than a
//! runtime surprise. All coordinates are in micrometres.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

// Internal
use stage_if::StagePosition;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A coordinate in the fixed reference frame of the chip under test.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ChipCoordinate(Vector3<f64>);

/// A coordinate in the native motion-axis frame of a physical stage.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StageCoordinate(Vector3<f64>);

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChipCoordinate {
    pub fn new(x_um: f64, y_um: f64, z_um: f64) -> Self {
        Self(Vector3::new(x_um, y_um, z_um))
    }

    pub fn zero() -> Self {
        Self(Vector3::zeros())
    }

    pub fn x(&self) -> f64 {
        self.0.x
    }

    pub fn y(&self) -> f64 {
        self.0.y
    }

    pub fn z(&self) -> f64 {
        self.0.z
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        self.0
    }

    pub fn from_vector(vector: Vector3<f64>) -> Self {
        Self(vector)
    }
}

impl Add for ChipCoordinate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for ChipCoordinate {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for ChipCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chip ({:.3}, {:.3}, {:.3}) um",
            self.0.x, self.0.y, self.0.z
        )
    }
}

impl StageCoordinate {
    pub fn new(x_um: f64, y_um: f64, z_um: f64) -> Self {
        Self(Vector3::new(x_um, y_um, z_um))
    }

    pub fn zero() -> Self {
        Self(Vector3::zeros())
    }

    pub fn x(&self) -> f64 {
        self.0.x
    }

    pub fn y(&self) -> f64 {
        self.0.y
    }

    pub fn z(&self) -> f64 {
        self.0.z
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        self.0
    }

    pub fn from_vector(vector: Vector3<f64>) -> Self {
        Self(vector)
    }
}

impl Add for StageCoordinate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for StageCoordinate {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for StageCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage ({:.3}, {:.3}, {:.3}) um",
            self.0.x, self.0.y, self.0.z
        )
    }
}

impl From<StagePosition> for StageCoordinate {
    fn from(position: StagePosition) -> Self {
        Self::new(position.x_um, position.y_um, position.z_um)
    }
}

impl From<StageCoordinate> for StagePosition {
    fn from(coordinate: StageCoordinate) -> Self {
        Self {
            x_um: coordinate.x(),
            y_um: coordinate.y(),
            z_um: coordinate.z(),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_arithmetic_stays_in_frame() {
        let a = ChipCoordinate::new(1.0, 2.0, 3.0);
        let b = ChipCoordinate::new(4.0, 5.0, 6.0);

        assert_eq!(a + b, ChipCoordinate::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, ChipCoordinate::new(3.0, 3.0, 3.0));
    }

    #[test]
    fn test_stage_position_round_trip() {
        let coordinate = StageCoordinate::new(10.5, -2.25, 0.0);
        let position = StagePosition::from(coordinate);

        assert_eq!(StageCoordinate::from(position), coordinate);
    }
}

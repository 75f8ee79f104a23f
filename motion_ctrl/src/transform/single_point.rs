//! Single point offset transformation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;
use std::fmt;

// Internal
use crate::coords::{ChipCoordinate, StageCoordinate};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A transformation pinned at a single coordinate pairing.
///
/// The offset is `stage - chip` of the fixed pairing, so the forward map is an addition and the
/// inverse a subtraction. Chaining the two is the identity for every point, which the round-trip
/// test below locks in.
#[derive(Debug, Clone, PartialEq)]
pub struct SinglePointFixation {
    chip_coordinate: ChipCoordinate,
    stage_coordinate: StageCoordinate,
    offset: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SinglePointFixation {
    /// Fix the transformation at the given pairing.
    pub fn new(chip_coordinate: ChipCoordinate, stage_coordinate: StageCoordinate) -> Self {
        let offset = stage_coordinate.to_vector() - chip_coordinate.to_vector();

        Self {
            chip_coordinate,
            stage_coordinate,
            offset,
        }
    }

    /// Transform a coordinate in chip space to stage space.
    pub fn chip_to_stage(&self, chip_coordinate: &ChipCoordinate) -> StageCoordinate {
        StageCoordinate::from_vector(chip_coordinate.to_vector() + self.offset)
    }

    /// Transform a coordinate in stage space to chip space.
    pub fn stage_to_chip(&self, stage_coordinate: &StageCoordinate) -> ChipCoordinate {
        ChipCoordinate::from_vector(stage_coordinate.to_vector() - self.offset)
    }

    /// The fixed pairing reproduces exactly, so the residual is always zero.
    pub fn mean_error(&self) -> f64 {
        0.0
    }
}

impl fmt::Display for SinglePointFixation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mapped to {}",
            self.chip_coordinate, self.stage_coordinate
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fixed_pairing_maps_exactly() {
        let chip = ChipCoordinate::new(100.0, -50.0, 0.0);
        let stage = StageCoordinate::new(2300.5, 1800.25, 10.0);

        let fixation = SinglePointFixation::new(chip, stage);

        assert_eq!(fixation.chip_to_stage(&chip), stage);
        assert_eq!(fixation.stage_to_chip(&stage), chip);
        assert_eq!(fixation.mean_error(), 0.0);
    }

    #[test]
    fn test_round_trip_is_identity() {
        let fixation = SinglePointFixation::new(
            ChipCoordinate::new(-120.0, 4.5, 1.0),
            StageCoordinate::new(987.6, -543.2, 10.0),
        );

        for point in &[
            ChipCoordinate::zero(),
            ChipCoordinate::new(1.0, 2.0, 3.0),
            ChipCoordinate::new(-1e4, 2e4, -3.3),
            ChipCoordinate::new(0.1, -0.2, 0.0),
        ] {
            let round_trip = fixation.stage_to_chip(&fixation.chip_to_stage(point));

            assert_abs_diff_eq!(round_trip.x(), point.x(), epsilon = 1e-9);
            assert_abs_diff_eq!(round_trip.y(), point.y(), epsilon = 1e-9);
            assert_abs_diff_eq!(round_trip.z(), point.z(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_planar_pairing_keeps_z_offset() {
        // A 2D pairing (z = 0 on both sides) must leave z untouched
        let fixation = SinglePointFixation::new(
            ChipCoordinate::new(10.0, 20.0, 0.0),
            StageCoordinate::new(110.0, 220.0, 0.0),
        );

        let mapped = fixation.chip_to_stage(&ChipCoordinate::new(0.0, 0.0, 5.0));
        assert_eq!(mapped, StageCoordinate::new(100.0, 200.0, 5.0));
    }
}

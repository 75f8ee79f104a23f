//! Kabsch least-squares rotation transformation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use std::fmt;

// Internal
use super::TransformationError;
use crate::coords::{ChipCoordinate, StageCoordinate};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Minimum number of coordinate pairings for a planar (2D) fit.
pub const MIN_PAIRINGS_2D: usize = 2;

/// Minimum number of coordinate pairings for a full 3D fit.
pub const MIN_PAIRINGS_3D: usize = 3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A rigid-body transformation fitted over many coordinate pairings.
///
/// The rotation matrix `R` minimises the sum of squared residuals between the rotated,
/// centroid-centred chip points and their paired stage points (Kabsch algorithm, see
/// https://en.wikipedia.org/wiki/Kabsch_algorithm). Reflections are corrected for, so `R` is
/// always a proper rotation with determinant +1. The forward map is
/// `R * (p - chip_centroid) + stage_centroid`.
///
/// In planar mode the rotation is fitted on the xy plane only and z offsets pass straight
/// through, which suits stages whose z axis is aligned with the chip normal.
#[derive(Debug, Clone)]
pub struct KabschRotation {
    chip_coordinates: Vec<ChipCoordinate>,
    stage_coordinates: Vec<StageCoordinate>,
    chip_centroid: Vector3<f64>,
    stage_centroid: Vector3<f64>,
    rotation: Matrix3<f64>,
    // The rotation is orthogonal so the transpose is the inverse, which is numerically better
    // than inverting
    rotation_inverse: Matrix3<f64>,
    is_2d: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl KabschRotation {
    /// Fit a transformation over the given coordinate pairings.
    ///
    /// `chip_coordinates[i]` and `stage_coordinates[i]` must describe the same physical
    /// location. At least [`MIN_PAIRINGS_3D`] pairings are required, or [`MIN_PAIRINGS_2D`] for
    /// a planar fit.
    pub fn new(
        chip_coordinates: &[ChipCoordinate],
        stage_coordinates: &[StageCoordinate],
        is_2d: bool,
    ) -> Result<Self, TransformationError> {
        if chip_coordinates.len() != stage_coordinates.len() {
            return Err(TransformationError::PairingMismatch {
                chip: chip_coordinates.len(),
                stage: stage_coordinates.len(),
            });
        }

        let required = if is_2d {
            MIN_PAIRINGS_2D
        } else {
            MIN_PAIRINGS_3D
        };
        if chip_coordinates.len() < required {
            return Err(TransformationError::InsufficientPairings {
                required,
                actual: chip_coordinates.len(),
            });
        }

        let chip_centroid = centroid(chip_coordinates.iter().map(|c| c.to_vector()));
        let stage_centroid = centroid(stage_coordinates.iter().map(|s| s.to_vector()));

        let rotation = if is_2d {
            fit_rotation_2d(
                chip_coordinates,
                stage_coordinates,
                &chip_centroid,
                &stage_centroid,
            )
        } else {
            fit_rotation_3d(
                chip_coordinates,
                stage_coordinates,
                &chip_centroid,
                &stage_centroid,
            )
        };

        Ok(Self {
            chip_coordinates: chip_coordinates.to_vec(),
            stage_coordinates: stage_coordinates.to_vec(),
            chip_centroid,
            stage_centroid,
            rotation,
            rotation_inverse: rotation.transpose(),
            is_2d,
        })
    }

    /// Transform a coordinate in chip space to stage space.
    pub fn chip_to_stage(&self, chip_coordinate: &ChipCoordinate) -> StageCoordinate {
        StageCoordinate::from_vector(
            self.rotation * (chip_coordinate.to_vector() - self.chip_centroid)
                + self.stage_centroid,
        )
    }

    /// Transform a coordinate in stage space to chip space.
    pub fn stage_to_chip(&self, stage_coordinate: &StageCoordinate) -> ChipCoordinate {
        ChipCoordinate::from_vector(
            self.rotation_inverse * (stage_coordinate.to_vector() - self.stage_centroid)
                + self.chip_centroid,
        )
    }

    /// Root-mean-square residual distance between the transformed chip points and their paired
    /// stage points, in micrometres.
    pub fn mean_error(&self) -> f64 {
        let sum_of_squares: f64 = self
            .chip_coordinates
            .iter()
            .zip(self.stage_coordinates.iter())
            .map(|(chip, stage)| {
                (self.chip_to_stage(chip).to_vector() - stage.to_vector()).norm_squared()
            })
            .sum();

        (sum_of_squares / self.chip_coordinates.len() as f64).sqrt()
    }

    /// The fitted rotation matrix.
    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// True if the rotation was fitted on the xy plane only.
    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    /// Number of coordinate pairings the fit is based on.
    pub fn pairing_count(&self) -> usize {
        self.chip_coordinates.len()
    }
}

impl fmt::Display for KabschRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Kabsch rotation over {} pairings ({}, mean error {:.3} um)",
            self.pairing_count(),
            if self.is_2d { "2D" } else { "3D" },
            self.mean_error()
        )
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Mean of a non-empty sequence of vectors.
fn centroid(vectors: impl Iterator<Item = Vector3<f64>>) -> Vector3<f64> {
    let mut sum = Vector3::zeros();
    let mut count = 0usize;

    for vector in vectors {
        sum += vector;
        count += 1;
    }

    sum / count as f64
}

/// Fit the optimal proper rotation between two centred 3D point sets.
fn fit_rotation_3d(
    chip_coordinates: &[ChipCoordinate],
    stage_coordinates: &[StageCoordinate],
    chip_centroid: &Vector3<f64>,
    stage_centroid: &Vector3<f64>,
) -> Matrix3<f64> {
    // Cross-covariance of the centred point sets
    let mut h = Matrix3::zeros();
    for (chip, stage) in chip_coordinates.iter().zip(stage_coordinates.iter()) {
        let p = chip.to_vector() - chip_centroid;
        let q = stage.to_vector() - stage_centroid;
        h += p * q.transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.unwrap();
    let v = svd.v_t.unwrap().transpose();

    // Correct a reflection into a proper rotation
    let mut d = Matrix3::identity();
    if (v * u.transpose()).determinant() < 0.0 {
        d[(2, 2)] = -1.0;
    }

    v * d * u.transpose()
}

/// Fit the optimal proper rotation on the xy plane, embedded into a 3x3 matrix with z passed
/// through unchanged.
fn fit_rotation_2d(
    chip_coordinates: &[ChipCoordinate],
    stage_coordinates: &[StageCoordinate],
    chip_centroid: &Vector3<f64>,
    stage_centroid: &Vector3<f64>,
) -> Matrix3<f64> {
    let mut h = Matrix2::zeros();
    for (chip, stage) in chip_coordinates.iter().zip(stage_coordinates.iter()) {
        let p = chip.to_vector() - chip_centroid;
        let q = stage.to_vector() - stage_centroid;
        h += Vector2::new(p.x, p.y) * Vector2::new(q.x, q.y).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.unwrap();
    let v = svd.v_t.unwrap().transpose();

    let mut d = Matrix2::identity();
    if (v * u.transpose()).determinant() < 0.0 {
        d[(1, 1)] = -1.0;
    }

    let planar = v * d * u.transpose();

    let mut rotation = Matrix3::identity();
    rotation[(0, 0)] = planar[(0, 0)];
    rotation[(0, 1)] = planar[(0, 1)];
    rotation[(1, 0)] = planar[(1, 0)];
    rotation[(1, 1)] = planar[(1, 1)];

    rotation
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Rotation3;

    /// Apply a known rigid-body motion to a set of chip points.
    fn transformed_pairs(
        chip_points: &[ChipCoordinate],
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
    ) -> Vec<StageCoordinate> {
        chip_points
            .iter()
            .map(|c| StageCoordinate::from_vector(rotation * c.to_vector() + translation))
            .collect()
    }

    fn assert_vectors_eq(a: Vector3<f64>, b: Vector3<f64>, epsilon: f64) {
        assert_abs_diff_eq!(a.x, b.x, epsilon = epsilon);
        assert_abs_diff_eq!(a.y, b.y, epsilon = epsilon);
        assert_abs_diff_eq!(a.z, b.z, epsilon = epsilon);
    }

    #[test]
    fn test_exact_3d_correspondences_are_recovered() {
        let chip_points = [
            ChipCoordinate::new(0.0, 0.0, 0.0),
            ChipCoordinate::new(100.0, 0.0, 0.0),
            ChipCoordinate::new(0.0, 80.0, 0.0),
            ChipCoordinate::new(0.0, 0.0, 60.0),
            ChipCoordinate::new(25.0, -40.0, 10.0),
        ];
        let rotation = *Rotation3::from_euler_angles(0.2, -0.4, 1.1).matrix();
        let translation = Vector3::new(500.0, -300.0, 42.0);
        let stage_points = transformed_pairs(&chip_points, &rotation, &translation);

        let kabsch = KabschRotation::new(&chip_points, &stage_points, false).unwrap();

        // The fit reproduces the generating motion
        assert_abs_diff_eq!(kabsch.mean_error(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kabsch.rotation().determinant(), 1.0, epsilon = 1e-9);

        // An unrelated probe point maps through the generating motion
        let probe = ChipCoordinate::new(12.0, 34.0, -5.0);
        assert_vectors_eq(
            kabsch.chip_to_stage(&probe).to_vector(),
            rotation * probe.to_vector() + translation,
            1e-6,
        );

        // Round trips in both directions
        assert_vectors_eq(
            kabsch
                .stage_to_chip(&kabsch.chip_to_stage(&probe))
                .to_vector(),
            probe.to_vector(),
            1e-9,
        );
        let stage_probe = StageCoordinate::new(450.0, -280.0, 55.0);
        assert_vectors_eq(
            kabsch
                .chip_to_stage(&kabsch.stage_to_chip(&stage_probe))
                .to_vector(),
            stage_probe.to_vector(),
            1e-9,
        );
    }

    #[test]
    fn test_reflected_correspondences_still_give_proper_rotation() {
        let chip_points = [
            ChipCoordinate::new(0.0, 0.0, 0.0),
            ChipCoordinate::new(100.0, 0.0, 0.0),
            ChipCoordinate::new(0.0, 100.0, 0.0),
            ChipCoordinate::new(0.0, 0.0, 100.0),
        ];

        // Mirror the points through the xy plane. The best orthogonal alignment would be a
        // reflection, which must be corrected into a proper rotation.
        let stage_points: Vec<StageCoordinate> = chip_points
            .iter()
            .map(|c| StageCoordinate::new(c.x(), c.y(), -c.z()))
            .collect();

        let kabsch = KabschRotation::new(&chip_points, &stage_points, false).unwrap();

        assert_abs_diff_eq!(kabsch.rotation().determinant(), 1.0, epsilon = 1e-9);
        // A reflection cannot be reproduced by a rotation, so the fit has residual
        assert!(kabsch.mean_error() > 1.0);
    }

    #[test]
    fn test_planar_fit_recovers_in_plane_rotation() {
        let chip_points = [
            ChipCoordinate::new(0.0, 0.0, 0.0),
            ChipCoordinate::new(100.0, 0.0, 0.0),
            ChipCoordinate::new(40.0, 70.0, 0.0),
        ];
        let angle = 30f64.to_radians();
        let rotation = *Rotation3::from_axis_angle(&Vector3::z_axis(), angle).matrix();
        let translation = Vector3::new(10.0, 20.0, 0.0);
        let stage_points = transformed_pairs(&chip_points, &rotation, &translation);

        let kabsch = KabschRotation::new(&chip_points, &stage_points, true).unwrap();

        assert_abs_diff_eq!(kabsch.mean_error(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kabsch.rotation().determinant(), 1.0, epsilon = 1e-9);

        // z offsets pass straight through a planar fit
        let probe = ChipCoordinate::new(50.0, 10.0, 7.0);
        let mapped = kabsch.chip_to_stage(&probe);
        assert_abs_diff_eq!(mapped.z(), 7.0, epsilon = 1e-9);

        assert_vectors_eq(
            kabsch
                .stage_to_chip(&kabsch.chip_to_stage(&probe))
                .to_vector(),
            probe.to_vector(),
            1e-9,
        );
    }

    #[test]
    fn test_planar_fit_works_with_two_pairings() {
        let chip_points = [
            ChipCoordinate::new(0.0, 0.0, 0.0),
            ChipCoordinate::new(200.0, 0.0, 0.0),
        ];
        let angle = -45f64.to_radians();
        let rotation = *Rotation3::from_axis_angle(&Vector3::z_axis(), angle).matrix();
        let translation = Vector3::new(-5.0, 12.5, 0.0);
        let stage_points = transformed_pairs(&chip_points, &rotation, &translation);

        let kabsch = KabschRotation::new(&chip_points, &stage_points, true).unwrap();

        assert_abs_diff_eq!(kabsch.mean_error(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pairing_count_mismatch_is_rejected() {
        let chip_points = [
            ChipCoordinate::new(0.0, 0.0, 0.0),
            ChipCoordinate::new(1.0, 0.0, 0.0),
            ChipCoordinate::new(0.0, 1.0, 0.0),
        ];
        let stage_points = [StageCoordinate::new(0.0, 0.0, 0.0)];

        assert!(matches!(
            KabschRotation::new(&chip_points, &stage_points, false),
            Err(TransformationError::PairingMismatch { chip: 3, stage: 1 })
        ));
    }

    #[test]
    fn test_insufficient_pairings_are_rejected() {
        let chip_points = [
            ChipCoordinate::new(0.0, 0.0, 0.0),
            ChipCoordinate::new(1.0, 0.0, 0.0),
        ];
        let stage_points = [
            StageCoordinate::new(0.0, 0.0, 0.0),
            StageCoordinate::new(1.0, 0.0, 0.0),
        ];

        // Two pairings are enough for a planar fit but not for a 3D fit
        assert!(KabschRotation::new(&chip_points, &stage_points, true).is_ok());
        assert!(matches!(
            KabschRotation::new(&chip_points, &stage_points, false),
            Err(TransformationError::InsufficientPairings {
                required: MIN_PAIRINGS_3D,
                actual: 2
            })
        ));

        assert!(matches!(
            KabschRotation::new(&chip_points[..1], &stage_points[..1], true),
            Err(TransformationError::InsufficientPairings {
                required: MIN_PAIRINGS_2D,
                actual: 1
            })
        ));
    }
}

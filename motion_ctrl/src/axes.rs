//! # Axis Mapping
//!
//! This module describes how the three chip axes map onto the three motion axes of a stage. A
//! stage may be mounted mirrored or rotated relative to the chip, so each chip axis is assigned
//! a stage axis together with a direction sign. A valid mapping induces a signed permutation
//! matrix which rotates chip-frame vectors into the stage frame.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// One of the three motion axes. Used both as a chip axis and as a stage axis identifier.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// The direction sign of an axis assignment.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum Direction {
    Positive,
    Negative,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Assignment of each chip axis to a signed stage axis.
///
/// A mapping is valid when all three chip axes are assigned and the three stage axes used are
/// pairwise distinct, together spanning the full stage frame. Partial or conflicting mappings
/// can be represented (they occur naturally while an operator is still picking assignments) but
/// are rejected by [`AxesMapping::is_valid`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AxesMapping {
    map: HashMap<Axis, (Direction, Axis)>,
}

/// Error raised when a raw direction value is not one of +1/-1.
#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid axis direction, expected +1 or -1")]
pub struct InvalidDirectionError(pub i8);

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Axis {
    /// All axes in index order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// The matrix/vector index of this axis.
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X-Axis"),
            Axis::Y => write!(f, "Y-Axis"),
            Axis::Z => write!(f, "Z-Axis"),
        }
    }
}

impl Direction {
    /// The sign multiplier of this direction.
    pub fn value(&self) -> f64 {
        match self {
            Direction::Positive => 1.0,
            Direction::Negative => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Positive => write!(f, "Positive"),
            Direction::Negative => write!(f, "Negative"),
        }
    }
}

impl TryFrom<i8> for Direction {
    type Error = InvalidDirectionError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Positive),
            -1 => Ok(Direction::Negative),
            other => Err(InvalidDirectionError(other)),
        }
    }
}

impl AxesMapping {
    /// Create an empty mapping with no axes assigned.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Create the identity mapping: each chip axis to its same-named stage axis, positive.
    pub fn identity() -> Self {
        let mut mapping = Self::new();
        for axis in &Axis::ALL {
            mapping.assign(*axis, Direction::Positive, *axis);
        }
        mapping
    }

    /// Assign a chip axis to a signed stage axis, replacing any previous assignment of that
    /// chip axis.
    pub fn assign(&mut self, chip_axis: Axis, direction: Direction, stage_axis: Axis) {
        self.map.insert(chip_axis, (direction, stage_axis));
    }

    /// The signed stage axis currently assigned to a chip axis, if any.
    pub fn mapping_for(&self, chip_axis: Axis) -> Option<(Direction, Axis)> {
        self.map.get(&chip_axis).copied()
    }

    /// Returns a decision whether this mapping is valid.
    ///
    /// The criteria are: every chip axis is assigned, and no stage axis is used twice. Never
    /// fails, this is a pure predicate.
    pub fn is_valid(&self) -> bool {
        if !Axis::ALL.iter().all(|axis| self.map.contains_key(axis)) {
            return false;
        }

        let mut used = [false; 3];
        for (_, stage_axis) in self.map.values() {
            if used[stage_axis.index()] {
                return false;
            }
            used[stage_axis.index()] = true;
        }

        true
    }

    /// Derive the rotation matrix induced by this mapping.
    ///
    /// For chip axis `c` assigned to `(direction d, stage axis s)` the entry `matrix[s][c]` is
    /// the sign of `d`, all other entries are zero. The result is a signed permutation matrix
    /// exactly when [`AxesMapping::is_valid`] holds; for partial mappings the unassigned rows
    /// and columns stay zero.
    pub fn matrix(&self) -> Matrix3<f64> {
        let mut matrix = Matrix3::zeros();

        for (chip_axis, (direction, stage_axis)) in &self.map {
            matrix[(stage_axis.index(), chip_axis.index())] = direction.value();
        }

        matrix
    }
}

impl Default for AxesMapping {
    fn default() -> Self {
        Self::identity()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

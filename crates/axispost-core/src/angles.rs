//! Rotary angle tuples and their determination state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Maximum number of rotary axes on any supported machine
pub const MAX_ROTARY_AXES: usize = 3;

/// Fixed-capacity list of rotary angles, one per machine rotary axis
///
/// Units depend on the producer: the solver works in radians, posted
/// moves carry degrees. Serialized as a plain list of at most
/// `MAX_ROTARY_AXES` values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct AngleTuple {
    values: [f64; MAX_ROTARY_AXES],
    len: usize,
}

impl AngleTuple {
    /// Tuple with `len` zero angles
    pub fn zeros(len: usize) -> Self {
        Self {
            values: [0.0; MAX_ROTARY_AXES],
            len: len.min(MAX_ROTARY_AXES),
        }
    }

    /// Tuple from a slice (extra values beyond three are ignored)
    pub fn from_slice(values: &[f64]) -> Self {
        let mut t = Self::zeros(values.len());
        t.values[..t.len].copy_from_slice(&values[..t.len]);
        t
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.len]
    }

    pub fn get(&self, axis: usize) -> Option<f64> {
        self.as_slice().get(axis).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.as_slice().iter().copied()
    }

    /// Apply `f` to every angle
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        let mut out = *self;
        for v in out.values[..out.len].iter_mut() {
            *v = f(*v);
        }
        out
    }

    /// Pairwise combination with another tuple of the same length
    pub fn zip_map(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut out = *self;
        for i in 0..self.len.min(other.len) {
            out.values[i] = f(self.values[i], other.values[i]);
        }
        out
    }

    pub fn to_degrees(&self) -> Self {
        self.map(f64::to_degrees)
    }

    pub fn to_radians(&self) -> Self {
        self.map(f64::to_radians)
    }

    /// Sum of absolute per-axis differences
    pub fn total_delta(&self, other: &Self) -> f64 {
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| (a - b).abs())
            .sum()
    }

    /// Largest absolute per-axis difference and the axis it occurs on
    pub fn max_delta(&self, other: &Self) -> (usize, f64) {
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| (a - b).abs())
            .enumerate()
            .fold((0, 0.0), |best, (i, d)| if d > best.1 { (i, d) } else { best })
    }

    /// True when every angle matches within `tol`
    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.len == other.len && self.iter().zip(other.iter()).all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl TryFrom<Vec<f64>> for AngleTuple {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.len() > MAX_ROTARY_AXES {
            return Err(format!(
                "angle tuple has {} values, at most {} rotary axes are supported",
                values.len(),
                MAX_ROTARY_AXES
            ));
        }
        Ok(Self::from_slice(&values))
    }
}

impl From<AngleTuple> for Vec<f64> {
    fn from(t: AngleTuple) -> Self {
        t.as_slice().to_vec()
    }
}

impl Index<usize> for AngleTuple {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.as_slice()[index]
    }
}

impl IndexMut<usize> for AngleTuple {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        let len = self.len;
        &mut self.values[..len][index]
    }
}

impl fmt::Display for AngleTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.6}", v)?;
        }
        write!(f, ")")
    }
}

/// Whether all rotary angles of a move are uniquely determined
///
/// At a pole the orientation lies along a rotary axis and that axis' angle
/// is arbitrary. Three-rotary machines only fix the sum or the difference of
/// the two coupled angles, recorded as the equal / opposite cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleState {
    #[default]
    Determined,
    Rot1Undetermined,
    Rot2Undetermined,
    UndeterminedCaseEqual,
    UndeterminedCaseOpposite,
}

impl AngleState {
    pub fn is_determined(&self) -> bool {
        matches!(self, Self::Determined)
    }

    /// Undetermined state for a two-rotary pole on `axis`
    pub fn undetermined_axis(axis: usize) -> Self {
        if axis == 0 {
            Self::Rot1Undetermined
        } else {
            Self::Rot2Undetermined
        }
    }
}

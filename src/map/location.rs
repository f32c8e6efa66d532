use serde::{Deserialize, Serialize};
use std::fmt;

/// A cell on a column-staggered hex grid.
///
/// Odd columns sit half a hex lower than even columns. The same type is used
/// for absolute positions and for rule-relative offsets; the two are combined
/// with [`Location::offset_by`], never with plain component addition.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Axial form of a relative offset: `(q, r)` with `r = y - x/2` (truncating).
    pub fn offset_axial(self) -> (i32, i32) {
        (self.x, self.y - self.x / 2)
    }

    /// Inverse of [`Location::offset_axial`].
    pub fn from_offset_axial(q: i32, r: i32) -> Self {
        Self::new(q, r + q / 2)
    }

    /// Axial form of an absolute position: `(q, r)` with `r = y - floor(x/2)`.
    fn absolute_axial(self) -> (i32, i32) {
        (self.x, self.y - self.x.div_euclid(2))
    }

    fn from_absolute_axial(q: i32, r: i32) -> Self {
        Self::new(q, r + q.div_euclid(2))
    }

    /// Translate this position by a rule-relative offset.
    ///
    /// An offset with an odd `x` lands on the half-shifted neighbouring column
    /// the same way regardless of the parity of the starting column.
    pub fn offset_by(self, offset: Location) -> Location {
        let (q, r) = self.absolute_axial();
        let (dq, dr) = offset.offset_axial();
        Self::from_absolute_axial(q + dq, r + dr)
    }

    /// Exact inverse of [`Location::offset_by`].
    pub fn offset_back(self, offset: Location) -> Location {
        self.offset_by(Location::new(-offset.x, -offset.y))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

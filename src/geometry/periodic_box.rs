//! Axis-aligned periodic simulation box.
//!
//! The box is periodic on all three axes. Node coordinates in a
//! [`FiberNetwork`](crate::core::network::FiberNetwork) are kept *unwrapped*: a node may lie
//! outside the box, and the helpers here translate between periodic images.
//!
//! - **shift** moves a point lying strictly beyond a face by one box length back into the
//!   canonical image.
//! - **unshift** moves a point by at most one box length per axis so it becomes the image
//!   nearest to a reference point (minimum image convention).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Point3;
use crate::geometry::util::{norm, sub};

/// Errors raised when constructing a [`PeriodicBox`].
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum BoxError {
    /// A box size is not finite and strictly positive.
    #[error("Invalid box size {size:?} on axis {axis}; expected finite value > 0")]
    InvalidSize {
        /// Axis index containing the invalid size.
        axis: usize,
        /// Invalid size value.
        size: f64,
    },

    /// A center coordinate is not finite.
    #[error("Non-finite box center {value:?} on axis {axis}")]
    NonFiniteCenter {
        /// Axis index containing the invalid coordinate.
        axis: usize,
        /// Invalid center value.
        value: f64,
    },
}

/// Axis-aligned cuboid with periodic boundaries on all three axes.
///
/// # Examples
///
/// ```
/// use fibernet::geometry::PeriodicBox;
///
/// let domain = PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap();
/// assert_eq!(domain.low(0), -5.0);
/// assert_eq!(domain.high(2), 5.0);
///
/// // Minimum-image distance across the x faces.
/// let d = domain.periodic_distance(&[4.5, 0.0, 0.0], &[-4.5, 0.0, 0.0]);
/// assert!((d - 1.0).abs() < 1e-12);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodicBox {
    center: Point3,
    size: Point3,
}

impl PeriodicBox {
    /// Creates a new periodic box from its center and per-axis size.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::InvalidSize`] if a size is not finite and strictly positive, and
    /// [`BoxError::NonFiniteCenter`] if a center coordinate is not finite.
    pub fn new(center: Point3, size: Point3) -> Result<Self, BoxError> {
        for axis in 0..3 {
            if !center[axis].is_finite() {
                return Err(BoxError::NonFiniteCenter {
                    axis,
                    value: center[axis],
                });
            }
            if !size[axis].is_finite() || size[axis] <= 0.0 {
                return Err(BoxError::InvalidSize {
                    axis,
                    size: size[axis],
                });
            }
        }
        Ok(Self { center, size })
    }

    /// Box center.
    #[must_use]
    pub const fn center(&self) -> Point3 {
        self.center
    }

    /// Per-axis box size.
    #[must_use]
    pub const fn size(&self) -> Point3 {
        self.size
    }

    /// Lower face coordinate along `axis`.
    #[must_use]
    pub fn low(&self, axis: usize) -> f64 {
        self.center[axis] - self.size[axis] / 2.0
    }

    /// Upper face coordinate along `axis`.
    #[must_use]
    pub fn high(&self, axis: usize) -> f64 {
        self.center[axis] + self.size[axis] / 2.0
    }

    /// Box volume.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.size[0] * self.size[1] * self.size[2]
    }

    /// Smallest box edge length.
    ///
    /// Fiber length limits ("one third of the box length") are measured against this value,
    /// which keeps every admissible fiber shorter than half of every period.
    #[must_use]
    pub fn reference_length(&self) -> f64 {
        self.size[0].min(self.size[1]).min(self.size[2])
    }

    /// Returns `true` if `point` lies on the upper face of `axis` within `tolerance`.
    #[must_use]
    pub fn is_on_high_plane(&self, point: &Point3, axis: usize, tolerance: f64) -> bool {
        (self.high(axis) - point[axis]).abs() < tolerance
    }

    /// Returns `true` if `point` lies on the lower face of `axis` within `tolerance`.
    #[must_use]
    pub fn is_on_low_plane(&self, point: &Point3, axis: usize, tolerance: f64) -> bool {
        (self.low(axis) - point[axis]).abs() < tolerance
    }

    /// Per-axis flags telling whether `point` lies on either face of that axis.
    #[must_use]
    pub fn boundary_axes(&self, point: &Point3, tolerance: f64) -> [bool; 3] {
        std::array::from_fn(|axis| {
            self.is_on_high_plane(point, axis, tolerance)
                || self.is_on_low_plane(point, axis, tolerance)
        })
    }

    /// Translates `point` by one box length along every axis on which it lies strictly
    /// beyond a face.
    ///
    /// Returns `true` if any axis was shifted.
    pub fn shift_into_box(&self, point: &mut Point3) -> bool {
        let mut shifted = false;
        for axis in 0..3 {
            if point[axis] > self.high(axis) {
                point[axis] -= self.size[axis];
                shifted = true;
            } else if point[axis] < self.low(axis) {
                point[axis] += self.size[axis];
                shifted = true;
            }
        }
        shifted
    }

    /// Shifts `d` along `axis` by one box length if `d + offset` is more than half a box
    /// length away from `reference`.
    ///
    /// Returns `true` if `d` was modified.
    pub fn unshift_1d(&self, axis: usize, d: &mut f64, reference: f64, offset: f64) -> bool {
        let x = *d + offset;
        let half = 0.5 * self.size[axis];
        if x - reference < -half {
            *d += self.size[axis];
            true
        } else if x - reference > half {
            *d -= self.size[axis];
            true
        } else {
            false
        }
    }

    /// Moves `point` to the periodic image nearest to `reference`, axis by axis.
    pub fn unshift(&self, point: &mut Point3, reference: &Point3) {
        for axis in 0..3 {
            self.unshift_1d(axis, &mut point[axis], reference[axis], 0.0);
        }
    }

    /// Minimum-image difference vector `a - b`.
    #[must_use]
    pub fn periodic_delta(&self, a: &Point3, b: &Point3) -> Point3 {
        let mut image = *a;
        self.unshift(&mut image, b);
        sub(&image, b)
    }

    /// Minimum-image Euclidean distance between `a` and `b`.
    #[must_use]
    pub fn periodic_distance(&self, a: &Point3, b: &Point3) -> f64 {
        norm(&self.periodic_delta(a, b))
    }
}

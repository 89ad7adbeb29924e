//! Vector norm and distance computations on 3D coordinate arrays.

use crate::geometry::Point3;

/// Component-wise difference `a - b`.
#[inline]
#[must_use]
pub fn sub(a: &Point3, b: &Point3) -> Point3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Dot product of two 3D vectors.
#[inline]
#[must_use]
pub fn dot(a: &Point3, b: &Point3) -> f64 {
    a[0].mul_add(b[0], a[1].mul_add(b[1], a[2] * b[2]))
}

/// Sum of squares of the coordinates.
///
/// # Examples
///
/// ```
/// use fibernet::geometry::util::squared_norm;
///
/// assert_eq!(squared_norm(&[1.0, 2.0, 2.0]), 9.0);
/// ```
#[inline]
#[must_use]
pub fn squared_norm(v: &Point3) -> f64 {
    dot(v, v)
}

/// Euclidean (L2) norm of a 3D vector.
///
/// # Examples
///
/// ```
/// use fibernet::geometry::util::norm;
///
/// assert_eq!(norm(&[1.0, 2.0, 2.0]), 3.0);
/// ```
#[inline]
#[must_use]
pub fn norm(v: &Point3) -> f64 {
    squared_norm(v).sqrt()
}

/// Returns `true` if every coordinate of `a` and `b` differs by less than `tolerance`.
///
/// This is the coordinate-wise (L∞) match used for node identity; it is *not* a Euclidean
/// distance test.
///
/// # Examples
///
/// ```
/// use fibernet::geometry::util::coords_match;
///
/// assert!(coords_match(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0 + 1e-9], 1e-7));
/// assert!(!coords_match(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.1], 1e-7));
/// ```
#[inline]
#[must_use]
pub fn coords_match(a: &Point3, b: &Point3, tolerance: f64) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() < tolerance)
}

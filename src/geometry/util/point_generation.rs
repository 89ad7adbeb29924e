//! Random seed point generation and random permutations.
//!
//! All functions draw from a caller-supplied generator so that a single seeded stream can be
//! shared across the whole pipeline in a fixed draw order.

use rand::Rng;
use thiserror::Error;

use crate::geometry::{PeriodicBox, Point3};

/// Error type for random point generation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RandomPointGenerationError {
    /// Zero points were requested where at least one is required.
    #[error("Invalid point count: {n_points}, at least one point is required")]
    InvalidPointCount {
        /// Requested number of points.
        n_points: usize,
    },
}

/// Generate `n_points` seed points uniformly distributed inside `domain`.
///
/// For each point the x, y and z coordinates are drawn in that order as
/// `low + u * (high - low)` with `u` uniform in `[0, 1)`.
///
/// # Errors
///
/// Returns [`RandomPointGenerationError::InvalidPointCount`] if `n_points` is zero.
///
/// # Examples
///
/// ```
/// use fibernet::geometry::PeriodicBox;
/// use fibernet::geometry::util::generate_seed_points;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let domain = PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap();
/// let mut rng = StdRng::seed_from_u64(42);
/// let seeds = generate_seed_points(&domain, 50, &mut rng).unwrap();
/// assert_eq!(seeds.len(), 50);
/// assert!(seeds.iter().all(|p| p.iter().all(|c| (-5.0..5.0).contains(c))));
/// ```
pub fn generate_seed_points<R: Rng + ?Sized>(
    domain: &PeriodicBox,
    n_points: usize,
    rng: &mut R,
) -> Result<Vec<Point3>, RandomPointGenerationError> {
    if n_points == 0 {
        return Err(RandomPointGenerationError::InvalidPointCount { n_points });
    }

    let mut points = Vec::with_capacity(n_points);
    for _ in 0..n_points {
        let point: Point3 = std::array::from_fn(|axis| {
            let (low, high) = (domain.low(axis), domain.high(axis));
            rng.random::<f64>().mul_add(high - low, low)
        });
        points.push(point);
    }
    Ok(points)
}

/// Generate seed points with a dedicated seeded generator for reproducible results.
///
/// # Errors
///
/// Returns [`RandomPointGenerationError::InvalidPointCount`] if `n_points` is zero.
///
/// # Examples
///
/// ```
/// use fibernet::geometry::PeriodicBox;
/// use fibernet::geometry::util::generate_seed_points_seeded;
///
/// let domain = PeriodicBox::new([0.0; 3], [1.0; 3]).unwrap();
/// let a = generate_seed_points_seeded(&domain, 20, 7).unwrap();
/// let b = generate_seed_points_seeded(&domain, 20, 7).unwrap();
/// assert_eq!(a, b);
/// ```
pub fn generate_seed_points_seeded(
    domain: &PeriodicBox,
    n_points: usize,
    seed: u64,
) -> Result<Vec<Point3>, RandomPointGenerationError> {
    use rand::SeedableRng;

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    generate_seed_points(domain, n_points, &mut rng)
}

/// Random permutation of `0..n` (inside-out Fisher–Yates).
///
/// # Examples
///
/// ```
/// use fibernet::geometry::util::random_permutation;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let mut order = random_permutation(10, &mut rng);
/// order.sort_unstable();
/// assert_eq!(order, (0..10).collect::<Vec<_>>());
/// ```
pub fn random_permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order = Vec::with_capacity(n);
    for i in 0..n {
        let j = rng.random_range(0..=i);
        if j == i {
            order.push(i);
        } else {
            order.push(order[j]);
            order[j] = i;
        }
    }
    order
}

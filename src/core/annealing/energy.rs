//! Target distributions and the histogram goodness-of-fit energy.

use std::f64::consts::SQRT_2;

use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;

use super::histogram::BinSpec;

/// A cumulative distribution the annealed histogram is driven toward.
pub trait TargetDistribution {
    /// Cumulative probability at `x`.
    fn cdf(&self, x: f64) -> f64;
}

/// Log-normal distribution of normalized fiber lengths.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogNormal {
    /// Mean of `ln x`.
    pub mu: f64,
    /// Standard deviation of `ln x`.
    pub sigma: f64,
}

impl Default for LogNormal {
    fn default() -> Self {
        Self {
            mu: -0.3,
            sigma: 0.68,
        }
    }
}

impl TargetDistribution for LogNormal {
    fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        0.5f64.mul_add(erf((x.ln() - self.mu) / (self.sigma * SQRT_2)), 0.5)
    }
}

/// Even polynomial in `1 - x` describing the cosine of the angle between adjacent fibers.
///
/// `F(x) = 1 - b1 p - b2 p^2 - b3 p^3` with `p = (1 - x)^2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CosinePolynomial {
    /// Coefficient of `(1 - x)^2`.
    pub b1: f64,
    /// Coefficient of `(1 - x)^4`.
    pub b2: f64,
    /// Coefficient of `(1 - x)^6`.
    pub b3: f64,
}

impl Default for CosinePolynomial {
    fn default() -> Self {
        Self {
            b1: 0.646_666_666_666_667 / 2.0,
            b2: -0.126_666_666_666_667 / 4.0,
            b3: 0.020_000_000_000_000_1 / 6.0,
        }
    }
}

impl TargetDistribution for CosinePolynomial {
    fn cdf(&self, x: f64) -> f64 {
        let p = (1.0 - x) * (1.0 - x);
        1.0 - p * self.b3.mul_add(p, self.b2).mul_add(p, self.b1)
    }
}

/// Cramér-von-Mises type distance between binned samples and `target`, from counts alone.
///
/// Every sample in bin `p` is placed at the bin center `x_p`. With `M` the number of samples
/// in lower bins and `S = M - n F(x_p) - 1/2`, a bin holding `c` samples contributes
/// `c ((c + 1)(6 S + 2 c + 1) / 6 + S^2)`; the sum is divided by `n^2`.
///
/// # Examples
///
/// ```
/// use fibernet::core::annealing::energy::{CosinePolynomial, histogram_energy};
/// use fibernet::core::annealing::histogram::BinSpec;
///
/// assert_eq!(histogram_energy(&[0; 1000], &BinSpec::COSINE, &CosinePolynomial::default()), 0.0);
/// ```
#[must_use]
pub fn histogram_energy(counts: &[u32], spec: &BinSpec, target: &impl TargetDistribution) -> f64 {
    let n: f64 = counts.iter().map(|&c| f64::from(c)).sum();
    if n == 0.0 {
        return 0.0;
    }
    let mut below = 0.0;
    let mut energy = 0.0;
    for (bin, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let c = f64::from(count);
        let s = n.mul_add(-target.cdf(spec.center(bin)), below) - 0.5;
        energy += c * ((c + 1.0) * 2.0f64.mul_add(c, 6.0f64.mul_add(s, 1.0)) / 6.0 + s * s);
        below += c;
    }
    energy / (n * n)
}

/// Metropolis criterion: downhill moves are always accepted, uphill ones with
/// probability `exp(-delta / temperature)`.
///
/// A uniform number is drawn from `rng` only when `delta >= 0`.
pub fn metropolis_accept<R: Rng + ?Sized>(delta: f64, temperature: f64, rng: &mut R) -> bool {
    if delta < 0.0 {
        return true;
    }
    rng.random::<f64>() < (-delta / temperature).exp()
}

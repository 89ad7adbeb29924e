//! Valency adaptation: reshapes the node-degree histogram of the tracked nodes.
//!
//! Starting from a network whose tracked nodes are (mostly) degree 4, three phases move the
//! degree distribution toward the target fractions of a collagen network:
//!
//! 1. **Degree 6**: a random degree-4 center receives two new edges to nearby degree-4
//!    partners. The center becomes degree 6, both partners degree 5.
//! 2. **Degree 5**: new edges between pairs of nearby degree-4 nodes.
//! 3. **Degree 3**: in a random order (two passes), an edge between two degree-4 nodes is
//!    removed, dropping both to degree 3.
//!
//! Only the topology changes; positions are left untouched. On exit tombstoned edges are
//! compacted and the index rebuilt.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::search::{SearchExhausted, bounded_search};
use crate::core::collections::{EdgeId, NodeId};
use crate::core::network::FiberNetwork;
use crate::geometry::PeriodicBox;
use crate::geometry::util::random_permutation;

/// Errors raised by [`adapt_valency`].
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ValencyError {
    /// A target fraction is negative or not finite.
    #[error("Invalid target fraction {value} for degree {degree}")]
    InvalidFraction {
        /// Degree whose fraction is invalid.
        degree: usize,
        /// The invalid value.
        value: f64,
    },

    /// Target fractions add up to more than one.
    #[error("Target fractions sum to {sum}, expected at most 1")]
    FractionsExceedOne {
        /// Sum of all fractions.
        sum: f64,
    },
}

/// Target fractions of tracked nodes per degree.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValencyTargets {
    /// Fraction of degree-3 nodes.
    pub z3: f64,
    /// Fraction of degree-4 nodes (receives the rounding remainder).
    pub z4: f64,
    /// Fraction of degree-5 nodes.
    pub z5: f64,
    /// Fraction of degree-6 nodes.
    pub z6: f64,
}

impl Default for ValencyTargets {
    /// Degree distribution of reconstructed collagen networks.
    fn default() -> Self {
        Self {
            z3: 0.72,
            z4: 0.20,
            z5: 0.054,
            z6: 0.011,
        }
    }
}

impl ValencyTargets {
    /// All fractions zero except degree 4, which leaves a network untouched.
    #[must_use]
    pub const fn unchanged() -> Self {
        Self {
            z3: 0.0,
            z4: 1.0,
            z5: 0.0,
            z6: 0.0,
        }
    }

    /// Checks that every fraction is finite, non-negative and that they sum to at most 1.
    ///
    /// # Errors
    ///
    /// Returns [`ValencyError`] describing the first violated condition.
    pub fn validate(&self) -> Result<(), ValencyError> {
        for (degree, value) in [(3, self.z3), (4, self.z4), (5, self.z5), (6, self.z6)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValencyError::InvalidFraction { degree, value });
            }
        }
        let sum = self.z3 + self.z4 + self.z5 + self.z6;
        if sum > 1.0 + 1e-12 {
            return Err(ValencyError::FractionsExceedOne { sum });
        }
        Ok(())
    }

    /// Floor-based node quotas for `node_count` tracked nodes.
    ///
    /// # Examples
    ///
    /// ```
    /// use fibernet::core::algorithms::valency::ValencyTargets;
    ///
    /// let quotas = ValencyTargets::default().quotas(1000);
    /// assert_eq!((quotas.z3, quotas.z5, quotas.z6), (720, 54, 11));
    /// assert_eq!(quotas.z4, 215);
    /// ```
    #[must_use]
    pub fn quotas(&self, node_count: usize) -> ValencyQuotas {
        let z3 = floor_count(self.z3, node_count);
        let z5 = floor_count(self.z5, node_count);
        let z6 = floor_count(self.z6, node_count);
        let z4 = node_count.saturating_sub(z3 + z5 + z6);
        ValencyQuotas { z3, z4, z5, z6 }
    }
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_count(fraction: f64, node_count: usize) -> usize {
    (fraction * node_count as f64).floor().max(0.0) as usize
}

/// Node counts per degree derived from [`ValencyTargets`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValencyQuotas {
    /// Degree-3 nodes.
    pub z3: usize,
    /// Degree-4 nodes.
    pub z4: usize,
    /// Degree-5 nodes.
    pub z5: usize,
    /// Degree-6 nodes.
    pub z6: usize,
}

/// Options for [`adapt_valency`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValencyConfig {
    /// Target degree fractions.
    pub targets: ValencyTargets,
    /// Random draws allowed per node search before the phase gives up.
    pub max_draws: usize,
    /// Incident edges tried per node during degree-3 creation.
    pub removal_tries: usize,
    /// Passes over the random node order during degree-3 creation.
    pub removal_passes: usize,
    /// Longest new fiber, as a fraction of the reference box length.
    pub max_length_fraction: f64,
}

impl Default for ValencyConfig {
    fn default() -> Self {
        Self {
            targets: ValencyTargets::default(),
            max_draws: 100_000,
            removal_tries: 100,
            removal_passes: 2,
            max_length_fraction: 1.0 / 3.0,
        }
    }
}

/// Phases of [`adapt_valency`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValencyPhase {
    /// Degree-6 creation.
    Degree6,
    /// Degree-5 creation.
    Degree5,
    /// Degree-3 creation.
    Degree3,
}

/// Outcome of [`adapt_valency`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValencyReport {
    /// Quotas the phases aimed for.
    pub quotas: ValencyQuotas,
    /// Centers raised to degree 6.
    pub degree6_centers: usize,
    /// Nodes raised to degree 5.
    pub degree5_tally: usize,
    /// Nodes lowered to degree 3.
    pub degree3_tally: usize,
    /// Edges added by the degree-6 and degree-5 phases.
    pub edges_added: usize,
    /// Edges removed by the degree-3 phase.
    pub edges_removed: usize,
    /// Phases stopped early because a search ran out of draws.
    pub exhausted: Vec<ValencyPhase>,
}

/// Adapts the degree distribution of the tracked nodes toward `config.targets`.
///
/// Search exhaustion stops the affected phase, logs a warning and is recorded in
/// [`ValencyReport::exhausted`]; it is not an error.
///
/// # Errors
///
/// Returns [`ValencyError`] if the targets are invalid.
pub fn adapt_valency<R: Rng + ?Sized>(
    network: &mut FiberNetwork,
    domain: &PeriodicBox,
    config: &ValencyConfig,
    rng: &mut R,
) -> Result<ValencyReport, ValencyError> {
    config.targets.validate()?;

    let tracked = network.tracked_nodes().to_vec();
    let mut report = ValencyReport {
        quotas: config.targets.quotas(tracked.len()),
        ..ValencyReport::default()
    };
    let adapter = Adapter {
        domain,
        config,
        tracked: &tracked,
        max_length: config.max_length_fraction * domain.reference_length(),
    };

    if let Err(exhausted) = adapter.create_degree6(network, rng, &mut report) {
        tracing::warn!(%exhausted, "degree-6 creation stopped early");
        report.exhausted.push(ValencyPhase::Degree6);
    }
    if let Err(exhausted) = adapter.create_degree5(network, rng, &mut report) {
        tracing::warn!(%exhausted, "degree-5 creation stopped early");
        report.exhausted.push(ValencyPhase::Degree5);
    }
    adapter.create_degree3(network, rng, &mut report);

    network.compact_edges();

    tracing::info!(
        z6 = report.degree6_centers,
        z5 = report.degree5_tally,
        z3 = report.degree3_tally,
        added = report.edges_added,
        removed = report.edges_removed,
        "valency adaptation complete"
    );
    Ok(report)
}

struct Adapter<'a> {
    domain: &'a PeriodicBox,
    config: &'a ValencyConfig,
    tracked: &'a [NodeId],
    max_length: f64,
}

impl Adapter<'_> {
    fn draw<R, F>(&self, rng: &mut R, accept: F) -> Result<NodeId, SearchExhausted>
    where
        R: Rng + ?Sized,
        F: Fn(NodeId) -> bool,
    {
        if self.tracked.is_empty() {
            return Err(SearchExhausted { attempts: 0 });
        }
        bounded_search(self.config.max_draws, |_| {
            let node = self.tracked[rng.random_range(0..self.tracked.len())];
            accept(node).then_some(node)
        })
    }

    fn draw_center<R: Rng + ?Sized>(
        &self,
        network: &FiberNetwork,
        rng: &mut R,
    ) -> Result<NodeId, SearchExhausted> {
        self.draw(rng, |node| network.degree(node) == 4)
    }

    /// A distinct, non-adjacent degree-4 node within the fiber length limit of `center`.
    fn find_partner<R: Rng + ?Sized>(
        &self,
        network: &FiberNetwork,
        center: NodeId,
        rng: &mut R,
    ) -> Result<NodeId, SearchExhausted> {
        let origin = network.position(center);
        self.draw(rng, |node| {
            node != center
                && network.degree(node) == 4
                && !network.contains_edge(center, node)
                && self.domain.periodic_distance(&origin, &network.position(node)) < self.max_length
        })
    }

    fn create_degree6<R: Rng + ?Sized>(
        &self,
        network: &mut FiberNetwork,
        rng: &mut R,
        report: &mut ValencyReport,
    ) -> Result<(), SearchExhausted> {
        while report.degree6_centers < report.quotas.z6 {
            let center = self.draw_center(network, rng)?;
            for _ in 0..2 {
                let partner = self.find_partner(network, center, rng)?;
                network.add_edge(center, partner);
                report.edges_added += 1;
                report.degree5_tally += 1;
            }
            report.degree6_centers += 1;
        }
        Ok(())
    }

    fn create_degree5<R: Rng + ?Sized>(
        &self,
        network: &mut FiberNetwork,
        rng: &mut R,
        report: &mut ValencyReport,
    ) -> Result<(), SearchExhausted> {
        while report.degree5_tally < report.quotas.z5 {
            let center = self.draw_center(network, rng)?;
            let partner = self.find_partner(network, center, rng)?;
            network.add_edge(center, partner);
            report.edges_added += 1;
            report.degree5_tally += 2;
        }
        Ok(())
    }

    fn create_degree3<R: Rng + ?Sized>(
        &self,
        network: &mut FiberNetwork,
        rng: &mut R,
        report: &mut ValencyReport,
    ) {
        if report.quotas.z3 == 0 || self.tracked.is_empty() {
            return;
        }
        let order = random_permutation(self.tracked.len(), rng);

        'passes: for _ in 0..self.config.removal_passes {
            for &index in &order {
                if report.degree3_tally >= report.quotas.z3 {
                    break 'passes;
                }
                let node = self.tracked[index];
                if network.degree(node) != 4 {
                    continue;
                }
                let found: Result<EdgeId, _> = bounded_search(self.config.removal_tries, |_| {
                    let incident = network.incident_edges(node);
                    let edge = incident[rng.random_range(0..incident.len())];
                    let other = network.edge(edge).other(node)?;
                    (network.degree(other) == 4).then_some(edge)
                });
                if let Ok(edge) = found {
                    network.mark_edge_removed(edge);
                    report.edges_removed += 1;
                    report.degree3_tally += 2;
                }
            }
        }

        if report.degree3_tally < report.quotas.z3 {
            tracing::warn!(
                reached = report.degree3_tally,
                quota = report.quotas.z3,
                "degree-3 quota not reached"
            );
            report.exhausted.push(ValencyPhase::Degree3);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Periodic square lattice in the z = 0 plane: every node has degree 4.
    fn lattice(k: usize, spacing: f64) -> (FiberNetwork, PeriodicBox) {
        let size = spacing * k as f64;
        let domain = PeriodicBox::new([0.0; 3], [size, size, size]).unwrap();
        let id = |i: usize, j: usize| (i % k) * k + (j % k);
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for i in 0..k {
            for j in 0..k {
                nodes.push([
                    (i as f64 + 0.5).mul_add(spacing, -size / 2.0),
                    (j as f64 + 0.5).mul_add(spacing, -size / 2.0),
                    0.0,
                ]);
                edges.push([id(i, j), id(i + 1, j)]);
                edges.push([id(i, j), id(i, j + 1)]);
            }
        }
        let mut network = FiberNetwork::from_parts(nodes, edges).unwrap();
        network.set_tracked_nodes((0..k * k).collect());
        (network, domain)
    }

    #[test]
    fn test_quotas_assign_remainder_to_degree4() {
        let quotas = ValencyTargets::default().quotas(10);
        assert_eq!(quotas, ValencyQuotas { z3: 7, z4: 3, z5: 0, z6: 0 });
        let total = ValencyTargets::default().quotas(977);
        assert_eq!(total.z3 + total.z4 + total.z5 + total.z6, 977);
    }

    #[test]
    fn test_invalid_targets_are_rejected() {
        let negative = ValencyTargets {
            z5: -0.1,
            ..ValencyTargets::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(ValencyError::InvalidFraction { degree: 5, .. })
        ));
        let too_many = ValencyTargets {
            z3: 0.9,
            ..ValencyTargets::default()
        };
        assert!(matches!(
            too_many.validate(),
            Err(ValencyError::FractionsExceedOne { .. })
        ));
    }

    #[test]
    fn test_zero_quotas_leave_network_unchanged() {
        let (mut network, domain) = lattice(6, 2.0);
        let before = network.clone();
        let config = ValencyConfig {
            targets: ValencyTargets::unchanged(),
            ..ValencyConfig::default()
        };
        let report =
            adapt_valency(&mut network, &domain, &config, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(network, before);
        assert_eq!(report.edges_added + report.edges_removed, 0);
    }

    #[test]
    fn test_default_targets_on_lattice() {
        let (mut network, domain) = lattice(10, 1.2);
        let edges_before = network.edge_count();
        let report = adapt_valency(
            &mut network,
            &domain,
            &ValencyConfig::default(),
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();
        network.validate().unwrap();

        assert_eq!(report.quotas, ValencyQuotas { z3: 72, z4: 22, z5: 5, z6: 1 });
        let histogram = network.degree_histogram();
        assert_eq!(histogram.get(&6).copied().unwrap_or(0), report.degree6_centers);
        assert_eq!(report.degree6_centers, 1);
        assert_eq!(histogram.get(&5).copied().unwrap_or(0), report.degree5_tally);
        assert_eq!(histogram.get(&3).copied().unwrap_or(0), report.degree3_tally);
        assert!(report.degree3_tally <= 72);
        assert_eq!(
            network.edge_count(),
            edges_before + report.edges_added - report.edges_removed
        );
        assert!(!report.exhausted.contains(&ValencyPhase::Degree6));
        assert!(!report.exhausted.contains(&ValencyPhase::Degree5));
        assert_eq!(
            report.exhausted.contains(&ValencyPhase::Degree3),
            report.degree3_tally < 72
        );
    }

    #[test]
    fn test_positions_never_change() {
        let (mut network, domain) = lattice(8, 1.0);
        let positions = network.nodes().to_vec();
        adapt_valency(
            &mut network,
            &domain,
            &ValencyConfig::default(),
            &mut StdRng::seed_from_u64(3),
        )
        .unwrap();
        assert_eq!(network.nodes(), positions.as_slice());
    }

    #[test]
    fn test_exhaustion_is_reported_not_fatal() {
        // Degree-4 nodes exist, but every fiber length limit is too short for a partner.
        let (mut network, domain) = lattice(6, 2.0);
        let config = ValencyConfig {
            max_length_fraction: 1e-6,
            max_draws: 50,
            ..ValencyConfig::default()
        };
        let report =
            adapt_valency(&mut network, &domain, &config, &mut StdRng::seed_from_u64(5)).unwrap();
        assert!(report.exhausted.contains(&ValencyPhase::Degree5));
        assert_eq!(report.edges_added, 0);
        network.validate().unwrap();
    }
}

//! Simulated annealing of fiber positions and connectivity.
//!
//! The engine drives two empirical distributions toward analytic targets:
//!
//! - normalized fiber lengths, toward a [`LogNormal`] CDF;
//! - cosines of the angles between fibers sharing a node, toward a [`CosinePolynomial`] CDF.
//!
//! Each iteration proposes moves until one is accepted or the sub-iteration budget runs out.
//! A move mutates the network speculatively, rebins only the affected samples, and is then
//! accepted by the Metropolis criterion or reverted from a one-step snapshot. The temperature
//! follows a power-law schedule.
//!
//! # Examples
//!
//! ```
//! use fibernet::core::annealing::{AnnealingConfig, anneal};
//! use fibernet::core::network::FiberNetwork;
//! use fibernet::geometry::PeriodicBox;
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let domain = PeriodicBox::new([0.0; 3], [6.0; 3]).unwrap();
//! let mut network = FiberNetwork::from_parts(
//!     vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
//!     [[0, 1], [0, 2], [0, 3], [1, 2]],
//! )
//! .unwrap();
//! network.set_tracked_nodes(vec![0, 1, 2, 3]);
//!
//! let config = AnnealingConfig { max_iterations: 50, ..AnnealingConfig::default() };
//! let report = anneal(&mut network, &domain, &config, &mut StdRng::seed_from_u64(1)).unwrap();
//! assert!(report.iterations <= 50);
//! assert_eq!(network.edge_count(), 4);
//! ```

pub mod energy;
pub mod histogram;
mod moves;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::collections::{EdgeId, NodeId};
use crate::core::network::FiberNetwork;
use crate::geometry::{PeriodicBox, Point3};

pub use energy::{
    CosinePolynomial, LogNormal, TargetDistribution, histogram_energy, metropolis_accept,
};
pub use histogram::{BinSpec, CosineBins, LengthBins};

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised by [`anneal`].
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum AnnealingError {
    /// A numeric parameter is out of its valid range.
    #[error("Invalid annealing parameter {name} = {value}")]
    InvalidParameter {
        /// Name of the configuration field.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// No pair of edges eligible for recombination was found.
    #[error("No recombination candidate found in {attempts} attempts")]
    RecombinationExhausted {
        /// Number of candidate draws made.
        attempts: usize,
    },
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// The two kinds of move the engine can propose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveKind {
    /// Displace one node.
    Relocation,
    /// Swap the endpoints of two nearby edges.
    Recombination,
}

/// How the move kind is chosen for each iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum MovePolicy {
    /// Node relocation only.
    #[default]
    RelocationOnly,
    /// Edge recombination only.
    RecombinationOnly,
    /// Recombination with the given probability, relocation otherwise.
    Mixed {
        /// Probability of proposing a recombination.
        recombination_probability: f64,
    },
}

impl MovePolicy {
    /// Picks the move kind for the next iteration; only [`MovePolicy::Mixed`] draws from `rng`.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> MoveKind {
        match *self {
            Self::RelocationOnly => MoveKind::Relocation,
            Self::RecombinationOnly => MoveKind::Recombination,
            Self::Mixed {
                recombination_probability,
            } => {
                if rng.random::<f64>() < recombination_probability {
                    MoveKind::Recombination
                } else {
                    MoveKind::Relocation
                }
            }
        }
    }
}

/// Parameters of [`anneal`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnealingConfig {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Move proposals per iteration before giving up on it.
    pub max_subiterations: usize,
    /// Both energies at or below this value stop the run.
    pub tolerance: f64,
    /// Starting temperature.
    pub initial_temperature: f64,
    /// Temperature factor per cooling interval.
    pub decay_rate: f64,
    /// Iterations between temperature updates.
    pub cooling_interval: usize,
    /// Iterations between trace records.
    pub trace_interval: usize,
    /// Largest per-coordinate relocation, as a fraction of the reference box length.
    pub max_step_fraction: f64,
    /// Longest allowed fiber, as a fraction of the reference box length.
    pub max_length_fraction: f64,
    /// Weight of the length energy.
    pub length_weight: f64,
    /// Weight of the cosine energy.
    pub cosine_weight: f64,
    /// Target distribution of normalized lengths.
    pub length_target: LogNormal,
    /// Target distribution of cosines.
    pub cosine_target: CosinePolynomial,
    /// Length binning.
    pub length_bins: BinSpec,
    /// Cosine binning.
    pub cosine_bins: BinSpec,
    /// Move selection.
    pub move_policy: MovePolicy,
    /// Candidate draws allowed when searching for a recombination partner.
    pub recombination_budget: usize,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            max_subiterations: 100,
            tolerance: 0.01,
            initial_temperature: 0.05,
            decay_rate: 0.95,
            cooling_interval: 1000,
            trace_interval: 1000,
            max_step_fraction: 0.05,
            max_length_fraction: 1.0 / 3.0,
            length_weight: 1.0,
            cosine_weight: 1.0,
            length_target: LogNormal::default(),
            cosine_target: CosinePolynomial::default(),
            length_bins: BinSpec::LENGTH,
            cosine_bins: BinSpec::COSINE,
            move_policy: MovePolicy::default(),
            recombination_budget: 1_000_000,
        }
    }
}

impl AnnealingConfig {
    /// Checks ranges of all numeric parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AnnealingError::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<(), AnnealingError> {
        let positive = [
            ("initial_temperature", self.initial_temperature),
            ("decay_rate", self.decay_rate),
            ("max_step_fraction", self.max_step_fraction),
            ("max_length_fraction", self.max_length_fraction),
            ("length_target.sigma", self.length_target.sigma),
            ("length_bins.width", self.length_bins.width),
            ("cosine_bins.width", self.cosine_bins.width),
        ];
        let non_negative = [
            ("tolerance", self.tolerance),
            ("length_weight", self.length_weight),
            ("cosine_weight", self.cosine_weight),
        ];
        let counts = [
            ("cooling_interval", self.cooling_interval),
            ("trace_interval", self.trace_interval),
            ("length_bins.bins", self.length_bins.bins),
            ("cosine_bins.bins", self.cosine_bins.bins),
        ];

        if let Some(&(name, value)) = positive
            .iter()
            .find(|(_, v)| !v.is_finite() || *v <= 0.0)
        {
            return Err(AnnealingError::InvalidParameter { name, value });
        }
        if let Some(&(name, value)) = non_negative
            .iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(AnnealingError::InvalidParameter { name, value });
        }
        if let Some(&(name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(AnnealingError::InvalidParameter { name, value: 0.0 });
        }
        if self.decay_rate > 1.0 {
            return Err(AnnealingError::InvalidParameter {
                name: "decay_rate",
                value: self.decay_rate,
            });
        }
        if let MovePolicy::Mixed {
            recombination_probability: p,
        } = self.move_policy
            && !(0.0..=1.0).contains(&p)
        {
            return Err(AnnealingError::InvalidParameter {
                name: "move_policy.recombination_probability",
                value: p,
            });
        }
        Ok(())
    }

    /// Temperature after `iteration` iterations under the power-law schedule.
    ///
    /// # Examples
    ///
    /// ```
    /// use fibernet::core::annealing::AnnealingConfig;
    ///
    /// let config = AnnealingConfig::default();
    /// assert_eq!(config.temperature_at(0), 0.05);
    /// assert!((config.temperature_at(2000) - 0.05 * 0.95 * 0.95).abs() < 1e-15);
    /// ```
    #[must_use]
    pub fn temperature_at(&self, iteration: usize) -> f64 {
        self.initial_temperature
            * self
                .decay_rate
                .powf(iteration as f64 / self.cooling_interval as f64)
    }
}

// =============================================================================
// REPORTING
// =============================================================================

/// Energies and temperature at one point of the run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Iteration index.
    pub iteration: usize,
    /// Temperature in effect.
    pub temperature: f64,
    /// Length energy.
    pub length_energy: f64,
    /// Cosine energy.
    pub cosine_energy: f64,
    /// Weighted sum of both energies.
    pub total_energy: f64,
}

/// The sampled distributions at one point of the run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    /// Normalized length of every fiber.
    pub normalized_lengths: Vec<f64>,
    /// One bin-center value per fiber pair sharing a node.
    pub cosine_samples: Vec<f64>,
    /// Length energy.
    pub length_energy: f64,
    /// Cosine energy.
    pub cosine_energy: f64,
}

/// Summary of an annealing run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnealingReport {
    /// Iterations performed.
    pub iterations: usize,
    /// Whether both energies ended at or below the tolerance.
    pub converged: bool,
    /// Temperature at the end of the run.
    pub final_temperature: f64,
    /// Length normalization factor `(movable nodes / volume)^(1/3)`.
    pub length_scale: f64,
    /// Accepted relocations.
    pub relocations_accepted: usize,
    /// Accepted recombinations.
    pub recombinations_accepted: usize,
    /// Proposals rejected by the Metropolis criterion.
    pub metropolis_rejections: usize,
    /// Proposals that violated the length limit or would duplicate an edge.
    pub infeasible_proposals: usize,
    /// Iterations whose sub-iteration budget ran out without an accepted move.
    pub stalled_iterations: usize,
    /// Periodic energy records.
    pub trace: Vec<TraceRecord>,
    /// Distributions before the first iteration.
    pub initial: DistributionSnapshot,
    /// Distributions after the last iteration.
    pub last: DistributionSnapshot,
}

/// Result of a single move proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move was kept.
    Accepted,
    /// The move was evaluated and reverted by the Metropolis criterion.
    Rejected,
    /// The move violated a constraint and was undone before evaluation.
    Infeasible,
}

// =============================================================================
// ENGINE
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Energies {
    length: f64,
    cosine: f64,
}

impl Energies {
    fn total(self, config: &AnnealingConfig) -> f64 {
        config
            .length_weight
            .mul_add(self.length, config.cosine_weight * self.cosine)
    }
}

struct Annealer<'a, R: Rng + ?Sized> {
    network: &'a mut FiberNetwork,
    domain: &'a PeriodicBox,
    config: &'a AnnealingConfig,
    rng: &'a mut R,
    movable: Vec<NodeId>,
    max_step: f64,
    max_length: f64,
    temperature: f64,
    position_backup: Vec<Point3>,
    edge_backup: Vec<[NodeId; 2]>,
    lengths: LengthBins,
    cosines: CosineBins,
    energies: Energies,
    report: AnnealingReport,
}

impl<'a, R: Rng + ?Sized> Annealer<'a, R> {
    fn new(
        network: &'a mut FiberNetwork,
        domain: &'a PeriodicBox,
        config: &'a AnnealingConfig,
        rng: &'a mut R,
    ) -> Self {
        if network.live_edge_count() != network.edge_count() {
            network.compact_edges();
        }
        let movable: Vec<NodeId> = if network.tracked_nodes().is_empty() {
            (0..network.node_count())
                .filter(|&n| network.degree(n) > 0)
                .collect()
        } else {
            network.tracked_nodes().to_vec()
        };
        let scale = (movable.len() as f64 / domain.volume()).cbrt();
        let lengths = LengthBins::new(network, domain, config.length_bins, scale);
        let cosines = CosineBins::new(network, domain, config.cosine_bins);
        let reference = domain.reference_length();

        let mut annealer = Self {
            movable,
            max_step: config.max_step_fraction * reference,
            max_length: config.max_length_fraction * reference,
            temperature: config.initial_temperature,
            position_backup: network.nodes().to_vec(),
            edge_backup: network.edges().iter().map(|e| e.endpoints()).collect(),
            lengths,
            cosines,
            energies: Energies::default(),
            report: AnnealingReport {
                length_scale: scale,
                ..AnnealingReport::default()
            },
            network,
            domain,
            config,
            rng,
        };
        annealer.energies = annealer.evaluate();
        annealer.report.initial = annealer.snapshot();
        annealer
    }

    fn evaluate(&self) -> Energies {
        Energies {
            length: histogram_energy(
                self.lengths.histogram().counts(),
                self.lengths.spec(),
                &self.config.length_target,
            ),
            cosine: histogram_energy(
                self.cosines.histogram().counts(),
                self.cosines.spec(),
                &self.config.cosine_target,
            ),
        }
    }

    fn snapshot(&self) -> DistributionSnapshot {
        DistributionSnapshot {
            normalized_lengths: self.lengths.samples(self.network, self.domain),
            cosine_samples: self.cosines.samples(),
            length_energy: self.energies.length,
            cosine_energy: self.energies.cosine,
        }
    }

    fn converged(&self) -> bool {
        self.energies.length <= self.config.tolerance
            && self.energies.cosine <= self.config.tolerance
    }

    /// Rebins the affected samples, then commits or reverts them by the Metropolis criterion.
    ///
    /// On `false` the caller must restore the network geometry.
    fn settle(&mut self, nodes: &[NodeId], edges: &[EdgeId]) -> bool {
        for &edge in edges {
            self.lengths.update(edge, self.network, self.domain);
        }
        for &node in nodes {
            self.cosines.update(node, self.network, self.domain);
        }
        let proposed = self.evaluate();
        let delta = proposed.total(self.config) - self.energies.total(self.config);

        if metropolis_accept(delta, self.temperature, self.rng) {
            self.lengths.commit(edges.iter().copied());
            self.cosines.commit(nodes.iter().copied());
            self.energies = proposed;
            true
        } else {
            self.lengths.revert(edges.iter().copied());
            self.cosines.revert(nodes.iter().copied());
            self.report.metropolis_rejections += 1;
            false
        }
    }

    fn iterate(&mut self, kind: MoveKind) -> Result<(), AnnealingError> {
        for _ in 0..self.config.max_subiterations {
            let outcome = match kind {
                MoveKind::Relocation => self.relocate(),
                MoveKind::Recombination => self.recombine()?,
            };
            match outcome {
                MoveOutcome::Accepted => {
                    match kind {
                        MoveKind::Relocation => self.report.relocations_accepted += 1,
                        MoveKind::Recombination => self.report.recombinations_accepted += 1,
                    }
                    return Ok(());
                }
                MoveOutcome::Rejected => {}
                MoveOutcome::Infeasible => self.report.infeasible_proposals += 1,
            }
        }
        self.report.stalled_iterations += 1;
        Ok(())
    }

    fn record(&mut self, iteration: usize) {
        let record = TraceRecord {
            iteration,
            temperature: self.temperature,
            length_energy: self.energies.length,
            cosine_energy: self.energies.cosine,
            total_energy: self.energies.total(self.config),
        };
        tracing::info!(
            iteration,
            temperature = record.temperature,
            length = record.length_energy,
            cosine = record.cosine_energy,
            total = record.total_energy,
            "annealing progress"
        );
        self.report.trace.push(record);
    }

    fn run(mut self) -> Result<AnnealingReport, AnnealingError> {
        let config = self.config;
        let mut iteration = 0;
        while iteration < config.max_iterations && !self.converged() {
            let kind = config.move_policy.choose(self.rng);
            self.iterate(kind)?;
            if iteration % config.trace_interval == 0 {
                self.record(iteration);
            }
            if iteration % config.cooling_interval == 0 {
                self.temperature = config.temperature_at(iteration);
            }
            iteration += 1;
        }

        self.report.iterations = iteration;
        self.report.converged = self.converged();
        self.report.final_temperature = self.temperature;
        self.report.last = self.snapshot();
        tracing::info!(
            iterations = iteration,
            converged = self.report.converged,
            length = self.energies.length,
            cosine = self.energies.cosine,
            relocations = self.report.relocations_accepted,
            recombinations = self.report.recombinations_accepted,
            "annealing finished"
        );
        Ok(self.report)
    }
}

/// Anneals `network` inside `domain` toward the configured length and cosine distributions.
///
/// Movable nodes are the network's tracked nodes, or every connected node when none are
/// tracked. Tombstoned edges are compacted first. The run stops after
/// `config.max_iterations` iterations or as soon as both energies are within
/// `config.tolerance`; with zero iterations the network is left unchanged.
///
/// # Errors
///
/// Returns [`AnnealingError::InvalidParameter`] for an invalid configuration and
/// [`AnnealingError::RecombinationExhausted`] when a recombination partner search runs out
/// of attempts.
pub fn anneal<R: Rng + ?Sized>(
    network: &mut FiberNetwork,
    domain: &PeriodicBox,
    config: &AnnealingConfig,
    rng: &mut R,
) -> Result<AnnealingReport, AnnealingError> {
    config.validate()?;
    let annealer = Annealer::new(network, domain, config, rng);
    tracing::debug!(
        movable = annealer.movable.len(),
        edges = annealer.network.edge_count(),
        length = annealer.energies.length,
        cosine = annealer.energies.cosine,
        "annealing started"
    );
    annealer.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Periodic cubic lattice: every node has degree 6.
    fn cubic_lattice(k: usize, spacing: f64) -> (FiberNetwork, PeriodicBox) {
        let size = k as f64 * spacing;
        let domain = PeriodicBox::new([size / 2.0; 3], [size; 3]).unwrap();
        let id = |x: usize, y: usize, z: usize| (x % k) + k * ((y % k) + k * (z % k));
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for z in 0..k {
            for y in 0..k {
                for x in 0..k {
                    nodes.push([x as f64 * spacing, y as f64 * spacing, z as f64 * spacing]);
                    let here = id(x, y, z);
                    edges.push([here, id(x + 1, y, z)]);
                    edges.push([here, id(x, y + 1, z)]);
                    edges.push([here, id(x, y, z + 1)]);
                }
            }
        }
        let mut network = FiberNetwork::from_parts(nodes, edges).unwrap();
        network.set_tracked_nodes((0..k * k * k).collect());
        (network, domain)
    }

    fn histogram_totals<R: Rng + ?Sized>(annealer: &Annealer<'_, R>) -> (u64, u64) {
        (
            annealer.lengths.histogram().total(),
            annealer.cosines.histogram().total(),
        )
    }

    #[test]
    fn test_zero_iterations_leave_network_unchanged() {
        let (mut network, domain) = cubic_lattice(4, 1.0);
        let before = network.clone();
        let config = AnnealingConfig {
            max_iterations: 0,
            ..AnnealingConfig::default()
        };
        let report = anneal(&mut network, &domain, &config, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(network, before);
        assert_eq!(report.iterations, 0);
        assert!(report.trace.is_empty());
        assert_eq!(report.initial, report.last);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (mut network, domain) = cubic_lattice(3, 1.0);
        let config = AnnealingConfig {
            decay_rate: 1.5,
            ..AnnealingConfig::default()
        };
        let result = anneal(&mut network, &domain, &config, &mut StdRng::seed_from_u64(0));
        assert!(matches!(
            result,
            Err(AnnealingError::InvalidParameter {
                name: "decay_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_relocation_preserves_topology_and_histogram_sums() {
        let (mut network, domain) = cubic_lattice(4, 1.0);
        let edges_before: Vec<_> = network.edges().to_vec();
        let config = AnnealingConfig {
            max_iterations: 300,
            trace_interval: 100,
            ..AnnealingConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let mut annealer = Annealer::new(&mut network, &domain, &config, &mut rng);
        let totals = histogram_totals(&annealer);
        for _ in 0..50 {
            annealer.iterate(MoveKind::Relocation).unwrap();
            assert_eq!(histogram_totals(&annealer), totals);
        }
        let report = annealer.run().unwrap();
        assert!(report.relocations_accepted > 0);
        assert_eq!(report.recombinations_accepted, 0);
        assert_eq!(report.trace.len(), 3);
        assert_eq!(network.edges(), edges_before.as_slice());
        for edge in 0..network.edge_count() {
            assert!(network.periodic_length(edge, &domain) <= 4.0 / 3.0 + 1e-12);
        }
    }

    #[test]
    fn test_committed_bins_match_a_fresh_rebin() {
        // Five cells per side leave room for parallel edges within a third of the box.
        let (mut network, domain) = cubic_lattice(5, 1.0);
        let config = AnnealingConfig {
            move_policy: MovePolicy::Mixed {
                recombination_probability: 0.5,
            },
            ..AnnealingConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut annealer = Annealer::new(&mut network, &domain, &config, &mut rng);
        for _ in 0..100 {
            let kind = config.move_policy.choose(annealer.rng);
            annealer.iterate(kind).unwrap();
        }
        let fresh_lengths = LengthBins::new(
            annealer.network,
            &domain,
            config.length_bins,
            annealer.lengths.scale(),
        );
        let fresh_cosines = CosineBins::new(annealer.network, &domain, config.cosine_bins);
        assert_eq!(annealer.lengths.histogram(), fresh_lengths.histogram());
        assert_eq!(annealer.cosines.histogram(), fresh_cosines.histogram());
        assert_eq!(annealer.energies, annealer.evaluate());
        annealer.network.validate().unwrap();
    }

    #[test]
    fn test_runs_are_deterministic_for_a_seed() {
        let config = AnnealingConfig {
            max_iterations: 200,
            move_policy: MovePolicy::Mixed {
                recombination_probability: 0.3,
            },
            ..AnnealingConfig::default()
        };
        let run = || {
            let (mut network, domain) = cubic_lattice(5, 1.0);
            let report =
                anneal(&mut network, &domain, &config, &mut StdRng::seed_from_u64(9)).unwrap();
            (network, report)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_temperature_follows_power_law() {
        let config = AnnealingConfig {
            max_iterations: 2001,
            tolerance: 0.0,
            max_subiterations: 1,
            ..AnnealingConfig::default()
        };
        let (mut network, domain) = cubic_lattice(3, 1.0);
        let report = anneal(&mut network, &domain, &config, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(report.iterations, 2001);
        assert_eq!(report.trace.len(), 3);
        assert_eq!(report.trace[0].temperature, 0.05);
        // The record at 1000 is written before the temperature update of that iteration.
        assert_eq!(report.trace[1].temperature, 0.05);
        assert!((report.trace[2].temperature - 0.05 * 0.95).abs() < 1e-15);
        assert!((report.final_temperature - 0.05 * 0.95 * 0.95).abs() < 1e-15);
    }
}

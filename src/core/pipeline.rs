//! End-to-end network generation.
//!
//! [`NetworkGenerator`] runs the stages in a fixed order:
//!
//! 1. uniform seed points in the box,
//! 2. the cell kernel,
//! 3. graph extraction,
//! 4. periodic consolidation,
//! 5. valency adaptation (optional),
//! 6. annealing (optional).
//!
//! A single `StdRng`, seeded from [`GeneratorConfig::seed`], feeds every random draw, so equal
//! configurations produce identical networks.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::consolidation::{
    ConsolidationConfig, ConsolidationReport, consolidate_periodic,
};
use crate::core::algorithms::extraction::{ExtractionConfig, ExtractionReport, extract_network};
use crate::core::algorithms::valency::{
    ValencyConfig, ValencyError, ValencyReport, adapt_valency,
};
use crate::core::annealing::{AnnealingConfig, AnnealingError, AnnealingReport, anneal};
use crate::core::network::FiberNetwork;
use crate::geometry::algorithms::{CellKernel, KernelError, PeriodicVoronoiKernel};
use crate::geometry::util::{RandomPointGenerationError, generate_seed_points};
use crate::geometry::{BoxError, PeriodicBox, Point3};

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised by [`NetworkGenerator::generate`].
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum GenerationError {
    /// The box is invalid.
    #[error(transparent)]
    Box(#[from] BoxError),
    /// Seed generation failed.
    #[error(transparent)]
    Seeds(#[from] RandomPointGenerationError),
    /// The cell kernel failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// Valency adaptation failed.
    #[error(transparent)]
    Valency(#[from] ValencyError),
    /// Annealing failed.
    #[error(transparent)]
    Annealing(#[from] AnnealingError),
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Parameters of a full generation run.
///
/// # Examples
///
/// ```
/// use fibernet::core::pipeline::GeneratorConfigBuilder;
///
/// let config = GeneratorConfigBuilder::default()
///     .box_size([5.0, 5.0, 5.0])
///     .seed_count(20)
///     .seed(7)
///     .build()
///     .unwrap();
/// assert_eq!(config.seed_count, 20);
/// assert!(config.adapt_valency);
///
/// assert!(GeneratorConfigBuilder::default().seed_count(0).build().is_err());
/// ```
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct GeneratorConfig {
    /// Center of the periodic box.
    pub box_center: Point3,
    /// Edge lengths of the periodic box.
    pub box_size: Point3,
    /// Number of seed points.
    pub seed_count: usize,
    /// Seed of the random number generator.
    pub seed: u64,
    /// Graph extraction options.
    pub extraction: ExtractionConfig,
    /// Periodic consolidation options.
    pub consolidation: ConsolidationConfig,
    /// Whether to run valency adaptation.
    pub adapt_valency: bool,
    /// Valency adaptation options.
    pub valency: ValencyConfig,
    /// Whether to run annealing.
    pub anneal: bool,
    /// Annealing options.
    pub annealing: AnnealingConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            box_center: [0.0; 3],
            box_size: [10.0; 3],
            seed_count: 100,
            seed: 42,
            extraction: ExtractionConfig::default(),
            consolidation: ConsolidationConfig::default(),
            adapt_valency: true,
            valency: ValencyConfig::default(),
            anneal: true,
            annealing: AnnealingConfig::default(),
        }
    }
}

impl GeneratorConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.seed_count == Some(0) {
            return Err("seed_count must be at least 1".to_string());
        }
        if let Some(size) = self.box_size
            && let Some(axis) = (0..3).find(|&a| !size[a].is_finite() || size[a] <= 0.0)
        {
            return Err(format!("box_size[{axis}] = {} must be positive", size[axis]));
        }
        if let Some(valency) = &self.valency {
            valency.targets.validate().map_err(|e| e.to_string())?;
        }
        if let Some(annealing) = &self.annealing {
            annealing.validate().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

/// A generated network with the data of every stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedNetwork {
    /// The periodic box.
    pub domain: PeriodicBox,
    /// Seed points handed to the kernel.
    pub seeds: Vec<Point3>,
    /// The final network.
    pub network: FiberNetwork,
    /// Extraction counters.
    pub extraction: ExtractionReport,
    /// Consolidation counters.
    pub consolidation: ConsolidationReport,
    /// Valency adaptation outcome, if it ran.
    pub valency: Option<ValencyReport>,
    /// Annealing outcome, if it ran.
    pub annealing: Option<AnnealingReport>,
}

/// Runs the generation stages with one shared random stream.
///
/// # Examples
///
/// ```
/// use fibernet::core::pipeline::{GeneratorConfigBuilder, NetworkGenerator};
///
/// let config = GeneratorConfigBuilder::default()
///     .seed_count(30)
///     .anneal(false)
///     .build()
///     .unwrap();
/// let generated = NetworkGenerator::new(config).generate().unwrap();
/// assert!(generated.network.edge_count() > 0);
/// assert!(generated.annealing.is_none());
/// ```
#[derive(Clone, Debug)]
pub struct NetworkGenerator<K = PeriodicVoronoiKernel> {
    config: GeneratorConfig,
    kernel: K,
    rng: StdRng,
}

impl NetworkGenerator {
    /// Generator using the built-in periodic Voronoi kernel.
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_kernel(config, PeriodicVoronoiKernel::default())
    }
}

impl<K: CellKernel> NetworkGenerator<K> {
    /// Generator using a custom cell kernel.
    #[must_use]
    pub fn with_kernel(config: GeneratorConfig, kernel: K) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            kernel,
            rng,
        }
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Runs all stages.
    ///
    /// Repeated calls continue the same random stream and so yield different networks.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] from the first stage that fails.
    pub fn generate(&mut self) -> Result<GeneratedNetwork, GenerationError> {
        let config = &self.config;
        let domain = PeriodicBox::new(config.box_center, config.box_size)?;
        let seeds = generate_seed_points(&domain, config.seed_count, &mut self.rng)?;
        let cells = self.kernel.compute_cells(&domain, &seeds)?;

        let (mut network, extraction) = extract_network(&cells, &domain, &config.extraction);
        let consolidation = consolidate_periodic(&mut network, &domain, &config.consolidation);

        let valency = if config.adapt_valency {
            Some(adapt_valency(
                &mut network,
                &domain,
                &config.valency,
                &mut self.rng,
            )?)
        } else {
            None
        };

        let annealing = if config.anneal {
            Some(anneal(
                &mut network,
                &domain,
                &config.annealing,
                &mut self.rng,
            )?)
        } else {
            None
        };

        tracing::info!(
            seeds = seeds.len(),
            nodes = network.node_count(),
            edges = network.edge_count(),
            tracked = network.tracked_nodes().len(),
            "network generated"
        );
        Ok(GeneratedNetwork {
            domain,
            seeds,
            network,
            extraction,
            consolidation,
            valency,
            annealing,
        })
    }
}

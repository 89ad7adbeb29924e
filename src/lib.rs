//! # fibernet
//!
//! Stochastic generation of periodic fiber networks with collagen-like statistics.
//!
//! A periodic box is partitioned into Voronoi cells around random seeds. The cell edges become
//! a graph of fiber junctions (nodes) and fiber segments (edges), which is then
//!
//! 1. deduplicated across cells ([`core::algorithms::extraction`]),
//! 2. reconciled across the periodic faces ([`core::algorithms::consolidation`]),
//! 3. reshaped toward a target node-degree distribution ([`core::algorithms::valency`]),
//! 4. annealed until fiber lengths and inter-fiber angles follow target distributions
//!    ([`core::annealing`]).
//!
//! # Basic Usage
//!
//! ```rust
//! use fibernet::prelude::*;
//!
//! let mut annealing = AnnealingConfig::default();
//! annealing.max_iterations = 200;
//!
//! let config = GeneratorConfigBuilder::default()
//!     .box_size([10.0, 10.0, 10.0])
//!     .seed_count(50)
//!     .seed(42)
//!     .annealing(annealing)
//!     .build()
//!     .unwrap();
//!
//! let generated = NetworkGenerator::new(config).generate().unwrap();
//! let network = &generated.network;
//!
//! assert!(network.edge_count() > 0);
//! assert!((0..network.node_count()).all(|n| network.degree(n) >= 1));
//! assert!(generated.annealing.unwrap().iterations <= 200);
//! ```
//!
//! # Network Invariants
//!
//! [`FiberNetwork::validate`](core::network::FiberNetwork::validate) checks the structural
//! invariants every stage maintains:
//!
//! - **Index consistency** – every live edge appears in the incidence lists of exactly its two
//!   endpoints.
//! - **No self-loops** – no edge connects a node to itself.
//! - **No duplicates** – no two live edges connect the same unordered pair.
//!
//! Extraction additionally guarantees that no two nodes lie within the extraction tolerance of
//! each other, and consolidation removes every pair of edges that are periodic images of one
//! another.
//!
//! # Reproducibility
//!
//! All randomness flows through one `StdRng` seeded from
//! [`GeneratorConfig::seed`](core::pipeline::GeneratorConfig::seed), drawn in a fixed order
//! (seed points, valency adaptation, annealing). Equal configurations give equal networks.
//!
//! # Logging
//!
//! The library emits [`tracing`] events: `info` for stage summaries and annealing progress,
//! `debug` for per-stage detail, `warn` for recoverable anomalies such as degenerate cells
//! or exhausted searches, `error` for violated internal invariants. Install a subscriber
//! (for example `tracing-subscriber` with `EnvFilter`) to see them.

// Forbid unsafe code throughout the entire crate
#![forbid(unsafe_code)]

#[macro_use]
extern crate derive_builder;

/// The `core` module contains the fiber network, the generation stages and output.
pub mod core {
    /// Graph construction and reshaping stages
    pub mod algorithms {
        /// Periodic duplicate removal and stub stitching
        pub mod consolidation;
        /// Cell geometry to deduplicated graph
        pub mod extraction;
        pub mod search;
        /// Node-degree redistribution
        pub mod valency;
    }
    pub mod annealing;
    /// Hash-based collection aliases and the spatial hash grid
    pub mod collections;
    pub mod io;
    pub mod network;
    pub mod pipeline;
    pub use network::*;
    pub use pipeline::*;
}

/// Geometric types: the periodic box, vector helpers and the cell kernel.
pub mod geometry {
    /// Cell kernels producing convex cell geometry
    pub mod algorithms {
        /// Periodic Voronoi cells by half-space clipping
        pub mod voronoi;
        pub use voronoi::*;
    }
    pub mod periodic_box;
    /// Vector helpers, seed generation and permutations
    pub mod util;

    /// A point or vector in three dimensions.
    pub type Point3 = [f64; 3];

    pub use periodic_box::*;
}

/// A prelude module that re-exports commonly used types.
pub mod prelude {
    pub use crate::core::algorithms::{
        consolidation::{ConsolidationConfig, ConsolidationReport, consolidate_periodic},
        extraction::{ExtractionConfig, ExtractionReport, NodeLookup, extract_network},
        search::{SearchExhausted, bounded_search},
        valency::{ValencyConfig, ValencyError, ValencyReport, ValencyTargets, adapt_valency},
    };
    pub use crate::core::annealing::{
        AnnealingConfig, AnnealingError, AnnealingReport, MovePolicy, anneal,
    };
    pub use crate::core::io::write_network_files;
    pub use crate::core::network::{Edge, FiberNetwork, NetworkError, NodeClass};
    pub use crate::core::pipeline::{
        GeneratedNetwork, GenerationError, GeneratorConfig, GeneratorConfigBuilder,
        NetworkGenerator,
    };

    // Re-export commonly used collection types from core::collections
    pub use crate::core::collections::{
        EdgeId, FastHashMap, FastHashSet, HashGridIndex, NodeId, SmallBuffer,
    };

    pub use crate::geometry::{
        BoxError, PeriodicBox, Point3,
        algorithms::{CellGeometry, CellKernel, KernelError, PeriodicVoronoiKernel},
        util::*,
    };
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use crate::{
        core::{network::FiberNetwork, pipeline::GeneratorConfig},
        geometry::PeriodicBox,
        is_normal,
    };

    #[test]
    fn normal_types() {
        assert!(is_normal::<FiberNetwork>());
        assert!(is_normal::<PeriodicBox>());
        assert!(is_normal::<GeneratorConfig>());
    }

    #[test]
    fn test_prelude_collections_exports() {
        use crate::prelude::*;

        let mut map: FastHashMap<u64, usize> = FastHashMap::default();
        map.insert(123, 456);
        assert_eq!(map.get(&123), Some(&456));

        let mut set: FastHashSet<NodeId> = FastHashSet::default();
        set.insert(789);
        assert!(set.contains(&789));

        let mut buffer: SmallBuffer<EdgeId, 8> = SmallBuffer::new();
        buffer.push(42);
        assert_eq!(buffer.len(), 1);
    }
}

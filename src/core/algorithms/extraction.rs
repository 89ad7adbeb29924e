//! Graph extraction: per-cell polyhedra to a global deduplicated node/edge graph.
//!
//! Every cell vertex is matched against the nodes discovered so far under a tight absolute
//! per-coordinate tolerance; a match reuses the existing [`NodeId`], otherwise a new node is
//! appended. Every local adjacency pair becomes an edge unless the same unordered node pair
//! already exists.
//!
//! On exit the network satisfies:
//! - no two nodes match under the extraction tolerance
//! - no self-loops and no duplicate unordered pairs
//! - the node-to-edge index is built
//! - every node has degree ≥ 1

use serde::{Deserialize, Serialize};

use crate::core::collections::{
    FastHashSet, HashGridIndex, NodeId, fast_hash_set_with_capacity,
};
use crate::core::network::FiberNetwork;
use crate::geometry::algorithms::CellGeometry;
use crate::geometry::util::coords_match;
use crate::geometry::{PeriodicBox, Point3};

/// Tolerance under which two cell vertices are the same node.
pub const EXTRACTION_TOLERANCE: f64 = 1e-13;

/// Tolerance for "vertex lies on a box face" during boundary pruning.
pub const PLANE_TOLERANCE: f64 = 1e-13;

/// Strategy used to find an existing node matching a cell vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeLookup {
    /// Scan all known nodes.
    LinearScan,
    /// Query a spatial hash grid; same matching result as the scan.
    #[default]
    HashGrid,
}

/// Options for [`extract_network`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Per-coordinate match tolerance.
    pub tolerance: f64,
    /// Node lookup strategy.
    pub lookup: NodeLookup,
    /// Discard edges whose endpoints both lie on faces of the same axis.
    pub prune_boundary_edges: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tolerance: EXTRACTION_TOLERANCE,
            lookup: NodeLookup::default(),
            prune_boundary_edges: false,
        }
    }
}

/// Counters collected during extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Cells processed.
    pub cells: usize,
    /// Nodes in the extracted network.
    pub nodes: usize,
    /// Edges in the extracted network.
    pub edges: usize,
    /// Edges rejected because both endpoints resolved to the same node.
    pub self_loops_skipped: usize,
    /// Adjacency entries pointing outside their cell.
    pub invalid_adjacency: usize,
    /// Edges discarded by boundary pruning.
    pub pruned_edges: usize,
    /// Freshly created vertices discarded by boundary pruning.
    pub pruned_vertices: usize,
    /// Node ids that were not created in increasing order.
    pub id_order_violations: usize,
}

/// Builds the global fiber network from per-seed cell geometry.
///
/// # Examples
///
/// ```
/// use fibernet::core::algorithms::extraction::{ExtractionConfig, extract_network};
/// use fibernet::geometry::PeriodicBox;
/// use fibernet::geometry::algorithms::CellGeometry;
///
/// // Two cells sharing the vertex at the origin.
/// let a = CellGeometry {
///     vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
///     adjacency: vec![vec![1], vec![0]],
/// };
/// let b = CellGeometry {
///     vertices: vec![[0.0, 1.0, 0.0], [0.0, 0.0, 0.0]],
///     adjacency: vec![vec![1], vec![0]],
/// };
/// let domain = PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap();
/// let (network, report) = extract_network(&[a, b], &domain, &ExtractionConfig::default());
///
/// assert_eq!(network.node_count(), 3);
/// assert_eq!(network.edge_count(), 2);
/// assert_eq!(network.degree(0), 2);
/// assert_eq!(report.self_loops_skipped, 0);
/// ```
#[must_use]
pub fn extract_network(
    cells: &[CellGeometry],
    domain: &PeriodicBox,
    config: &ExtractionConfig,
) -> (FiberNetwork, ExtractionReport) {
    // A Poisson-Voronoi cell contributes about 14 distinct edges on average.
    let mut extractor = GraphExtractor::new(domain, config, 16 * cells.len());
    for cell in cells {
        extractor.process_cell(cell);
    }
    extractor.finish()
}

struct GraphExtractor<'a> {
    domain: &'a PeriodicBox,
    config: &'a ExtractionConfig,
    network: FiberNetwork,
    grid: HashGridIndex<NodeId>,
    pairs: FastHashSet<(NodeId, NodeId)>,
    last_created: Option<NodeId>,
    report: ExtractionReport,
}

impl<'a> GraphExtractor<'a> {
    fn new(domain: &'a PeriodicBox, config: &'a ExtractionConfig, expected_edges: usize) -> Self {
        let cell_size = (domain.reference_length() / 1024.0).max(config.tolerance);
        Self {
            domain,
            config,
            network: FiberNetwork::new(),
            grid: HashGridIndex::new(cell_size),
            pairs: fast_hash_set_with_capacity(expected_edges),
            last_created: None,
            report: ExtractionReport::default(),
        }
    }

    /// Last-created node matching `point`, if any.
    fn find(&self, point: &Point3) -> Option<NodeId> {
        let nodes = self.network.nodes();
        if self.config.lookup == NodeLookup::HashGrid {
            let mut found: Option<NodeId> = None;
            let used = self.grid.for_each_candidate(point, |id| {
                if coords_match(&nodes[id], point, self.config.tolerance)
                    && found.is_none_or(|best| id > best)
                {
                    found = Some(id);
                }
                true
            });
            if used {
                return found;
            }
        }
        (0..nodes.len())
            .rev()
            .find(|&id| coords_match(&nodes[id], point, self.config.tolerance))
    }

    /// Resolves `point` to a node id, creating the node if needed.
    fn resolve(&mut self, point: &Point3) -> (NodeId, bool) {
        if let Some(id) = self.find(point) {
            return (id, false);
        }
        let id = self.network.push_node(*point);
        self.grid.insert(id, point);

        if let Some(last) = self.last_created
            && id <= last
        {
            debug_assert!(id > last, "node id {id} created after {last}");
            tracing::error!(id, last, "node ids are not strictly increasing");
            self.report.id_order_violations += 1;
        }
        self.last_created = Some(id);
        (id, true)
    }

    /// Discards the freshly created node `id`, which must be the newest node.
    fn discard_created(&mut self, id: NodeId) {
        if id + 1 != self.network.node_count() {
            tracing::warn!(id, "pruned vertex is not the newest node; keeping it");
            return;
        }
        if let Some(position) = self.network.pop_isolated_node() {
            self.grid.remove(id, &position);
            self.last_created = id.checked_sub(1);
            self.report.pruned_vertices += 1;
        }
    }

    fn process_cell(&mut self, cell: &CellGeometry) {
        self.report.cells += 1;
        let count = cell.vertices.len();

        for (local, partners) in cell.adjacency.iter().enumerate().take(count) {
            let (first, first_created) = self.resolve(&cell.vertices[local]);
            let first_planes = self.domain.boundary_axes(&cell.vertices[local], PLANE_TOLERANCE);
            let mut edges_created = 0_usize;

            for &partner in partners {
                if partner >= count {
                    tracing::warn!(
                        cell = self.report.cells - 1,
                        local,
                        partner,
                        "adjacency entry outside the cell ignored"
                    );
                    self.report.invalid_adjacency += 1;
                    continue;
                }
                let (second, second_created) = self.resolve(&cell.vertices[partner]);

                if first == second {
                    tracing::warn!(
                        node = first,
                        cell = self.report.cells - 1,
                        "edge endpoints collapse to one node; skipping self-loop"
                    );
                    self.report.self_loops_skipped += 1;
                    continue;
                }

                let key = (first.min(second), first.max(second));
                if self.pairs.contains(&key) {
                    continue;
                }

                if self.config.prune_boundary_edges {
                    let second_planes =
                        self.domain.boundary_axes(&cell.vertices[partner], PLANE_TOLERANCE);
                    if (0..3).any(|axis| first_planes[axis] && second_planes[axis]) {
                        if second_created {
                            self.discard_created(second);
                        }
                        self.report.pruned_edges += 1;
                        continue;
                    }
                }

                self.pairs.insert(key);
                self.network.push_edge(first, second);
                edges_created += 1;
            }

            if self.config.prune_boundary_edges
                && first_created
                && edges_created == 0
                && first_planes.iter().any(|on| *on)
            {
                self.discard_created(first);
            }
        }
    }

    fn finish(mut self) -> (FiberNetwork, ExtractionReport) {
        self.network.rebuild_index();
        self.report.nodes = self.network.node_count();
        self.report.edges = self.network.edge_count();
        tracing::info!(
            cells = self.report.cells,
            nodes = self.report.nodes,
            edges = self.report.edges,
            self_loops = self.report.self_loops_skipped,
            pruned_edges = self.report.pruned_edges,
            "graph extraction complete"
        );
        (self.network, self.report)
    }
}

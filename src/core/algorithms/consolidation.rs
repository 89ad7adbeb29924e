//! Periodic consolidation: removes periodic double edges and stitches cut junctions.
//!
//! Cells straddling a box face produce each boundary-crossing fiber twice, once per periodic
//! image, and split a junction lying on the cut into a degree-3 *branch* on one side and a
//! degree-1 *stub* on the other. Consolidation works on the *shifted* positions (every node
//! strictly beyond a face moved back by one box length) and:
//!
//! 1. tombstones every edge whose shifted endpoints coincide with those of a lower-indexed
//!    live edge (either orientation), then compacts;
//! 2. rewires the edge of every stub onto the matching branch, which becomes tracked along
//!    with all degree-4 nodes;
//! 3. deletes the nodes left without edges.
//!
//! Requires an extracted network (built index, no duplicate edges). On exit the index is
//! rebuilt and the tracked node set is populated.

use serde::{Deserialize, Serialize};

use crate::core::collections::{EdgeId, HashGridIndex, NodeId};
use crate::core::network::{FiberNetwork, NodeClass};
use crate::geometry::util::coords_match;
use crate::geometry::{PeriodicBox, Point3};

/// Tolerance under which two shifted positions are the same periodic point.
pub const PERIODIC_MATCH_TOLERANCE: f64 = 1e-7;

/// Options for [`consolidate_periodic`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Per-coordinate match tolerance for shifted positions.
    pub tolerance: f64,
    /// Delete nodes left with degree 0 and renumber the rest.
    pub remove_orphans: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            tolerance: PERIODIC_MATCH_TOLERANCE,
            remove_orphans: true,
        }
    }
}

/// Counters collected during consolidation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Nodes lying strictly outside the box.
    pub shifted_nodes: usize,
    /// Edges with at least one shifted endpoint.
    pub touched_edges: usize,
    /// Periodic double edges removed.
    pub duplicate_edges_removed: usize,
    /// Degree-1 nodes after duplicate removal.
    pub stubs: usize,
    /// Degree-3 nodes after duplicate removal.
    pub branches: usize,
    /// Stubs whose edge was moved onto a branch.
    pub stubs_stitched: usize,
    /// Stubs without a matching branch, left at degree 1.
    pub stubs_unmatched: usize,
    /// Matches whose rewire would create a self-loop or duplicate edge.
    pub rewires_skipped: usize,
    /// Nodes deleted because they had no edges left.
    pub orphans_removed: usize,
    /// Size of the tracked node set.
    pub tracked_nodes: usize,
}

/// Shifted positions of all nodes, and the per-node "was shifted" flags.
fn shifted_positions(network: &FiberNetwork, domain: &PeriodicBox) -> (Vec<Point3>, Vec<bool>) {
    network
        .nodes()
        .iter()
        .map(|position| {
            let mut shifted = *position;
            let moved = domain.shift_into_box(&mut shifted);
            (shifted, moved)
        })
        .unzip()
}

/// Removes periodic double edges and stitches stubs to branches.
///
/// # Examples
///
/// ```
/// use fibernet::core::algorithms::consolidation::{ConsolidationConfig, consolidate_periodic};
/// use fibernet::core::network::FiberNetwork;
/// use fibernet::geometry::PeriodicBox;
///
/// let domain = PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap();
/// // The same fiber seen from both sides of the x faces.
/// let mut network = FiberNetwork::from_parts(
///     vec![[4.0, 0.0, 0.0], [5.5, 0.0, 0.0], [-6.0, 0.0, 0.0], [-4.5, 0.0, 0.0]],
///     [[0, 1], [2, 3]],
/// )
/// .unwrap();
///
/// let report = consolidate_periodic(&mut network, &domain, &ConsolidationConfig::default());
/// assert_eq!(report.duplicate_edges_removed, 1);
/// assert_eq!(network.edge_count(), 1);
/// ```
pub fn consolidate_periodic(
    network: &mut FiberNetwork,
    domain: &PeriodicBox,
    config: &ConsolidationConfig,
) -> ConsolidationReport {
    let mut report = ConsolidationReport::default();

    let (shifted, moved) = shifted_positions(network, domain);
    report.shifted_nodes = moved.iter().filter(|m| **m).count();

    remove_double_edges(network, &shifted, &moved, config, &mut report);
    network.compact_edges();

    let tracked = stitch_stubs(network, &shifted, config, &mut report);
    network.set_tracked_nodes(tracked);

    if config.remove_orphans {
        report.orphans_removed = network.remove_orphan_nodes();
    }
    report.tracked_nodes = network.tracked_nodes().len();

    tracing::info!(
        duplicates = report.duplicate_edges_removed,
        stitched = report.stubs_stitched,
        unmatched_stubs = report.stubs_unmatched,
        orphans = report.orphans_removed,
        nodes = network.node_count(),
        edges = network.edge_count(),
        tracked = report.tracked_nodes,
        "periodic consolidation complete"
    );
    report
}

/// Tombstones every live edge matching a lower-indexed live edge.
fn remove_double_edges(
    network: &mut FiberNetwork,
    shifted: &[Point3],
    moved: &[bool],
    config: &ConsolidationConfig,
    report: &mut ConsolidationReport,
) {
    let edges = network.edges().to_vec();
    let touched: Vec<bool> = edges
        .iter()
        .map(|e| !e.is_removed() && e.endpoints().iter().any(|&n| moved[n]))
        .collect();
    report.touched_edges = touched.iter().filter(|t| **t).count();

    let midpoint = |edge: EdgeId| -> Point3 {
        let [a, b] = edges[edge].endpoints();
        std::array::from_fn(|axis| 0.5 * (shifted[a][axis] + shifted[b][axis]))
    };
    let same_image = |i: EdgeId, j: EdgeId| -> bool {
        let [a1, a2] = edges[i].endpoints();
        let [b1, b2] = edges[j].endpoints();
        let m = |x: NodeId, y: NodeId| coords_match(&shifted[x], &shifted[y], config.tolerance);
        (m(a1, b1) && m(a2, b2)) || (m(a1, b2) && m(a2, b1))
    };

    // Matching edges have midpoints within the tolerance of each other.
    let mut grid = HashGridIndex::new(grid_cell_size_from(shifted, config.tolerance));
    for (id, edge) in edges.iter().enumerate() {
        if !edge.is_removed() {
            grid.insert(id, &midpoint(id));
        }
    }

    let mut removed = vec![false; edges.len()];
    for i in 0..edges.len() {
        if edges[i].is_removed() || removed[i] {
            continue;
        }
        let mut doubles = Vec::new();
        let mut visit = |j: EdgeId| {
            if j > i && !removed[j] && (touched[i] || touched[j]) && same_image(i, j) {
                doubles.push(j);
            }
            true
        };
        if !grid.for_each_candidate(&midpoint(i), &mut visit) {
            (i + 1..edges.len())
                .filter(|&j| !edges[j].is_removed())
                .for_each(|j| {
                    visit(j);
                });
        }
        for j in doubles {
            tracing::debug!(kept = i, removed = j, "periodic double edge");
            removed[j] = true;
            network.mark_edge_removed(j);
            report.duplicate_edges_removed += 1;
        }
    }
}

fn grid_cell_size_from(shifted: &[Point3], tolerance: f64) -> f64 {
    let mut low = [f64::INFINITY; 3];
    let mut high = [f64::NEG_INFINITY; 3];
    for p in shifted {
        for axis in 0..3 {
            low[axis] = low[axis].min(p[axis]);
            high[axis] = high[axis].max(p[axis]);
        }
    }
    let extent = (0..3).map(|axis| high[axis] - low[axis]).fold(0.0, f64::max);
    if extent.is_finite() && extent > 0.0 {
        (extent / 1024.0).max(2.0 * tolerance)
    } else {
        1.0
    }
}

/// Rewires stub edges onto matching branches; returns the sorted tracked node set.
fn stitch_stubs(
    network: &mut FiberNetwork,
    shifted: &[Point3],
    config: &ConsolidationConfig,
    report: &mut ConsolidationReport,
) -> Vec<NodeId> {
    let mut tracked = vec![false; network.node_count()];
    let mut stubs = Vec::new();
    let mut branches = Vec::new();
    for node in 0..network.node_count() {
        match network.class(node) {
            NodeClass::Regular => tracked[node] = true,
            NodeClass::Stub => stubs.push(node),
            NodeClass::Branch => branches.push(node),
            _ => {}
        }
    }
    report.stubs = stubs.len();
    report.branches = branches.len();

    let mut grid = HashGridIndex::new(grid_cell_size_from(shifted, config.tolerance));
    for &branch in &branches {
        grid.insert(branch, &shifted[branch]);
    }

    for &stub in &stubs {
        let mut best: Option<NodeId> = None;
        let mut visit = |branch: NodeId| {
            if coords_match(&shifted[branch], &shifted[stub], config.tolerance)
                && best.is_none_or(|b| branch < b)
            {
                best = Some(branch);
            }
            true
        };
        if !grid.for_each_candidate(&shifted[stub], &mut visit) {
            branches.iter().copied().for_each(|b| {
                visit(b);
            });
        }

        let Some(branch) = best else {
            tracing::debug!(stub, "stub without periodic partner left at degree 1");
            report.stubs_unmatched += 1;
            continue;
        };

        let Some(&edge) = network.incident_edges(stub).first() else {
            continue;
        };
        let other = network.edge(edge).other(stub);
        if other == Some(branch) || other.is_some_and(|o| network.contains_edge(branch, o)) {
            tracing::warn!(stub, branch, edge, "stub rewire would duplicate an edge; skipped");
            report.rewires_skipped += 1;
            continue;
        }

        network.replace_endpoint(edge, stub, branch);
        tracked[branch] = true;
        report.stubs_stitched += 1;
    }

    network.rebuild_index();
    tracked
        .iter()
        .enumerate()
        .filter_map(|(node, t)| t.then_some(node))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::extraction::{ExtractionConfig, extract_network};
    use crate::geometry::algorithms::{CellKernel, PeriodicVoronoiKernel};
    use crate::geometry::util::generate_seed_points_seeded;

    fn domain() -> PeriodicBox {
        PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap()
    }

    #[test]
    fn test_untouched_network_is_unchanged() {
        let mut network = FiberNetwork::from_parts(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
            [[0, 1], [1, 2]],
        )
        .unwrap();
        let before = network.clone();
        let report = consolidate_periodic(&mut network, &domain(), &ConsolidationConfig::default());
        assert_eq!(report.duplicate_edges_removed, 0);
        assert_eq!(report.shifted_nodes, 0);
        assert_eq!(network.nodes(), before.nodes());
        assert_eq!(network.edges(), before.edges());
    }

    #[test]
    fn test_reversed_double_is_removed() {
        let mut network = FiberNetwork::from_parts(
            vec![
                [4.0, 1.0, 1.0],
                [5.5, 1.0, 1.0],
                [-4.5, 1.0, 1.0],
                [-6.0, 1.0, 1.0],
            ],
            [[0, 1], [2, 3]],
        )
        .unwrap();
        let report = consolidate_periodic(&mut network, &domain(), &ConsolidationConfig::default());
        assert_eq!(report.duplicate_edges_removed, 1);
        assert_eq!(report.touched_edges, 2);
        assert_eq!(network.edge_count(), 1);
        // The two endpoints of the removed copy are orphaned and deleted.
        assert_eq!(report.orphans_removed, 2);
        assert_eq!(network.node_count(), 2);
        network.validate().unwrap();
    }

    #[test]
    fn test_stub_is_stitched_to_branch() {
        // Branch at the +x face with three fibers; its stub image at the -x face.
        let mut network = FiberNetwork::from_parts(
            vec![
                [5.0, 0.0, 0.0],  // 0 branch
                [4.0, 0.0, 0.0],  // 1
                [5.0, 1.0, 0.0],  // 2
                [5.0, 0.0, 1.0],  // 3
                [-5.0, 0.0, 0.0], // 4 stub, image of 0 (on the face, not shifted)
                [-4.0, 0.5, 0.0], // 5
            ],
            [[0, 1], [0, 2], [0, 3], [4, 5]],
        )
        .unwrap();
        // Make node 0 lie strictly beyond the face so that it shifts onto the stub.
        network.set_position(0, [5.0 + 1e-9, 0.0, 0.0]);
        network.set_position(4, [-5.0 + 1e-9, 0.0, 0.0]);

        let report = consolidate_periodic(&mut network, &domain(), &ConsolidationConfig::default());
        // The far ends of the branch fibers are stubs too, without partners.
        assert_eq!(report.stubs, 5);
        assert_eq!(report.stubs_unmatched, 4);
        assert_eq!(report.branches, 1);
        assert_eq!(report.stubs_stitched, 1);
        assert_eq!(report.orphans_removed, 1);
        assert_eq!(network.node_count(), 5);
        assert_eq!(network.degree(0), 4);
        assert_eq!(network.tracked_nodes(), &[0]);
        network.validate().unwrap();
    }

    #[test]
    fn test_unmatched_stub_stays() {
        let mut network =
            FiberNetwork::from_parts(vec![[0.0; 3], [1.0, 0.0, 0.0]], [[0, 1]]).unwrap();
        let report = consolidate_periodic(&mut network, &domain(), &ConsolidationConfig::default());
        assert_eq!(report.stubs, 2);
        assert_eq!(report.stubs_unmatched, 2);
        assert_eq!(network.edge_count(), 1);
    }

    #[test]
    fn test_voronoi_network_has_no_periodic_doubles() {
        let domain = domain();
        let seeds = generate_seed_points_seeded(&domain, 30, 42).unwrap();
        let cells = PeriodicVoronoiKernel::default()
            .compute_cells(&domain, &seeds)
            .unwrap();
        let (mut network, _) = extract_network(&cells, &domain, &ExtractionConfig::default());
        let report = consolidate_periodic(&mut network, &domain, &ConsolidationConfig::default());
        network.validate().unwrap();
        assert!(report.duplicate_edges_removed > 0);

        let (shifted, _) = shifted_positions(&network, &domain);
        let edges = network.edges();
        for i in 0..edges.len() {
            for j in i + 1..edges.len() {
                let [a1, a2] = edges[i].endpoints();
                let [b1, b2] = edges[j].endpoints();
                let m = |x: NodeId, y: NodeId| {
                    coords_match(&shifted[x], &shifted[y], PERIODIC_MATCH_TOLERANCE)
                };
                assert!(!((m(a1, b1) && m(a2, b2)) || (m(a1, b2) && m(a2, b1))));
            }
        }
        assert!((0..network.node_count()).all(|n| network.degree(n) >= 1));
    }
}

//! The fiber network graph shared by every generation stage.
//!
//! A [`FiberNetwork`] stores nodes (fiber junctions, unwrapped coordinates) and edges (fiber
//! segments, unordered node pairs) in dense arrays, plus the derived node-to-edge index and
//! the set of *tracked* nodes that valency adaptation and annealing draw from.
//!
//! # Deletion
//!
//! Edges are removed in two phases. [`FiberNetwork::mark_edge_removed`] sets a tombstone and
//! drops the edge from the node-to-edge index, so every other edge id stays valid while a
//! stage iterates. [`FiberNetwork::compact_edges`] then erases tombstoned edges and rebuilds
//! the index.
//!
//! # Index invariant
//!
//! Every live edge id appears in the incident list of exactly its two endpoints, and no
//! tombstoned edge appears anywhere. [`FiberNetwork::validate`] checks this together with the
//! absence of self-loops and duplicate edges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::collections::{EdgeBuffer, EdgeId, FastHashMap, NodeId};
use crate::geometry::{PeriodicBox, Point3};

/// An unordered pair of node ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    endpoints: [NodeId; 2],
    removed: bool,
}

impl Edge {
    /// Creates a live edge between `a` and `b`.
    #[must_use]
    pub const fn new(a: NodeId, b: NodeId) -> Self {
        Self {
            endpoints: [a, b],
            removed: false,
        }
    }

    /// Both endpoints, in storage order.
    #[must_use]
    pub const fn endpoints(&self) -> [NodeId; 2] {
        self.endpoints
    }

    /// Whether the edge carries a tombstone.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    /// Whether `node` is one of the endpoints.
    #[must_use]
    pub const fn contains(&self, node: NodeId) -> bool {
        self.endpoints[0] == node || self.endpoints[1] == node
    }

    /// The endpoint opposite to `node`, or `None` if `node` is not an endpoint.
    #[must_use]
    pub const fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.endpoints[0] == node {
            Some(self.endpoints[1])
        } else if self.endpoints[1] == node {
            Some(self.endpoints[0])
        } else {
            None
        }
    }

    /// Whether the edge connects `a` and `b` in either orientation.
    #[must_use]
    pub const fn connects(&self, a: NodeId, b: NodeId) -> bool {
        (self.endpoints[0] == a && self.endpoints[1] == b)
            || (self.endpoints[0] == b && self.endpoints[1] == a)
    }
}

/// Node classification by degree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeClass {
    /// Degree 0.
    Isolated,
    /// Degree 1: a dangling fiber end, usually produced by a periodic cut.
    Stub,
    /// Degree 3: a plain three-way junction.
    Branch,
    /// Degree 4: the junction type produced by a Voronoi edge network after stitching.
    Regular,
    /// Degree 5 or 6.
    Hub,
    /// Any other degree.
    Other,
}

impl NodeClass {
    /// Classifies a degree.
    #[must_use]
    pub const fn from_degree(degree: usize) -> Self {
        match degree {
            0 => Self::Isolated,
            1 => Self::Stub,
            3 => Self::Branch,
            4 => Self::Regular,
            5 | 6 => Self::Hub,
            _ => Self::Other,
        }
    }
}

/// Structural inconsistencies reported by [`FiberNetwork::validate`] and
/// [`FiberNetwork::from_parts`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum NetworkError {
    /// An edge references a node id that does not exist.
    #[error("Edge {edge} references node {node}, but the network has {node_count} nodes")]
    EndpointOutOfRange {
        /// Offending edge.
        edge: EdgeId,
        /// Offending endpoint.
        node: NodeId,
        /// Number of nodes in the network.
        node_count: usize,
    },

    /// An edge connects a node to itself.
    #[error("Edge {edge} is a self-loop on node {node}")]
    SelfLoop {
        /// Offending edge.
        edge: EdgeId,
        /// The repeated endpoint.
        node: NodeId,
    },

    /// Two live edges connect the same unordered node pair.
    #[error("Edges {first} and {second} connect the same node pair")]
    DuplicateEdge {
        /// Lower edge id.
        first: EdgeId,
        /// Higher edge id.
        second: EdgeId,
    },

    /// The node-to-edge index disagrees with the edge list.
    #[error("Incident edge index of node {node} is inconsistent with the edge list")]
    IndexMismatch {
        /// Node whose incident list is wrong.
        node: NodeId,
    },

    /// A tracked node id does not exist.
    #[error("Tracked node {node} is out of range")]
    TrackedOutOfRange {
        /// Offending tracked id.
        node: NodeId,
    },
}

/// Nodes, edges, their incidence index and the tracked node set.
///
/// # Examples
///
/// ```
/// use fibernet::core::network::FiberNetwork;
///
/// let mut network = FiberNetwork::new();
/// let a = network.push_node([0.0, 0.0, 0.0]);
/// let b = network.push_node([1.0, 0.0, 0.0]);
/// let e = network.add_edge(a, b);
///
/// assert_eq!(network.degree(a), 1);
/// assert!(network.contains_edge(b, a));
///
/// network.mark_edge_removed(e);
/// assert_eq!(network.degree(a), 0);
/// assert_eq!(network.compact_edges(), 1);
/// assert_eq!(network.edge_count(), 0);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FiberNetwork {
    nodes: Vec<Point3>,
    edges: Vec<Edge>,
    node_edges: Vec<EdgeBuffer>,
    tracked: Vec<NodeId>,
}

impl FiberNetwork {
    /// Creates an empty network.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_edges: Vec::new(),
            tracked: Vec::new(),
        }
    }

    /// Builds a network from node positions and endpoint pairs and rebuilds the index.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if an endpoint is out of range, an edge is a self-loop, or
    /// two edges connect the same pair.
    pub fn from_parts(
        nodes: Vec<Point3>,
        edges: impl IntoIterator<Item = [NodeId; 2]>,
    ) -> Result<Self, NetworkError> {
        let mut network = Self {
            edges: edges.into_iter().map(|[a, b]| Edge::new(a, b)).collect(),
            nodes,
            node_edges: Vec::new(),
            tracked: Vec::new(),
        };
        network.check_endpoints()?;
        network.rebuild_index();
        network.validate()?;
        Ok(network)
    }

    // =========================================================================
    // NODES
    // =========================================================================

    /// Number of nodes.
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All node positions, indexed by [`NodeId`].
    #[must_use]
    pub fn nodes(&self) -> &[Point3] {
        &self.nodes
    }

    /// Position of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is out of range.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Point3 {
        self.nodes[node]
    }

    /// Overwrites the position of `node`.
    pub fn set_position(&mut self, node: NodeId, position: Point3) {
        self.nodes[node] = position;
    }

    /// Appends a node and returns its id.
    pub fn push_node(&mut self, position: Point3) -> NodeId {
        self.nodes.push(position);
        self.node_edges.push(EdgeBuffer::new());
        self.nodes.len() - 1
    }

    /// Removes the most recently appended node if it has no incident edges.
    ///
    /// Returns the removed position.
    pub fn pop_isolated_node(&mut self) -> Option<Point3> {
        let last = self.nodes.len().checked_sub(1)?;
        if !self.node_edges[last].is_empty() || self.edges.iter().any(|e| e.contains(last)) {
            return None;
        }
        self.node_edges.pop();
        self.tracked.retain(|&n| n != last);
        self.nodes.pop()
    }

    /// Number of live edges incident to `node`.
    #[must_use]
    pub fn degree(&self, node: NodeId) -> usize {
        self.node_edges.get(node).map_or(0, |list| list.len())
    }

    /// Classification of `node` by its degree.
    #[must_use]
    pub fn class(&self, node: NodeId) -> NodeClass {
        NodeClass::from_degree(self.degree(node))
    }

    /// Live edges incident to `node`.
    #[must_use]
    pub fn incident_edges(&self, node: NodeId) -> &[EdgeId] {
        self.node_edges
            .get(node)
            .map(|list| list.as_slice())
            .unwrap_or_default()
    }

    /// Nodes adjacent to `node` through live edges.
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incident_edges(node)
            .iter()
            .filter_map(move |&e| self.edges[e].other(node))
    }

    /// Count of nodes per degree.
    #[must_use]
    pub fn degree_histogram(&self) -> BTreeMap<usize, usize> {
        let mut histogram = BTreeMap::new();
        for list in &self.node_edges {
            *histogram.entry(list.len()).or_insert(0) += 1;
        }
        histogram
    }

    // =========================================================================
    // TRACKED NODES
    // =========================================================================

    /// Nodes eligible for random draws during valency adaptation and annealing.
    #[must_use]
    pub fn tracked_nodes(&self) -> &[NodeId] {
        &self.tracked
    }

    /// Replaces the tracked node set.
    pub fn set_tracked_nodes(&mut self, tracked: Vec<NodeId>) {
        self.tracked = tracked;
    }

    // =========================================================================
    // EDGES
    // =========================================================================

    /// Number of stored edges, tombstoned ones included.
    #[must_use]
    pub const fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges without a tombstone.
    #[must_use]
    pub fn live_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| !e.is_removed()).count()
    }

    /// All stored edges, indexed by [`EdgeId`].
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The edge with id `edge`.
    ///
    /// # Panics
    ///
    /// Panics if `edge` is out of range.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Edge {
        self.edges[edge]
    }

    /// Whether a live edge connects `a` and `b`.
    #[must_use]
    pub fn contains_edge(&self, a: NodeId, b: NodeId) -> bool {
        let (probe, target) = if self.degree(a) <= self.degree(b) {
            (a, b)
        } else {
            (b, a)
        };
        self.incident_edges(probe)
            .iter()
            .any(|&e| self.edges[e].other(probe) == Some(target))
    }

    /// Appends an edge without touching the incidence index.
    ///
    /// Used by bulk builders that call [`Self::rebuild_index`] once at the end.
    pub fn push_edge(&mut self, a: NodeId, b: NodeId) -> EdgeId {
        self.edges.push(Edge::new(a, b));
        self.edges.len() - 1
    }

    /// Appends an edge and registers it with both endpoints.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> EdgeId {
        let id = self.push_edge(a, b);
        self.node_edges[a].push(id);
        self.node_edges[b].push(id);
        id
    }

    /// Tombstones `edge` and drops it from the incident lists of its endpoints.
    ///
    /// Returns `false` if the edge was already removed.
    pub fn mark_edge_removed(&mut self, edge: EdgeId) -> bool {
        if self.edges[edge].removed {
            return false;
        }
        self.edges[edge].removed = true;
        for node in self.edges[edge].endpoints {
            if let Some(list) = self.node_edges.get_mut(node) {
                list.retain(|e| *e != edge);
            }
        }
        true
    }

    /// Replaces endpoint `old` of `edge` with `new`, updating the incidence index.
    ///
    /// Returns `false` (and changes nothing) if `old` is not an endpoint of `edge`.
    pub fn replace_endpoint(&mut self, edge: EdgeId, old: NodeId, new: NodeId) -> bool {
        let slot = match self.edges[edge].endpoints {
            [a, _] if a == old => 0,
            [_, b] if b == old => 1,
            _ => return false,
        };
        self.edges[edge].endpoints[slot] = new;
        if !self.edges[edge].removed {
            self.node_edges[old].retain(|e| *e != edge);
            self.node_edges[new].push(edge);
        }
        true
    }

    /// Sets both endpoints of a live `edge`, updating the incidence index.
    pub fn reconnect(&mut self, edge: EdgeId, endpoints: [NodeId; 2]) {
        let current = self.edges[edge].endpoints;
        if current == endpoints {
            return;
        }
        if !self.edges[edge].removed {
            for node in current.into_iter().filter(|n| !endpoints.contains(n)) {
                self.node_edges[node].retain(|e| *e != edge);
            }
            for node in endpoints.into_iter().filter(|n| !current.contains(n)) {
                self.node_edges[node].push(edge);
            }
        }
        self.edges[edge].endpoints = endpoints;
    }

    /// Erases tombstoned edges, renumbers the survivors in order and rebuilds the index.
    ///
    /// Returns the number of erased edges.
    pub fn compact_edges(&mut self) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| !e.removed);
        self.rebuild_index();
        before - self.edges.len()
    }

    /// Rebuilds the node-to-edge index from the edge list.
    pub fn rebuild_index(&mut self) {
        self.node_edges.clear();
        self.node_edges.resize_with(self.nodes.len(), EdgeBuffer::new);
        for (id, edge) in self.edges.iter().enumerate() {
            if edge.removed {
                continue;
            }
            let [a, b] = edge.endpoints;
            self.node_edges[a].push(id);
            self.node_edges[b].push(id);
        }
    }

    /// Deletes nodes without incident edges and renumbers the rest densely, in order.
    ///
    /// Edge endpoints and tracked ids are remapped; tracked ids of deleted nodes are dropped.
    /// Returns the number of deleted nodes.
    pub fn remove_orphan_nodes(&mut self) -> usize {
        let mut remap = vec![None; self.nodes.len()];
        let mut kept = Vec::with_capacity(self.nodes.len());
        for (old, position) in self.nodes.iter().enumerate() {
            if !self.node_edges[old].is_empty() {
                remap[old] = Some(kept.len());
                kept.push(*position);
            }
        }
        let removed = self.nodes.len() - kept.len();
        if removed == 0 {
            return 0;
        }

        self.nodes = kept;
        // Tombstones may reference deleted nodes; drop them before remapping.
        self.edges.retain(|e| !e.removed);
        for edge in &mut self.edges {
            for endpoint in &mut edge.endpoints {
                // Live edges only touch nodes with a non-empty incident list.
                if let Some(new) = remap[*endpoint] {
                    *endpoint = new;
                }
            }
        }
        self.tracked = self.tracked.iter().filter_map(|&n| remap[n]).collect();
        self.rebuild_index();
        removed
    }

    /// Minimum-image length of `edge`.
    #[must_use]
    pub fn periodic_length(&self, edge: EdgeId, domain: &PeriodicBox) -> f64 {
        let [a, b] = self.edges[edge].endpoints;
        domain.periodic_distance(&self.nodes[a], &self.nodes[b])
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    fn check_endpoints(&self) -> Result<(), NetworkError> {
        for (id, edge) in self.edges.iter().enumerate() {
            for node in edge.endpoints {
                if node >= self.nodes.len() {
                    return Err(NetworkError::EndpointOutOfRange {
                        edge: id,
                        node,
                        node_count: self.nodes.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks endpoint ranges, self-loops, duplicate edges, the incidence index and the
    /// tracked set.
    ///
    /// # Errors
    ///
    /// Returns the first [`NetworkError`] found.
    pub fn validate(&self) -> Result<(), NetworkError> {
        self.check_endpoints()?;

        let mut pairs: FastHashMap<(NodeId, NodeId), EdgeId> = FastHashMap::default();
        for (id, edge) in self.edges.iter().enumerate() {
            if edge.removed {
                continue;
            }
            let [a, b] = edge.endpoints;
            if a == b {
                return Err(NetworkError::SelfLoop { edge: id, node: a });
            }
            if let Some(&first) = pairs.get(&(a.min(b), a.max(b))) {
                return Err(NetworkError::DuplicateEdge { first, second: id });
            }
            pairs.insert((a.min(b), a.max(b)), id);
        }

        if self.node_edges.len() != self.nodes.len() {
            return Err(NetworkError::IndexMismatch {
                node: self.node_edges.len().min(self.nodes.len()),
            });
        }
        let mut expected = vec![0_usize; self.nodes.len()];
        for edge in self.edges.iter().filter(|e| !e.removed) {
            expected[edge.endpoints[0]] += 1;
            expected[edge.endpoints[1]] += 1;
        }
        for (node, list) in self.node_edges.iter().enumerate() {
            let consistent = list.len() == expected[node]
                && list
                    .iter()
                    .all(|&e| e < self.edges.len() && !self.edges[e].removed && self.edges[e].contains(node));
            if !consistent {
                return Err(NetworkError::IndexMismatch { node });
            }
        }

        if let Some(&node) = self.tracked.iter().find(|&&n| n >= self.nodes.len()) {
            return Err(NetworkError::TrackedOutOfRange { node });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> FiberNetwork {
        FiberNetwork::from_parts(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            [[0, 1], [1, 2], [2, 3], [3, 0]],
        )
        .unwrap()
    }

    #[test]
    fn test_edge_accessors() {
        let edge = Edge::new(3, 7);
        assert_eq!(edge.other(3), Some(7));
        assert_eq!(edge.other(7), Some(3));
        assert_eq!(edge.other(1), None);
        assert!(edge.connects(7, 3));
        assert!(!edge.is_removed());
    }

    #[test]
    fn test_from_parts_rejects_bad_edges() {
        let nodes = vec![[0.0; 3], [1.0, 0.0, 0.0]];
        assert_eq!(
            FiberNetwork::from_parts(nodes.clone(), [[0, 2]]),
            Err(NetworkError::EndpointOutOfRange {
                edge: 0,
                node: 2,
                node_count: 2
            })
        );
        assert_eq!(
            FiberNetwork::from_parts(nodes.clone(), [[1, 1]]),
            Err(NetworkError::SelfLoop { edge: 0, node: 1 })
        );
        assert_eq!(
            FiberNetwork::from_parts(nodes, [[0, 1], [1, 0]]),
            Err(NetworkError::DuplicateEdge {
                first: 0,
                second: 1
            })
        );
    }

    #[test]
    fn test_tombstone_then_compact_renumbers_edges() {
        let mut network = square();
        assert!(network.mark_edge_removed(1));
        assert!(!network.mark_edge_removed(1));
        assert_eq!(network.degree(1), 1);
        assert_eq!(network.live_edge_count(), 3);
        network.validate().unwrap();

        assert_eq!(network.compact_edges(), 1);
        assert_eq!(network.edge_count(), 3);
        assert!(network.edges()[1].connects(2, 3));
        network.validate().unwrap();
    }

    #[test]
    fn test_replace_endpoint_keeps_index_consistent() {
        let mut network = square();
        assert!(network.replace_endpoint(0, 1, 2));
        assert!(!network.replace_endpoint(0, 1, 3));
        assert_eq!(network.degree(1), 1);
        assert_eq!(network.degree(2), 3);
        assert!(network.contains_edge(0, 2));
        assert!(!network.contains_edge(0, 1));
        network.validate().unwrap();
    }

    #[test]
    fn test_reconnect_round_trips() {
        let mut network = square();
        let before = network.clone();
        let original = network.edge(0).endpoints();
        network.reconnect(0, [0, 2]);
        assert!(network.contains_edge(0, 2));
        assert_eq!(network.degree(1), 1);
        network.reconnect(0, original);
        assert!(network.contains_edge(0, 1));
        assert_eq!(network.degree_histogram(), before.degree_histogram());
        network.validate().unwrap();
    }

    #[test]
    fn test_remove_orphan_nodes_remaps_ids() {
        let mut network = FiberNetwork::from_parts(
            vec![[0.0; 3], [9.0; 3], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            [[0, 2], [2, 3]],
        )
        .unwrap();
        network.set_tracked_nodes(vec![1, 3]);

        assert_eq!(network.remove_orphan_nodes(), 1);
        assert_eq!(network.node_count(), 3);
        assert!(network.contains_edge(0, 1));
        assert!(network.contains_edge(1, 2));
        assert_eq!(network.tracked_nodes(), &[2]);
        network.validate().unwrap();
    }

    #[test]
    fn test_pop_isolated_node_only_pops_isolated_tail() {
        let mut network = square();
        assert_eq!(network.pop_isolated_node(), None);
        let extra = network.push_node([5.0; 3]);
        assert_eq!(extra, 4);
        assert_eq!(network.pop_isolated_node(), Some([5.0; 3]));
        assert_eq!(network.node_count(), 4);
    }

    #[test]
    fn test_degree_histogram_and_classes() {
        let network = square();
        assert_eq!(network.degree_histogram().get(&2), Some(&4));
        assert_eq!(network.class(0), NodeClass::Other);
        assert_eq!(NodeClass::from_degree(1), NodeClass::Stub);
        assert_eq!(NodeClass::from_degree(6), NodeClass::Hub);
        let neighbors: Vec<_> = network.neighbors(0).collect();
        assert_eq!(neighbors, vec![1, 3]);
    }

    #[test]
    fn test_periodic_length_uses_minimum_image() {
        let domain = PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap();
        let network =
            FiberNetwork::from_parts(vec![[4.5, 0.0, 0.0], [-4.5, 0.0, 0.0]], [[0, 1]]).unwrap();
        approx::assert_relative_eq!(network.periodic_length(0, &domain), 1.0, epsilon = 1e-12);
    }
}

//! The two move types of the annealing engine.

use rand::Rng;

use super::{AnnealingError, Annealer, MoveOutcome};
use crate::core::algorithms::search::bounded_search;
use crate::core::collections::{EdgeId, NodeId};

impl<R: Rng + ?Sized> Annealer<'_, R> {
    /// Displaces one movable node by up to `max_step` per coordinate.
    ///
    /// Infeasible if any incident fiber becomes longer than `max_length`. The cosines of the
    /// node and its neighbours and the lengths of its fibers are rebinned.
    pub(super) fn relocate(&mut self) -> MoveOutcome {
        if self.movable.is_empty() {
            return MoveOutcome::Infeasible;
        }
        let node = self.movable[self.rng.random_range(0..self.movable.len())];
        let mut position = self.network.position(node);
        for coordinate in &mut position {
            *coordinate += self.rng.random_range(-1.0..1.0) * self.max_step;
        }
        self.network.set_position(node, position);

        let edges: Vec<EdgeId> = self.network.incident_edges(node).to_vec();
        if edges
            .iter()
            .any(|&e| self.network.periodic_length(e, self.domain) > self.max_length)
        {
            self.network.set_position(node, self.position_backup[node]);
            return MoveOutcome::Infeasible;
        }

        let mut nodes: Vec<NodeId> = self.network.neighbors(node).collect();
        nodes.push(node);
        nodes.sort_unstable();
        nodes.dedup();

        if self.settle(&nodes, &edges) {
            self.position_backup[node] = position;
            MoveOutcome::Accepted
        } else {
            self.network.set_position(node, self.position_backup[node]);
            MoveOutcome::Rejected
        }
    }

    /// Exchanges endpoints between two nearby fibers `(a1, a2)` and `(b1, b2)`.
    ///
    /// The partner is searched among fibers sharing no endpoint with the first one and whose
    /// endpoints all lie within `max_length` of both of its endpoints. The crosswise pattern
    /// `(a1, b2), (b1, a2)` is tried first, then `(a1, b1), (a2, b2)`; a pattern that would
    /// duplicate an existing fiber is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AnnealingError::RecombinationExhausted`] if no partner is found within the
    /// recombination budget.
    pub(super) fn recombine(&mut self) -> Result<MoveOutcome, AnnealingError> {
        let edge_count = self.network.edge_count();
        if edge_count < 2 {
            return Err(AnnealingError::RecombinationExhausted { attempts: 0 });
        }
        let first = self.rng.random_range(0..edge_count);
        let [a1, a2] = self.network.edge(first).endpoints();

        let network = &*self.network;
        let rng = &mut *self.rng;
        let domain = self.domain;
        let max_length = self.max_length;
        let second = bounded_search(self.config.recombination_budget, |_| {
            let candidate = rng.random_range(0..edge_count);
            let [b1, b2] = network.edge(candidate).endpoints();
            let disjoint = ![a1, a2].contains(&b1) && ![a1, a2].contains(&b2);
            let close = [(a1, b1), (a1, b2), (a2, b1), (a2, b2)]
                .into_iter()
                .all(|(p, q)| {
                    domain.periodic_distance(&network.position(p), &network.position(q))
                        <= max_length
                });
            (disjoint && close).then_some(candidate)
        })
        .map_err(|exhausted| {
            tracing::error!(
                edge = first,
                attempts = exhausted.attempts,
                "no recombination partner"
            );
            AnnealingError::RecombinationExhausted {
                attempts: exhausted.attempts,
            }
        })?;
        let [b1, b2] = self.network.edge(second).endpoints();

        let (new_first, new_second) =
            if !self.network.contains_edge(a1, b2) && !self.network.contains_edge(b1, a2) {
                ([a1, b2], [b1, a2])
            } else if !self.network.contains_edge(a1, b1) && !self.network.contains_edge(a2, b2)
            {
                ([a1, b1], [a2, b2])
            } else {
                return Ok(MoveOutcome::Infeasible);
            };
        self.network.reconnect(first, new_first);
        self.network.reconnect(second, new_second);

        let mut nodes = [a1, a2, b1, b2];
        nodes.sort_unstable();
        let edges = [first, second];
        if self.settle(&nodes, &edges) {
            self.edge_backup[first] = new_first;
            self.edge_backup[second] = new_second;
            Ok(MoveOutcome::Accepted)
        } else {
            self.network.reconnect(first, self.edge_backup[first]);
            self.network.reconnect(second, self.edge_backup[second]);
            Ok(MoveOutcome::Rejected)
        }
    }
}

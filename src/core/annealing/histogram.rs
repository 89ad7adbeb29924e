//! Binned length and cosine statistics with speculative update, commit and revert.
//!
//! Both histograms record, next to the bin counts, which bin every sample currently occupies
//! (one bin per edge for lengths, one bin per incident edge pair for cosines) plus a backup of
//! those memberships. A move updates the memberships of the edges and nodes it touched,
//! then either commits them into the backup or reverts them, restoring counts exactly.

use serde::{Deserialize, Serialize};

use crate::core::collections::{EdgeId, NodeId};
use crate::core::network::FiberNetwork;
use crate::geometry::util::{dot, norm};
use crate::geometry::PeriodicBox;

/// Uniform binning of `[low, low + bins * width)`; samples outside clamp to the end bins.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    /// Number of bins.
    pub bins: usize,
    /// Lower edge of the first bin.
    pub low: f64,
    /// Bin width.
    pub width: f64,
}

impl BinSpec {
    /// Normalized fiber lengths in `[0, 5)`.
    pub const LENGTH: Self = Self {
        bins: 1000,
        low: 0.0,
        width: 5.0 / 1000.0,
    };

    /// Cosines in `[-1, 1)`.
    pub const COSINE: Self = Self {
        bins: 1000,
        low: -1.0,
        width: 2.0 / 1000.0,
    };

    /// Bin index of `x`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fibernet::core::annealing::histogram::BinSpec;
    ///
    /// assert_eq!(BinSpec::COSINE.bin_of(-1.0), 0);
    /// assert_eq!(BinSpec::COSINE.bin_of(1.0), 999);
    /// assert_eq!(BinSpec::LENGTH.bin_of(12.0), 999);
    /// ```
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bin_of(&self, x: f64) -> usize {
        let last = self.bins.saturating_sub(1);
        let position = ((x - self.low) / self.width).floor();
        if position.is_nan() || position >= last as f64 {
            last
        } else if position <= 0.0 {
            0
        } else {
            position as usize
        }
    }

    /// Center of bin `bin`.
    #[must_use]
    pub fn center(&self, bin: usize) -> f64 {
        (bin as f64 + 0.5).mul_add(self.width, self.low)
    }
}

/// Bin counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    counts: Vec<u32>,
}

impl Histogram {
    fn new(bins: usize) -> Self {
        Self {
            counts: vec![0; bins],
        }
    }

    fn add(&mut self, bin: usize) {
        self.counts[bin] += 1;
    }

    fn remove(&mut self, bin: usize) {
        debug_assert!(self.counts[bin] > 0, "bin {bin} underflow");
        self.counts[bin] = self.counts[bin].saturating_sub(1);
    }

    /// Counts per bin.
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }
}

/// Normalized length of every edge, binned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LengthBins {
    spec: BinSpec,
    scale: f64,
    histogram: Histogram,
    edge_bins: Vec<usize>,
    backup: Vec<usize>,
}

impl LengthBins {
    /// Bins every edge of `network`; raw lengths are multiplied by `scale`.
    #[must_use]
    pub fn new(network: &FiberNetwork, domain: &PeriodicBox, spec: BinSpec, scale: f64) -> Self {
        let mut histogram = Histogram::new(spec.bins);
        let edge_bins: Vec<usize> = (0..network.edge_count())
            .map(|edge| {
                let bin = spec.bin_of(network.periodic_length(edge, domain) * scale);
                histogram.add(bin);
                bin
            })
            .collect();
        Self {
            spec,
            scale,
            histogram,
            backup: edge_bins.clone(),
            edge_bins,
        }
    }

    /// Binning used.
    #[must_use]
    pub const fn spec(&self) -> &BinSpec {
        &self.spec
    }

    /// Length normalization factor.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Current counts.
    #[must_use]
    pub const fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Current bin of every edge.
    #[must_use]
    pub fn edge_bins(&self) -> &[usize] {
        &self.edge_bins
    }

    /// Rebins `edge` from the current network state.
    pub fn update(&mut self, edge: EdgeId, network: &FiberNetwork, domain: &PeriodicBox) {
        self.histogram.remove(self.edge_bins[edge]);
        let bin = self
            .spec
            .bin_of(network.periodic_length(edge, domain) * self.scale);
        self.edge_bins[edge] = bin;
        self.histogram.add(bin);
    }

    /// Accepts the current bins of `edges` into the backup.
    pub fn commit(&mut self, edges: impl IntoIterator<Item = EdgeId>) {
        for edge in edges {
            self.backup[edge] = self.edge_bins[edge];
        }
    }

    /// Restores the backed-up bins of `edges` and their counts.
    pub fn revert(&mut self, edges: impl IntoIterator<Item = EdgeId>) {
        for edge in edges {
            self.histogram.remove(self.edge_bins[edge]);
            self.histogram.add(self.backup[edge]);
            self.edge_bins[edge] = self.backup[edge];
        }
    }

    /// Normalized length of every edge.
    #[must_use]
    pub fn samples(&self, network: &FiberNetwork, domain: &PeriodicBox) -> Vec<f64> {
        (0..network.edge_count())
            .map(|edge| network.periodic_length(edge, domain) * self.scale)
            .collect()
    }
}

/// Cosine of the angle between every pair of edges sharing a node, binned per node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CosineBins {
    spec: BinSpec,
    histogram: Histogram,
    node_bins: Vec<Vec<usize>>,
    backup: Vec<Vec<usize>>,
}

impl CosineBins {
    /// Bins the incident edge pairs of every node of `network`.
    #[must_use]
    pub fn new(network: &FiberNetwork, domain: &PeriodicBox, spec: BinSpec) -> Self {
        let mut bins = Self {
            spec,
            histogram: Histogram::new(spec.bins),
            node_bins: vec![Vec::new(); network.node_count()],
            backup: Vec::new(),
        };
        for node in 0..network.node_count() {
            bins.update(node, network, domain);
        }
        bins.backup = bins.node_bins.clone();
        bins
    }

    /// Binning used.
    #[must_use]
    pub const fn spec(&self) -> &BinSpec {
        &self.spec
    }

    /// Current counts.
    #[must_use]
    pub const fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Current bins of the incident edge pairs of `node`.
    #[must_use]
    pub fn node_bins(&self, node: NodeId) -> &[usize] {
        &self.node_bins[node]
    }

    /// Rebins all incident edge pairs of `node` from the current network state.
    pub fn update(&mut self, node: NodeId, network: &FiberNetwork, domain: &PeriodicBox) {
        for &bin in &self.node_bins[node] {
            self.histogram.remove(bin);
        }
        let origin = network.position(node);
        let directions: Vec<_> = network
            .neighbors(node)
            .map(|other| domain.periodic_delta(&network.position(other), &origin))
            .collect();

        let bins = &mut self.node_bins[node];
        bins.clear();
        for i in 0..directions.len() {
            for j in i + 1..directions.len() {
                let cosine = dot(&directions[i], &directions[j])
                    / (norm(&directions[i]) * norm(&directions[j]));
                let bin = self.spec.bin_of(cosine);
                self.histogram.add(bin);
                bins.push(bin);
            }
        }
    }

    /// Accepts the current bins of `nodes` into the backup.
    pub fn commit(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        for node in nodes {
            self.backup[node].clone_from(&self.node_bins[node]);
        }
    }

    /// Restores the backed-up bins of `nodes` and their counts.
    pub fn revert(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        for node in nodes {
            for &bin in &self.node_bins[node] {
                self.histogram.remove(bin);
            }
            for &bin in &self.backup[node] {
                self.histogram.add(bin);
            }
            self.node_bins[node].clone_from(&self.backup[node]);
        }
    }

    /// One bin-center sample per counted pair, in bin order.
    #[must_use]
    pub fn samples(&self) -> Vec<f64> {
        self.histogram
            .counts()
            .iter()
            .enumerate()
            .flat_map(|(bin, &count)| {
                std::iter::repeat_n(self.spec.center(bin), count as usize)
            })
            .collect()
    }
}

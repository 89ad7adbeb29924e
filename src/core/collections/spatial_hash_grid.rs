//! Spatial hash-grid acceleration structure.
//!
//! This module provides a lightweight spatial index used as a drop-in replacement for the
//! linear scans that match coordinates under an absolute tolerance:
//! - node deduplication during graph extraction (`1e-13`)
//! - periodic image matching during consolidation (`1e-7`)
//!
//! Matching semantics are unchanged: the grid only narrows the candidate set, callers still
//! apply the exact per-coordinate tolerance test. As long as `cell_size >= tolerance`, every
//! point within tolerance of a query lies in the 3×3×3 Moore neighborhood of the query cell.

use super::{FastHashMap, SmallBuffer};

const BUCKET_INLINE_CAPACITY: usize = 8;

/// Largest cell coordinate magnitude that still has unit resolution in `f64`.
const MAX_CELL_COORDINATE: f64 = 4_503_599_627_370_496.0; // 2^52

/// Hashable grid-cell key (floored cell coordinates).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct GridKey([i64; 3]);

/// A simple spatial hash grid mapping grid cells to the keys stored in them.
///
/// The grid uses a fixed `cell_size` and indexes points by `floor(coord / cell_size)`.
#[derive(Clone, Debug)]
pub struct HashGridIndex<K> {
    cell_size: f64,
    usable: bool,
    cells: FastHashMap<GridKey, SmallBuffer<K, BUCKET_INLINE_CAPACITY>>,
}

impl<K: Copy> HashGridIndex<K> {
    /// Create a new grid index with the given cell size.
    ///
    /// A non-finite or non-positive cell size yields an unusable index; callers must then
    /// fall back to linear scans.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            usable: cell_size.is_finite() && cell_size > 0.0,
            cells: FastHashMap::default(),
        }
    }

    /// Returns `true` while every inserted point could be keyed.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.usable
    }

    /// Cell edge length of the grid.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Removes all entries, keeping the index usable if the cell size is valid.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.usable = self.cell_size.is_finite() && self.cell_size > 0.0;
    }

    /// Insert a key at the given coordinates.
    ///
    /// If the point cannot be keyed robustly the index is disabled, so callers can fall
    /// back to linear scans.
    pub fn insert(&mut self, key: K, coords: &[f64; 3]) {
        if !self.usable {
            return;
        }

        let Some(grid_key) = self.key_for_coords(coords) else {
            self.usable = false;
            return;
        };

        self.cells.entry(grid_key).or_default().push(key);
    }

    /// Removes one occurrence of `key` stored at `coords`.
    ///
    /// Returns `true` if the key was found.
    pub fn remove(&mut self, key: K, coords: &[f64; 3]) -> bool
    where
        K: PartialEq,
    {
        let Some(grid_key) = self.key_for_coords(coords) else {
            return false;
        };
        let Some(bucket) = self.cells.get_mut(&grid_key) else {
            return false;
        };
        let Some(position) = bucket.iter().position(|stored| *stored == key) else {
            return false;
        };
        bucket.remove(position);
        if bucket.is_empty() {
            self.cells.remove(&grid_key);
        }
        true
    }

    /// Visit all candidate keys in the 3×3×3 neighborhood around `coords`.
    ///
    /// The visitor returns `false` to stop early. Returns `true` if the index was used for
    /// the query (even if it yielded zero candidates), `false` if it was unusable.
    pub fn for_each_candidate<F>(&self, coords: &[f64; 3], mut f: F) -> bool
    where
        F: FnMut(K) -> bool,
    {
        if !self.usable {
            return false;
        }

        let Some(GridKey(base)) = self.key_for_coords(coords) else {
            return false;
        };

        'outer: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let neighbor = GridKey([base[0] + dx, base[1] + dy, base[2] + dz]);
                    if let Some(bucket) = self.cells.get(&neighbor) {
                        for &key in bucket {
                            if !f(key) {
                                break 'outer;
                            }
                        }
                    }
                }
            }
        }

        true
    }

    // Cell coordinates are range-checked before the cast, so it is exact.
    #[expect(clippy::cast_possible_truncation)]
    fn key_for_coords(&self, coords: &[f64; 3]) -> Option<GridKey> {
        if !self.usable {
            return None;
        }

        let mut key = [0_i64; 3];
        for (slot, coord) in key.iter_mut().zip(coords) {
            let cell_coord = (coord / self.cell_size).floor();
            if !cell_coord.is_finite() || cell_coord.abs() >= MAX_CELL_COORDINATE {
                return None;
            }
            *slot = cell_coord as i64;
        }

        Some(GridKey(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collections::FastHashSet;

    #[test]
    fn test_candidate_lookup_spans_neighbor_cells() {
        let mut grid: HashGridIndex<usize> = HashGridIndex::new(1.0);
        grid.insert(0, &[0.2, 0.2, 0.2]);
        grid.insert(1, &[-0.2, 0.2, 0.2]);
        grid.insert(2, &[5.0, 5.0, 5.0]);

        let mut found = FastHashSet::default();
        let used = grid.for_each_candidate(&[0.9, 0.1, 0.0], |key| {
            found.insert(key);
            true
        });

        assert!(used);
        assert!(found.contains(&0));
        assert!(found.contains(&1));
        assert!(!found.contains(&2));
    }

    #[test]
    fn test_early_exit_stops_visiting() {
        let mut grid: HashGridIndex<usize> = HashGridIndex::new(1.0);
        for key in 0..5 {
            grid.insert(key, &[0.5, 0.5, 0.5]);
        }

        let mut visited = 0;
        grid.for_each_candidate(&[0.5, 0.5, 0.5], |_| {
            visited += 1;
            visited < 2
        });
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_invalid_cell_size_is_unusable() {
        let mut grid: HashGridIndex<usize> = HashGridIndex::new(0.0);
        assert!(!grid.is_usable());
        grid.insert(0, &[0.0, 0.0, 0.0]);
        assert!(!grid.for_each_candidate(&[0.0, 0.0, 0.0], |_| true));
    }

    #[test]
    fn test_non_finite_coordinate_disables_index() {
        let mut grid: HashGridIndex<usize> = HashGridIndex::new(1.0);
        grid.insert(0, &[f64::NAN, 0.0, 0.0]);
        assert!(!grid.is_usable());

        grid.clear();
        assert!(grid.is_usable());
    }

    #[test]
    fn test_remove_drops_single_occurrence() {
        let mut grid: HashGridIndex<usize> = HashGridIndex::new(1.0);
        grid.insert(7, &[0.5, 0.5, 0.5]);
        grid.insert(8, &[0.5, 0.5, 0.5]);

        assert!(grid.remove(7, &[0.5, 0.5, 0.5]));
        assert!(!grid.remove(7, &[0.5, 0.5, 0.5]));

        let mut found = Vec::new();
        grid.for_each_candidate(&[0.5, 0.5, 0.5], |key| {
            found.push(key);
            true
        });
        assert_eq!(found, vec![8]);
    }
}

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Identifier of a node (fiber junction) in a [`FiberNetwork`](crate::core::network::FiberNetwork).
///
/// Ids are dense and assigned in order of first discovery during extraction.
pub type NodeId = usize;

/// Identifier of an edge (fiber segment) in a [`FiberNetwork`](crate::core::network::FiberNetwork).
pub type EdgeId = usize;

/// Optimized `HashMap` type for performance-critical operations.
/// Uses `rustc_hash::FxHasher` for faster hashing in non-cryptographic contexts.
///
/// # Security Warning
///
/// Not DoS-resistant. Use only with trusted, internal data.
///
/// # Examples
///
/// ```rust
/// use fibernet::core::collections::FastHashMap;
///
/// let mut map: FastHashMap<u64, usize> = FastHashMap::default();
/// map.insert(123, 456);
/// ```
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// Optimized `HashSet` type for internal membership testing.
///
/// # Examples
///
/// ```rust
/// use fibernet::core::collections::FastHashSet;
///
/// let mut set: FastHashSet<(usize, usize)> = FastHashSet::default();
/// set.insert((1, 2));
/// assert!(set.contains(&(1, 2)));
/// ```
pub type FastHashSet<T> = FxHashSet<T>;

/// Small-optimized Vec that uses stack allocation for small collections.
///
/// # Size Guidelines
///
/// - **N=4**: plane incidences of a polyhedron vertex
/// - **N=8**: node-to-edge lists (valency rarely exceeds 6), hash grid buckets
///
/// # Examples
///
/// ```rust
/// use fibernet::core::collections::SmallBuffer;
///
/// let mut buffer: SmallBuffer<usize, 8> = SmallBuffer::new();
/// for i in 0..4 {
///     buffer.push(i);
/// }
/// assert!(!buffer.spilled());
/// ```
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Inline capacity of a node's incident edge list.
pub const MAX_INLINE_VALENCY: usize = 8;

/// Incident edge list of one node.
pub type EdgeBuffer = SmallBuffer<EdgeId, MAX_INLINE_VALENCY>;

/// Creates a [`FastHashSet`] with at least the given capacity.
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

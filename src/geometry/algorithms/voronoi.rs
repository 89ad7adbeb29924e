//! Convex cell kernel seam and a periodic Voronoi reference kernel.
//!
//! Graph extraction consumes cell geometry through the [`CellKernel`] trait: per seed, the
//! cell's vertex coordinates (global, unwrapped) and per vertex the list of adjacent local
//! vertex indices. Any tessellation backend can be plugged in behind it.
//!
//! [`PeriodicVoronoiKernel`] is a brute-force implementation that builds each cell by
//! clipping a cube around the seed with the bisector planes of the periodic images of all
//! other seeds, nearest first, until no remaining plane can reach the cell.
//!
//! # Vertex identity
//!
//! A generic Voronoi vertex is the circumcenter of four seed images. After clipping, each
//! vertex is recomputed from its sorted generator quadruple, so cells sharing a vertex in the
//! same periodic frame report bit-identical coordinates. This is what lets extraction match
//! vertices under a `1e-13` tolerance.

use std::cmp::Ordering;

use smallvec::smallvec;
use thiserror::Error;

use crate::core::collections::{FastHashMap, SmallBuffer};
use crate::geometry::util::{dot, squared_norm, sub};
use crate::geometry::{PeriodicBox, Point3};

/// Geometry of one convex cell as produced by a [`CellKernel`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellGeometry {
    /// Vertex coordinates (global, unwrapped).
    pub vertices: Vec<Point3>,
    /// For every vertex, the local indices of its adjacent vertices.
    pub adjacency: Vec<Vec<usize>>,
}

impl CellGeometry {
    /// Number of vertices of the cell.
    #[must_use]
    pub const fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Degree (order) of a local vertex.
    #[must_use]
    pub fn degree(&self, vertex: usize) -> usize {
        self.adjacency.get(vertex).map_or(0, Vec::len)
    }
}

/// Reasons a single cell could not be built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellFailure {
    /// All vertices were on the outer side of a clipping plane.
    ClippedAway,
    /// A clipped face did not produce a closed cap polygon.
    OpenCap,
}

/// Errors raised by a [`CellKernel`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum KernelError {
    /// No seeds were supplied.
    #[error("Cannot tessellate an empty seed set")]
    EmptySeeds,

    /// A seed coordinate is not finite.
    #[error("Seed {index} has non-finite coordinates")]
    NonFiniteSeed {
        /// Index of the offending seed.
        index: usize,
    },

    /// A cell degenerated during construction.
    #[error("Cell of seed {seed} could not be built: {failure:?}")]
    DegenerateCell {
        /// Index of the seed whose cell failed.
        seed: usize,
        /// Failure classification.
        failure: CellFailure,
    },
}

/// Produces per-seed convex cell geometry for a sealed periodic box.
pub trait CellKernel {
    /// Computes one [`CellGeometry`] per seed, in seed order.
    ///
    /// # Errors
    ///
    /// Returns a [`KernelError`] if the seeds are invalid or a cell cannot be built.
    fn compute_cells(
        &self,
        domain: &PeriodicBox,
        seeds: &[Point3],
    ) -> Result<Vec<CellGeometry>, KernelError>;
}

/// Seed image: a seed index and a periodic lattice offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct ImageKey {
    seed: usize,
    shift: [i8; 3],
}

impl ImageKey {
    fn position(self, seeds: &[Point3], size: &Point3) -> Point3 {
        let base = seeds[self.seed];
        std::array::from_fn(|axis| f64::from(self.shift[axis]).mul_add(size[axis], base[axis]))
    }
}

#[derive(Clone, Copy, Debug)]
enum PlaneSource {
    Wall,
    Image(ImageKey),
}

#[derive(Clone, Copy, Debug)]
struct Plane {
    normal: Point3,
    offset: f64,
    source: PlaneSource,
}

#[derive(Clone, Debug)]
struct ClipVertex {
    position: Point3,
    /// Sorted indices of the planes the vertex lies on.
    planes: SmallBuffer<usize, 4>,
}

#[derive(Clone, Debug)]
struct ClipFace {
    ring: Vec<usize>,
}

/// Periodic Voronoi tessellation by half-space clipping.
///
/// Cost is quadratic in the seed count (every cell scans all 27 images of every seed), which
/// is adequate for networks of up to a few thousand seeds.
///
/// # Examples
///
/// ```
/// use fibernet::geometry::PeriodicBox;
/// use fibernet::geometry::algorithms::{CellKernel, PeriodicVoronoiKernel};
///
/// let domain = PeriodicBox::new([0.0; 3], [2.0; 3]).unwrap();
/// let cells = PeriodicVoronoiKernel::default()
///     .compute_cells(&domain, &[[0.0, 0.0, 0.0]])
///     .unwrap();
///
/// // A single seed owns the whole box: a cube with 8 vertices of degree 3.
/// assert_eq!(cells[0].vertex_count(), 8);
/// assert!((0..8).all(|v| cells[0].degree(v) == 3));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct PeriodicVoronoiKernel {
    /// Plane-side classification tolerance, relative to the largest box size.
    pub relative_tolerance: f64,
}

impl Default for PeriodicVoronoiKernel {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-12,
        }
    }
}

impl CellKernel for PeriodicVoronoiKernel {
    fn compute_cells(
        &self,
        domain: &PeriodicBox,
        seeds: &[Point3],
    ) -> Result<Vec<CellGeometry>, KernelError> {
        if seeds.is_empty() {
            return Err(KernelError::EmptySeeds);
        }
        if let Some(index) = seeds.iter().position(|s| s.iter().any(|c| !c.is_finite())) {
            return Err(KernelError::NonFiniteSeed { index });
        }

        let size = domain.size();
        let scale = size[0].max(size[1]).max(size[2]);
        let tolerance = self.relative_tolerance * scale;

        let mut cells = Vec::with_capacity(seeds.len());
        for seed in 0..seeds.len() {
            let cell = CellBuilder::new(seed, seeds, size, tolerance)
                .build()
                .map_err(|failure| KernelError::DegenerateCell { seed, failure })?;
            cells.push(cell);
        }

        tracing::debug!(
            cells = cells.len(),
            vertices = cells.iter().map(CellGeometry::vertex_count).sum::<usize>(),
            "periodic Voronoi tessellation complete"
        );
        Ok(cells)
    }
}

struct CellBuilder<'a> {
    seed_index: usize,
    seed: Point3,
    seeds: &'a [Point3],
    size: Point3,
    tolerance: f64,
    planes: Vec<Plane>,
    vertices: Vec<ClipVertex>,
    faces: Vec<ClipFace>,
}

impl<'a> CellBuilder<'a> {
    fn new(seed_index: usize, seeds: &'a [Point3], size: Point3, tolerance: f64) -> Self {
        let seed = seeds[seed_index];
        let half = size[0].max(size[1]).max(size[2]);

        // Walls: -x, +x, -y, +y, -z, +z.
        let mut planes = Vec::with_capacity(64);
        for axis in 0..3 {
            let mut normal = [0.0; 3];
            normal[axis] = -1.0;
            planes.push(Plane {
                normal,
                offset: -(seed[axis] - half),
                source: PlaneSource::Wall,
            });
            normal[axis] = 1.0;
            planes.push(Plane {
                normal,
                offset: seed[axis] + half,
                source: PlaneSource::Wall,
            });
        }

        // Cube corner i has bit 0/1/2 set when its x/y/z coordinate is on the upper wall.
        let vertices = (0..8_usize)
            .map(|corner| {
                let bits = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
                let position = std::array::from_fn(|axis| {
                    if bits[axis] == 1 {
                        seed[axis] + half
                    } else {
                        seed[axis] - half
                    }
                });
                ClipVertex {
                    position,
                    planes: smallvec![bits[0], 2 + bits[1], 4 + bits[2]],
                }
            })
            .collect();

        // Counter-clockwise seen from outside.
        let faces = [
            [0, 4, 6, 2],
            [1, 3, 7, 5],
            [0, 1, 5, 4],
            [2, 6, 7, 3],
            [0, 2, 3, 1],
            [4, 5, 7, 6],
        ]
        .into_iter()
        .map(|ring| ClipFace {
            ring: ring.to_vec(),
        })
        .collect();

        Self {
            seed_index,
            seed,
            seeds,
            size,
            tolerance,
            planes,
            vertices,
            faces,
        }
    }

    fn build(mut self) -> Result<CellGeometry, CellFailure> {
        for (key, distance_sq) in self.candidate_images() {
            // A bisector at distance r/2 cannot cut a cell whose vertices are all closer.
            if distance_sq / 4.0 > self.max_radius_sq() + self.tolerance {
                break;
            }
            let image = key.position(self.seeds, &self.size);
            let normal = sub(&image, &self.seed);
            let midpoint: Point3 = std::array::from_fn(|axis| 0.5 * (image[axis] + self.seed[axis]));
            self.planes.push(Plane {
                normal,
                offset: dot(&normal, &midpoint),
                source: PlaneSource::Image(key),
            });
            let plane_index = self.planes.len() - 1;
            self.clip(plane_index)?;
        }

        Ok(self.finish())
    }

    /// All seed images except the seed itself, nearest first.
    fn candidate_images(&self) -> Vec<(ImageKey, f64)> {
        let mut candidates = Vec::with_capacity(self.seeds.len() * 27);
        for seed in 0..self.seeds.len() {
            for sx in -1_i8..=1 {
                for sy in -1_i8..=1 {
                    for sz in -1_i8..=1 {
                        let key = ImageKey {
                            seed,
                            shift: [sx, sy, sz],
                        };
                        if seed == self.seed_index && key.shift == [0, 0, 0] {
                            continue;
                        }
                        let distance_sq =
                            squared_norm(&sub(&key.position(self.seeds, &self.size), &self.seed));
                        if distance_sq <= self.tolerance * self.tolerance {
                            tracing::warn!(
                                seed = self.seed_index,
                                other = seed,
                                "coincident seed image ignored"
                            );
                            continue;
                        }
                        candidates.push((key, distance_sq));
                    }
                }
            }
        }
        candidates.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        candidates
    }

    fn max_radius_sq(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| squared_norm(&sub(&v.position, &self.seed)))
            .fold(0.0, f64::max)
    }

    /// Clips the polyhedron against the inner half-space of `plane_index`.
    ///
    /// Returns `Ok(false)` if the plane does not cut the polyhedron.
    fn clip(&mut self, plane_index: usize) -> Result<bool, CellFailure> {
        let plane = self.planes[plane_index];
        let distances: Vec<f64> = self
            .vertices
            .iter()
            .map(|v| dot(&plane.normal, &v.position) - plane.offset)
            .collect();
        let tolerance = self.tolerance * plane.normal.iter().map(|c| c.abs()).fold(1.0, f64::max);
        let outside: Vec<bool> = distances.iter().map(|d| *d > tolerance).collect();

        if !outside.iter().any(|o| *o) {
            return Ok(false);
        }
        if outside.iter().all(|o| *o) {
            return Err(CellFailure::ClippedAway);
        }

        let mut vertices = Vec::with_capacity(self.vertices.len() + 4);
        let mut remap = vec![usize::MAX; self.vertices.len()];
        for (old, vertex) in self.vertices.iter().enumerate() {
            if !outside[old] {
                remap[old] = vertices.len();
                vertices.push(vertex.clone());
            }
        }

        let mut cuts: FastHashMap<(usize, usize), usize> = FastHashMap::default();
        let mut faces = Vec::with_capacity(self.faces.len() + 1);
        let mut segments = Vec::new();

        for face in &self.faces {
            let mut ring = Vec::with_capacity(face.ring.len() + 1);
            let mut exit = None;
            let mut enter = None;
            let m = face.ring.len();
            for k in 0..m {
                let current = face.ring[k];
                let next = face.ring[(k + 1) % m];
                if !outside[current] {
                    ring.push(remap[current]);
                }
                if outside[current] != outside[next] {
                    let key = (current.min(next), current.max(next));
                    let cut = if let Some(&existing) = cuts.get(&key) {
                        existing
                    } else {
                        let vertex = self.cut_vertex(key.0, key.1, &distances, plane_index);
                        vertices.push(vertex);
                        cuts.insert(key, vertices.len() - 1);
                        vertices.len() - 1
                    };
                    ring.push(cut);
                    if outside[current] {
                        enter = Some(cut);
                    } else {
                        exit = Some(cut);
                    }
                }
            }
            if ring.len() >= 3 {
                faces.push(ClipFace { ring });
            }
            match (exit, enter) {
                (Some(from), Some(to)) => segments.push((from, to)),
                (None, None) => {}
                _ => return Err(CellFailure::OpenCap),
            }
        }

        let cap = Self::chain_cap(&segments).ok_or(CellFailure::OpenCap)?;
        faces.push(ClipFace { ring: cap });

        self.vertices = vertices;
        self.faces = faces;
        Ok(true)
    }

    fn cut_vertex(&self, a: usize, b: usize, distances: &[f64], plane_index: usize) -> ClipVertex {
        let (pa, pb) = (self.vertices[a].position, self.vertices[b].position);
        let t = distances[a] / (distances[a] - distances[b]);
        let position = std::array::from_fn(|axis| t.mul_add(pb[axis] - pa[axis], pa[axis]));

        let mut planes: SmallBuffer<usize, 4> = self.vertices[a]
            .planes
            .iter()
            .copied()
            .filter(|p| self.vertices[b].planes.contains(p))
            .collect();
        planes.push(plane_index);
        planes.sort_unstable();
        ClipVertex { position, planes }
    }

    /// Chains per-face cut segments `(exit, enter)` into the cap polygon.
    ///
    /// Adjacent faces traverse the cap edges in the opposite direction, so the chain is
    /// reversed to keep the cap counter-clockwise from outside.
    fn chain_cap(segments: &[(usize, usize)]) -> Option<Vec<usize>> {
        if segments.len() < 3 {
            return None;
        }
        let next: FastHashMap<usize, usize> = segments.iter().copied().collect();
        if next.len() != segments.len() {
            return None;
        }
        let (start, mut current) = segments[0];
        let mut cap = vec![start];
        while current != start {
            if cap.len() >= segments.len() {
                return None;
            }
            cap.push(current);
            current = *next.get(&current)?;
        }
        if cap.len() != segments.len() {
            return None;
        }
        cap.reverse();
        Some(cap)
    }

    /// Canonical vertex positions and adjacency lists.
    fn finish(self) -> CellGeometry {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::with_capacity(3); self.vertices.len()];
        for face in &self.faces {
            let m = face.ring.len();
            for k in 0..m {
                let (a, b) = (face.ring[k], face.ring[(k + 1) % m]);
                if !adjacency[a].contains(&b) {
                    adjacency[a].push(b);
                }
                if !adjacency[b].contains(&a) {
                    adjacency[b].push(a);
                }
            }
        }

        let vertices = self
            .vertices
            .iter()
            .map(|v| self.canonical_position(v).unwrap_or(v.position))
            .collect();

        CellGeometry {
            vertices,
            adjacency,
        }
    }

    /// Circumcenter of the sorted generator quadruple of a vertex on exactly three bisectors.
    fn canonical_position(&self, vertex: &ClipVertex) -> Option<Point3> {
        if vertex.planes.len() != 3 {
            return None;
        }
        let mut generators: SmallBuffer<ImageKey, 4> = smallvec![ImageKey {
            seed: self.seed_index,
            shift: [0, 0, 0],
        }];
        for &plane in &vertex.planes {
            match self.planes[plane].source {
                PlaneSource::Image(key) => generators.push(key),
                PlaneSource::Wall => return None,
            }
        }
        generators.sort_unstable();

        let p: SmallBuffer<Point3, 4> = generators
            .iter()
            .map(|key| key.position(self.seeds, &self.size))
            .collect();
        let center = circumcenter(&p[0], &p[1], &p[2], &p[3])?;

        // Guard against a generator set that does not describe this vertex.
        let drift = squared_norm(&sub(&center, &vertex.position)).sqrt();
        (drift < 1e3 * self.tolerance.max(f64::EPSILON)).then_some(center)
    }
}

fn cross(a: &Point3, b: &Point3) -> Point3 {
    [
        a[1].mul_add(b[2], -(a[2] * b[1])),
        a[2].mul_add(b[0], -(a[0] * b[2])),
        a[0].mul_add(b[1], -(a[1] * b[0])),
    ]
}

/// Circumcenter of a tetrahedron, `None` when it is (nearly) flat.
fn circumcenter(p0: &Point3, p1: &Point3, p2: &Point3, p3: &Point3) -> Option<Point3> {
    let a = sub(p1, p0);
    let b = sub(p2, p0);
    let c = sub(p3, p0);
    let bc = cross(&b, &c);
    let ca = cross(&c, &a);
    let ab = cross(&a, &b);
    let det = 2.0 * dot(&a, &bc);
    let scale = squared_norm(&a).max(squared_norm(&b)).max(squared_norm(&c));
    if det.abs() <= 1e-14 * scale * scale.sqrt() {
        return None;
    }
    let (na, nb, nc) = (squared_norm(&a), squared_norm(&b), squared_norm(&c));
    Some(std::array::from_fn(|axis| {
        p0[axis] + na.mul_add(bc[axis], nb.mul_add(ca[axis], nc * ab[axis])) / det
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::util::generate_seed_points_seeded;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_seed_cell_is_the_box() {
        let domain = PeriodicBox::new([0.0; 3], [2.0, 4.0, 6.0]).unwrap();
        let cells = PeriodicVoronoiKernel::default()
            .compute_cells(&domain, &[[0.5, 0.5, 0.5]])
            .unwrap();
        let cell = &cells[0];
        assert_eq!(cell.vertex_count(), 8);
        for v in &cell.vertices {
            assert_relative_eq!((v[0] - 0.5).abs(), 1.0, epsilon = 1e-12);
            assert_relative_eq!((v[1] - 0.5).abs(), 2.0, epsilon = 1e-12);
            assert_relative_eq!((v[2] - 0.5).abs(), 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_two_seed_cells_split_the_box() {
        let domain = PeriodicBox::new([0.0; 3], [2.0; 3]).unwrap();
        let seeds = [[-0.5, 0.0, 0.0], [0.5, 0.0, 0.0]];
        let cells = PeriodicVoronoiKernel::default()
            .compute_cells(&domain, &seeds)
            .unwrap();
        assert_eq!(cells.len(), 2);
        for (cell, seed) in cells.iter().zip(&seeds) {
            assert_eq!(cell.vertex_count(), 8);
            for v in &cell.vertices {
                assert_relative_eq!((v[0] - seed[0]).abs(), 0.5, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_random_cells_are_simple_polyhedra() {
        let domain = PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap();
        let seeds = generate_seed_points_seeded(&domain, 20, 5).unwrap();
        let cells = PeriodicVoronoiKernel::default()
            .compute_cells(&domain, &seeds)
            .unwrap();

        let total_volume_proxy: usize = cells.iter().map(CellGeometry::vertex_count).sum();
        assert!(total_volume_proxy > 20 * 4);

        for (cell, seed) in cells.iter().zip(&seeds) {
            assert!(cell.vertex_count() >= 4);
            for v in 0..cell.vertex_count() {
                assert_eq!(cell.degree(v), 3, "Voronoi cell vertices have order 3");
                for &w in &cell.adjacency[v] {
                    assert!(cell.adjacency[w].contains(&v));
                }
            }
            // Every vertex is closer to its own seed than to any other seed image.
            for vertex in &cell.vertices {
                let own = squared_norm(&sub(vertex, seed));
                for other in &seeds {
                    let d = domain.periodic_delta(vertex, other);
                    assert!(squared_norm(&d) >= own - 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_shared_vertices_are_bit_identical() {
        let domain = PeriodicBox::new([0.0; 3], [10.0; 3]).unwrap();
        let seeds = generate_seed_points_seeded(&domain, 30, 11).unwrap();
        let cells = PeriodicVoronoiKernel::default()
            .compute_cells(&domain, &seeds)
            .unwrap();

        let mut near_misses = 0;
        let all: Vec<Point3> = cells.iter().flat_map(|c| c.vertices.clone()).collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                let d = squared_norm(&sub(a, b)).sqrt();
                if d > 0.0 && d < 1e-9 {
                    near_misses += 1;
                }
            }
        }
        assert_eq!(near_misses, 0);
    }

    #[test]
    fn test_rejects_invalid_seeds() {
        let domain = PeriodicBox::new([0.0; 3], [1.0; 3]).unwrap();
        let kernel = PeriodicVoronoiKernel::default();
        assert_eq!(
            kernel.compute_cells(&domain, &[]),
            Err(KernelError::EmptySeeds)
        );
        assert_eq!(
            kernel.compute_cells(&domain, &[[0.0, f64::NAN, 0.0]]),
            Err(KernelError::NonFiniteSeed { index: 0 })
        );
    }

    #[test]
    fn test_circumcenter_of_unit_corner() {
        let c = circumcenter(
            &[0.0, 0.0, 0.0],
            &[1.0, 0.0, 0.0],
            &[0.0, 1.0, 0.0],
            &[0.0, 0.0, 1.0],
        )
        .unwrap();
        for coord in c {
            assert_relative_eq!(coord, 0.5, epsilon = 1e-15);
        }
        assert!(circumcenter(&[0.0; 3], &[1.0, 0.0, 0.0], &[2.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).is_none());
    }
}

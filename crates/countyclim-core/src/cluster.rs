//! Locality-aware chunking of a county collection under a memory budget.
//!
//! Pipeline: project centroids into a latitude-appropriate planar CRS →
//! seeded k-means clustering → memory-constrained re-partitioning →
//! nearest-neighbor locality ordering within each chunk.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::county::CountyRecord;

/// Fraction of the run's memory budget any single chunk may claim.
const CHUNK_BUDGET_FRACTION: f64 = 0.8;

/// Deterministic k-means seeding; chunking must be reproducible run-to-run.
const KMEANS_SEED: u64 = 42;
const KMEANS_RESTARTS: usize = 10;
const KMEANS_MAX_ITER: usize = 100;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Chunking policy for the spatial-chunked strategy.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Fraction of available system memory to budget for the run.
    pub target_memory_usage: f64,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub enable_spatial_cache: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_memory_usage: 0.75,
            min_chunk_size: 5,
            max_chunk_size: 50,
            enable_spatial_cache: true,
        }
    }
}

impl ChunkingConfig {
    /// Policy used for the large-region (CONUS) case.
    pub fn large_region() -> Self {
        Self {
            min_chunk_size: 10,
            ..Self::default()
        }
    }
}

/// A group of county-collection indices processed together by one worker.
/// The estimate is only meaningful during construction; it is not updated as
/// processing proceeds.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub indices: Vec<usize>,
    pub estimated_bytes: f64,
}

// ── Projection ────────────────────────────────────────────────────────────────

/// Planar projection for centroid clustering, picked by latitude band to
/// keep inter-centroid distances meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    NorthPolarStereographic,
    SouthPolarStereographic,
    /// Used for the Americas mid-latitude window and as the global fallback.
    WebMercator,
}

fn pick_projection(centroids: &[(f64, f64)]) -> Projection {
    let min_lat = centroids.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let max_lat = centroids
        .iter()
        .map(|c| c.1)
        .fold(f64::NEG_INFINITY, f64::max);

    if min_lat > 60.0 {
        Projection::NorthPolarStereographic
    } else if max_lat < -60.0 {
        Projection::SouthPolarStereographic
    } else {
        Projection::WebMercator
    }
}

/// Spherical forward projection, metres. Accuracy only needs to support
/// relative distance comparisons between centroids.
fn project(lon: f64, lat: f64, projection: Projection) -> (f64, f64) {
    let lam = lon.to_radians();
    match projection {
        Projection::WebMercator => {
            // Clamp away from the poles where Mercator diverges.
            let phi = lat.clamp(-85.05, 85.05).to_radians();
            (
                EARTH_RADIUS_M * lam,
                EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + phi / 2.0).tan().ln(),
            )
        }
        Projection::NorthPolarStereographic => {
            let phi = lat.to_radians();
            let rho = 2.0 * EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 - phi / 2.0).tan();
            (rho * lam.sin(), -rho * lam.cos())
        }
        Projection::SouthPolarStereographic => {
            let phi = lat.to_radians();
            let rho = 2.0 * EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + phi / 2.0).tan();
            (rho * lam.sin(), rho * lam.cos())
        }
    }
}

// ── K-means ───────────────────────────────────────────────────────────────────

fn squared_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

/// Lloyd's algorithm with k-means++ seeding, multiple restarts, lowest
/// inertia wins. Deterministic for a fixed seed.
fn kmeans(points: &[(f64, f64)], k: usize, seed: u64) -> Vec<usize> {
    let k = k.min(points.len()).max(1);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut best_labels = vec![0usize; points.len()];
    let mut best_inertia = f64::INFINITY;

    for _ in 0..KMEANS_RESTARTS {
        let mut centers = kmeans_pp_init(points, k, &mut rng);
        let mut labels = vec![0usize; points.len()];

        for _ in 0..KMEANS_MAX_ITER {
            let mut changed = false;
            for (i, &p) in points.iter().enumerate() {
                let nearest = (0..k)
                    .min_by(|&a, &b| {
                        squared_distance(p, centers[a])
                            .partial_cmp(&squared_distance(p, centers[b]))
                            .unwrap()
                    })
                    .unwrap();
                if labels[i] != nearest {
                    labels[i] = nearest;
                    changed = true;
                }
            }

            let mut sums = vec![(0.0f64, 0.0f64, 0usize); k];
            for (i, &p) in points.iter().enumerate() {
                let s = &mut sums[labels[i]];
                s.0 += p.0;
                s.1 += p.1;
                s.2 += 1;
            }
            for (c, s) in centers.iter_mut().zip(&sums) {
                if s.2 > 0 {
                    *c = (s.0 / s.2 as f64, s.1 / s.2 as f64);
                }
            }

            if !changed {
                break;
            }
        }

        let inertia: f64 = points
            .iter()
            .zip(&labels)
            .map(|(&p, &l)| squared_distance(p, centers[l]))
            .sum();
        if inertia < best_inertia {
            best_inertia = inertia;
            best_labels = labels;
        }
    }

    best_labels
}

fn kmeans_pp_init(points: &[(f64, f64)], k: usize, rng: &mut StdRng) -> Vec<(f64, f64)> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.gen_range(0..points.len())]);

    while centers.len() < k {
        let dists: Vec<f64> = points
            .iter()
            .map(|&p| {
                centers
                    .iter()
                    .map(|&c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = dists.iter().sum();
        if total <= 0.0 {
            // All points coincide with existing centers.
            centers.push(points[rng.gen_range(0..points.len())]);
            continue;
        }
        let mut target = rng.gen::<f64>() * total;
        let mut chosen = points.len() - 1;
        for (i, &d) in dists.iter().enumerate() {
            target -= d;
            if target <= 0.0 {
                chosen = i;
                break;
            }
        }
        centers.push(points[chosen]);
    }

    centers
}

// ── Chunk construction ────────────────────────────────────────────────────────

/// Partition county indices into locality-aware, memory-bounded chunks.
///
/// `estimates[i]` is the per-county memory estimate in bytes for
/// `counties[i]`; `budget_bytes` is the run's target memory budget.
pub fn build_spatial_chunks(
    counties: &[CountyRecord],
    estimates: &[f64],
    budget_bytes: f64,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    assert_eq!(counties.len(), estimates.len());
    if counties.is_empty() {
        return Vec::new();
    }

    let centroids: Vec<(f64, f64)> = counties
        .iter()
        .map(|c| c.centroid().map_or((0.0, 0.0), |p| (p.x(), p.y())))
        .collect();
    let projection = pick_projection(&centroids);
    let projected: Vec<(f64, f64)> = centroids
        .iter()
        .map(|&(lon, lat)| project(lon, lat, projection))
        .collect();

    let mean_estimate = estimates.iter().sum::<f64>() / estimates.len() as f64;
    let k = ((counties.len() as f64 * mean_estimate / budget_bytes.max(1.0)) as usize)
        .max(config.min_chunk_size)
        .min(counties.len());

    log::info!(
        "clustering {} counties into {} initial spatial clusters ({:?})",
        counties.len(),
        k,
        projection
    );
    let labels = kmeans(&projected, k, KMEANS_SEED);

    let refined = refine_clusters_by_memory(&labels, k, estimates, budget_bytes, config);
    let ordered: Vec<Vec<usize>> = refined
        .into_iter()
        .map(|chunk| order_by_locality(chunk, &projected))
        .collect();

    ordered
        .into_iter()
        .map(|indices| {
            let estimated_bytes = indices.iter().map(|&i| estimates[i]).sum();
            Chunk {
                indices,
                estimated_bytes,
            }
        })
        .collect()
}

/// Re-partition initial clusters so every chunk fits the per-chunk memory
/// cap and the configured size bounds. Oversized clusters are greedily
/// bin-packed smallest-estimate first; undersized clusters are merged into
/// the previous chunk when both the size and memory caps allow.
fn refine_clusters_by_memory(
    labels: &[usize],
    k: usize,
    estimates: &[f64],
    budget_bytes: f64,
    config: &ChunkingConfig,
) -> Vec<Vec<usize>> {
    let per_chunk_cap = budget_bytes * CHUNK_BUDGET_FRACTION;
    let mut chunks: Vec<Vec<usize>> = Vec::new();
    let mut chunk_memory: Vec<f64> = Vec::new();

    for cluster_id in 0..k {
        let members: Vec<usize> = (0..labels.len())
            .filter(|&i| labels[i] == cluster_id)
            .collect();
        if members.is_empty() {
            continue;
        }
        let cluster_total: f64 = members.iter().map(|&i| estimates[i]).sum();

        if cluster_total > per_chunk_cap {
            // Greedy bin-pack, smallest estimates first.
            let mut sorted = members;
            sorted.sort_by(|&a, &b| estimates[a].partial_cmp(&estimates[b]).unwrap());

            let mut current: Vec<usize> = Vec::new();
            let mut current_memory = 0.0;
            for idx in sorted {
                if current_memory + estimates[idx] < per_chunk_cap
                    && current.len() < config.max_chunk_size
                {
                    current.push(idx);
                    current_memory += estimates[idx];
                } else {
                    if !current.is_empty() {
                        chunks.push(current);
                        chunk_memory.push(current_memory);
                    }
                    current = vec![idx];
                    current_memory = estimates[idx];
                }
            }
            if !current.is_empty() {
                chunks.push(current);
                chunk_memory.push(current_memory);
            }
        } else if members.len() >= config.min_chunk_size {
            chunks.push(members);
            chunk_memory.push(cluster_total);
        } else {
            // Undersized cluster: merge into the previous chunk when the
            // combined chunk stays within both caps, else keep it small.
            let fits_previous = chunks.last().is_some_and(|prev| {
                prev.len() + members.len() <= config.max_chunk_size
            }) && chunk_memory
                .last()
                .is_some_and(|&m| m + cluster_total <= per_chunk_cap);

            if fits_previous {
                chunks.last_mut().unwrap().extend(members);
                *chunk_memory.last_mut().unwrap() += cluster_total;
            } else {
                chunks.push(members);
                chunk_memory.push(cluster_total);
            }
        }
    }

    chunks
}

/// Greedy nearest-neighbor walk over projected centroids, so neighboring
/// counties are clipped back-to-back within a chunk. Chunks of one or two
/// counties are already optimally ordered.
fn order_by_locality(chunk: Vec<usize>, projected: &[(f64, f64)]) -> Vec<usize> {
    if chunk.len() <= 2 {
        return chunk;
    }

    let mut remaining = chunk;
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut current = remaining.remove(0);
    ordered.push(current);

    while !remaining.is_empty() {
        let (pos, _) = remaining
            .iter()
            .enumerate()
            .min_by(|(_, &a), (_, &b)| {
                squared_distance(projected[current], projected[a])
                    .partial_cmp(&squared_distance(projected[current], projected[b]))
                    .unwrap()
            })
            .unwrap();
        current = remaining.remove(pos);
        ordered.push(current);
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::county::rect_county;

    /// Grid of 1x1-degree counties at the given origins.
    fn counties_at(origins: &[(f64, f64)]) -> Vec<CountyRecord> {
        origins
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                rect_county(
                    &format!("{i:05}"),
                    &format!("County {i}"),
                    "XX",
                    i as u32 + 1,
                    x,
                    y,
                    x + 1.0,
                    y + 1.0,
                )
            })
            .collect()
    }

    fn conus_like_counties(n: usize) -> Vec<CountyRecord> {
        let origins: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let col = (i % 20) as f64;
                let row = (i / 20) as f64;
                (-120.0 + col * 2.0, 30.0 + row * 1.5)
            })
            .collect();
        counties_at(&origins)
    }

    #[test]
    fn every_county_lands_in_exactly_one_chunk() {
        let counties = conus_like_counties(80);
        let estimates = vec![1000.0; 80];
        let chunks = build_spatial_chunks(&counties, &estimates, 50_000.0, &ChunkingConfig::default());

        let mut seen: Vec<usize> = chunks.iter().flat_map(|c| c.indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..80).collect::<Vec<_>>());
    }

    #[test]
    fn multi_county_chunks_respect_the_memory_cap() {
        let counties = conus_like_counties(60);
        // Uneven estimates so the bin-packer actually has to split.
        let estimates: Vec<f64> = (0..60).map(|i| 500.0 + (i % 7) as f64 * 800.0).collect();
        let budget = 10_000.0;
        let chunks = build_spatial_chunks(&counties, &estimates, budget, &ChunkingConfig::default());

        for chunk in &chunks {
            if chunk.indices.len() > 1 {
                assert!(
                    chunk.estimated_bytes <= budget * CHUNK_BUDGET_FRACTION + 1e-9,
                    "chunk of {} counties estimated at {} exceeds cap",
                    chunk.indices.len(),
                    chunk.estimated_bytes
                );
            }
            assert!(chunk.indices.len() <= ChunkingConfig::default().max_chunk_size);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let counties = conus_like_counties(50);
        let estimates = vec![2000.0; 50];
        let a = build_spatial_chunks(&counties, &estimates, 100_000.0, &ChunkingConfig::default());
        let b = build_spatial_chunks(&counties, &estimates, 100_000.0, &ChunkingConfig::default());

        let ai: Vec<Vec<usize>> = a.iter().map(|c| c.indices.clone()).collect();
        let bi: Vec<Vec<usize>> = b.iter().map(|c| c.indices.clone()).collect();
        assert_eq!(ai, bi);
    }

    #[test]
    fn locality_order_keeps_membership() {
        let projected: Vec<(f64, f64)> = vec![(0.0, 0.0), (5.0, 0.0), (1.0, 0.0), (4.0, 0.0)];
        let ordered = order_by_locality(vec![0, 1, 2, 3], &projected);
        assert_eq!(ordered, vec![0, 2, 3, 1]); // walk: 0 -> 1.0 -> 4.0 -> 5.0

        let mut sorted = ordered;
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn polar_counties_use_polar_stereographic() {
        assert_eq!(
            pick_projection(&[(-150.0, 65.0), (-145.0, 70.0)]),
            Projection::NorthPolarStereographic
        );
        assert_eq!(
            pick_projection(&[(0.0, -75.0)]),
            Projection::SouthPolarStereographic
        );
        assert_eq!(
            pick_projection(&[(-100.0, 40.0), (-80.0, 35.0)]),
            Projection::WebMercator
        );
    }

    #[test]
    fn kmeans_separates_two_obvious_blobs() {
        let mut points: Vec<(f64, f64)> = Vec::new();
        for i in 0..10 {
            points.push((i as f64 * 0.1, 0.0));
            points.push((100.0 + i as f64 * 0.1, 0.0));
        }
        let labels = kmeans(&points, 2, KMEANS_SEED);
        // Alternating blob membership: consecutive pairs must differ, all
        // even indices agree, all odd indices agree.
        assert!(labels.iter().step_by(2).all(|&l| l == labels[0]));
        assert!(labels.iter().skip(1).step_by(2).all(|&l| l == labels[1]));
        assert_ne!(labels[0], labels[1]);
    }
}

//! Centroid clustering with a fixed cluster count.
//!
//! K-means over the rows of a precomputed distance matrix: each date is
//! embedded as its vector of distances to every other date, and clustered
//! with Euclidean geometry. Centroids are synthetic means, not members.

use super::Partition;
use crate::core::DayMatrix;
use crate::error::{DayTypeError, Result};

/// K-means configuration.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters, must be in [2, date count].
    pub k: usize,
    /// Maximum iterations; if exceeded the best partition found is
    /// returned with `converged = false`.
    pub max_iter: usize,
    /// Convergence tolerance on the inertia delta.
    pub tolerance: f64,
    /// Seed for deterministic initialization.
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 2,
            max_iter: 300,
            tolerance: 1e-4,
            seed: None,
        }
    }
}

impl KMeansConfig {
    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Cluster the rows of a distance matrix into `config.k` groups.
pub fn kmeans(distance: &DayMatrix, config: &KMeansConfig) -> Result<Partition> {
    let n = distance.size();
    if config.k < 2 || config.k > n {
        return Err(DayTypeError::InvalidClusterCount {
            k: config.k,
            dates: n,
        });
    }

    let points: Vec<&[f64]> = (0..n).map(|i| distance.row(i)).collect();
    let mut centroids = initialize_centroids(&points, config);

    let mut labels = vec![0; n];
    let mut prev_inertia = f64::INFINITY;
    let mut converged = false;
    let mut n_iter = 0;

    for iter in 0..config.max_iter {
        n_iter = iter + 1;

        // Assignment step.
        let mut inertia = 0.0;
        for (i, point) in points.iter().enumerate() {
            let (nearest, dist) = find_nearest_centroid(point, &centroids);
            labels[i] = nearest;
            inertia += dist;
        }

        if (prev_inertia - inertia).abs() < config.tolerance {
            converged = true;
            break;
        }
        prev_inertia = inertia;

        // Update step; empty clusters keep their previous centroid.
        update_centroids(&points, &labels, &mut centroids);
    }

    Ok(Partition {
        labels,
        exemplars: None,
        converged,
        n_iter,
    })
}

/// Deterministic k-means++-style initialization: the first centroid comes
/// from the seed, the rest are picked proportionally to their distance
/// from the nearest existing centroid.
fn initialize_centroids(points: &[&[f64]], config: &KMeansConfig) -> Vec<Vec<f64>> {
    let n = points.len();
    let k = config.k;
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);

    let first_idx = match config.seed {
        Some(seed) => (seed as usize) % n,
        None => 0,
    };
    centroids.push(points[first_idx].to_vec());

    for _ in 1..k {
        let mut distances: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| euclidean(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let sum: f64 = distances.iter().sum();
        if sum > 0.0 {
            for d in &mut distances {
                *d /= sum;
            }
        }

        let threshold = match config.seed {
            Some(seed) => ((seed + centroids.len() as u64) % 1000) as f64 / 1000.0,
            None => 0.5,
        };

        let mut cumsum = 0.0;
        let mut selected = n - 1;
        for (i, &d) in distances.iter().enumerate() {
            cumsum += d;
            if cumsum >= threshold {
                selected = i;
                break;
            }
        }
        centroids.push(points[selected].to_vec());
    }

    centroids
}

fn find_nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut min_dist = f64::INFINITY;
    let mut nearest = 0;
    for (i, centroid) in centroids.iter().enumerate() {
        let dist = euclidean(point, centroid);
        if dist < min_dist {
            min_dist = dist;
            nearest = i;
        }
    }
    (nearest, min_dist)
}

fn update_centroids(points: &[&[f64]], labels: &[usize], centroids: &mut [Vec<f64>]) {
    let dim = points[0].len();
    for (cluster, centroid) in centroids.iter_mut().enumerate() {
        let members: Vec<&[f64]> = points
            .iter()
            .zip(labels.iter())
            .filter(|(_, &l)| l == cluster)
            .map(|(&p, _)| p)
            .collect();
        if members.is_empty() {
            continue;
        }
        let count = members.len() as f64;
        for d in 0..dim {
            centroid[d] = members.iter().map(|m| m[d]).sum::<f64>() / count;
        }
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

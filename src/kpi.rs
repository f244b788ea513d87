//! Cluster quality KPIs: per-cluster fit errors and network validity indices.

use crate::core::{DayMatrix, EntityId, ProfileTable};
use crate::error::{DayTypeError, Result};
use crate::similarity::Assignment;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// Per-cluster error kind against the cluster exemplar profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Mean absolute error.
    Mae,
    /// Mean absolute percentage error, relative to the exemplar value;
    /// buckets with a zero exemplar value are excluded from the mean.
    Mape,
    /// Mean squared error.
    Mse,
    /// Root mean squared error.
    Rmse,
}

/// Cluster id → exemplar date, for one entity.
pub type ExemplarMap = BTreeMap<usize, NaiveDate>;

/// Per-cluster fit error for one entity.
///
/// Every member date's smoothed profile is compared pointwise against the
/// cluster exemplar's profile, skipping buckets where either side is
/// missing. Errors are flattened across (member date × bucket) before the
/// mean; a cluster with no comparable points yields NaN, not an error.
///
/// Returns `IncompleteAssignment` if an exemplar date is not assigned to
/// its own cluster, which is an internal invariant violation.
pub fn entity_cluster_error(
    smoothed: &ProfileTable,
    assignment: &Assignment,
    exemplars: &ExemplarMap,
    kind: ErrorKind,
) -> Result<Vec<(usize, f64)>> {
    let mut results = Vec::with_capacity(exemplars.len());

    for (&cluster, &exemplar_date) in exemplars {
        if !assignment
            .iter()
            .any(|&(d, c)| d == exemplar_date && c == cluster)
        {
            return Err(DayTypeError::IncompleteAssignment {
                cluster,
                date: exemplar_date.to_string(),
            });
        }
        let exemplar_col =
            smoothed
                .date_index(exemplar_date)
                .ok_or(DayTypeError::IncompleteAssignment {
                    cluster,
                    date: exemplar_date.to_string(),
                })?;

        let mut sum = 0.0;
        let mut count = 0usize;
        for &(date, c) in assignment {
            if c != cluster {
                continue;
            }
            let col = match smoothed.date_index(date) {
                Some(col) => col,
                None => continue,
            };
            for bucket in 0..smoothed.bucket_count() {
                let (member, exemplar) =
                    match (smoothed.get(bucket, col), smoothed.get(bucket, exemplar_col)) {
                        (Some(m), Some(e)) => (m, e),
                        _ => continue,
                    };
                let diff = member - exemplar;
                let term = match kind {
                    ErrorKind::Mae => diff.abs(),
                    ErrorKind::Mape => {
                        if exemplar == 0.0 {
                            continue;
                        }
                        (diff / exemplar).abs()
                    }
                    ErrorKind::Mse | ErrorKind::Rmse => diff * diff,
                };
                sum += term;
                count += 1;
            }
        }

        let mean = if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        };
        let value = match kind {
            ErrorKind::Rmse => mean.sqrt(),
            _ => mean,
        };
        results.push((cluster, value));
    }

    Ok(results)
}

/// Per-cluster fit error across all entities: KeyID → (cluster, value) rows.
pub fn per_cluster_error(
    smoothed: &HashMap<EntityId, ProfileTable>,
    assignments: &HashMap<EntityId, Assignment>,
    exemplar_maps: &HashMap<EntityId, ExemplarMap>,
    kind: ErrorKind,
) -> Result<HashMap<EntityId, Vec<(usize, f64)>>> {
    let mut out = HashMap::with_capacity(exemplar_maps.len());
    for (key, exemplars) in exemplar_maps {
        let table = smoothed
            .get(key)
            .ok_or_else(|| DayTypeError::InvalidParameter(format!("unknown entity {key}")))?;
        let assignment = assignments
            .get(key)
            .ok_or_else(|| DayTypeError::InvalidParameter(format!("unknown entity {key}")))?;
        out.insert(
            key.clone(),
            entity_cluster_error(table, assignment, exemplars, kind)?,
        );
    }
    Ok(out)
}

/// One named network validity score with its directionality.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedScore {
    pub name: &'static str,
    pub value: f64,
    pub direction: &'static str,
}

/// Network-wide cluster validity indices over a distance matrix + labels.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkQuality {
    /// Mean silhouette coefficient on the precomputed distances;
    /// -1 worst, 1 best, near 0 means overlapping clusters.
    pub silhouette: f64,
    /// Calinski-Harabasz: between- over within-cluster dispersion of the
    /// distance-profile embedding; higher is better.
    pub calinski_harabasz: f64,
    /// Davies-Bouldin over the same embedding; lower is better, 0 floor.
    pub davies_bouldin: f64,
}

impl NetworkQuality {
    /// Flat rows for the reporting layer, stable order.
    pub fn scores(&self) -> Vec<NamedScore> {
        vec![
            NamedScore {
                name: "Silhouette",
                value: self.silhouette,
                direction: "[Bad = -1, Good = 1]",
            },
            NamedScore {
                name: "Calinski-Harabasz",
                value: self.calinski_harabasz,
                direction: "The higher the better",
            },
            NamedScore {
                name: "Davies-Bouldin",
                value: self.davies_bouldin,
                direction: "The lower the better",
            },
        ]
    }
}

/// Compute all three validity indices.
///
/// Silhouette treats the matrix as precomputed distances; the other two
/// treat each date's row (its distance profile) as a Euclidean point, the
/// same embedding the network k-means clusters.
pub fn network_quality(distance: &DayMatrix, labels: &[usize]) -> Result<NetworkQuality> {
    let n = distance.size();
    if labels.len() != n {
        return Err(DayTypeError::DimensionMismatch {
            expected: n,
            got: labels.len(),
        });
    }
    let k = labels.iter().copied().max().map_or(0, |m| m + 1);
    if k < 2 || k >= n {
        return Err(DayTypeError::InvalidParameter(format!(
            "validity indices need 2 <= clusters < dates, got {k} clusters over {n} dates"
        )));
    }

    let sizes = {
        let mut sizes = vec![0usize; k];
        for &l in labels {
            sizes[l] += 1;
        }
        sizes
    };
    if sizes.iter().any(|&s| s == 0) {
        return Err(DayTypeError::InvalidParameter(
            "labels are not dense: empty cluster id".to_string(),
        ));
    }

    Ok(NetworkQuality {
        silhouette: silhouette(distance, labels, k, &sizes),
        calinski_harabasz: calinski_harabasz(distance, labels, k, &sizes),
        davies_bouldin: davies_bouldin(distance, labels, k, &sizes),
    })
}

fn silhouette(distance: &DayMatrix, labels: &[usize], k: usize, sizes: &[usize]) -> f64 {
    let n = distance.size();
    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] == 1 {
            continue; // singleton contributes 0
        }
        let mut cluster_sums = vec![0.0; k];
        for j in 0..n {
            if j != i {
                cluster_sums[labels[j]] += distance.get(i, j);
            }
        }
        let a = cluster_sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own)
            .map(|c| cluster_sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

/// Cluster centroids of the row embedding.
fn centroids(distance: &DayMatrix, labels: &[usize], k: usize, sizes: &[usize]) -> Vec<Vec<f64>> {
    let n = distance.size();
    let mut centroids = vec![vec![0.0; n]; k];
    for i in 0..n {
        let row = distance.row(i);
        let c = &mut centroids[labels[i]];
        for (d, &v) in row.iter().enumerate() {
            c[d] += v;
        }
    }
    for (c, &size) in centroids.iter_mut().zip(sizes) {
        for v in c.iter_mut() {
            *v /= size as f64;
        }
    }
    centroids
}

fn squared_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn calinski_harabasz(distance: &DayMatrix, labels: &[usize], k: usize, sizes: &[usize]) -> f64 {
    let n = distance.size();
    let centroids = centroids(distance, labels, k, sizes);
    let mut overall = vec![0.0; n];
    for i in 0..n {
        for (d, &v) in distance.row(i).iter().enumerate() {
            overall[d] += v;
        }
    }
    for v in overall.iter_mut() {
        *v /= n as f64;
    }

    let within: f64 = (0..n)
        .map(|i| squared_dist(distance.row(i), &centroids[labels[i]]))
        .sum();
    let between: f64 = centroids
        .iter()
        .zip(sizes)
        .map(|(c, &size)| size as f64 * squared_dist(c, &overall))
        .sum();

    (between / (k - 1) as f64) / (within / (n - k) as f64)
}

fn davies_bouldin(distance: &DayMatrix, labels: &[usize], k: usize, sizes: &[usize]) -> f64 {
    let n = distance.size();
    let centroids = centroids(distance, labels, k, sizes);

    // Mean intra-cluster distance to the centroid.
    let mut spread = vec![0.0; k];
    for i in 0..n {
        spread[labels[i]] += squared_dist(distance.row(i), &centroids[labels[i]]).sqrt();
    }
    for (s, &size) in spread.iter_mut().zip(sizes) {
        *s /= size as f64;
    }

    let mut total = 0.0;
    for i in 0..k {
        let mut worst = 0.0f64;
        for j in 0..k {
            if i == j {
                continue;
            }
            let separation = squared_dist(&centroids[i], &centroids[j]).sqrt();
            let ratio = if separation > 0.0 {
                (spread[i] + spread[j]) / separation
            } else {
                f64::INFINITY
            };
            worst = worst.max(ratio);
        }
        total += worst;
    }
    total / k as f64
}

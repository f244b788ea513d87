//! Exemplar clustering via affinity propagation.
//!
//! Message-passing clustering over a precomputed similarity matrix. The
//! cluster count is discovered from the affinity structure rather than
//! supplied; exemplars are actual members of their clusters.

use super::Partition;
use crate::core::DayMatrix;
use crate::error::{DayTypeError, Result};

/// Affinity propagation configuration.
#[derive(Debug, Clone)]
pub struct AffinityConfig {
    /// Message damping factor, in [0.5, 1).
    pub damping: f64,
    /// Maximum message-passing iterations.
    pub max_iter: usize,
    /// Iterations the exemplar set must stay unchanged to declare
    /// convergence.
    pub convergence_iter: usize,
    /// Per-point exemplar preference (self-similarity). `None` uses the
    /// median of the similarity matrix. Pinning a point's preference to
    /// `f64::NEG_INFINITY` bars it from ever becoming an exemplar.
    pub preference: Option<Vec<f64>>,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            damping: 0.5,
            max_iter: 200,
            convergence_iter: 15,
            preference: None,
        }
    }
}

impl AffinityConfig {
    pub fn damping(mut self, damping: f64) -> Self {
        self.damping = damping.clamp(0.5, 0.999);
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn convergence_iter(mut self, convergence_iter: usize) -> Self {
        self.convergence_iter = convergence_iter.max(1);
        self
    }

    pub fn preference(mut self, preference: Vec<f64>) -> Self {
        self.preference = Some(preference);
        self
    }
}

/// Cluster a similarity matrix by affinity propagation.
///
/// Non-finite similarity entries (degenerate dates) are treated as zero
/// affinity so they cannot poison the message passing. On non-convergence
/// within the iteration budget the last partition is returned with
/// `converged = false`; degenerate input collapsing to a single cluster is
/// valid output, not an error. Pinning every point's preference to
/// `f64::NEG_INFINITY` leaves no eligible exemplar and fails with
/// `NoEligibleExemplar`.
pub fn affinity_propagation(similarity: &DayMatrix, config: &AffinityConfig) -> Result<Partition> {
    let n = similarity.size();
    if let Some(pref) = &config.preference {
        if pref.len() != n {
            return Err(DayTypeError::DimensionMismatch {
                expected: n,
                got: pref.len(),
            });
        }
    }
    let pinned = |k: usize| {
        config
            .preference
            .as_ref()
            .map_or(false, |p| p[k] == f64::NEG_INFINITY)
    };
    if (0..n).all(pinned) {
        return Err(DayTypeError::NoEligibleExemplar);
    }
    if n == 1 {
        return Ok(Partition {
            labels: vec![0],
            exemplars: Some(vec![0]),
            converged: true,
            n_iter: 0,
        });
    }

    // Sanitized similarity with preferences on the diagonal.
    let mut s = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let v = similarity.get(i, j);
            s[i * n + j] = if v.is_finite() { v } else { 0.0 };
        }
    }
    let default_pref = median(&s);
    for k in 0..n {
        s[k * n + k] = match &config.preference {
            Some(pref) => pref[k],
            None => default_pref,
        };
    }

    let damping = config.damping;
    let mut r = vec![0.0; n * n];
    let mut a = vec![0.0; n * n];
    let mut prev_exemplars: Vec<usize> = Vec::new();
    let mut stable_iters = 0;
    let mut converged = false;
    let mut n_iter = 0;

    for iter in 0..config.max_iter {
        n_iter = iter + 1;

        // Responsibility updates: r(i,k) <- s(i,k) - max_{k' != k}(a(i,k') + s(i,k')).
        for i in 0..n {
            let row = i * n;
            let mut max1 = f64::NEG_INFINITY;
            let mut max2 = f64::NEG_INFINITY;
            let mut argmax = 0;
            for k in 0..n {
                let v = a[row + k] + s[row + k];
                if v > max1 {
                    max2 = max1;
                    max1 = v;
                    argmax = k;
                } else if v > max2 {
                    max2 = v;
                }
            }
            for k in 0..n {
                let competitor = if k == argmax { max2 } else { max1 };
                let updated = s[row + k] - competitor;
                r[row + k] = damping * r[row + k] + (1.0 - damping) * updated;
            }
        }

        // Availability updates:
        // a(i,k) <- min(0, r(k,k) + sum_{i' not in {i,k}} max(0, r(i',k)));
        // a(k,k) <- sum_{i' != k} max(0, r(i',k)).
        for k in 0..n {
            let mut positive_sum = 0.0;
            for i in 0..n {
                if i != k {
                    positive_sum += r[i * n + k].max(0.0);
                }
            }
            for i in 0..n {
                let updated = if i == k {
                    positive_sum
                } else {
                    (r[k * n + k] + positive_sum - r[i * n + k].max(0.0)).min(0.0)
                };
                a[i * n + k] = damping * a[i * n + k] + (1.0 - damping) * updated;
            }
        }

        let exemplars: Vec<usize> = (0..n)
            .filter(|&k| r[k * n + k] + a[k * n + k] > 0.0)
            .collect();
        if !exemplars.is_empty() && exemplars == prev_exemplars {
            stable_iters += 1;
            if stable_iters >= config.convergence_iter {
                converged = true;
                break;
            }
        } else {
            stable_iters = 0;
            prev_exemplars = exemplars;
        }
    }

    let mut exemplars: Vec<usize> = (0..n)
        .filter(|&k| r[k * n + k] + a[k * n + k] > 0.0)
        .collect();

    // Degenerate affinity structure: fall back to a single cluster around
    // the point with the largest total similarity, skipping points whose
    // preference bars them from exemplar duty.
    if exemplars.is_empty() {
        let best = (0..n)
            .filter(|&k| s[k * n + k] > f64::NEG_INFINITY)
            .max_by(|&p, &q| {
                let total = |k: usize| -> f64 { (0..n).filter(|&j| j != k).map(|j| s[j * n + k]).sum() };
                total(p).total_cmp(&total(q))
            })
            .ok_or(DayTypeError::NoEligibleExemplar)?;
        exemplars.push(best);
    }

    // Assign each point to the most similar exemplar; exemplars map to
    // their own cluster regardless of preference values.
    let mut labels = vec![0; n];
    for i in 0..n {
        if let Some(cluster) = exemplars.iter().position(|&e| e == i) {
            labels[i] = cluster;
            continue;
        }
        let mut best_cluster = 0;
        let mut best_sim = f64::NEG_INFINITY;
        for (cluster, &e) in exemplars.iter().enumerate() {
            let v = s[i * n + e];
            if v > best_sim {
                best_sim = v;
                best_cluster = cluster;
            }
        }
        labels[i] = best_cluster;
    }

    Ok(Partition {
        labels,
        exemplars: Some(exemplars),
        converged,
        n_iter,
    })
}

fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates(n: u32) -> Vec<NaiveDate> {
        (1..=n)
            .map(|d| NaiveDate::from_ymd_opt(2024, 2, d).unwrap())
            .collect()
    }

    /// Two-block similarity with small deterministic noise. Without the
    /// noise every point in a block is an exactly interchangeable exemplar
    /// candidate and the messages oscillate between the tied choices.
    fn block_similarity(n: usize, split: usize) -> DayMatrix {
        let mut state: u64 = 7;
        let mut noise = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) % 2001) as f64 / 1000.0 - 1.0
        };
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let v = if i == j {
                    1.0
                } else {
                    let base = if (i < split) == (j < split) { 0.9 } else { 0.1 };
                    base + 0.02 * noise()
                };
                values[i * n + j] = v;
                values[j * n + i] = v;
            }
        }
        DayMatrix::from_fn(dates(n as u32), |i, j| values[i * n + j]).unwrap()
    }

    #[test]
    fn two_blocks_give_two_clusters() {
        let sim = block_similarity(8, 4);
        let partition = affinity_propagation(&sim, &AffinityConfig::default()).unwrap();

        let exemplars = partition.exemplars.as_ref().unwrap();
        assert_eq!(exemplars.len(), 2);
        // Block membership recovered.
        for i in 0..4 {
            assert_eq!(partition.labels[i], partition.labels[0]);
        }
        for i in 4..8 {
            assert_eq!(partition.labels[i], partition.labels[4]);
        }
        assert_ne!(partition.labels[0], partition.labels[4]);
    }

    #[test]
    fn exemplars_are_members_of_their_clusters() {
        let sim = block_similarity(9, 5);
        let partition = affinity_propagation(&sim, &AffinityConfig::default()).unwrap();
        for (cluster, &e) in partition.exemplars.as_ref().unwrap().iter().enumerate() {
            assert_eq!(partition.labels[e], cluster);
        }
    }

    #[test]
    fn every_cluster_has_a_member() {
        let sim = block_similarity(10, 3);
        let partition = affinity_propagation(&sim, &AffinityConfig::default()).unwrap();
        for cluster in 0..partition.cluster_count() {
            assert!(!partition.members(cluster).is_empty());
        }
    }

    #[test]
    fn identical_points_collapse_to_one_cluster() {
        let sim = DayMatrix::from_fn(dates(5), |_, _| 1.0).unwrap();
        let partition = affinity_propagation(&sim, &AffinityConfig::default()).unwrap();
        assert_eq!(partition.cluster_count(), 1);
        assert!(partition.labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn pinned_preference_bars_exemplar_duty() {
        let sim = block_similarity(6, 3);
        let mut pref = vec![0.5; 6];
        // Bar the whole first block from exemplar duty.
        pref[0] = f64::NEG_INFINITY;
        pref[1] = f64::NEG_INFINITY;
        pref[2] = f64::NEG_INFINITY;
        let config = AffinityConfig::default().preference(pref);
        let partition = affinity_propagation(&sim, &config).unwrap();
        for &e in partition.exemplars.as_ref().unwrap() {
            assert!(e >= 3, "barred point {e} selected as exemplar");
        }
    }

    #[test]
    fn all_pinned_preferences_are_fatal() {
        let sim = block_similarity(4, 2);
        let config = AffinityConfig::default().preference(vec![f64::NEG_INFINITY; 4]);
        assert!(matches!(
            affinity_propagation(&sim, &config),
            Err(DayTypeError::NoEligibleExemplar)
        ));
    }

    #[test]
    fn single_pinned_point_is_fatal() {
        let sim = DayMatrix::from_fn(dates(1), |_, _| 1.0).unwrap();
        let config = AffinityConfig::default().preference(vec![f64::NEG_INFINITY]);
        assert!(matches!(
            affinity_propagation(&sim, &config),
            Err(DayTypeError::NoEligibleExemplar)
        ));
    }

    #[test]
    fn single_point_is_trivial() {
        let sim = DayMatrix::from_fn(dates(1), |_, _| 1.0).unwrap();
        let partition = affinity_propagation(&sim, &AffinityConfig::default()).unwrap();
        assert_eq!(partition.labels, vec![0]);
        assert_eq!(partition.exemplars, Some(vec![0]));
        assert!(partition.converged);
    }

    #[test]
    fn non_finite_similarities_are_tolerated() {
        let mut sim = block_similarity(6, 3);
        sim.set(0, 5, f64::NAN);
        sim.set(5, 0, f64::NAN);
        let partition = affinity_propagation(&sim, &AffinityConfig::default()).unwrap();
        assert_eq!(partition.labels.len(), 6);
    }

    #[test]
    fn preference_length_checked() {
        let sim = block_similarity(4, 2);
        let config = AffinityConfig::default().preference(vec![0.0; 3]);
        assert!(matches!(
            affinity_propagation(&sim, &config),
            Err(DayTypeError::DimensionMismatch { expected: 4, got: 3 })
        ));
    }
}

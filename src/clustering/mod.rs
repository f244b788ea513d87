//! Day clustering over similarity and distance matrices.
//!
//! Two strategies share one capability: exemplar-based affinity
//! propagation (no fixed cluster count, per entity) and centroid-based
//! k-means (fixed K, network scope). Downstream consumers (KPI scoring,
//! the network stage) only see the resulting `Partition`.

pub mod affinity;
pub mod kmeans;

pub use affinity::{affinity_propagation, AffinityConfig};
pub use kmeans::{kmeans, KMeansConfig};

use crate::core::DayMatrix;
use crate::error::Result;

/// A clustering outcome: dense labels plus optional exemplar indices.
///
/// `converged = false` means the iteration budget ran out; the partition
/// is the best one available, usable at the caller's discretion.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Cluster id per date, dense in `0..cluster_count`.
    pub labels: Vec<usize>,
    /// For exemplar clustering, `exemplars[c]` is the date index
    /// representing cluster `c`. Centroid clustering has none.
    pub exemplars: Option<Vec<usize>>,
    pub converged: bool,
    pub n_iter: usize,
}

impl Partition {
    pub fn cluster_count(&self) -> usize {
        match &self.exemplars {
            Some(e) => e.len(),
            None => self.labels.iter().copied().max().map_or(0, |m| m + 1),
        }
    }

    /// Date indices belonging to one cluster.
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == cluster)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Polymorphic clustering capability over a precomputed matrix.
#[derive(Debug, Clone)]
pub enum ClusteringStrategy {
    /// Affinity propagation over a similarity matrix.
    Exemplar(AffinityConfig),
    /// K-means over a distance matrix's rows.
    Centroid(KMeansConfig),
}

impl ClusteringStrategy {
    /// Fit the strategy. `Exemplar` expects a similarity matrix,
    /// `Centroid` a distance matrix.
    pub fn fit(&self, matrix: &DayMatrix) -> Result<Partition> {
        match self {
            ClusteringStrategy::Exemplar(config) => affinity_propagation(matrix, config),
            ClusteringStrategy::Centroid(config) => kmeans(matrix, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates(n: u32) -> Vec<NaiveDate> {
        (1..=n)
            .map(|d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
            .collect()
    }

    #[test]
    fn partition_members_and_count() {
        let partition = Partition {
            labels: vec![0, 1, 0, 1, 1],
            exemplars: Some(vec![0, 1]),
            converged: true,
            n_iter: 3,
        };
        assert_eq!(partition.cluster_count(), 2);
        assert_eq!(partition.members(0), vec![0, 2]);
        assert_eq!(partition.members(1), vec![1, 3, 4]);
    }

    #[test]
    fn strategy_dispatch() {
        // Two clearly separated blocks in similarity space.
        let n = 4;
        let sim = DayMatrix::from_fn(dates(n as u32), |i, j| {
            if (i < 2) == (j < 2) {
                1.0
            } else {
                0.0
            }
        })
        .unwrap();

        let exemplar = ClusteringStrategy::Exemplar(AffinityConfig::default());
        let partition = exemplar.fit(&sim).unwrap();
        assert_eq!(partition.labels.len(), n);
        assert!(partition.exemplars.is_some());

        let dist = crate::similarity::distance_matrix(&sim);
        let centroid = ClusteringStrategy::Centroid(KMeansConfig::default().k(2).seed(7));
        let partition = centroid.fit(&dist).unwrap();
        assert_eq!(partition.labels.len(), n);
        assert!(partition.exemplars.is_none());
    }
}

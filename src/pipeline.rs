//! Day-type derivation pipeline: smoothing, per-entity clustering, and
//! network-scope clustering.
//!
//! The per-entity stage (smooth → similarity → exemplar clustering) is a
//! pure transform per entity and runs on a rayon parallel iterator; one
//! entity's failure is isolated and reported without touching the others.
//! The network stage starts only after every entity has finished, since it
//! consumes the complete assignment set.

use crate::cache::{table_fingerprint, CacheKey, ResultCache};
use crate::clustering::{affinity_propagation, kmeans, AffinityConfig, KMeansConfig};
use crate::core::{DayMatrix, EntityId, ProfileTable};
use crate::error::{DayTypeError, Result};
use crate::kpi::{network_quality, ExemplarMap, NetworkQuality};
use crate::similarity::{distance_matrix, network_similarity_matrix, similarity_matrix, Assignment};
use crate::smoothing::{half_width_for, smooth_table, Kernel};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Run-level configuration for the day-type engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time-of-day grid resolution in minutes; bucket count is
    /// `ceil(1440 / resolution)`.
    pub resolution_minutes: u32,
    /// Smoothing kernel width as a percentage (0–100) of the daily grid.
    pub smoothing_percentage: f64,
    /// Fixed cluster count for the network stage, >= 2.
    pub network_cluster_count: usize,
    /// Enable per-entity exemplar clustering.
    pub enable_profile_clustering: bool,
    /// Enable network-scope clustering (requires the per-entity stage).
    pub enable_network_clustering: bool,
    /// Exemplar clustering parameters.
    pub affinity: AffinityConfig,
    /// Iteration bound for the network k-means.
    pub kmeans_max_iter: usize,
    /// Seed for the deterministic k-means initialization.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution_minutes: 15,
            smoothing_percentage: 10.0,
            network_cluster_count: 12,
            enable_profile_clustering: true,
            enable_network_clustering: true,
            affinity: AffinityConfig::default(),
            kmeans_max_iter: 300,
            seed: 0,
        }
    }
}

impl EngineConfig {
    pub fn resolution_minutes(mut self, minutes: u32) -> Self {
        self.resolution_minutes = minutes;
        self
    }

    pub fn smoothing_percentage(mut self, percentage: f64) -> Self {
        self.smoothing_percentage = percentage;
        self
    }

    pub fn network_cluster_count(mut self, k: usize) -> Self {
        self.network_cluster_count = k;
        self
    }

    pub fn enable_profile_clustering(mut self, enable: bool) -> Self {
        self.enable_profile_clustering = enable;
        self
    }

    pub fn enable_network_clustering(mut self, enable: bool) -> Self {
        self.enable_network_clustering = enable;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.resolution_minutes == 0 || self.resolution_minutes > 1440 {
            return Err(DayTypeError::InvalidParameter(format!(
                "time resolution must be in 1..=1440 minutes, got {}",
                self.resolution_minutes
            )));
        }
        if !(0.0..=100.0).contains(&self.smoothing_percentage) {
            return Err(DayTypeError::InvalidParameter(format!(
                "smoothing percentage must be in [0, 100], got {}",
                self.smoothing_percentage
            )));
        }
        if self.network_cluster_count < 2 {
            return Err(DayTypeError::InvalidParameter(format!(
                "network cluster count must be >= 2, got {}",
                self.network_cluster_count
            )));
        }
        Ok(())
    }

    /// Content fingerprint of every parameter that affects results; part
    /// of the cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.resolution_minutes.hash(&mut hasher);
        self.smoothing_percentage.to_bits().hash(&mut hasher);
        self.network_cluster_count.hash(&mut hasher);
        self.enable_profile_clustering.hash(&mut hasher);
        self.enable_network_clustering.hash(&mut hasher);
        self.affinity.damping.to_bits().hash(&mut hasher);
        self.affinity.max_iter.hash(&mut hasher);
        self.affinity.convergence_iter.hash(&mut hasher);
        self.kmeans_max_iter.hash(&mut hasher);
        self.seed.hash(&mut hasher);
        hasher.finish()
    }
}

/// One entity's per-entity stage output: smoothed table plus exemplar
/// clustering (when enabled).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStage {
    pub smoothed: ProfileTable,
    pub clusters: Option<EntityClusters>,
}

/// Exemplar clustering result for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityClusters {
    /// Date → cluster id.
    pub assignment: Assignment,
    /// Cluster id → exemplar date.
    pub exemplars: ExemplarMap,
    pub converged: bool,
}

/// Network-scope clustering result.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResult {
    /// Date → cluster id across the whole network.
    pub assignment: Assignment,
    /// Validity indices; `None` when they are undefined for the partition
    /// (e.g. every date its own cluster).
    pub quality: Option<NetworkQuality>,
    pub converged: bool,
}

/// Full engine output. Per-entity failures never abort the run; a network
/// stage failure leaves the per-entity results usable on their own.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub entities: HashMap<EntityId, EntityStage>,
    pub failures: Vec<(EntityId, DayTypeError)>,
    pub network: Option<NetworkResult>,
    pub network_error: Option<DayTypeError>,
}

/// The day-type clustering engine.
#[derive(Debug, Clone, Default)]
pub struct DayTypeEngine {
    config: EngineConfig,
}

impl DayTypeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline over per-entity profile tables.
    pub fn run(&self, tables: &HashMap<EntityId, ProfileTable>) -> Result<EngineOutput> {
        self.config.validate()?;
        if tables.is_empty() {
            return Err(DayTypeError::EmptyData);
        }

        let stages: Vec<(EntityId, Result<EntityStage>)> = tables
            .par_iter()
            .map(|(key, table)| (key.clone(), self.run_entity(table)))
            .collect();

        self.finish(stages)
    }

    /// Like [`run`](Self::run), but consults a content-addressed cache for
    /// the per-entity stage. Hits skip smoothing and exemplar clustering;
    /// misses are computed in parallel and inserted afterwards.
    pub fn run_cached(
        &self,
        tables: &HashMap<EntityId, ProfileTable>,
        cache: &mut ResultCache<EntityStage>,
    ) -> Result<EngineOutput> {
        self.config.validate()?;
        if tables.is_empty() {
            return Err(DayTypeError::EmptyData);
        }

        let config_fp = self.config.fingerprint();
        let mut stages: Vec<(EntityId, Result<EntityStage>)> = Vec::with_capacity(tables.len());
        let mut misses: Vec<(CacheKey, &ProfileTable)> = Vec::new();
        for (key, table) in tables {
            let cache_key = CacheKey {
                entity: key.clone(),
                data_fingerprint: table_fingerprint(table),
                config_fingerprint: config_fp,
            };
            match cache.get(&cache_key) {
                Some(stage) => {
                    debug!("cache hit for entity {key}");
                    stages.push((key.clone(), Ok(stage.clone())));
                }
                None => misses.push((cache_key, table)),
            }
        }

        let computed: Vec<(CacheKey, Result<EntityStage>)> = misses
            .into_par_iter()
            .map(|(cache_key, table)| {
                let stage = self.run_entity(table);
                (cache_key, stage)
            })
            .collect();
        for (cache_key, stage) in computed {
            let entity = cache_key.entity.clone();
            if let Ok(stage_value) = &stage {
                cache.insert(cache_key, stage_value.clone());
            }
            stages.push((entity, stage));
        }

        self.finish(stages)
    }

    /// Per-entity stage: smooth, then (optionally) similarity + exemplar
    /// clustering.
    fn run_entity(&self, table: &ProfileTable) -> Result<EntityStage> {
        let expected = crate::core::bucket_count(self.config.resolution_minutes);
        if table.bucket_count() != expected {
            return Err(DayTypeError::DimensionMismatch {
                expected,
                got: table.bucket_count(),
            });
        }

        let half_width = half_width_for(self.config.smoothing_percentage, expected);
        let kernel = Kernel::triangular(half_width);
        let smoothed = smooth_table(table, &kernel)?;

        if !self.config.enable_profile_clustering {
            return Ok(EntityStage {
                smoothed,
                clusters: None,
            });
        }

        let sim = similarity_matrix(&smoothed)?;
        let config = self.affinity_config_for(&smoothed, &sim);
        let partition = affinity_propagation(&sim, &config)?;
        if !partition.converged {
            warn!(
                "exemplar clustering did not converge within {} iterations; using last partition",
                partition.n_iter
            );
        }

        let dates = smoothed.dates().to_vec();
        let assignment: Assignment = dates
            .iter()
            .zip(&partition.labels)
            .map(|(&d, &l)| (d, l))
            .collect();
        let exemplars: ExemplarMap = partition
            .exemplars
            .as_ref()
            .map(|e| {
                e.iter()
                    .enumerate()
                    .map(|(cluster, &idx)| (cluster, dates[idx]))
                    .collect()
            })
            .unwrap_or_default();

        Ok(EntityStage {
            smoothed,
            clusters: Some(EntityClusters {
                assignment,
                exemplars,
                converged: partition.converged,
            }),
        })
    }

    /// Pin degenerate dates (zero valid samples or zero norm) out of
    /// exemplar duty; other preferences stay at the median similarity.
    fn affinity_config_for(&self, smoothed: &ProfileTable, sim: &DayMatrix) -> AffinityConfig {
        let degenerate: Vec<bool> = (0..smoothed.date_count())
            .map(|col| {
                smoothed
                    .column(col)
                    .iter()
                    .flatten()
                    .map(|v| v * v)
                    .sum::<f64>()
                    == 0.0
            })
            .collect();
        if !degenerate.iter().any(|&d| d) {
            return self.config.affinity.clone();
        }

        let median = finite_median(sim);
        let preference: Vec<f64> = degenerate
            .iter()
            .map(|&deg| if deg { f64::NEG_INFINITY } else { median })
            .collect();
        self.config.affinity.clone().preference(preference)
    }

    /// Join on the per-entity stage and run the network stage.
    fn finish(&self, stages: Vec<(EntityId, Result<EntityStage>)>) -> Result<EngineOutput> {
        let mut output = EngineOutput::default();
        for (key, stage) in stages {
            match stage {
                Ok(stage) => {
                    output.entities.insert(key, stage);
                }
                Err(err) => {
                    warn!("entity {key} failed: {err}");
                    output.failures.push((key, err));
                }
            }
        }

        if !self.config.enable_network_clustering || !self.config.enable_profile_clustering {
            return Ok(output);
        }

        let assignments: HashMap<EntityId, Assignment> = output
            .entities
            .iter()
            .filter_map(|(key, stage)| {
                stage
                    .clusters
                    .as_ref()
                    .map(|c| (key.clone(), c.assignment.clone()))
            })
            .collect();
        if assignments.is_empty() {
            output.network_error = Some(DayTypeError::EmptyData);
            return Ok(output);
        }

        match self.run_network(&assignments) {
            Ok(network) => output.network = Some(network),
            Err(err) => {
                warn!("network stage failed: {err}");
                output.network_error = Some(err);
            }
        }

        Ok(output)
    }

    fn run_network(&self, assignments: &HashMap<EntityId, Assignment>) -> Result<NetworkResult> {
        let sim = network_similarity_matrix(assignments)?;
        let dist = distance_matrix(&sim);
        debug!(
            "network stage: {} dates, k = {}",
            dist.size(),
            self.config.network_cluster_count
        );

        let config = KMeansConfig::default()
            .k(self.config.network_cluster_count)
            .max_iter(self.config.kmeans_max_iter)
            .seed(self.config.seed);
        let partition = kmeans(&dist, &config)?;
        if !partition.converged {
            warn!(
                "network k-means did not converge within {} iterations; using last partition",
                partition.n_iter
            );
        }

        let quality = match network_quality(&dist, &partition.labels) {
            Ok(q) => Some(q),
            Err(err) => {
                warn!("network validity indices unavailable: {err}");
                None
            }
        };

        let assignment: Assignment = dist
            .dates()
            .iter()
            .zip(&partition.labels)
            .map(|(&d, &l)| (d, l))
            .collect();

        Ok(NetworkResult {
            assignment,
            quality,
            converged: partition.converged,
        })
    }
}

fn finite_median(matrix: &DayMatrix) -> f64 {
    let n = matrix.size();
    let mut values: Vec<f64> = (0..n)
        .flat_map(|i| matrix.row(i).iter().copied())
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

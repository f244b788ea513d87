//! # daytype-cluster
//!
//! Derives recurring "day-type" patterns from per-entity daily time
//! series (e.g. traffic flow or speed per detector per day).
//!
//! The pipeline: cleansed records are pivoted into per-entity
//! time-bucket × date profile tables, smoothed with a gap-aware
//! triangular kernel, clustered per entity by affinity propagation over a
//! cosine-like similarity matrix, then aggregated network-wide where
//! cluster co-membership defines a day similarity that k-means partitions
//! into a fixed number of day-types. Per-cluster fit errors
//! (MAE/MAPE/MSE/RMSE) and network validity indices score the result.
//!
//! The crate is pure compute over in-memory matrices: no file I/O, no
//! plotting, no persistence. Collaborators supply cleansed input and
//! consume the flat result rows from [`report`].

#![allow(clippy::needless_range_loop)]

pub mod cache;
pub mod clustering;
pub mod core;
pub mod error;
pub mod kpi;
pub mod pipeline;
pub mod report;
pub mod similarity;
pub mod smoothing;

pub use error::{DayTypeError, Result};

pub mod prelude {
    pub use crate::cache::ResultCache;
    pub use crate::clustering::{ClusteringStrategy, Partition};
    pub use crate::core::{build_profile_tables, bucket_count, CleanRecord, EntityId, ProfileTable};
    pub use crate::error::{DayTypeError, Result};
    pub use crate::kpi::{network_quality, per_cluster_error, ErrorKind, NetworkQuality};
    pub use crate::pipeline::{DayTypeEngine, EngineConfig, EngineOutput};
}

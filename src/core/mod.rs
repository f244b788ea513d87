//! Core data structures: per-entity profile tables and labeled day matrices.

pub mod matrix;
pub mod profile;

pub use matrix::DayMatrix;
pub use profile::{build_profile_tables, bucket_count, CleanRecord, EntityId, ProfileTable};

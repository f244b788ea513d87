//! Error types for the daytype-cluster library.

use thiserror::Error;

/// Result type alias for day-type operations.
pub type Result<T> = std::result::Result<T, DayTypeError>;

/// Errors that can occur while deriving day-types.
///
/// Degenerate numeric input (a date with zero valid samples, a zero norm)
/// is deliberately NOT an error: it surfaces as a NaN/missing cell so that
/// downstream aggregation can skip it. Clustering non-convergence is not an
/// error either; see `clustering::Partition::converged`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DayTypeError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Network cluster count outside the valid range for the date set.
    #[error("invalid cluster count: k = {k} must be in [2, {dates}]")]
    InvalidClusterCount { k: usize, dates: usize },

    /// A cluster exemplar references a date that is not a member of its own
    /// cluster. This is an internal invariant violation, fatal for the
    /// stage that detects it.
    #[error("incomplete assignment: exemplar date {date} is not assigned to cluster {cluster}")]
    IncompleteAssignment { cluster: usize, date: String },

    /// Exemplar clustering found no date eligible for exemplar duty: every
    /// point's preference is pinned to negative infinity. Happens when all
    /// of an entity's dates are degenerate (zero valid samples).
    #[error("no exemplar-eligible date: every preference is pinned to negative infinity")]
    NoEligibleExemplar,
}

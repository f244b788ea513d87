//! Square matrices labeled by calendar dates (similarity and distance).

use crate::error::{DayTypeError, Result};
use chrono::NaiveDate;

/// A dense square matrix whose rows and columns are indexed by dates.
///
/// Used for per-entity and network similarity matrices and for the
/// derived distance matrices. Storage is row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DayMatrix {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl DayMatrix {
    /// Build from raw row-major values; `values.len()` must be `dates.len()²`.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.is_empty() {
            return Err(DayTypeError::EmptyData);
        }
        let expected = dates.len() * dates.len();
        if values.len() != expected {
            return Err(DayTypeError::DimensionMismatch {
                expected,
                got: values.len(),
            });
        }
        Ok(Self { dates, values })
    }

    /// Build by evaluating `f(i, j)` for every cell.
    pub fn from_fn<F>(dates: Vec<NaiveDate>, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> f64,
    {
        if dates.is_empty() {
            return Err(DayTypeError::EmptyData);
        }
        let n = dates.len();
        let mut values = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                values.push(f(i, j));
            }
        }
        Ok(Self { dates, values })
    }

    pub fn size(&self) -> usize {
        self.dates.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dates.len() + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.values[i * self.dates.len() + j] = value;
    }

    /// One row as a slice; for a distance matrix this is the date's
    /// distance profile against every other date.
    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.dates.len();
        &self.values[i * n..(i + 1) * n]
    }

    /// Apply an element-wise transform, keeping the date labels.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        Self {
            dates: self.dates.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }
}

//! Profile tables: one entity's daily signals as a time-bucket × date matrix.

use crate::error::{DayTypeError, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Opaque key identifying an independently-clustered signal source
/// (a detector, a road section, ...).
pub type EntityId = String;

/// One cleansed measurement: a value for one entity at one (date, time bucket).
///
/// Produced by an upstream cleansing collaborator; this crate never reads
/// raw files.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub key_id: EntityId,
    pub date: NaiveDate,
    /// Time-of-day bucket index, `0..bucket_count`.
    pub bucket: usize,
    pub value: f64,
}

/// Number of time buckets in one day at the given resolution (minutes).
///
/// Assumes profiles live on a perfect grid of that resolution; 1440 minutes
/// in 24h, rounded up.
pub fn bucket_count(resolution_minutes: u32) -> usize {
    (1440 + resolution_minutes as usize - 1) / resolution_minutes as usize
}

/// A time-bucket × date matrix of one entity's daily profiles.
///
/// Cells are `Option<f64>`: `None` marks a missing sample. Storage is
/// column-major (one column per date), dates sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    bucket_count: usize,
    dates: Vec<NaiveDate>,
    values: Vec<Option<f64>>,
}

impl ProfileTable {
    /// Create an all-missing table over the given dates.
    ///
    /// Dates are sorted and deduplicated.
    pub fn new(bucket_count: usize, dates: Vec<NaiveDate>) -> Result<Self> {
        if bucket_count == 0 {
            return Err(DayTypeError::InvalidParameter(
                "bucket count must be positive".to_string(),
            ));
        }
        if dates.is_empty() {
            return Err(DayTypeError::EmptyData);
        }
        let dates: Vec<NaiveDate> = dates.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let values = vec![None; bucket_count * dates.len()];
        Ok(Self {
            bucket_count,
            dates,
            values,
        })
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    /// Column index of a date, if present.
    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn get(&self, bucket: usize, col: usize) -> Option<f64> {
        self.values[col * self.bucket_count + bucket]
    }

    pub fn set(&mut self, bucket: usize, col: usize, value: Option<f64>) {
        self.values[col * self.bucket_count + bucket] = value;
    }

    /// One date's full profile as a bucket-indexed slice.
    pub fn column(&self, col: usize) -> &[Option<f64>] {
        let start = col * self.bucket_count;
        &self.values[start..start + self.bucket_count]
    }

    /// Number of non-missing samples in a date's profile.
    pub fn valid_count(&self, col: usize) -> usize {
        self.column(col).iter().filter(|v| v.is_some()).count()
    }

    /// Apply a per-column transform, producing a table over the same dates.
    ///
    /// The transform receives one date's profile and must return a profile
    /// of the same length.
    pub fn map_columns<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&[Option<f64>]) -> Vec<Option<f64>>,
    {
        let mut out = Self {
            bucket_count: self.bucket_count,
            dates: self.dates.clone(),
            values: Vec::with_capacity(self.values.len()),
        };
        for col in 0..self.date_count() {
            let mapped = f(self.column(col));
            if mapped.len() != self.bucket_count {
                return Err(DayTypeError::DimensionMismatch {
                    expected: self.bucket_count,
                    got: mapped.len(),
                });
            }
            out.values.extend(mapped);
        }
        Ok(out)
    }
}

/// Reshape cleansed records into one profile table per entity.
///
/// The pivot keeps the first value seen for a duplicate (entity, date,
/// bucket) triple. Records with a bucket outside `0..bucket_count` are
/// rejected.
pub fn build_profile_tables(
    records: &[CleanRecord],
    bucket_count: usize,
) -> Result<HashMap<EntityId, ProfileTable>> {
    if records.is_empty() {
        return Err(DayTypeError::EmptyData);
    }

    let mut per_entity: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    for r in records {
        if r.bucket >= bucket_count {
            return Err(DayTypeError::InvalidParameter(format!(
                "bucket index {} out of range (bucket count {})",
                r.bucket, bucket_count
            )));
        }
        per_entity.entry(r.key_id.as_str()).or_default().insert(r.date);
    }

    let mut tables: HashMap<EntityId, ProfileTable> = per_entity
        .into_iter()
        .map(|(key, dates)| {
            let table = ProfileTable::new(bucket_count, dates.into_iter().collect())?;
            Ok((key.to_string(), table))
        })
        .collect::<Result<_>>()?;

    for r in records {
        let table = tables.get_mut(&r.key_id).expect("entity inserted above");
        let col = table.date_index(r.date).expect("date inserted above");
        if table.get(r.bucket, col).is_none() {
            table.set(r.bucket, col, Some(r.value));
        }
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn bucket_count_rounds_up() {
        assert_eq!(bucket_count(15), 96);
        assert_eq!(bucket_count(60), 24);
        assert_eq!(bucket_count(7), 206); // 1440 / 7 = 205.71...
    }

    #[test]
    fn build_pivots_records() {
        let records = vec![
            CleanRecord {
                key_id: "A".into(),
                date: d(2),
                bucket: 0,
                value: 5.0,
            },
            CleanRecord {
                key_id: "A".into(),
                date: d(1),
                bucket: 1,
                value: 7.0,
            },
            CleanRecord {
                key_id: "B".into(),
                date: d(1),
                bucket: 0,
                value: 9.0,
            },
        ];
        let tables = build_profile_tables(&records, 4).unwrap();
        assert_eq!(tables.len(), 2);

        let a = &tables["A"];
        assert_eq!(a.dates(), &[d(1), d(2)]);
        assert_eq!(a.get(1, 0), Some(7.0));
        assert_eq!(a.get(0, 1), Some(5.0));
        assert_eq!(a.get(0, 0), None);
        assert_eq!(a.valid_count(0), 1);
    }

    #[test]
    fn build_first_value_wins_on_duplicates() {
        let records = vec![
            CleanRecord {
                key_id: "A".into(),
                date: d(1),
                bucket: 0,
                value: 1.0,
            },
            CleanRecord {
                key_id: "A".into(),
                date: d(1),
                bucket: 0,
                value: 2.0,
            },
        ];
        let tables = build_profile_tables(&records, 2).unwrap();
        assert_eq!(tables["A"].get(0, 0), Some(1.0));
    }

    #[test]
    fn build_rejects_out_of_range_bucket() {
        let records = vec![CleanRecord {
            key_id: "A".into(),
            date: d(1),
            bucket: 4,
            value: 1.0,
        }];
        let result = build_profile_tables(&records, 4);
        assert!(matches!(result, Err(DayTypeError::InvalidParameter(_))));
    }

    #[test]
    fn build_empty_records() {
        let result = build_profile_tables(&[], 4);
        assert!(matches!(result, Err(DayTypeError::EmptyData)));
    }

    #[test]
    fn map_columns_checks_length() {
        let table = ProfileTable::new(3, vec![d(1)]).unwrap();
        let result = table.map_columns(|_| vec![None; 2]);
        assert!(matches!(
            result,
            Err(DayTypeError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }
}

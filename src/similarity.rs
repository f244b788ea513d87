//! Day-to-day similarity matrices, per entity and at network scope.

use crate::core::{DayMatrix, EntityId, ProfileTable};
use crate::error::Result;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Per-entity day-to-day similarity over smoothed profiles.
///
/// `sim(i, j)` is the dot product over buckets where both dates are
/// defined, normalized by the square root of the product of the two
/// profiles' squared norms, each norm taken over its own vector's defined
/// support. The diagonal is set to 1 by definition rather than computed,
/// so a date with no valid samples still has self-similarity 1; its
/// off-diagonal entries come out NaN (degenerate, not fatal) and callers
/// must not pick such dates as exemplars.
pub fn similarity_matrix(table: &ProfileTable) -> Result<DayMatrix> {
    let n = table.date_count();
    let buckets = table.bucket_count();

    let norms: Vec<f64> = (0..n)
        .map(|col| {
            table
                .column(col)
                .iter()
                .flatten()
                .map(|v| v * v)
                .sum::<f64>()
        })
        .collect();

    let mut matrix = DayMatrix::from_fn(table.dates().to_vec(), |_, _| 0.0)?;
    for i in 0..n {
        matrix.set(i, i, 1.0);
        for j in (i + 1)..n {
            let mut dot = 0.0;
            for b in 0..buckets {
                if let (Some(vi), Some(vj)) = (table.get(b, i), table.get(b, j)) {
                    dot += vi * vj;
                }
            }
            let value = dot / (norms[i] * norms[j]).sqrt();
            matrix.set(i, j, value);
            matrix.set(j, i, value);
        }
    }
    Ok(matrix)
}

/// Per-entity exemplar cluster assignment: each date's cluster id.
pub type Assignment = Vec<(NaiveDate, usize)>;

/// Network-scope day similarity from per-entity cluster co-membership.
///
/// An indicator table over (entity, cluster) rows × dates is built: a cell
/// is 1 when the date belongs to that entity's cluster. Similarity of two
/// dates is the count of shared (entity, cluster) memberships over the dot
/// product of the two dates' per-entity coverage vectors. Dates enter only
/// through assignments, so every date is covered by at least one entity
/// and self-similarity is 1 by construction; a 0/0 cell (no entity covers
/// both dates) yields similarity 0.
pub fn network_similarity_matrix(
    assignments: &HashMap<EntityId, Assignment>,
) -> Result<DayMatrix> {
    let date_set: BTreeSet<NaiveDate> = assignments
        .values()
        .flat_map(|a| a.iter().map(|&(d, _)| d))
        .collect();
    let dates: Vec<NaiveDate> = date_set.into_iter().collect();
    let index: HashMap<NaiveDate, usize> = dates
        .iter()
        .enumerate()
        .map(|(i, &d)| (d, i))
        .collect();
    let n = dates.len();

    let mut numerator = vec![0.0; n * n];
    let mut denominator = vec![0.0; n * n];

    for assignment in assignments.values() {
        // Coverage: which dates this entity contributes at all.
        let covered: Vec<usize> = assignment.iter().map(|&(d, _)| index[&d]).collect();
        for &a in &covered {
            for &b in &covered {
                denominator[a * n + b] += 1.0;
            }
        }

        // Co-membership: pairs of dates sharing a cluster for this entity.
        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &(date, cluster) in assignment {
            members.entry(cluster).or_default().push(index[&date]);
        }
        for dates_in_cluster in members.values() {
            for &a in dates_in_cluster {
                for &b in dates_in_cluster {
                    numerator[a * n + b] += 1.0;
                }
            }
        }
    }

    DayMatrix::from_fn(dates, |i, j| {
        let den = denominator[i * n + j];
        if den == 0.0 {
            0.0
        } else {
            numerator[i * n + j] / den
        }
    })
}

/// Monotonically-decreasing transform from similarity to distance:
/// `d = exp(−s) − exp(−1)`, exactly 0 at similarity 1.
pub fn distance_matrix(similarity: &DayMatrix) -> DayMatrix {
    let floor = (-1.0f64).exp();
    similarity.map(|s| (-s).exp() - floor)
}

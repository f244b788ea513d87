//! Gap-aware triangular-kernel smoothing of daily profiles.
//!
//! Missing samples are handled by convolving the value series (with
//! missing treated as zero) and a presence indicator series with the same
//! kernel, then dividing. Gaps and edges are thereby down-weighted by
//! exactly the kernel mass they cover, instead of dragging the output
//! toward zero.

use crate::core::ProfileTable;
use crate::error::Result;

/// A symmetric triangular weighting kernel.
///
/// Taps are (offset, weight) pairs with weight = half_width − |offset|.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    taps: Vec<(isize, f64)>,
}

impl Kernel {
    /// Build a triangular kernel of the given half-width.
    ///
    /// Produces `2 * half_width + 1` taps. A half-width of 0 yields a
    /// single unit-weight tap, making smoothing the identity transform.
    pub fn triangular(half_width: usize) -> Self {
        if half_width == 0 {
            return Self {
                taps: vec![(0, 1.0)],
            };
        }
        let h = half_width as isize;
        let taps = (-h..=h).map(|k| (k, (h - k.abs()) as f64)).collect();
        Self { taps }
    }

    pub fn taps(&self) -> &[(isize, f64)] {
        &self.taps
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

/// Kernel half-width for a smoothing percentage (0–100) of the daily grid.
pub fn half_width_for(smoothing_percentage: f64, bucket_count: usize) -> usize {
    (smoothing_percentage * bucket_count as f64 / 200.0).ceil() as usize
}

/// Smooth one daily profile with a triangular kernel, gap-aware.
///
/// Convolves both (value × indicator) and the indicator alone, and divides
/// element-wise. Positions where the convolved indicator mass is zero stay
/// missing. Edges use only in-range taps, which is equivalent to
/// zero-padding the indicator.
pub fn smooth(profile: &[Option<f64>], kernel: &Kernel) -> Vec<Option<f64>> {
    let n = profile.len() as isize;
    let mut out = Vec::with_capacity(profile.len());
    for i in 0..n {
        let mut num = 0.0;
        let mut den = 0.0;
        for &(offset, weight) in kernel.taps() {
            let src = i - offset;
            if src < 0 || src >= n {
                continue;
            }
            if let Some(v) = profile[src as usize] {
                num += weight * v;
                den += weight;
            }
        }
        out.push(if den > 0.0 { Some(num / den) } else { None });
    }
    out
}

/// Smooth every date column of a profile table.
pub fn smooth_table(table: &ProfileTable, kernel: &Kernel) -> Result<ProfileTable> {
    table.map_columns(|profile| smooth(profile, kernel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    #[test]
    fn triangular_kernel_shape() {
        let kernel = Kernel::triangular(2);
        assert_eq!(
            kernel.taps(),
            &[(-2, 0.0), (-1, 1.0), (0, 2.0), (1, 1.0), (2, 0.0)]
        );
    }

    #[test]
    fn zero_half_width_is_unit_tap() {
        let kernel = Kernel::triangular(0);
        assert_eq!(kernel.taps(), &[(0, 1.0)]);
    }

    #[test]
    fn half_width_formula() {
        // 10% of 96 buckets: ceil(10 * 96 / 200) = ceil(4.8) = 5
        assert_eq!(half_width_for(10.0, 96), 5);
        assert_eq!(half_width_for(0.0, 96), 0);
        assert_eq!(half_width_for(100.0, 96), 48);
    }

    #[test]
    fn identity_at_zero_half_width() {
        let profile = vec![Some(1.0), None, Some(3.0), Some(4.0)];
        let smoothed = smooth(&profile, &Kernel::triangular(0));
        assert_eq!(smoothed, profile);
    }

    #[test]
    fn constant_signal_is_fixed_point() {
        let profile = vec![Some(5.0); 10];
        let smoothed = smooth(&profile, &Kernel::triangular(3));
        for v in smoothed {
            assert_relative_eq!(v.unwrap(), 5.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn constant_signal_with_gaps_is_fixed_point() {
        // Gap-aware normalization must not drag values toward zero.
        let mut profile = vec![Some(5.0); 12];
        profile[3] = None;
        profile[4] = None;
        profile[9] = None;
        let smoothed = smooth(&profile, &Kernel::triangular(2));
        for v in smoothed.iter().flatten() {
            assert_relative_eq!(*v, 5.0, epsilon = 1e-12);
        }
        // Interior gaps are filled from neighbors.
        assert!(smoothed[3].is_some());
    }

    #[test]
    fn all_missing_stays_missing() {
        let profile = vec![None; 8];
        let smoothed = smooth(&profile, &Kernel::triangular(2));
        assert!(smoothed.iter().all(|v| v.is_none()));
    }

    #[test]
    fn isolated_sample_beyond_kernel_reach_stays_missing() {
        let mut profile = vec![None; 10];
        profile[0] = Some(1.0);
        let smoothed = smooth(&profile, &Kernel::triangular(2));
        // Reach of a half-width-2 kernel is one bucket (end taps have
        // zero weight).
        assert!(smoothed[1].is_some());
        assert!(smoothed[2].is_none());
    }

    #[test]
    fn weighted_average_at_interior_point() {
        let profile = vec![Some(0.0), Some(10.0), Some(0.0)];
        let smoothed = smooth(&profile, &Kernel::triangular(2));
        // Center: (1*0 + 2*10 + 1*0) / 4
        assert_relative_eq!(smoothed[1].unwrap(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn smooth_table_keeps_shape() {
        let dates: Vec<NaiveDate> = (1..=3)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let mut table = ProfileTable::new(4, dates).unwrap();
        for col in 0..3 {
            for bucket in 0..4 {
                table.set(bucket, col, Some((bucket + col) as f64));
            }
        }
        let smoothed = smooth_table(&table, &Kernel::triangular(1)).unwrap();
        assert_eq!(smoothed.bucket_count(), 4);
        assert_eq!(smoothed.dates(), table.dates());
    }
}

//! Duration/value tables shared by the step and cyclic drivers.

use sim_types::SimError;

use crate::Result;

/// A table of `(duration, value)` segments laid end to end from time 0.
///
/// The change times are kept as a prefix sum with sentinels,
///
/// ```text
/// change_times = [0, d₀, d₀+d₁, ..., Σd, +∞]
/// ```
///
/// so segment `i` covers `[change_times[i], change_times[i+1])` and index
/// `N` is the open-ended segment after the table.
///
/// Lookups remember the last segment. A query in the same or the following
/// segment costs a couple of comparisons; anything else falls back to a
/// binary search.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSchedule {
    durations: Vec<f64>,
    values: Vec<f64>,
    change_times: Vec<f64>,
    index: usize,
}

impl ChangeSchedule {
    /// Build a schedule, validating the table.
    pub fn new(object: &str, durations: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if durations.len() != values.len() {
            return Err(SimError::LengthMismatch {
                object: object.to_string(),
                left: "Durations".to_string(),
                left_len: durations.len(),
                right: "Values".to_string(),
                right_len: values.len(),
            }
            .into());
        }
        if durations.is_empty() {
            return Err(SimError::invalid(object, "Durations", "", "table is empty").into());
        }
        if let Some(bad) = durations.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(SimError::invalid(
                object,
                "Durations",
                bad.to_string(),
                "durations must be finite and non-negative",
            )
            .into());
        }

        let mut change_times = Vec::with_capacity(durations.len() + 2);
        change_times.push(0.0);
        let mut total = 0.0;
        for d in &durations {
            total += d;
            change_times.push(total);
        }
        change_times.push(f64::INFINITY);

        Ok(Self {
            durations,
            values,
            change_times,
            index: 0,
        })
    }

    /// Number of table entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a valid schedule.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all durations.
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.change_times[self.len()]
    }

    /// Segment durations.
    #[must_use]
    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    /// Segment values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Prefix-sum change times including both sentinels.
    #[must_use]
    pub fn change_times(&self) -> &[f64] {
        &self.change_times
    }

    /// Value of segment `index`, holding the last entry past the end.
    #[must_use]
    pub fn value(&self, index: usize) -> f64 {
        self.values[index.min(self.len() - 1)]
    }

    fn contains(&self, index: usize, time: f64) -> bool {
        self.change_times[index] <= time && time < self.change_times[index + 1]
    }

    /// Index of the segment containing `time`, in `0..=len()`.
    ///
    /// Times before 0 map to segment 0.
    pub fn lookup(&mut self, time: f64) -> usize {
        if self.contains(self.index, time) {
            return self.index;
        }
        let next = self.index + 1;
        if next <= self.len() && self.contains(next, time) {
            self.index = next;
            return next;
        }
        let after = self.change_times.partition_point(|t| *t <= time);
        self.index = after.saturating_sub(1).min(self.len());
        self.index
    }

    /// Position of `time` within segment `index` as a fraction in `[0, 1)`.
    ///
    /// Zero-length and open-ended segments return 0.
    #[must_use]
    pub fn segment_fraction(&self, index: usize, time: f64) -> f64 {
        if index >= self.len() {
            return 0.0;
        }
        let start = self.change_times[index];
        let width = self.change_times[index + 1] - start;
        if width > 0.0 {
            (time - start) / width
        } else {
            0.0
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn schedule() -> ChangeSchedule {
        ChangeSchedule::new("s", vec![1.0, 0.0, 2.0], vec![10.0, 20.0, 30.0]).unwrap()
    }

    #[test]
    fn test_change_times_have_sentinels() {
        let s = schedule();
        assert_eq!(s.change_times(), &[0.0, 1.0, 1.0, 3.0, f64::INFINITY]);
        assert_eq!(s.total_duration(), 3.0);
    }

    #[test]
    fn test_lookup_sequential_and_random() {
        let mut s = schedule();
        assert_eq!(s.lookup(0.0), 0);
        assert_eq!(s.lookup(0.5), 0);
        // Zero length segment 1 is skipped.
        assert_eq!(s.lookup(1.0), 2);
        assert_eq!(s.lookup(2.9), 2);
        assert_eq!(s.lookup(3.0), 3);
        assert_eq!(s.lookup(100.0), 3);
        assert_eq!(s.value(3), 30.0);
        // Jump backwards.
        assert_eq!(s.lookup(0.25), 0);
        assert_eq!(s.lookup(-1.0), 0);
    }

    #[test]
    fn test_segment_fraction() {
        let s = schedule();
        assert_eq!(s.segment_fraction(2, 2.0), 0.5);
        assert_eq!(s.segment_fraction(1, 1.0), 0.0);
        assert_eq!(s.segment_fraction(3, 5.0), 0.0);
    }

    #[test]
    fn test_invalid_tables() {
        assert!(matches!(
            ChangeSchedule::new("s", vec![1.0], vec![1.0, 2.0]),
            Err(crate::ControlError::Config(SimError::LengthMismatch { .. }))
        ));
        assert!(ChangeSchedule::new("s", vec![], vec![]).is_err());
        assert!(ChangeSchedule::new("s", vec![-1.0], vec![1.0]).is_err());
        assert!(ChangeSchedule::new("s", vec![f64::NAN], vec![1.0]).is_err());
    }
}

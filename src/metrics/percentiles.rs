use serde::Serialize;

/// Round for human-facing output. Accumulators keep full precision.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Value at `floor(fraction × len)` of an ascending slice, no interpolation.
/// Empty input yields 0.
pub fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (fraction * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// p50 / p95 / p99 over a set of durations (ms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileSet {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl PercentileSet {
    /// Sorts a private copy; the caller's slice is left untouched.
    pub fn from_durations(durations: &[f64]) -> Self {
        if durations.is_empty() {
            return Self::empty();
        }
        let sorted = sorted_copy(durations);
        Self {
            p50: round2(percentile(&sorted, 0.50)),
            p95: round2(percentile(&sorted, 0.95)),
            p99: round2(percentile(&sorted, 0.99)),
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self {
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
        }
    }
}

/// Count / mean / extremes plus percentiles, used by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationSummary {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: PercentileSet,
}

impl DurationSummary {
    pub fn from_durations(durations: &[f64]) -> Self {
        if durations.is_empty() {
            return Self {
                count: 0,
                average: 0.0,
                min: 0.0,
                max: 0.0,
                percentiles: PercentileSet::empty(),
            };
        }
        let sorted = sorted_copy(durations);
        Self {
            count: sorted.len(),
            average: round2(mean(&sorted)),
            min: round2(sorted[0]),
            max: round2(sorted[sorted.len() - 1]),
            percentiles: PercentileSet {
                p50: round2(percentile(&sorted, 0.50)),
                p95: round2(percentile(&sorted, 0.95)),
                p99: round2(percentile(&sorted, 0.99)),
            },
        }
    }
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_floor_index_without_interpolation() {
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&sorted, 0.50), 30.0);
        assert_eq!(percentile(&sorted, 0.95), 50.0);
        assert_eq!(percentile(&sorted, 0.99), 50.0);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(PercentileSet::from_durations(&[]), PercentileSet::empty());
        assert_eq!(DurationSummary::from_durations(&[]).count, 0);
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let set = PercentileSet::from_durations(&[50.0, 10.0, 40.0, 30.0, 20.0]);
        assert_eq!(set.p50, 30.0);
        assert_eq!(set.p95, 50.0);
    }

    #[test]
    fn summary_rounds_to_two_places() {
        let s = DurationSummary::from_durations(&[1.004, 2.0, 3.333]);
        assert_eq!(s.count, 3);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 3.33);
        assert_eq!(s.average, 2.11);
    }
}

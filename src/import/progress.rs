use serde::Serialize;

use crate::jobs::JobRecord;

/// A job as shown to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    #[serde(flatten)]
    pub job: JobRecord,
    pub percentage: f64,
}

impl Progress {
    pub fn snapshot(job: JobRecord) -> Self {
        Self {
            percentage: percentage(job.processed_count, job.total_estimate),
            job,
        }
    }
}

/// Share of the estimated total processed so far, to two decimal places.
/// Estimates may undercount, so the result is capped at 100.
pub fn percentage(processed: i64, total: Option<i64>) -> f64 {
    match total {
        Some(total) if total > 0 => {
            let pct = processed as f64 / total as f64 * 100.0;
            ((pct * 100.0).round() / 100.0).min(100.0)
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_two_places() {
        assert_eq!(percentage(1, Some(3)), 33.33);
        assert_eq!(percentage(2, Some(3)), 66.67);
        assert_eq!(percentage(50, Some(50)), 100.0);
    }

    #[test]
    fn unknown_or_zero_total_is_zero() {
        assert_eq!(percentage(10, None), 0.0);
        assert_eq!(percentage(10, Some(0)), 0.0);
    }

    #[test]
    fn never_exceeds_one_hundred() {
        assert_eq!(percentage(12, Some(10)), 100.0);
    }

    #[test]
    fn non_decreasing() {
        let mut last = 0.0;
        for processed in 0..=7 {
            let pct = percentage(processed, Some(7));
            assert!(pct >= last);
            last = pct;
        }
    }
}

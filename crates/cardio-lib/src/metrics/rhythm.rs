use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};

/// RR series with its summary statistics.
///
/// `heart_rate_bpm`, `hrv_ms` and `mean_rr_ms` are either all present or all
/// absent; they are absent exactly when no usable RR interval exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmMetrics {
    pub rr_ms: Vec<u32>,
    pub heart_rate_bpm: Option<f64>,
    pub hrv_ms: Option<f64>,
    pub mean_rr_ms: Option<f64>,
}

impl RhythmMetrics {
    pub fn is_defined(&self) -> bool {
        self.heart_rate_bpm.is_some()
    }
}

pub fn rhythm_metrics(rr: &RRSeries) -> RhythmMetrics {
    match (heart_rate(rr), heart_rate_variability(rr), mean_rr(rr)) {
        (Some(hr), Some(hrv), Some(mean)) => RhythmMetrics {
            rr_ms: rr.rr_ms.clone(),
            heart_rate_bpm: Some(hr),
            hrv_ms: Some(hrv),
            mean_rr_ms: Some(round2(mean)),
        },
        _ => RhythmMetrics {
            rr_ms: rr.rr_ms.clone(),
            heart_rate_bpm: None,
            hrv_ms: None,
            mean_rr_ms: None,
        },
    }
}

fn mean_rr(rr: &RRSeries) -> Option<f64> {
    if rr.is_empty() {
        return None;
    }
    Some(rr.rr_ms.iter().map(|&v| v as f64).sum::<f64>() / rr.len() as f64)
}

/// Mean heart rate in bpm, rounded to 2 decimals.
pub fn heart_rate(rr: &RRSeries) -> Option<f64> {
    let mean = mean_rr(rr)?;
    (mean > 0.0).then(|| round2(60_000.0 / mean))
}

/// Population standard deviation of the RR series (ms), rounded to 2 decimals.
pub fn heart_rate_variability(rr: &RRSeries) -> Option<f64> {
    let mean = mean_rr(rr)?;
    let var = rr
        .rr_ms
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / rr.len() as f64;
    Some(round2(var.sqrt()))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::PeakSet;

    fn rr(values: &[u32]) -> RRSeries {
        RRSeries {
            rr_ms: values.to_vec(),
        }
    }

    #[test]
    fn regular_rhythm_at_500hz() {
        let peaks = PeakSet::from_indices(vec![100, 350, 600]);
        let series = RRSeries::from_peaks(&peaks, 500.0);
        let m = rhythm_metrics(&series);
        assert_eq!(m.rr_ms, vec![500, 500]);
        assert_eq!(m.heart_rate_bpm, Some(120.0));
        assert_eq!(m.hrv_ms, Some(0.0));
        assert_eq!(m.mean_rr_ms, Some(500.0));
    }

    #[test]
    fn empty_series_is_undefined() {
        let m = rhythm_metrics(&RRSeries::from_peaks(&PeakSet::default(), 500.0));
        assert!(m.rr_ms.is_empty());
        assert_eq!(m.heart_rate_bpm, None);
        assert_eq!(m.hrv_ms, None);
        assert_eq!(m.mean_rr_ms, None);
    }

    #[test]
    fn population_std_and_rounding() {
        let series = rr(&[800, 810, 790, 805]);
        // mean 801.25, population variance 54.6875
        assert_eq!(heart_rate_variability(&series), Some(7.40));
        assert_eq!(heart_rate(&series), Some(74.88));
    }

    #[test]
    fn zero_mean_rr_leaves_everything_undefined() {
        let m = rhythm_metrics(&rr(&[0, 0]));
        assert_eq!(m.heart_rate_bpm, None);
        assert_eq!(m.hrv_ms, None);
        assert!(!m.is_defined());
    }

    #[test]
    fn metrics_are_co_null() {
        let cases: Vec<Vec<u32>> = vec![
            vec![],
            vec![0],
            vec![1000],
            vec![600, 700],
            vec![0, 0, 0],
            vec![333, 334, 335, 900],
        ];
        for case in cases {
            let m = rhythm_metrics(&rr(&case));
            let defined = [
                m.heart_rate_bpm.is_some(),
                m.hrv_ms.is_some(),
                m.mean_rr_ms.is_some(),
            ];
            assert!(
                defined.iter().all(|d| *d) || defined.iter().all(|d| !*d),
                "mixed definedness for {:?}: {:?}",
                case,
                defined
            );
            assert_eq!(m.rr_ms, case);
            if !case.is_empty() && case.iter().any(|&v| v > 0) {
                assert!(m.is_defined());
            }
        }
    }
}

use crate::{
    error::FilterError,
    filters::{butter_bandpass, iir_notch, median_filter},
    signal::TimeSeries,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Band-pass, mains notch and baseline removal parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    /// Lower band-pass edge (Hz).
    pub bandpass_low_hz: f64,
    /// Upper band-pass edge (Hz).
    pub bandpass_high_hz: f64,
    /// Butterworth prototype order of the band-pass.
    pub bandpass_order: usize,
    /// Mains frequency to notch out (Hz).
    pub mains_hz: f64,
    /// Quality factor of the mains notch.
    pub notch_q: f64,
    /// Median window (samples) used to estimate baseline wander.
    pub baseline_window: usize,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            bandpass_low_hz: 0.5,
            bandpass_high_hz: 40.0,
            bandpass_order: 4,
            mains_hz: 50.0,
            notch_q: 30.0,
            baseline_window: 71,
        }
    }
}

/// What happened at one conditioning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Applied,
    /// The step passed its input through unchanged.
    Degraded { reason: String },
}

impl StageOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StageOutcome::Applied)
    }
}

/// Conditioned samples plus the outcome of each step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conditioned {
    pub series: TimeSeries,
    pub bandpass: StageOutcome,
    pub notch: StageOutcome,
    pub baseline: StageOutcome,
}

impl Conditioned {
    pub fn is_degraded(&self) -> bool {
        !(self.bandpass.is_applied() && self.notch.is_applied() && self.baseline.is_applied())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Conditioner {
    cfg: ConditionerConfig,
}

impl Conditioner {
    pub fn new(cfg: ConditionerConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.cfg
    }

    /// Band-pass, notch, then subtract a median baseline. Never fails: a step
    /// that cannot run leaves its input untouched and reports `Degraded`.
    pub fn condition(&self, ts: &TimeSeries) -> Conditioned {
        let cfg = &self.cfg;
        let (data, bandpass) = step("band-pass", &ts.data, |d| {
            butter_bandpass(cfg.bandpass_order, cfg.bandpass_low_hz, cfg.bandpass_high_hz, ts.fs)?
                .filtfilt(d)
        });
        let (data, notch) = step("notch", &data, |d| {
            iir_notch(cfg.mains_hz, cfg.notch_q, ts.fs)?.filtfilt(d)
        });
        let (data, baseline) = self.remove_baseline(data);
        debug!(
            "conditioned {} samples at {} Hz (band-pass {:?}, notch {:?}, baseline {:?})",
            ts.len(),
            ts.fs,
            bandpass,
            notch,
            baseline
        );
        Conditioned {
            series: TimeSeries::new(ts.fs, data),
            bandpass,
            notch,
            baseline,
        }
    }

    fn remove_baseline(&self, data: Vec<f64>) -> (Vec<f64>, StageOutcome) {
        let len = data.len();
        match baseline_window(self.cfg.baseline_window, len) {
            Some(w) => {
                let baseline = median_filter(&data, w);
                let out = data.iter().zip(&baseline).map(|(x, b)| x - b).collect();
                (out, StageOutcome::Applied)
            }
            None => (
                data,
                StageOutcome::Degraded {
                    reason: format!(
                        "median window {} does not fit {} samples",
                        self.cfg.baseline_window, len
                    ),
                },
            ),
        }
    }
}

/// The requested window clipped to `len` and rounded down to odd, or `None`
/// when that still covers the whole signal (or is narrower than 3).
pub fn baseline_window(requested: usize, len: usize) -> Option<usize> {
    let clipped = requested.min(len);
    let odd = if clipped % 2 == 0 {
        clipped.saturating_sub(1)
    } else {
        clipped
    };
    if odd < 3 || odd >= len {
        None
    } else {
        Some(odd)
    }
}

fn step<F>(name: &str, data: &[f64], f: F) -> (Vec<f64>, StageOutcome)
where
    F: FnOnce(&[f64]) -> Result<Vec<f64>, FilterError>,
{
    match f(data) {
        Ok(out) => (out, StageOutcome::Applied),
        Err(err) => {
            warn!("{} step passed through: {}", name, err);
            (
                data.to_vec(),
                StageOutcome::Degraded {
                    reason: err.to_string(),
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{synthetic_lead, SynthConfig};

    #[test]
    fn output_length_matches_input() {
        let cond = Conditioner::default();
        for len in [1usize, 2, 3, 10, 70, 71, 72, 500, 2500] {
            let data: Vec<f64> = (0..len).map(|i| (i as f64 * 0.05).sin()).collect();
            let out = cond.condition(&TimeSeries::new(500.0, data));
            assert_eq!(out.series.len(), len);
        }
    }

    #[test]
    fn low_sample_rate_degrades_filters_only() {
        let cond = Conditioner::default();
        let data: Vec<f64> = (0..400).map(|i| (i as f64 * 0.2).sin()).collect();
        let out = cond.condition(&TimeSeries::new(60.0, data));
        assert!(matches!(out.bandpass, StageOutcome::Degraded { .. }));
        assert!(matches!(out.notch, StageOutcome::Degraded { .. }));
        assert_eq!(out.baseline, StageOutcome::Applied);
        assert!(out.is_degraded());
    }

    #[test]
    fn short_signal_uses_clipped_baseline_window() {
        let cond = Conditioner::default();
        let data: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let out = cond.condition(&TimeSeries::new(500.0, data));
        assert_eq!(out.baseline, StageOutcome::Applied);
        assert_eq!(out.series.len(), 50);
    }

    #[test]
    fn window_covering_the_signal_skips_baseline() {
        let cond = Conditioner::default();
        for len in [3usize, 21, 69, 71] {
            let data: Vec<f64> = (0..len).map(|i| i as f64).collect();
            let out = cond.condition(&TimeSeries::new(500.0, data));
            assert!(
                matches!(out.baseline, StageOutcome::Degraded { .. }),
                "{} samples",
                len
            );
        }
    }

    #[test]
    fn baseline_window_is_clipped_and_odd() {
        assert_eq!(baseline_window(71, 5000), Some(71));
        assert_eq!(baseline_window(70, 5000), Some(69));
        assert_eq!(baseline_window(71, 72), Some(71));
        assert_eq!(baseline_window(71, 71), None);
        assert_eq!(baseline_window(71, 70), Some(69));
        assert_eq!(baseline_window(71, 69), None);
        assert_eq!(baseline_window(71, 40), Some(39));
        assert_eq!(baseline_window(71, 50), Some(49));
        assert_eq!(baseline_window(2, 40), None);
    }

    #[test]
    fn removes_wander_and_keeps_qrs() {
        let cfg = SynthConfig {
            wander_amplitude: 0.5,
            ..SynthConfig::default()
        };
        let raw = synthetic_lead(&cfg, 1.0);
        let out = Conditioner::default().condition(&raw);
        assert!(!out.is_degraded());
        let mean = out.series.data.iter().sum::<f64>() / out.series.len() as f64;
        assert!(mean.abs() < 0.05, "residual offset {}", mean);
        let peak = out.series.data.iter().cloned().fold(f64::MIN, f64::max);
        assert!(peak > 0.5, "QRS amplitude lost: {}", peak);
    }
}

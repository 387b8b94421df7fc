use crate::{
    conditioner::Conditioner,
    error::PipelineError,
    filters::resample,
    signal::TimeSeries,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Spread below this (relative to the signal magnitude) counts as flat.
const FLAT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    #[default]
    MinMax,
    /// Standardise first, then rescale to `[0, 1]`.
    ZScore,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Output length handed to the single-lead classifier.
    pub target_length: usize,
    /// Samples with |z| at or above this are replaced by their neighbours' mean.
    pub outlier_z: f64,
    pub method: NormalizationMethod,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            target_length: 187,
            outlier_z: 3.0,
            method: NormalizationMethod::MinMax,
        }
    }
}

/// Parameters needed to reproduce (or undo) an amplitude normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum NormalizationStats {
    MinMax { min: f64, max: f64, amplitude: f64 },
    ZScore { mean: f64, std: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplePath {
    Fft,
    /// Band-limited resampling failed; the signal was truncated or zero-padded.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWaveform {
    pub samples: Vec<f64>,
    pub stats: NormalizationStats,
    pub original_len: usize,
    pub resampling: ResamplePath,
}

impl NormalizedWaveform {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalNormalizer {
    cfg: NormalizerConfig,
}

impl SignalNormalizer {
    pub fn new(cfg: NormalizerConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.cfg
    }

    /// Outlier suppression, resampling to `target_length`, then amplitude
    /// normalization into `[0, 1]`. The input is used as-is.
    pub fn normalize(&self, data: &[f64]) -> Result<NormalizedWaveform, PipelineError> {
        if data.is_empty() {
            return Err(PipelineError::InsufficientData {
                stage: "normalize",
                required: 1,
                actual: 0,
            });
        }
        if self.cfg.target_length == 0 {
            return Err(PipelineError::InvalidWaveform(
                "target length must be positive".into(),
            ));
        }
        let cleaned = suppress_outliers(data, self.cfg.outlier_z);
        let (resampled, resampling) = match resample(&cleaned, self.cfg.target_length) {
            Ok(out) => (out, ResamplePath::Fft),
            Err(err) => {
                warn!("resampling failed ({}), truncating or zero-padding instead", err);
                (fit_length(&cleaned, self.cfg.target_length), ResamplePath::Fallback)
            }
        };
        let (samples, stats) = match self.cfg.method {
            NormalizationMethod::MinMax => min_max_normalize(&resampled),
            NormalizationMethod::ZScore => z_score_normalize(&resampled),
        };
        debug!(
            "normalized {} samples to {} ({:?})",
            data.len(),
            samples.len(),
            stats
        );
        Ok(NormalizedWaveform {
            samples,
            stats,
            original_len: data.len(),
            resampling,
        })
    }

    /// File path: condition the lead first, then [`SignalNormalizer::normalize`].
    pub fn prepare_record(
        &self,
        conditioner: &Conditioner,
        ts: &TimeSeries,
    ) -> Result<NormalizedWaveform, PipelineError> {
        let conditioned = conditioner.condition(ts);
        if conditioned.is_degraded() {
            debug!("record conditioning degraded, normalizing anyway");
        }
        self.normalize(&conditioned.series.data)
    }
}

/// Replace every interior sample with |z| >= `threshold` by the mean of its
/// two original neighbours. Zero-variance input is returned unchanged.
pub fn suppress_outliers(data: &[f64], threshold: f64) -> Vec<f64> {
    let n = data.len();
    if n < 3 {
        return data.to_vec();
    }
    let mean = data.iter().sum::<f64>() / n as f64;
    let std = (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    if !(std > 0.0) {
        return data.to_vec();
    }
    let mut out = data.to_vec();
    let mut replaced = 0usize;
    for i in 1..n - 1 {
        if ((data[i] - mean) / std).abs() >= threshold {
            out[i] = 0.5 * (data[i - 1] + data[i + 1]);
            replaced += 1;
        }
    }
    if replaced > 0 {
        debug!("suppressed {} outlier samples", replaced);
    }
    out
}

/// Truncate, or pad with zeros, to exactly `target` samples.
pub fn fit_length(data: &[f64], target: usize) -> Vec<f64> {
    let mut out: Vec<f64> = data.iter().copied().take(target).collect();
    out.resize(target, 0.0);
    out
}

/// Min-max scale to `[0, 1]`; a flat signal maps to all zeros.
pub fn min_max_normalize(data: &[f64]) -> (Vec<f64>, NormalizationStats) {
    let (min, max) = bounds(data);
    let amplitude = max - min;
    let stats = NormalizationStats::MinMax {
        min,
        max,
        amplitude,
    };
    if is_flat(min, max) {
        return (vec![0.0; data.len()], stats);
    }
    let out = data
        .iter()
        .map(|x| ((x - min) / amplitude).clamp(0.0, 1.0))
        .collect();
    (out, stats)
}

fn z_score_normalize(data: &[f64]) -> (Vec<f64>, NormalizationStats) {
    let n = data.len().max(1) as f64;
    let mean = data.iter().sum::<f64>() / n;
    let std = (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    let stats = NormalizationStats::ZScore { mean, std };
    let (min, max) = bounds(data);
    if is_flat(min, max) || !(std > 0.0) {
        return (vec![0.0; data.len()], stats);
    }
    let standardised: Vec<f64> = data.iter().map(|x| (x - mean) / std).collect();
    let (out, _) = min_max_normalize(&standardised);
    (out, stats)
}

fn bounds(data: &[f64]) -> (f64, f64) {
    data.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

fn is_flat(min: f64, max: f64) -> bool {
    if !(min.is_finite() && max.is_finite()) {
        return true;
    }
    let scale = min.abs().max(max.abs()).max(1.0);
    max - min <= FLAT_TOLERANCE * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{synthetic_lead, SynthConfig};

    fn assert_unit_range(values: &[f64]) {
        for v in values {
            assert!((0.0..=1.0).contains(v), "value {} outside [0, 1]", v);
        }
    }

    #[test]
    fn short_signal_is_resampled_not_padded() {
        let data: Vec<f64> = (0..50).map(|i| (i as f64 * 0.4).sin()).collect();
        let out = SignalNormalizer::default().normalize(&data).unwrap();
        assert_eq!(out.len(), 187);
        assert_eq!(out.resampling, ResamplePath::Fft);
        assert_eq!(out.original_len, 50);
        assert_unit_range(&out.samples);
        // zero padding would leave a constant tail
        let tail = &out.samples[150..];
        assert!(tail.iter().any(|v| (v - tail[0]).abs() > 1e-3));
    }

    #[test]
    fn constant_input_gives_zeros() {
        for len in [1, 2, 50, 187, 600] {
            let out = SignalNormalizer::default().normalize(&vec![3.7; len]).unwrap();
            assert_eq!(out.samples, vec![0.0; 187]);
        }
    }

    #[test]
    fn renormalizing_is_a_no_op() {
        let data: Vec<f64> = (0..187).map(|i| (i as f64 * 0.1).sin()).collect();
        let normalizer = SignalNormalizer::default();
        let once = normalizer.normalize(&data).unwrap();
        let twice = normalizer.normalize(&once.samples).unwrap();
        for (a, b) in once.samples.iter().zip(&twice.samples) {
            assert!((a - b).abs() < 1e-12);
        }
        let (again, _) = min_max_normalize(&once.samples);
        assert_eq!(again, once.samples);
    }

    #[test]
    fn outliers_use_neighbour_mean() {
        let mut data = vec![0.0; 40];
        data[20] = 100.0;
        data[0] = 100.0;
        let out = suppress_outliers(&data, 3.0);
        assert_eq!(out[20], 0.0);
        // endpoints are never replaced
        assert_eq!(out[0], 100.0);
        assert_eq!(suppress_outliers(&[5.0; 10], 3.0), vec![5.0; 10]);
    }

    #[test]
    fn z_score_method_records_mean_and_std() {
        let cfg = NormalizerConfig {
            method: NormalizationMethod::ZScore,
            target_length: 4,
            ..NormalizerConfig::default()
        };
        let out = SignalNormalizer::new(cfg)
            .normalize(&[1.0, 3.0, 1.0, 3.0])
            .unwrap();
        assert_eq!(out.stats, NormalizationStats::ZScore { mean: 2.0, std: 1.0 });
        assert_eq!(out.samples, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn min_max_stats_describe_the_input() {
        let (out, stats) = min_max_normalize(&[2.0, 4.0, 3.0]);
        assert_eq!(out, vec![0.0, 1.0, 0.5]);
        assert_eq!(
            stats,
            NormalizationStats::MinMax {
                min: 2.0,
                max: 4.0,
                amplitude: 2.0
            }
        );
    }

    #[test]
    fn fit_length_truncates_or_pads() {
        assert_eq!(fit_length(&[1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert_eq!(fit_length(&[1.0], 3), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            SignalNormalizer::default().normalize(&[]),
            Err(PipelineError::InsufficientData { actual: 0, .. })
        ));
    }

    #[test]
    fn prepared_record_has_target_shape() {
        let cfg = SynthConfig {
            fs: 360.0,
            noise_amplitude: 0.05,
            wander_amplitude: 0.4,
            ..SynthConfig::default()
        };
        let lead = synthetic_lead(&cfg, 1.0);
        let out = SignalNormalizer::default()
            .prepare_record(&Conditioner::default(), &lead)
            .unwrap();
        assert_eq!(out.len(), 187);
        assert_eq!(out.original_len, lead.len());
        assert_unit_range(&out.samples);
    }
}

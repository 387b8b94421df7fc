//! End-to-end entry points shared by every call site.

use crate::{
    classifier::{
        Classifier, ClassifierHandle, ClassifierInput, Prediction, BEAT_CLASSES,
        HEART_FAILURE_CLASSES,
    },
    conditioner::StageOutcome,
    config::PipelineConfig,
    detectors::ecg::refine_peaks,
    error::PipelineError,
    features::{ExtractionFailure, ExtractionPath, FeatureOutcome},
    metrics::{rhythm_metrics, RhythmMetrics},
    normalize::NormalizationStats,
    signal::{PeakSet, RRSeries, Waveform},
};
use log::{debug, info};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ConditioningReport {
    pub bandpass: StageOutcome,
    pub notch: StageOutcome,
    pub baseline: StageOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RhythmReport {
    pub fs: f64,
    pub lead: usize,
    pub samples: usize,
    pub peaks: PeakSet,
    #[serde(flatten)]
    pub metrics: RhythmMetrics,
    pub conditioning: ConditioningReport,
}

/// Condition one lead, detect R-peaks, move each onto its R apex and
/// summarise the rhythm.
pub fn analyze_rhythm(
    waveform: &Waveform,
    lead: usize,
    config: &PipelineConfig,
) -> Result<RhythmReport, PipelineError> {
    let raw = waveform.lead_series(lead)?;
    let conditioned = config.conditioner().condition(&raw);
    let detected = config.detector().detect(&conditioned.series);
    let tolerance = (config.delineator.refine_tolerance_s * raw.fs).round() as usize;
    let peaks = refine_peaks(&conditioned.series.data, &detected, tolerance);
    let rr = RRSeries::from_peaks(&peaks, raw.fs);
    let metrics = rhythm_metrics(&rr);
    debug!(
        "lead {}: {} peaks, heart rate {:?}",
        lead,
        peaks.len(),
        metrics.heart_rate_bpm
    );
    Ok(RhythmReport {
        fs: raw.fs,
        lead,
        samples: raw.len(),
        peaks,
        metrics,
        conditioning: ConditioningReport {
            bandpass: conditioned.bandpass,
            notch: conditioned.notch,
            baseline: conditioned.baseline,
        },
    })
}

/// 12-lead per-beat features with one smoothed retry.
pub fn extract_record_features(
    waveform: &Waveform,
    config: &PipelineConfig,
) -> Result<FeatureOutcome, PipelineError> {
    config.feature_extractor().extract(waveform)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    Predicted {
        prediction: Prediction,
        #[serde(skip_serializing_if = "Option::is_none")]
        normalization: Option<NormalizationStats>,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<ExtractionPath>,
    },
    /// Features could not be extracted; the classifier was not called.
    Undetermined {
        primary: ExtractionFailure,
        fallback: ExtractionFailure,
    },
}

impl PredictionOutcome {
    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            PredictionOutcome::Predicted { prediction, .. } => Some(prediction),
            PredictionOutcome::Undetermined { .. } => None,
        }
    }
}

/// Normalize raw single-lead samples and classify them.
///
/// `fs` is checked but not otherwise used: the normalizer resamples to a
/// fixed length, so the classifier input has the same shape whatever the
/// recording rate.
pub fn predict_single_lead<C: Classifier>(
    handle: &ClassifierHandle<C>,
    samples: &[f64],
    fs: f64,
    config: &PipelineConfig,
) -> Result<PredictionOutcome, PipelineError> {
    if !(fs.is_finite() && fs > 0.0) {
        return Err(PipelineError::InvalidSampleRate(fs));
    }
    let normalized = config.normalizer().normalize(samples)?;
    let output = handle.call(ClassifierInput::Waveform(&normalized))?;
    let prediction = Prediction::from_output(output, &HEART_FAILURE_CLASSES)?;
    info!(
        "single-lead prediction {} ({:.3})",
        prediction.label, prediction.confidence
    );
    Ok(PredictionOutcome::Predicted {
        prediction,
        normalization: Some(normalized.stats),
        path: None,
    })
}

/// Extract per-beat features from a 12-lead record and classify them.
pub fn predict_twelve_lead<C: Classifier>(
    handle: &ClassifierHandle<C>,
    waveform: &Waveform,
    config: &PipelineConfig,
) -> Result<PredictionOutcome, PipelineError> {
    let (features, path) = match extract_record_features(waveform, config)? {
        FeatureOutcome::Extracted { features, path } => (features, path),
        FeatureOutcome::Undetermined { primary, fallback } => {
            info!("12-lead prediction undetermined, classifier not called");
            return Ok(PredictionOutcome::Undetermined { primary, fallback });
        }
    };
    let output = handle.call(ClassifierInput::Beats(&features))?;
    let prediction = Prediction::from_output(output, &BEAT_CLASSES)?;
    info!(
        "12-lead prediction {} over {} beats",
        prediction.label,
        features.len()
    );
    Ok(PredictionOutcome::Predicted {
        prediction,
        normalization: None,
        path: Some(path),
    })
}

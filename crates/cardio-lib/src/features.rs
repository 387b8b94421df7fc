//! Per-beat 12-lead feature vectors built from delineated fiducial points.

use crate::{
    conditioner::Conditioner,
    detectors::{LeadDelineation, PeakDetector, WaveDelineator},
    error::PipelineError,
    filters::savgol_filter,
    signal::{TimeSeries, Waveform},
};
use log::{debug, info, warn};
use serde::{ser::Serializer, Deserialize, Serialize};
use thiserror::Error;

pub const LEAD_COUNT: usize = 12;
pub const FEATURES_PER_LEAD: usize = 3;
pub const FEATURE_WIDTH: usize = LEAD_COUNT * FEATURES_PER_LEAD;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Upper bound on beats taken from one record.
    pub max_beats: usize,
    /// Savitzky–Golay window used by the fallback pass.
    pub smoothing_window: usize,
    /// Savitzky–Golay polynomial order used by the fallback pass.
    pub smoothing_order: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_beats: 16,
            smoothing_window: 15,
            smoothing_order: 3,
        }
    }
}

/// `[R-onset − R-offset amplitude, Q amplitude, T amplitude]` for each of the
/// 12 leads, in lead order. Serialises as a flat 36-element array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatFeatureVector {
    leads: [[f64; FEATURES_PER_LEAD]; LEAD_COUNT],
}

impl BeatFeatureVector {
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.leads.iter().flatten().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    pub fn lead(&self, idx: usize) -> Option<[f64; FEATURES_PER_LEAD]> {
        self.leads.get(idx).copied()
    }

    pub const fn len(&self) -> usize {
        FEATURE_WIDTH
    }

    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl Serialize for BeatFeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BeatFeatureMatrix {
    pub beats: Vec<BeatFeatureVector>,
}

impl BeatFeatureMatrix {
    pub fn len(&self) -> usize {
        self.beats.len()
    }
    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }
}

/// Why an extraction attempt produced nothing.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionFailure {
    #[error("expected {expected} leads, got {actual}")]
    LeadCount { expected: usize, actual: usize },
    #[error("lead {lead} delineation incomplete: {reason}")]
    Lead { lead: usize, reason: String },
    #[error("no beat carries all four fiducials in every lead")]
    NoBeats,
    #[error("no beat is complete across all leads")]
    NoValidBeats,
    #[error("smoothing failed: {reason}")]
    Smoothing { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPath {
    Primary,
    Fallback,
}

/// Result of feature extraction for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeatureOutcome {
    Extracted {
        path: ExtractionPath,
        features: BeatFeatureMatrix,
    },
    /// Neither attempt yielded a beat; no prediction should be made.
    Undetermined {
        primary: ExtractionFailure,
        fallback: ExtractionFailure,
    },
}

impl FeatureOutcome {
    pub fn features(&self) -> Option<&BeatFeatureMatrix> {
        match self {
            FeatureOutcome::Extracted { features, .. } => Some(features),
            FeatureOutcome::Undetermined { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BeatFeatureBuilder {
    cfg: FeatureConfig,
}

impl BeatFeatureBuilder {
    pub fn new(cfg: FeatureConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.cfg
    }

    /// Assemble one vector per beat that is complete in every lead.
    ///
    /// At most `max_beats` candidate beats are examined. A beat missing any
    /// landmark in any lead is skipped, never zero-filled.
    pub fn build(&self, leads: &[LeadDelineation]) -> Result<BeatFeatureMatrix, ExtractionFailure> {
        if leads.len() != LEAD_COUNT {
            return Err(ExtractionFailure::LeadCount {
                expected: LEAD_COUNT,
                actual: leads.len(),
            });
        }
        let available = leads
            .iter()
            .map(LeadDelineation::beat_count)
            .min()
            .unwrap_or(0);
        if available == 0 {
            return Err(ExtractionFailure::NoBeats);
        }
        let to_take = available.min(self.cfg.max_beats);

        let mut beats = Vec::with_capacity(to_take);
        for x in 0..to_take {
            match beat_vector(leads, x) {
                Some(v) => beats.push(v),
                None => debug!("beat {} incomplete in at least one lead, skipped", x),
            }
        }
        if beats.is_empty() {
            return Err(ExtractionFailure::NoValidBeats);
        }
        Ok(BeatFeatureMatrix { beats })
    }
}

fn beat_vector(leads: &[LeadDelineation], x: usize) -> Option<BeatFeatureVector> {
    let mut out = [[0.0; FEATURES_PER_LEAD]; LEAD_COUNT];
    for (slot, lead) in out.iter_mut().zip(leads) {
        let beat = lead.beat(x)?;
        *slot = [
            lead.amplitude(beat.r_onset)? - lead.amplitude(beat.r_offset)?,
            lead.amplitude(beat.q_peak)?,
            lead.amplitude(beat.t_peak)?,
        ];
    }
    Some(BeatFeatureVector { leads: out })
}

/// Full 12-lead path: condition, detect, delineate and build, with one
/// smoothed and rescaled retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor {
    pub conditioner: Conditioner,
    pub detector: PeakDetector,
    pub delineator: WaveDelineator,
    pub builder: BeatFeatureBuilder,
}

impl FeatureExtractor {
    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureOutcome, PipelineError> {
        if waveform.lead_count() != LEAD_COUNT {
            return Err(PipelineError::ShapeMismatch {
                expected: LEAD_COUNT,
                actual: waveform.lead_count(),
            });
        }
        let primary = match self.attempt(waveform) {
            Ok(features) => {
                return Ok(FeatureOutcome::Extracted {
                    path: ExtractionPath::Primary,
                    features,
                })
            }
            Err(err) => err,
        };
        info!("primary feature extraction failed ({}), retrying on smoothed record", primary);
        let fallback = self
            .smooth_and_rescale(waveform)
            .and_then(|smoothed| self.attempt(&smoothed));
        match fallback {
            Ok(features) => Ok(FeatureOutcome::Extracted {
                path: ExtractionPath::Fallback,
                features,
            }),
            Err(fallback) => {
                warn!("feature extraction undetermined: {}", fallback);
                Ok(FeatureOutcome::Undetermined { primary, fallback })
            }
        }
    }

    fn attempt(&self, waveform: &Waveform) -> Result<BeatFeatureMatrix, ExtractionFailure> {
        let mut leads = Vec::with_capacity(waveform.lead_count());
        for (idx, samples) in waveform.leads().enumerate() {
            let conditioned = self
                .conditioner
                .condition(&TimeSeries::new(waveform.fs(), samples.to_vec()))
                .series;
            let peaks = self.detector.detect(&conditioned);
            let lead = self
                .delineator
                .delineate(&conditioned, &peaks)
                .map_err(|err| ExtractionFailure::Lead {
                    lead: idx,
                    reason: err.to_string(),
                })?;
            leads.push(lead);
        }
        self.builder.build(&leads)
    }

    /// Savitzky–Golay smoothing then per-lead min-max rescale to `[0, 1]`.
    /// Constant leads are left as smoothed.
    pub fn smooth_and_rescale(&self, waveform: &Waveform) -> Result<Waveform, ExtractionFailure> {
        let mut failure = None;
        let out = waveform.map_leads(|lead| {
            let cfg = self.builder.config();
            match savgol_filter(lead, cfg.smoothing_window, cfg.smoothing_order) {
                Ok(smoothed) => rescale_unit(smoothed),
                Err(err) => {
                    failure.get_or_insert(ExtractionFailure::Smoothing {
                        reason: err.to_string(),
                    });
                    lead.to_vec()
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

fn rescale_unit(data: Vec<f64>) -> Vec<f64> {
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range > 0.0 {
        data.into_iter().map(|v| (v - min) / range).collect()
    } else {
        data
    }
}

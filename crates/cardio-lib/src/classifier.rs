//! Seam to the external ECG classifier.
//!
//! The model itself lives elsewhere. The pipeline only builds its input,
//! calls it through a [`ClassifierHandle`] and turns the raw output into a
//! labelled [`Prediction`].

use crate::{error::ClassifierError, features::BeatFeatureMatrix, normalize::NormalizedWaveform};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    thread,
    time::{Duration, Instant},
};

/// Per-beat score above which a beat votes positive.
pub const BEAT_SCORE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub enum ClassifierInput<'a> {
    /// Fixed-length single-lead waveform, fed as `(1, len, 1)`.
    Waveform(&'a NormalizedWaveform),
    /// One 36-wide row per beat.
    Beats(&'a BeatFeatureMatrix),
}

impl ClassifierInput<'_> {
    /// `(rows, columns)` of the tensor handed to the model.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            ClassifierInput::Waveform(w) => (w.len(), 1),
            ClassifierInput::Beats(m) => (m.len(), crate::features::FEATURE_WIDTH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ClassifierOutput {
    /// Per-class probabilities of a multi-class model.
    Probabilities(Vec<f64>),
    /// One binary score in `[0, 1]` per beat.
    BeatScores(Vec<f64>),
}

/// Anything that can score a prepared record.
///
/// `timeout` is the caller's budget for this attempt; implementations that
/// can cancel should honour it. The handle also checks it after the call.
pub trait Classifier {
    fn classify(
        &self,
        input: &ClassifierInput<'_>,
        timeout: Option<Duration>,
    ) -> Result<ClassifierOutput, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(
        &self,
        input: &ClassifierInput<'_>,
        timeout: Option<Duration>,
    ) -> Result<ClassifierOutput, ClassifierError> {
        (**self).classify(input, timeout)
    }
}

/// Timeout and retry settings for classifier calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallPolicy {
    /// Per-attempt budget; `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
    /// Total attempts including the first (at least 1).
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff_ms: u64,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: Some(10_000),
            max_attempts: 2,
            backoff_ms: 200,
        }
    }
}

impl CallPolicy {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// An explicitly owned classifier plus the policy used to call it.
#[derive(Debug)]
pub struct ClassifierHandle<C> {
    classifier: C,
    policy: CallPolicy,
}

impl<C: Classifier> ClassifierHandle<C> {
    pub fn new(classifier: C, policy: CallPolicy) -> Self {
        Self { classifier, policy }
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    pub fn into_inner(self) -> C {
        self.classifier
    }

    /// Call the classifier, retrying retryable failures up to
    /// `max_attempts` times. Output is checked against the input shape.
    pub fn call(&self, input: ClassifierInput<'_>) -> Result<ClassifierOutput, ClassifierError> {
        let attempts = self.policy.max_attempts.max(1);
        let timeout = self.policy.timeout();
        let mut attempt = 1;
        loop {
            let started = Instant::now();
            let result = self
                .classifier
                .classify(&input, timeout)
                .and_then(|out| match (timeout, self.policy.timeout_ms) {
                    (Some(limit), Some(ms)) if started.elapsed() > limit => {
                        Err(ClassifierError::TimedOut(ms))
                    }
                    _ => Ok(out),
                })
                .and_then(|out| validate(&input, out));
            match result {
                Ok(out) => {
                    debug!(
                        "classifier answered on attempt {} in {:?}",
                        attempt,
                        started.elapsed()
                    );
                    return Ok(out);
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        "classifier attempt {}/{} failed: {}",
                        attempt, attempts, err
                    );
                    if self.policy.backoff_ms > 0 {
                        thread::sleep(Duration::from_millis(self.policy.backoff_ms));
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn validate(
    input: &ClassifierInput<'_>,
    out: ClassifierOutput,
) -> Result<ClassifierOutput, ClassifierError> {
    let values = match &out {
        ClassifierOutput::Probabilities(p) => p,
        ClassifierOutput::BeatScores(s) => s,
    };
    if values.is_empty() {
        return Err(ClassifierError::InvalidOutput("empty output".into()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ClassifierError::InvalidOutput("non-finite value".into()));
    }
    if let (ClassifierInput::Beats(m), ClassifierOutput::BeatScores(s)) = (input, &out) {
        if s.len() != m.len() {
            return Err(ClassifierError::InvalidOutput(format!(
                "{} scores for {} beats",
                s.len(),
                m.len()
            )));
        }
    }
    Ok(out)
}

/// Name and description of one output class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassLabel {
    pub code: &'static str,
    pub description: &'static str,
}

/// Heart-failure severity classes of the single-lead model.
pub const HEART_FAILURE_CLASSES: [ClassLabel; 5] = [
    ClassLabel {
        code: "normal",
        description: "No heart failure",
    },
    ClassLabel {
        code: "mild",
        description: "Mild heart failure",
    },
    ClassLabel {
        code: "moderate",
        description: "Moderate heart failure",
    },
    ClassLabel {
        code: "severe",
        description: "Severe heart failure",
    },
    ClassLabel {
        code: "possible",
        description: "Possible heart failure",
    },
];

/// Per-beat model classes, indexed by the majority-vote outcome.
pub const BEAT_CLASSES: [ClassLabel; 2] = [
    ClassLabel {
        code: "NORM",
        description: "Normal ECG",
    },
    ClassLabel {
        code: "MI",
        description: "Myocardial infarction",
    },
];

/// Tally of per-beat scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BeatVote {
    pub positive: usize,
    pub total: usize,
}

impl BeatVote {
    /// Strictly more than half of the beats voted positive.
    pub fn is_positive(&self) -> bool {
        2 * self.positive > self.total
    }
}

/// Count beats scoring above [`BEAT_SCORE_THRESHOLD`]. `None` for no beats.
pub fn majority_vote(scores: &[f64]) -> Option<BeatVote> {
    if scores.is_empty() {
        return None;
    }
    Some(BeatVote {
        positive: scores.iter().filter(|&&s| s > BEAT_SCORE_THRESHOLD).count(),
        total: scores.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class_index: usize,
    pub label: &'static str,
    pub description: &'static str,
    /// Top probability, or the share of beats agreeing with the vote.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub probabilities: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<BeatVote>,
}

impl Prediction {
    pub fn from_output(output: ClassifierOutput, labels: &[ClassLabel]) -> Result<Self, ClassifierError> {
        match output {
            ClassifierOutput::Probabilities(p) => Self::from_probabilities(p, labels),
            ClassifierOutput::BeatScores(s) => Self::from_beat_scores(&s, labels),
        }
    }

    /// Arg-max class; the first index wins ties.
    pub fn from_probabilities(probabilities: Vec<f64>, labels: &[ClassLabel]) -> Result<Self, ClassifierError> {
        let (class_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            })
            .ok_or_else(|| ClassifierError::InvalidOutput("no probabilities".into()))?;
        let label = labels.get(class_index).ok_or_else(|| {
            ClassifierError::InvalidOutput(format!(
                "class {} outside a {}-class table",
                class_index,
                labels.len()
            ))
        })?;
        Ok(Self {
            class_index,
            label: label.code,
            description: label.description,
            confidence,
            probabilities,
            votes: None,
        })
    }

    pub fn from_beat_scores(scores: &[f64], labels: &[ClassLabel]) -> Result<Self, ClassifierError> {
        let vote = majority_vote(scores)
            .ok_or_else(|| ClassifierError::InvalidOutput("no beat scores".into()))?;
        let class_index = usize::from(vote.is_positive());
        let label = labels.get(class_index).ok_or_else(|| {
            ClassifierError::InvalidOutput(format!("no label for class {}", class_index))
        })?;
        let agreeing = if vote.is_positive() {
            vote.positive
        } else {
            vote.total - vote.positive
        };
        Ok(Self {
            class_index,
            label: label.code,
            description: label.description,
            confidence: agreeing as f64 / vote.total as f64,
            probabilities: Vec::new(),
            votes: Some(vote),
        })
    }
}

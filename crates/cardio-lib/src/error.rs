use thiserror::Error;

/// Fatal, caller-visible failures of a pipeline call.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("insufficient data for {stage}: need at least {required} samples, got {actual}")]
    InsufficientData {
        stage: &'static str,
        required: usize,
        actual: usize,
    },
    #[error("shape mismatch: expected {expected} leads, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("invalid waveform: {0}")]
    InvalidWaveform(String),
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(f64),
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(ClassifierError),
    #[error("classifier output rejected: {0}")]
    InvalidClassifierOutput(String),
}

impl From<ClassifierError> for PipelineError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::InvalidOutput(reason) => PipelineError::InvalidClassifierOutput(reason),
            other => PipelineError::ClassifierUnavailable(other),
        }
    }
}

/// Filter design failures. The conditioner turns these into a degraded
/// pass-through step instead of returning them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("sample rate must be positive and finite, got {0}")]
    SampleRate(f64),
    #[error("cutoff {cutoff} Hz must lie strictly between 0 and Nyquist ({nyquist} Hz)")]
    Cutoff { cutoff: f64, nyquist: f64 },
    #[error("band edges out of order: low {low} Hz >= high {high} Hz")]
    BandOrder { low: f64, high: f64 },
    #[error("filter order must be at least 1")]
    Order,
    #[error("quality factor must be positive, got {0}")]
    Quality(f64),
    #[error("window {window} invalid for polynomial order {order} and {len} samples")]
    Window {
        window: usize,
        order: usize,
        len: usize,
    },
    #[error("signal too short to filter: {0} samples")]
    TooShort(usize),
}

/// Per-lead delineation failure (the lead is "incomplete").
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelineationError {
    #[error("only {0} usable R-peaks after dropping boundary beats")]
    TooFewPeaks(usize),
    #[error("no {0} could be resolved for any beat")]
    Unresolved(&'static str),
}

/// Errors reported by (or about) the external classifier.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier call exceeded {0} ms")]
    TimedOut(u64),
    #[error("classifier returned malformed output: {0}")]
    InvalidOutput(String),
}

impl ClassifierError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClassifierError::InvalidOutput(_))
    }
}

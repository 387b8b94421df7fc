pub mod classifier;
pub mod conditioner;
pub mod config;
pub mod detectors;
pub mod error;
pub mod features;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod plot;
pub mod signal;
pub mod synth;

pub use classifier::{
    CallPolicy, Classifier, ClassifierHandle, ClassifierInput, ClassifierOutput, Prediction,
};
pub use conditioner::{Conditioned, Conditioner, ConditionerConfig, StageOutcome};
pub use config::PipelineConfig;
pub use detectors::*;
pub use error::{ClassifierError, DelineationError, FilterError, PipelineError};
pub use features::{BeatFeatureMatrix, BeatFeatureVector, FeatureOutcome};
pub use metrics::*;
pub use normalize::{NormalizedWaveform, NormalizationStats, SignalNormalizer};
pub use pipeline::{
    analyze_rhythm, extract_record_features, predict_single_lead, predict_twelve_lead,
    PredictionOutcome, RhythmReport,
};
pub use signal::*;

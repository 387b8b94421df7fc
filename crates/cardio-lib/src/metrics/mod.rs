pub mod rhythm;

pub use rhythm::{heart_rate, heart_rate_variability, rhythm_metrics, RhythmMetrics};

pub mod delineate;
pub mod ecg;

pub use delineate::{
    BeatFiducials, DelineatorConfig, Fiducial, LeadDelineation, WaveDelineator,
};
pub use ecg::{PeakDetector, PeakDetectorConfig};

use crate::{
    classifier::CallPolicy,
    conditioner::{Conditioner, ConditionerConfig},
    detectors::{DelineatorConfig, PeakDetector, PeakDetectorConfig, WaveDelineator},
    features::{BeatFeatureBuilder, FeatureConfig, FeatureExtractor},
    normalize::{NormalizerConfig, SignalNormalizer},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Sample rates assumed when a record carries no usable header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleRateDefaults {
    pub rhythm_fs: f64,
    pub twelve_lead_fs: f64,
    pub single_lead_fs: f64,
}

impl Default for SampleRateDefaults {
    fn default() -> Self {
        Self {
            rhythm_fs: 500.0,
            twelve_lead_fs: 500.0,
            single_lead_fs: 360.0,
        }
    }
}

/// Every tunable of the pipeline. Missing TOML keys keep their defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub conditioner: ConditionerConfig,
    pub detector: PeakDetectorConfig,
    pub delineator: DelineatorConfig,
    pub features: FeatureConfig,
    pub normalizer: NormalizerConfig,
    pub classifier: CallPolicy,
    pub defaults: SampleRateDefaults,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid pipeline configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialise configuration")
    }

    pub fn conditioner(&self) -> Conditioner {
        Conditioner::new(self.conditioner)
    }

    pub fn detector(&self) -> PeakDetector {
        PeakDetector::new(self.detector)
    }

    pub fn delineator(&self) -> WaveDelineator {
        WaveDelineator::new(self.delineator)
    }

    pub fn normalizer(&self) -> SignalNormalizer {
        SignalNormalizer::new(self.normalizer)
    }

    pub fn feature_extractor(&self) -> FeatureExtractor {
        FeatureExtractor {
            conditioner: self.conditioner(),
            detector: self.detector(),
            delineator: self.delineator(),
            builder: BeatFeatureBuilder::new(self.features),
        }
    }
}

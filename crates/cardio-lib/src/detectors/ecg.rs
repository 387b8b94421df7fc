use crate::signal::{PeakSet, TimeSeries};
use log::debug;
use serde::{Deserialize, Serialize};

/// Parameters of the derivative/square/integrate R-peak detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakDetectorConfig {
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum distance between accepted peaks (seconds).
    pub min_separation_s: f64,
    /// Absolute floor on input length (samples).
    pub min_samples: usize,
    /// Input must also span at least this long (seconds).
    pub min_duration_s: f64,
}

impl Default for PeakDetectorConfig {
    fn default() -> Self {
        Self {
            integration_window_s: 0.150,
            min_separation_s: 0.250,
            min_samples: 10,
            min_duration_s: 0.3,
        }
    }
}

impl PeakDetectorConfig {
    /// Shortest input (in samples) the detector will look at for `fs`.
    pub fn required_samples(&self, fs: f64) -> usize {
        self.min_samples
            .max((self.min_duration_s * fs).round() as usize)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PeakDetector {
    cfg: PeakDetectorConfig,
}

impl PeakDetector {
    pub fn new(cfg: PeakDetectorConfig) -> Self {
        Self { cfg }
    }

    /// Detect R-peaks in a conditioned lead.
    ///
    /// Inputs shorter than [`PeakDetectorConfig::required_samples`] yield an
    /// empty set rather than an error.
    pub fn detect(&self, ts: &TimeSeries) -> PeakSet {
        let required = self.cfg.required_samples(ts.fs);
        if ts.len() < required || !(ts.fs > 0.0) {
            debug!(
                "peak detection skipped: {} samples, {} required",
                ts.len(),
                required
            );
            return PeakSet::default();
        }
        let envelope = self.envelope(ts);
        let height = envelope.iter().sum::<f64>() / envelope.len() as f64;
        let distance = ((self.cfg.min_separation_s * ts.fs).round() as usize).max(1);
        let peaks = find_peaks(&envelope, height, distance);
        debug!("detected {} R-peaks in {} samples", peaks.len(), ts.len());
        PeakSet::from_indices(peaks)
    }

    /// Integrated squared-derivative energy used for peak picking.
    pub fn envelope(&self, ts: &TimeSeries) -> Vec<f64> {
        let derivative = derivative(&ts.data);
        let squared = square(&derivative);
        let win = ((self.cfg.integration_window_s * ts.fs).round() as usize).max(1);
        moving_average(&squared, win)
    }
}

/// First difference; the first sample is duplicated so the derivative there is zero.
fn derivative(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

/// Centred moving average over `win` samples, zero beyond the edges.
fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if win <= 1 {
        return data.to_vec();
    }
    let n = data.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &sample in data {
        acc += sample;
        prefix.push(acc);
    }
    let back = win / 2;
    let ahead = (win - 1) / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(back);
            let hi = (i + ahead + 1).min(n);
            (prefix[hi] - prefix[lo]) / win as f64
        })
        .collect()
}

/// Local maxima at or above `height`, thinned so no two kept peaks are closer
/// than `distance` samples. Higher peaks win; equal heights keep the earlier
/// index. Flat tops report their middle sample.
pub fn find_peaks(data: &[f64], height: f64, distance: usize) -> Vec<usize> {
    let n = data.len();
    let mut candidates = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead + 1 < n && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                let mid = (i + ahead - 1) / 2;
                if data[mid] >= height {
                    candidates.push(mid);
                }
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    if distance <= 1 || candidates.len() < 2 {
        return candidates;
    }

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        data[candidates[b]]
            .total_cmp(&data[candidates[a]])
            .then(candidates[a].cmp(&candidates[b]))
    });
    let mut keep = vec![true; candidates.len()];
    for &pos in &order {
        if !keep[pos] {
            continue;
        }
        let centre = candidates[pos];
        let mut k = pos;
        while k > 0 && centre - candidates[k - 1] < distance {
            k -= 1;
            keep[k] = false;
        }
        let mut k = pos + 1;
        while k < candidates.len() && candidates[k] - centre < distance {
            keep[k] = false;
            k += 1;
        }
    }
    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(idx, k)| k.then_some(idx))
        .collect()
}

/// Move each peak to the signal maximum within `tolerance` samples,
/// dropping duplicates so the result stays strictly increasing.
pub fn refine_peaks(data: &[f64], peaks: &PeakSet, tolerance: usize) -> PeakSet {
    let n = data.len();
    let mut out: Vec<usize> = Vec::with_capacity(peaks.len());
    for &p in &peaks.indices {
        if p >= n {
            continue;
        }
        let lo = p.saturating_sub(tolerance);
        let hi = (p + tolerance).min(n - 1);
        let mut best = p;
        for j in lo..=hi {
            if data[j] > data[best] {
                best = j;
            }
        }
        if out.last().map_or(true, |&last| best > last) {
            out.push(best);
        }
    }
    PeakSet::from_indices(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        conditioner::Conditioner,
        synth::{beat_samples, synthetic_lead, SynthConfig},
    };

    fn detect_synthetic(cfg: &SynthConfig) -> (PeakSet, Vec<usize>) {
        let raw = synthetic_lead(cfg, 1.0);
        let conditioned = Conditioner::default().condition(&raw);
        let peaks = PeakDetector::default().detect(&conditioned.series);
        (peaks, beat_samples(cfg))
    }

    #[test]
    fn detects_regular_beats() {
        let cfg = SynthConfig::default();
        let (peaks, truth) = detect_synthetic(&cfg);
        assert_eq!(peaks.len(), truth.len());
        let tol = (0.05 * cfg.fs) as usize;
        for (p, t) in peaks.indices.iter().zip(&truth) {
            assert!(p.abs_diff(*t) <= tol, "peak {} too far from beat {}", p, t);
        }
    }

    #[test]
    fn peaks_are_increasing_and_separated() {
        let cfg = SynthConfig {
            rr_jitter_s: 0.12,
            noise_amplitude: 0.02,
            mains_amplitude: 0.1,
            wander_amplitude: 0.3,
            seed: 11,
            ..SynthConfig::default()
        };
        let (peaks, _) = detect_synthetic(&cfg);
        let min_sep = (0.25 * cfg.fs).round() as usize;
        assert!(peaks.len() >= 2);
        for w in peaks.indices.windows(2) {
            assert!(w[1] > w[0]);
            assert!(w[1] - w[0] >= min_sep);
        }
    }

    #[test]
    fn short_input_yields_empty_set() {
        let ts = TimeSeries::new(500.0, vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert!(PeakDetector::default().detect(&ts).is_empty());
        // 0.3 s at 500 Hz is 150 samples
        let ts = TimeSeries::new(500.0, vec![0.0; 149]);
        assert!(PeakDetector::default().detect(&ts).is_empty());
    }

    #[test]
    fn flat_line_has_no_peaks() {
        let ts = TimeSeries::new(500.0, vec![0.0; 5000]);
        assert!(PeakDetector::default().detect(&ts).is_empty());
    }

    #[test]
    fn find_peaks_prefers_higher_then_earlier() {
        let data = [0.0, 1.0, 0.0, 3.0, 0.0, 0.0, 2.0, 0.0];
        assert_eq!(find_peaks(&data, 0.0, 3), vec![3, 6]);
        let data = [0.0, 2.0, 0.0, 2.0, 0.0];
        assert_eq!(find_peaks(&data, 0.0, 3), vec![1]);
        let data = [0.0, 1.0, 1.0, 1.0, 0.0];
        assert_eq!(find_peaks(&data, 0.5, 1), vec![2]);
        let data = [0.0, 1.0, 0.0, 5.0, 0.0];
        assert_eq!(find_peaks(&data, 2.0, 1), vec![3]);
    }

    #[test]
    fn moving_average_is_centred() {
        let data = [0.0, 0.0, 3.0, 0.0, 0.0];
        assert_eq!(moving_average(&data, 3), vec![0.0, 1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn refine_moves_to_local_maximum() {
        let data = [0.0, 0.2, 0.9, 0.4, 0.0, 0.0, 0.3, 1.0, 0.1];
        let peaks = PeakSet::from_indices(vec![1, 3, 6]);
        let refined = refine_peaks(&data, &peaks, 1);
        assert_eq!(refined.indices, vec![2, 7]);
    }
}

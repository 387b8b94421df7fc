use crate::{
    detectors::ecg::refine_peaks,
    error::DelineationError,
    signal::{PeakSet, TimeSeries},
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Search windows used to locate fiducial points around each R-peak.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DelineatorConfig {
    /// Half-width (seconds) of the window used to snap detector peaks onto the R apex.
    pub refine_tolerance_s: f64,
    /// How far (seconds) either side of R the QRS boundaries are searched.
    pub qrs_half_width_s: f64,
    /// Window (seconds) before R searched for the Q trough.
    pub q_search_s: f64,
    /// Onset/offset slope threshold as a fraction of the steepest QRS slope.
    pub slope_fraction: f64,
    /// T-wave search starts this long (seconds) after R.
    pub t_start_s: f64,
    /// T-wave search ends this long (seconds) after R.
    pub t_end_s: f64,
    /// T-wave search stops at least this long (seconds) before the next R.
    pub t_guard_s: f64,
}

impl Default for DelineatorConfig {
    fn default() -> Self {
        Self {
            refine_tolerance_s: 0.05,
            qrs_half_width_s: 0.12,
            q_search_s: 0.08,
            slope_fraction: 0.1,
            t_start_s: 0.10,
            t_end_s: 0.45,
            t_guard_s: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fiducial {
    TPeak,
    ROnset,
    ROffset,
    QPeak,
}

impl Fiducial {
    pub const ALL: [Fiducial; 4] = [
        Fiducial::TPeak,
        Fiducial::ROnset,
        Fiducial::ROffset,
        Fiducial::QPeak,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Fiducial::TPeak => "T-peak",
            Fiducial::ROnset => "R-onset",
            Fiducial::ROffset => "R-offset",
            Fiducial::QPeak => "Q-peak",
        }
    }
}

/// The four landmarks of one complete beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatFiducials {
    pub t_peak: usize,
    pub r_onset: usize,
    pub r_offset: usize,
    pub q_peak: usize,
}

/// Delineation of one lead. Each fiducial list holds one entry per beat;
/// `None` marks a landmark that could not be placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadDelineation {
    /// Mean-removed conditioned lead that all indices point into.
    pub signal: Vec<f64>,
    pub r_peaks: Vec<usize>,
    pub t_peaks: Vec<Option<usize>>,
    pub r_onsets: Vec<Option<usize>>,
    pub r_offsets: Vec<Option<usize>>,
    pub q_peaks: Vec<Option<usize>>,
}

impl LeadDelineation {
    pub fn fiducials(&self, kind: Fiducial) -> &[Option<usize>] {
        match kind {
            Fiducial::TPeak => &self.t_peaks,
            Fiducial::ROnset => &self.r_onsets,
            Fiducial::ROffset => &self.r_offsets,
            Fiducial::QPeak => &self.q_peaks,
        }
    }

    /// Smallest fiducial list length across the four kinds.
    pub fn beat_count(&self) -> usize {
        Fiducial::ALL
            .iter()
            .map(|&f| self.fiducials(f).len())
            .min()
            .unwrap_or(0)
    }

    /// Landmarks of beat `x` if all four exist and lie inside the signal.
    pub fn beat(&self, x: usize) -> Option<BeatFiducials> {
        let n = self.signal.len();
        let get = |kind: Fiducial| -> Option<usize> {
            self.fiducials(kind)
                .get(x)
                .copied()
                .flatten()
                .filter(|&idx| idx < n)
        };
        Some(BeatFiducials {
            t_peak: get(Fiducial::TPeak)?,
            r_onset: get(Fiducial::ROnset)?,
            r_offset: get(Fiducial::ROffset)?,
            q_peak: get(Fiducial::QPeak)?,
        })
    }

    pub fn amplitude(&self, idx: usize) -> Option<f64> {
        self.signal.get(idx).copied().filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WaveDelineator {
    cfg: DelineatorConfig,
}

impl WaveDelineator {
    pub fn new(cfg: DelineatorConfig) -> Self {
        Self { cfg }
    }

    /// Locate T-peak, R-onset, R-offset and Q-peak for every interior beat.
    ///
    /// The first and last peaks are dropped. The lead fails if fewer than two
    /// beats remain, or if one of the four landmark kinds cannot be placed in
    /// any beat. Q-peaks come from a separate pass with one entry per beat
    /// (`None` where the beat has no Q trough); that list is reconciled to the
    /// beat count before it is returned.
    pub fn delineate(
        &self,
        conditioned: &TimeSeries,
        peaks: &PeakSet,
    ) -> Result<LeadDelineation, DelineationError> {
        let fs = conditioned.fs;
        let signal = detrend_mean(&conditioned.data);
        let n = signal.len();
        let secs = |s: f64| (s * fs).round() as usize;

        let refined = refine_peaks(&signal, peaks, secs(self.cfg.refine_tolerance_s));
        if refined.len() < 4 {
            return Err(DelineationError::TooFewPeaks(refined.len().saturating_sub(2)));
        }
        let all = &refined.indices;
        let inner = &all[1..all.len() - 1];

        let mut t_peaks = Vec::with_capacity(inner.len());
        let mut r_onsets = Vec::with_capacity(inner.len());
        let mut r_offsets = Vec::with_capacity(inner.len());
        for (k, &r) in inner.iter().enumerate() {
            let prev = all[k];
            let next = all[k + 2];
            let lo = r.saturating_sub(secs(self.cfg.qrs_half_width_s)).max(prev + 1);
            let hi = (r + secs(self.cfg.qrs_half_width_s)).min(next - 1).min(n - 1);
            let threshold = self.cfg.slope_fraction * max_slope(&signal, lo, hi);

            r_onsets.push(find_onset(&signal, r, lo, threshold));
            r_offsets.push(find_offset(&signal, r, hi, threshold));

            let t_lo = r + secs(self.cfg.t_start_s);
            let t_hi = (r + secs(self.cfg.t_end_s))
                .min(next.saturating_sub(secs(self.cfg.t_guard_s)))
                .min(n - 1);
            t_peaks.push(argmax_abs(&signal, t_lo, t_hi));
        }
        let q_peaks = match_count(
            locate_q_peaks(&signal, all, secs(self.cfg.q_search_s)),
            inner.len(),
        );

        for (kind, list) in [
            (Fiducial::TPeak, &t_peaks),
            (Fiducial::ROnset, &r_onsets),
            (Fiducial::ROffset, &r_offsets),
            (Fiducial::QPeak, &q_peaks),
        ] {
            if list.iter().all(Option::is_none) {
                return Err(DelineationError::Unresolved(kind.name()));
            }
        }

        debug!("delineated {} beats", inner.len());
        Ok(LeadDelineation {
            signal,
            r_peaks: inner.to_vec(),
            t_peaks,
            r_onsets,
            r_offsets,
            q_peaks,
        })
    }
}

fn detrend_mean(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    data.iter().map(|x| x - mean).collect()
}

/// Pad with repeats of the last entry, or trim, so `values` has `count` entries.
pub fn match_count<T: Clone>(mut values: Vec<T>, count: usize) -> Vec<T> {
    if let Some(last) = values.last().cloned() {
        values.resize(count, last);
    }
    values
}

/// Q trough of every interior beat of `peaks` (first and last are skipped),
/// searched in the `search` samples before each R and after the previous R.
fn locate_q_peaks(x: &[f64], peaks: &[usize], search: usize) -> Vec<Option<usize>> {
    peaks
        .windows(3)
        .map(|w| {
            let (prev, r) = (w[0], w[1]);
            find_q_peak(x, r.saturating_sub(search).max(prev + 1), r)
        })
        .collect()
}

fn max_slope(x: &[f64], lo: usize, hi: usize) -> f64 {
    if hi <= lo {
        return 0.0;
    }
    (lo + 1..=hi)
        .map(|i| (x[i] - x[i - 1]).abs())
        .fold(0.0, f64::max)
}

/// Walk back from R down its upstroke into the preceding trough, then climb
/// out of it until the slope has risen above and fallen back under
/// `threshold`.
fn find_onset(x: &[f64], r: usize, lo: usize, threshold: f64) -> Option<usize> {
    if threshold <= 0.0 || r <= lo {
        return None;
    }
    let slope = |i: usize| (x[i] - x[i - 1]).abs();
    let mut i = r;
    while i > lo && x[i - 1] <= x[i] {
        i -= 1;
    }
    while i > lo && x[i - 1] > x[i] && slope(i) < threshold {
        i -= 1;
    }
    while i > lo && x[i - 1] > x[i] && slope(i) >= threshold {
        i -= 1;
    }
    (i > lo).then_some(i)
}

/// Mirror of [`find_onset`] walking forward through the S trough.
fn find_offset(x: &[f64], r: usize, hi: usize, threshold: f64) -> Option<usize> {
    if threshold <= 0.0 || hi <= r {
        return None;
    }
    let slope = |i: usize| (x[i + 1] - x[i]).abs();
    let mut i = r;
    while i < hi && x[i + 1] <= x[i] {
        i += 1;
    }
    while i < hi && x[i + 1] > x[i] && slope(i) < threshold {
        i += 1;
    }
    while i < hi && x[i + 1] > x[i] && slope(i) >= threshold {
        i += 1;
    }
    (i < hi).then_some(i)
}

fn argmax_abs(x: &[f64], lo: usize, hi: usize) -> Option<usize> {
    if lo >= hi || hi >= x.len() {
        return None;
    }
    (lo..=hi).max_by(|&a, &b| x[a].abs().total_cmp(&x[b].abs()))
}

/// Deepest strict local minimum in `[lo, r)`.
fn find_q_peak(x: &[f64], lo: usize, r: usize) -> Option<usize> {
    if lo + 1 >= r {
        return None;
    }
    let q = (lo..r).min_by(|&a, &b| x[a].total_cmp(&x[b]))?;
    (q > lo && x[q - 1] > x[q] && x[q + 1] > x[q]).then_some(q)
}

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// One lead of uniformly sampled ECG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: f64, data: Vec<f64>) -> Self {
        Self { fs, data }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// Multi-lead recording. All leads share the sample rate and length.
#[derive(Debug, Clone, Serialize)]
pub struct Waveform {
    fs: f64,
    leads: Vec<Vec<f64>>,
}

impl Waveform {
    /// Build from lead-major buffers (one `Vec` per lead).
    pub fn from_leads(fs: f64, leads: Vec<Vec<f64>>) -> Result<Self, PipelineError> {
        if !(fs.is_finite() && fs > 0.0) {
            return Err(PipelineError::InvalidSampleRate(fs));
        }
        let Some(first) = leads.first() else {
            return Err(PipelineError::InvalidWaveform("no leads".into()));
        };
        let len = first.len();
        if len == 0 {
            return Err(PipelineError::InsufficientData {
                stage: "waveform",
                required: 1,
                actual: 0,
            });
        }
        if let Some((idx, lead)) = leads.iter().enumerate().find(|(_, l)| l.len() != len) {
            return Err(PipelineError::InvalidWaveform(format!(
                "lead {} has {} samples, lead 0 has {}",
                idx,
                lead.len(),
                len
            )));
        }
        Ok(Self { fs, leads })
    }

    /// Build from a sample-major matrix (`rows[sample][lead]`), the layout record
    /// storage hands out.
    pub fn from_rows(fs: f64, rows: &[Vec<f64>]) -> Result<Self, PipelineError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width == 0 {
            return Err(PipelineError::InvalidWaveform("no leads".into()));
        }
        let mut leads = vec![Vec::with_capacity(rows.len()); width];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(PipelineError::InvalidWaveform(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            for (lead, &v) in leads.iter_mut().zip(row) {
                lead.push(v);
            }
        }
        Self::from_leads(fs, leads)
    }

    pub fn fs(&self) -> f64 {
        self.fs
    }
    pub fn lead_count(&self) -> usize {
        self.leads.len()
    }
    pub fn len(&self) -> usize {
        self.leads.first().map_or(0, Vec::len)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn lead(&self, idx: usize) -> Option<&[f64]> {
        self.leads.get(idx).map(Vec::as_slice)
    }
    pub fn leads(&self) -> impl Iterator<Item = &[f64]> {
        self.leads.iter().map(Vec::as_slice)
    }

    /// Copy one lead out as a standalone series.
    pub fn lead_series(&self, idx: usize) -> Result<TimeSeries, PipelineError> {
        self.lead(idx)
            .map(|data| TimeSeries::new(self.fs, data.to_vec()))
            .ok_or(PipelineError::ShapeMismatch {
                expected: idx + 1,
                actual: self.leads.len(),
            })
    }

    /// Apply `f` to each lead, producing a new waveform of the same shape.
    pub fn map_leads<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        let leads = self.leads.iter().map(|l| f(l)).collect();
        Self { fs: self.fs, leads }
    }
}

/// Detected R-peaks: strictly increasing sample indices into one lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakSet {
    pub indices: Vec<usize>,
}

impl PeakSet {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// RR intervals in whole milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr_ms: Vec<u32>,
}

impl RRSeries {
    pub fn from_peaks(peaks: &PeakSet, fs: f64) -> Self {
        let rr_ms = peaks
            .indices
            .windows(2)
            .map(|w| (1000.0 * (w[1] as f64 - w[0] as f64) / fs).round() as u32)
            .collect();
        Self { rr_ms }
    }
    pub fn len(&self) -> usize {
        self.rr_ms.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rr_ms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rr_from_peaks_rounds_to_ms() {
        let peaks = PeakSet::from_indices(vec![100, 350, 600]);
        let rr = RRSeries::from_peaks(&peaks, 500.0);
        assert_eq!(rr.rr_ms, vec![500, 500]);

        let peaks = PeakSet::from_indices(vec![0, 1]);
        let rr = RRSeries::from_peaks(&peaks, 360.0);
        assert_eq!(rr.rr_ms, vec![3]);
    }

    #[test]
    fn singleton_peaks_have_no_intervals() {
        assert!(RRSeries::from_peaks(&PeakSet::from_indices(vec![42]), 500.0).is_empty());
        assert!(RRSeries::from_peaks(&PeakSet::default(), 500.0).is_empty());
    }

    #[test]
    fn waveform_from_rows_transposes() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let wf = Waveform::from_rows(250.0, &rows).unwrap();
        assert_eq!(wf.lead_count(), 2);
        assert_eq!(wf.len(), 3);
        assert_eq!(wf.lead(1).unwrap(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn waveform_rejects_ragged_and_bad_rate() {
        let err = Waveform::from_leads(500.0, vec![vec![0.0; 4], vec![0.0; 3]]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidWaveform(_)));
        let err = Waveform::from_leads(0.0, vec![vec![0.0; 4]]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSampleRate(_)));
        let err = Waveform::from_leads(500.0, vec![Vec::new()]).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { .. }));
    }
}

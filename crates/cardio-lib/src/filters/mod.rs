//! IIR design and application as cascaded second-order sections.
//!
//! Filters are designed with the bilinear transform and always applied
//! zero-phase (forward then backward), so every call site sees the same
//! group-delay-free output.

mod median;
mod resample;
mod savgol;

pub use median::median_filter;
pub use resample::{resample, ResampleError};
pub use savgol::savgol_filter;

use crate::error::FilterError;
use num_complex::Complex64;
use std::f64::consts::PI;

/// One biquad, normalised so that `a0 == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    fn dc_gain(&self) -> f64 {
        let den = self.a.iter().sum::<f64>();
        if den.abs() < f64::EPSILON {
            0.0
        } else {
            self.b.iter().sum::<f64>() / den
        }
    }

    /// Steady-state transposed-DF2 state for a unit step input.
    fn step_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        [g - self.b[0], self.b[2] - self.a[2] * g]
    }
}

/// Cascade of biquads.
#[derive(Debug, Clone, PartialEq)]
pub struct Sos {
    pub sections: Vec<Biquad>,
}

/// Residual fraction of the slowest pole's response the edge padding must
/// decay to.
const SETTLE_RESIDUAL: f64 = 1e-3;

impl Sos {
    /// Largest pole magnitude across the cascade.
    pub fn pole_radius(&self) -> f64 {
        self.sections
            .iter()
            .map(|s| {
                let (a1, a2) = (s.a[1], s.a[2]);
                let disc = a1 * a1 - 4.0 * a2;
                if disc < 0.0 {
                    a2.sqrt()
                } else {
                    let root = disc.sqrt();
                    ((-a1 + root) / 2.0).abs().max(((-a1 - root) / 2.0).abs())
                }
            })
            .fold(0.0, f64::max)
    }

    /// Samples of mirror padding used by [`Sos::filtfilt`]: long enough for
    /// the slowest pole to settle, never shorter than `3 * (2 * sections + 1)`,
    /// and clipped to `len - 1`.
    pub fn pad_len(&self, len: usize) -> usize {
        let floor = 3 * (2 * self.sections.len() + 1);
        let radius = self.pole_radius();
        let settle = if radius > 0.0 && radius < 1.0 {
            (SETTLE_RESIDUAL.ln() / radius.ln()).ceil() as usize
        } else {
            0
        };
        floor.max(settle).min(len.saturating_sub(1))
    }

    /// Causal pass, each section starting in steady state for a constant
    /// input of `init`.
    fn run(&self, data: &[f64], init: f64) -> Vec<f64> {
        let mut out = data.to_vec();
        let mut scale = init;
        for section in &self.sections {
            let zi = section.step_state();
            let mut z = [zi[0] * scale, zi[1] * scale];
            for x in out.iter_mut() {
                let input = *x;
                let y = section.b[0] * input + z[0];
                z[0] = section.b[1] * input - section.a[1] * y + z[1];
                z[1] = section.b[2] * input - section.a[2] * y;
                *x = y;
            }
            scale *= section.dc_gain();
        }
        out
    }

    /// Zero-phase forward-backward filtering. Both ends are padded with a
    /// mirror image of the signal (the edge sample itself is not repeated),
    /// so the local mean carries across each edge, and each pass starts in
    /// steady state for its own first input. Output length equals input length.
    pub fn filtfilt(&self, data: &[f64]) -> Result<Vec<f64>, FilterError> {
        let n = data.len();
        if n < 3 {
            return Err(FilterError::TooShort(n));
        }
        let pad = self.pad_len(n);
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend(data[1..=pad].iter().rev());
        ext.extend_from_slice(data);
        ext.extend(data[n - 1 - pad..n - 1].iter().rev());

        let forward = self.run(&ext, ext[0]);
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let seed = reversed[0];
        reversed = self.run(&reversed, seed);
        reversed.reverse();
        Ok(reversed[pad..pad + n].to_vec())
    }
}

fn check_rate(fs: f64) -> Result<f64, FilterError> {
    if fs.is_finite() && fs > 0.0 {
        Ok(fs * 0.5)
    } else {
        Err(FilterError::SampleRate(fs))
    }
}

fn check_cutoff(cutoff: f64, nyquist: f64) -> Result<(), FilterError> {
    if cutoff.is_finite() && cutoff > 0.0 && cutoff < nyquist {
        Ok(())
    } else {
        Err(FilterError::Cutoff { cutoff, nyquist })
    }
}

/// Digital Butterworth band-pass of the given prototype order
/// (the cascade has `order` sections, i.e. `2 * order` poles).
pub fn butter_bandpass(order: usize, low_hz: f64, high_hz: f64, fs: f64) -> Result<Sos, FilterError> {
    if order == 0 {
        return Err(FilterError::Order);
    }
    let nyquist = check_rate(fs)?;
    check_cutoff(low_hz, nyquist)?;
    check_cutoff(high_hz, nyquist)?;
    if low_hz >= high_hz {
        return Err(FilterError::BandOrder {
            low: low_hz,
            high: high_hz,
        });
    }

    // Pre-warped analog band edges.
    let fs2 = 2.0 * fs;
    let w1 = fs2 * (PI * low_hz / fs).tan();
    let w2 = fs2 * (PI * high_hz / fs).tan();
    let bw = w2 - w1;
    let w0_sq = w1 * w2;

    let mut z_poles = Vec::with_capacity(2 * order);
    let mut denom = Complex64::new(1.0, 0.0);
    for k in 0..order {
        let theta = PI * (2 * k + 1 + order) as f64 / (2 * order) as f64;
        let proto = Complex64::from_polar(1.0, theta);
        let half = proto * (bw / 2.0);
        let disc = (half * half - w0_sq).sqrt();
        for s in [half + disc, half - disc] {
            denom *= fs2 - s;
            z_poles.push((fs2 + s) / (fs2 - s));
        }
    }
    let gain = (bw.powi(order as i32) * fs2.powi(order as i32) / denom).re;

    let sections = pair_poles(&z_poles)
        .into_iter()
        .enumerate()
        .map(|(i, a)| {
            let g = if i == 0 { gain } else { 1.0 };
            Biquad {
                b: [g, 0.0, -g],
                a,
            }
        })
        .collect::<Vec<_>>();
    if sections.len() != order {
        return Err(FilterError::Order);
    }
    Ok(Sos { sections })
}

/// Group z-plane poles into real-coefficient second-order denominators.
fn pair_poles(poles: &[Complex64]) -> Vec<[f64; 3]> {
    const IM_EPS: f64 = 1e-12;
    let mut out = Vec::new();
    let mut reals = Vec::new();
    for p in poles {
        if p.im > IM_EPS {
            out.push([1.0, -2.0 * p.re, p.norm_sqr()]);
        } else if p.im.abs() <= IM_EPS {
            reals.push(p.re);
        }
    }
    for pair in reals.chunks(2) {
        match pair {
            [p1, p2] => out.push([1.0, -(p1 + p2), p1 * p2]),
            [p] => out.push([1.0, -p, 0.0]),
            _ => {}
        }
    }
    out
}

/// Second-order IIR notch at `freq_hz` with quality factor `q`.
pub fn iir_notch(freq_hz: f64, q: f64, fs: f64) -> Result<Sos, FilterError> {
    let nyquist = check_rate(fs)?;
    check_cutoff(freq_hz, nyquist)?;
    if !(q.is_finite() && q > 0.0) {
        return Err(FilterError::Quality(q));
    }
    let w0 = PI * freq_hz / nyquist;
    let bw = w0 / q;
    let beta = (bw / 2.0).tan();
    let gain = 1.0 / (1.0 + beta);
    let cos_w0 = w0.cos();
    Ok(Sos {
        sections: vec![Biquad {
            b: [gain, -2.0 * gain * cos_w0, gain],
            a: [1.0, -2.0 * gain * cos_w0, 2.0 * gain - 1.0],
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(data: &[f64]) -> f64 {
        (data.iter().map(|x| x * x).sum::<f64>() / data.len() as f64).sqrt()
    }

    #[test]
    fn bandpass_has_order_sections_and_stable_poles() {
        let sos = butter_bandpass(4, 0.5, 40.0, 500.0).unwrap();
        assert_eq!(sos.sections.len(), 4);
        for s in &sos.sections {
            // |p|^2 == a2 for a conjugate pair
            assert!(s.a[2] < 1.0 && s.a[2] > 0.0, "unstable section {:?}", s);
        }
    }

    #[test]
    fn bandpass_passes_midband_and_rejects_dc() {
        let fs = 500.0;
        let sos = butter_bandpass(4, 0.5, 40.0, fs).unwrap();
        let mid = tone(10.0, fs, 5000);
        let out = sos.filtfilt(&mid).unwrap();
        assert_eq!(out.len(), mid.len());
        let ratio = rms(&out[500..4500]) / rms(&mid[500..4500]);
        assert!((ratio - 1.0).abs() < 0.05, "10 Hz gain {}", ratio);

        let dc = vec![3.0; 5000];
        let out = sos.filtfilt(&dc).unwrap();
        assert!(rms(&out[500..4500]) < 1e-3);

        let hf = tone(120.0, fs, 5000);
        let out = sos.filtfilt(&hf).unwrap();
        assert!(rms(&out[500..4500]) < 0.01);
    }

    #[test]
    fn bandpass_rejects_stopband_up_to_the_record_edges() {
        let fs = 500.0;
        let sos = butter_bandpass(4, 0.5, 40.0, fs).unwrap();
        for k in 0..8 {
            let phase = k as f64 * PI / 4.0;
            let hf: Vec<f64> = (0..5000)
                .map(|i| 1.5 + (2.0 * PI * 120.0 * i as f64 / fs + phase).sin())
                .collect();
            let out = sos.filtfilt(&hf).unwrap();
            let head = rms(&out[..100]);
            let tail = rms(&out[out.len() - 100..]);
            assert!(head < 0.05 && tail < 0.05, "phase {}: edges {} / {}", phase, head, tail);
            assert!(rms(&out[500..4500]) < 1e-3, "phase {}", phase);
            assert!(rms(&out) < 0.01, "phase {}: overall {}", phase, rms(&out));
        }
    }

    #[test]
    fn padding_outlasts_the_slowest_pole() {
        let sos = butter_bandpass(4, 0.5, 40.0, 500.0).unwrap();
        let radius = sos.pole_radius();
        assert!(radius > 0.99 && radius < 1.0);
        let pad = sos.pad_len(100_000);
        assert!(radius.powi(pad as i32) <= 1e-3);
        assert!(pad > 27);
        assert_eq!(sos.pad_len(40), 39);
        assert_eq!(sos.pad_len(1), 0);
        let notch = iir_notch(50.0, 30.0, 500.0).unwrap();
        assert!(notch.pad_len(100_000) < pad);
    }

    #[test]
    fn notch_removes_mains() {
        let fs = 500.0;
        let notch = iir_notch(50.0, 30.0, fs).unwrap();
        let hum = tone(50.0, fs, 5000);
        let out = notch.filtfilt(&hum).unwrap();
        assert!(rms(&out[1000..4000]) < 0.05);
        let keep = tone(10.0, fs, 5000);
        let out = notch.filtfilt(&keep).unwrap();
        assert!((rms(&out[1000..4000]) - rms(&keep[1000..4000])).abs() < 0.02);
    }

    #[test]
    fn design_rejects_cutoff_above_nyquist() {
        assert!(matches!(
            butter_bandpass(4, 0.5, 40.0, 60.0),
            Err(FilterError::Cutoff { .. })
        ));
        assert!(matches!(
            iir_notch(50.0, 30.0, 100.0),
            Err(FilterError::Cutoff { .. })
        ));
        assert!(matches!(
            butter_bandpass(4, 10.0, 5.0, 500.0),
            Err(FilterError::BandOrder { .. })
        ));
    }

    #[test]
    fn filtfilt_handles_short_inputs() {
        let sos = butter_bandpass(4, 0.5, 40.0, 500.0).unwrap();
        assert!(matches!(sos.filtfilt(&[1.0, 2.0]), Err(FilterError::TooShort(2))));
        let out = sos.filtfilt(&[1.0, -1.0, 0.5, 0.2]).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|v| v.is_finite()));
    }
}

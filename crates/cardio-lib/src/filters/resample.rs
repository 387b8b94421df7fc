use realfft::RealFftPlanner;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("cannot resample {from} samples to {to}")]
    Length { from: usize, to: usize },
    #[error("fft failed: {0}")]
    Fft(String),
}

/// Band-limited (Fourier) resampling of `data` to exactly `target` samples.
///
/// The spectrum is truncated or zero-extended; a shared Nyquist bin is split
/// or merged so the output stays real.
pub fn resample(data: &[f64], target: usize) -> Result<Vec<f64>, ResampleError> {
    let n = data.len();
    if n == 0 || target == 0 {
        return Err(ResampleError::Length { from: n, to: target });
    }
    if n == target {
        return Ok(data.to_vec());
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let mut buffer = data.to_vec();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut buffer, &mut spectrum)
        .map_err(|e| ResampleError::Fft(e.to_string()))?;

    let c2r = planner.plan_fft_inverse(target);
    let mut resized = c2r.make_input_vec();
    let shared = n.min(target);
    let keep = shared / 2 + 1;
    resized[..keep].copy_from_slice(&spectrum[..keep]);
    if shared % 2 == 0 {
        if target < n {
            resized[shared / 2] *= 2.0;
        } else {
            resized[shared / 2] *= 0.5;
        }
    }
    resized[0].im = 0.0;
    if target % 2 == 0 {
        if let Some(last) = resized.last_mut() {
            last.im = 0.0;
        }
    }

    let mut out = c2r.make_output_vec();
    c2r.process(&mut resized, &mut out)
        .map_err(|e| ResampleError::Fft(e.to_string()))?;
    let scale = 1.0 / n as f64;
    Ok(out.into_iter().map(|v| v * scale).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn produces_requested_length() {
        let data: Vec<f64> = (0..50).map(|i| (i as f64 * 0.3).sin()).collect();
        assert_eq!(resample(&data, 187).unwrap().len(), 187);
        assert_eq!(resample(&data, 20).unwrap().len(), 20);
        assert_eq!(resample(&data, 50).unwrap(), data);
    }

    #[test]
    fn upsampling_a_periodic_tone_is_exact() {
        let n = 64;
        let m = 187;
        let data: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 3.0 * i as f64 / n as f64).cos())
            .collect();
        let out = resample(&data, m).unwrap();
        for (j, v) in out.iter().enumerate() {
            let expected = (2.0 * PI * 3.0 * j as f64 / m as f64).cos();
            assert!((v - expected).abs() < 1e-9, "sample {}: {} vs {}", j, v, expected);
        }
    }

    #[test]
    fn constant_stays_constant() {
        let out = resample(&[2.5; 30], 187).unwrap();
        assert!(out.iter().all(|v| (v - 2.5).abs() < 1e-9));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(resample(&[], 187).is_err());
    }
}

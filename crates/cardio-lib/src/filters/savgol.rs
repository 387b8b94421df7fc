use crate::error::FilterError;

/// Savitzky–Golay smoothing with an odd `window` and polynomial `order`.
///
/// Interior samples use the least-squares convolution kernel; the first and
/// last `window / 2` samples are taken from a polynomial fitted to the edge
/// window, so the output keeps the input length.
pub fn savgol_filter(data: &[f64], window: usize, order: usize) -> Result<Vec<f64>, FilterError> {
    let n = data.len();
    if window % 2 == 0 || order >= window || window > n {
        return Err(FilterError::Window {
            window,
            order,
            len: n,
        });
    }
    let half = window / 2;
    let offsets: Vec<f64> = (0..window).map(|j| j as f64 - half as f64).collect();
    let gram = gram_matrix(&offsets, order);

    let mut unit = vec![0.0; order + 1];
    unit[0] = 1.0;
    let g = solve(gram.clone(), unit).ok_or(FilterError::Window {
        window,
        order,
        len: n,
    })?;
    let kernel: Vec<f64> = offsets.iter().map(|&t| eval_poly(&g, t)).collect();

    let mut out = vec![0.0; n];
    for i in half..n - half {
        out[i] = kernel
            .iter()
            .zip(&data[i - half..=i + half])
            .map(|(k, x)| k * x)
            .sum();
    }

    let edge = |segment: &[f64]| -> Option<Vec<f64>> {
        let rhs = (0..=order)
            .map(|p| offsets.iter().zip(segment).map(|(t, y)| t.powi(p as i32) * y).sum())
            .collect();
        solve(gram.clone(), rhs)
    };
    let err = || FilterError::Window {
        window,
        order,
        len: n,
    };
    let head = edge(&data[..window]).ok_or_else(err)?;
    for (i, o) in out.iter_mut().enumerate().take(half) {
        *o = eval_poly(&head, offsets[i]);
    }
    let tail = edge(&data[n - window..]).ok_or_else(err)?;
    for k in 0..half {
        out[n - half + k] = eval_poly(&tail, offsets[half + 1 + k]);
    }
    Ok(out)
}

fn gram_matrix(offsets: &[f64], order: usize) -> Vec<Vec<f64>> {
    (0..=order)
        .map(|r| {
            (0..=order)
                .map(|c| offsets.iter().map(|t| t.powi((r + c) as i32)).sum())
                .collect()
        })
        .collect()
}

fn eval_poly(coeffs: &[f64], t: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut m: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (rhs[row] - tail) / m[row][row];
    }
    Some(x)
}

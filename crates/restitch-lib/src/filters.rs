//! Deterministic numeric filters for the spectral-cleanup stage. Both
//! filters preserve sequence length and timeline alignment.

/// RBJ notch biquad centred on `freq` Hz. With a very low Q the notch is
/// wide enough to swallow baseline wander around its centre frequency.
/// Returns `(b, a)` with `a[0]` normalised to 1.
pub fn notch_coefficients(freq: f64, q: f64, fs: f64) -> ([f64; 3], [f64; 3]) {
    let w0 = 2.0 * std::f64::consts::PI * freq / fs;
    let alpha = w0.sin() / (2.0 * q);
    let cosw = w0.cos();
    let a0 = 1.0 + alpha;
    (
        [1.0 / a0, -2.0 * cosw / a0, 1.0 / a0],
        [1.0, -2.0 * cosw / a0, (1.0 - alpha) / a0],
    )
}

/// Zero-phase (forward-backward) application of a biquad, with odd
/// extension padding and steady-state initial conditions so constant
/// signals pass through without edge transients. Inputs shorter than the
/// padding are returned unchanged.
pub fn filtfilt_biquad(b: &[f64; 3], a: &[f64; 3], data: &[f64]) -> Vec<f64> {
    const PAD: usize = 9;
    let n = data.len();
    if n <= PAD {
        return data.to_vec();
    }

    let mut ext = Vec::with_capacity(n + 2 * PAD);
    for i in (1..=PAD).rev() {
        ext.push(2.0 * data[0] - data[i]);
    }
    ext.extend_from_slice(data);
    for i in 1..=PAD {
        ext.push(2.0 * data[n - 1] - data[n - 1 - i]);
    }

    let forward = biquad_filter(b, a, &ext);
    let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
    reversed = biquad_filter(b, a, &reversed);
    reversed.reverse();
    reversed[PAD..PAD + n].to_vec()
}

/// Direct-form II transposed biquad, state initialised to the filter's
/// steady-state response for the first input value.
fn biquad_filter(b: &[f64; 3], a: &[f64; 3], x: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(x.len());
    if x.is_empty() {
        return out;
    }
    let dc = (b[0] + b[1] + b[2]) / (1.0 + a[1] + a[2]);
    let x0 = x[0];
    let mut s1 = (dc - b[0]) * x0;
    let mut s2 = (dc - b[0] - b[1] + a[1] * dc) * x0;
    for &xi in x {
        let y = b[0] * xi + s1;
        s1 = b[1] * xi - a[1] * y + s2;
        s2 = b[2] * xi - a[2] * y;
        out.push(y);
    }
    out
}

/// Suppress very-low-frequency drift with a wide notch at `cutoff` Hz.
pub fn remove_baseline_wander(data: &[f64], sample_rate: f64, cutoff: f64, q: f64) -> Vec<f64> {
    if sample_rate <= 0.0 || cutoff <= 0.0 || cutoff >= sample_rate / 2.0 {
        return data.to_vec();
    }
    let (b, a) = notch_coefficients(cutoff, q, sample_rate);
    filtfilt_biquad(&b, &a, data)
}

/// Savitzky-Golay polynomial smoothing. `window` must be odd; inputs the
/// filter cannot fit (window too small, polyorder too high, data shorter
/// than the window) are returned unchanged. Edges are handled by fitting
/// a polynomial to the boundary windows and extrapolating.
pub fn savgol_filter(data: &[f64], window: usize, polyorder: usize) -> Vec<f64> {
    if window < 3 || window % 2 == 0 || polyorder >= window || data.len() < window {
        return data.to_vec();
    }
    let half = window / 2;
    let n = data.len();

    // Convolution weights for the window centre: w_i = z . [1, x_i, ...]
    // where G z = e0 and G is the normal-equation matrix.
    let mut g = vec![vec![0.0; polyorder + 1]; polyorder + 1];
    for (j, row) in g.iter_mut().enumerate() {
        for (k, cell) in row.iter_mut().enumerate() {
            *cell = (0..window)
                .map(|i| (i as f64 - half as f64).powi((j + k) as i32))
                .sum();
        }
    }
    let mut e0 = vec![0.0; polyorder + 1];
    e0[0] = 1.0;
    let z = solve_linear(g, e0);
    let weights: Vec<f64> = (0..window)
        .map(|i| {
            let x = i as f64 - half as f64;
            z.iter()
                .enumerate()
                .map(|(j, zj)| zj * x.powi(j as i32))
                .sum()
        })
        .collect();

    let mut out = vec![0.0; n];
    for i in half..n - half {
        out[i] = weights
            .iter()
            .zip(&data[i - half..i + half + 1])
            .map(|(w, v)| w * v)
            .sum();
    }

    // Edge samples: evaluate a least-squares polynomial fitted over the
    // first/last full window.
    let left = polyfit(&data[..window], polyorder);
    for (i, slot) in out.iter_mut().take(half).enumerate() {
        *slot = polyval(&left, i as f64);
    }
    let right = polyfit(&data[n - window..], polyorder);
    for i in n - half..n {
        out[i] = polyval(&right, (i - (n - window)) as f64);
    }
    out
}

fn polyfit(y: &[f64], polyorder: usize) -> Vec<f64> {
    let mut g = vec![vec![0.0; polyorder + 1]; polyorder + 1];
    let mut r = vec![0.0; polyorder + 1];
    for (j, row) in g.iter_mut().enumerate() {
        for (k, cell) in row.iter_mut().enumerate() {
            *cell = (0..y.len()).map(|i| (i as f64).powi((j + k) as i32)).sum();
        }
    }
    for (j, slot) in r.iter_mut().enumerate() {
        *slot = y
            .iter()
            .enumerate()
            .map(|(i, yi)| (i as f64).powi(j as i32) * yi)
            .sum();
    }
    solve_linear(g, r)
}

fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Gaussian elimination with partial pivoting for the small dense systems
/// the polynomial fits produce.
fn solve_linear(mut m: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Vec<f64> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| {
                m[a][col]
                    .abs()
                    .partial_cmp(&m[b][col].abs())
                    .expect("finite matrix entries")
            })
            .expect("non-empty system");
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        let diag = m[col][col];
        if diag == 0.0 {
            continue;
        }
        for row in col + 1..n {
            let factor = m[row][col] / diag;
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for k in row + 1..n {
            acc -= m[row][k] * x[k];
        }
        x[row] = if m[row][row] != 0.0 {
            acc / m[row][row]
        } else {
            0.0
        };
    }
    x
}

/// Smoothing entry point: default window is `sample_rate / 10`, forced
/// odd and at least 1, matching the rolling-window heuristic the
/// correction pipeline was tuned with.
pub fn smooth_signal(
    data: &[f64],
    sample_rate: f64,
    window: Option<usize>,
    polyorder: usize,
) -> Vec<f64> {
    let mut window = window.unwrap_or((sample_rate / 10.0) as usize);
    if window % 2 == 0 {
        window += 1;
    }
    savgol_filter(data, window, polyorder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notch_passes_constant_signal() {
        let data = vec![1.25; 512];
        let out = remove_baseline_wander(&data, 500.0, 0.05, 0.005);
        assert_eq!(out.len(), data.len());
        for v in &out {
            assert!((v - 1.25).abs() < 1e-9, "constant disturbed: {v}");
        }
    }

    #[test]
    fn notch_attenuates_slow_drift() {
        // Two full cycles of a sinusoid at the notch centre (zero mean;
        // the notch passes DC). Length and alignment must be untouched.
        let fs = 500.0;
        let n = 20_000;
        let drift: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 0.05 * i as f64 / fs).sin())
            .collect();
        let out = remove_baseline_wander(&drift, fs, 0.05, 0.005);
        assert_eq!(out.len(), n);
        // Compare away from the edges where the padding transient lives.
        let power_in: f64 = drift[1000..n - 1000].iter().map(|x| x * x).sum();
        let power_out: f64 = out[1000..n - 1000].iter().map(|x| x * x).sum();
        assert!(
            power_out < power_in * 0.25,
            "drift not attenuated: {power_out} vs {power_in}"
        );
    }

    #[test]
    fn notch_short_input_passthrough() {
        let data = vec![1.0, 2.0, 3.0];
        assert_eq!(remove_baseline_wander(&data, 500.0, 0.05, 0.005), data);
    }

    #[test]
    fn savgol_preserves_length() {
        let data: Vec<f64> = (0..100).map(|i| (i as f64 * 0.3).sin()).collect();
        assert_eq!(savgol_filter(&data, 17, 3).len(), data.len());
    }

    #[test]
    fn savgol_reproduces_polynomials_exactly() {
        // Anything up to the fit order passes through unchanged,
        // including the extrapolated edges.
        let cubic: Vec<f64> = (0..60)
            .map(|i| {
                let x = i as f64 * 0.1;
                0.5 * x * x * x - 2.0 * x * x + x - 3.0
            })
            .collect();
        let out = savgol_filter(&cubic, 11, 3);
        for (a, b) in out.iter().zip(&cubic) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn savgol_smooths_noise() {
        // Deterministic high-frequency wiggle on a linear trend.
        let data: Vec<f64> = (0..200)
            .map(|i| i as f64 * 0.01 + if i % 2 == 0 { 0.2 } else { -0.2 })
            .collect();
        let out = savgol_filter(&data, 15, 3);
        let wiggle_in: f64 = data.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        let wiggle_out: f64 = out.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        assert!(wiggle_out < wiggle_in * 0.5);
    }

    #[test]
    fn smooth_signal_derives_window_from_rate() {
        let data: Vec<f64> = (0..500).map(|i| (i as f64 * 0.05).cos()).collect();
        // rate 500 -> window 50 -> forced odd to 51.
        let auto = smooth_signal(&data, 500.0, None, 3);
        let explicit = savgol_filter(&data, 51, 3);
        assert_eq!(auto, explicit);
    }

    #[test]
    fn degenerate_windows_pass_through() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(smooth_signal(&data, 0.0, None, 3), data);
        assert_eq!(savgol_filter(&data, 9, 3), data);
    }
}

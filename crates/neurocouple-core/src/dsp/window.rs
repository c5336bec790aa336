//! Window functions and per-segment conditioning.

use std::f64::consts::PI;

use statrs::statistics::Statistics;

/// Symmetry of a generated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symmetry {
    /// Endpoints are equal; used for filter-design style windows.
    Symmetric,
    /// One sample of a length `n+1` symmetric window dropped; the usual
    /// choice for spectral estimation.
    Periodic,
}

fn cosine_window(n: usize, a0: f64, symmetry: Symmetry) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = match symmetry {
                Symmetry::Symmetric => (n - 1) as f64,
                Symmetry::Periodic => n as f64,
            };
            (0..n)
                .map(|i| a0 - (1.0 - a0) * (2.0 * PI * i as f64 / denom).cos())
                .collect()
        }
    }
}

/// Hann window of `n` samples.
pub fn hann(n: usize, symmetry: Symmetry) -> Vec<f64> {
    cosine_window(n, 0.5, symmetry)
}

/// Hamming window of `n` samples.
pub fn hamming(n: usize, symmetry: Symmetry) -> Vec<f64> {
    cosine_window(n, 0.54, symmetry)
}

/// Subtract the mean in place.
pub fn detrend_constant(data: &mut [f64]) {
    if data.is_empty() {
        return;
    }
    let mean = data.iter().mean();
    for x in data.iter_mut() {
        *x -= mean;
    }
}

/// Z-score with the population standard deviation.
///
/// A constant signal is only centered; dividing by a vanishing deviation
/// would turn it into NaN.
pub fn zscore(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mean = data.iter().mean();
    let std = data.iter().population_std_dev();
    if std < 1e-12 {
        return data.iter().map(|x| x - mean).collect();
    }
    data.iter().map(|x| (x - mean) / std).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_endpoints() {
        let w = hann(5, Symmetry::Symmetric);
        assert!(w[0].abs() < 1e-12);
        assert!(w[4].abs() < 1e-12);
        assert!((w[2] - 1.0).abs() < 1e-12);

        let w = hann(4, Symmetry::Periodic);
        assert!(w[0].abs() < 1e-12);
        assert!((w[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hamming_endpoints() {
        let w = hamming(9, Symmetry::Symmetric);
        assert!((w[0] - 0.08).abs() < 1e-12);
        assert!((w[8] - 0.08).abs() < 1e-12);
        assert!((w[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_lengths() {
        assert!(hann(0, Symmetry::Symmetric).is_empty());
        assert_eq!(hamming(1, Symmetry::Periodic), vec![1.0]);
    }

    #[test]
    fn detrend_removes_mean() {
        let mut data = vec![1.0, 2.0, 3.0, 6.0];
        detrend_constant(&mut data);
        let sum: f64 = data.iter().sum();
        assert!(sum.abs() < 1e-12);
        assert!((data[0] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn zscore_unit_variance() {
        let data: Vec<f64> = (0..100).map(|i| (i as f64 * 0.3).sin() * 4.0 + 7.0).collect();
        let z = zscore(&data);
        let mean = z.iter().mean();
        let std = z.iter().population_std_dev();
        assert!(mean.abs() < 1e-9);
        assert!((std - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zscore_constant_signal_is_centered() {
        let z = zscore(&[3.0; 10]);
        assert!(z.iter().all(|x| x.abs() < 1e-12));
    }
}

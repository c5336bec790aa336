//! FFT helpers: one-sided spectra and the analytic signal.

use rustfft::{FftPlanner, num_complex::Complex};

/// Frequencies of a one-sided spectrum of `nfft` points at `fs` Hz.
pub fn rfft_frequencies(nfft: usize, fs: f64) -> Vec<f64> {
    (0..=nfft / 2).map(|k| k as f64 * fs / nfft as f64).collect()
}

/// Plans forward FFTs of one size and reuses the buffers across segments.
pub struct SegmentFft {
    nfft: usize,
    fft: std::sync::Arc<dyn rustfft::Fft<f64>>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl SegmentFft {
    pub fn new(nfft: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(nfft);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            nfft,
            fft,
            buffer: vec![Complex::new(0.0, 0.0); nfft],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// One-sided spectrum (`nfft/2 + 1` bins) of `segment * window`,
    /// zero-padded or truncated to `nfft`.
    pub fn one_sided(&mut self, segment: &[f64], window: &[f64]) -> &[Complex<f64>] {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = match (segment.get(i), window.get(i)) {
                (Some(&x), Some(&w)) => Complex::new(x * w, 0.0),
                _ => Complex::new(0.0, 0.0),
            };
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        &self.buffer[..self.nfft / 2 + 1]
    }
}

/// Analytic signal `x + i·H{x}` computed in the frequency domain.
///
/// Positive frequencies are doubled, negative ones zeroed; DC and (for even
/// lengths) the Nyquist bin are kept as is.
pub fn analytic_signal(x: &[f64]) -> Vec<Complex<f64>> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    forward.process(&mut spectrum);

    let half = n / 2;
    for (k, bin) in spectrum.iter_mut().enumerate() {
        let gain = if k == 0 || (n % 2 == 0 && k == half) {
            1.0
        } else if k < n.div_ceil(2) {
            2.0
        } else {
            0.0
        };
        *bin *= gain;
    }

    inverse.process(&mut spectrum);
    let scale = 1.0 / n as f64;
    for v in spectrum.iter_mut() {
        *v *= scale;
    }
    spectrum
}

/// Instantaneous phase in `(-π, π]`.
pub fn instantaneous_phase(x: &[f64]) -> Vec<f64> {
    analytic_signal(x).iter().map(|c| c.arg()).collect()
}

/// Amplitude envelope `|x + i·H{x}|`.
pub fn envelope(x: &[f64]) -> Vec<f64> {
    analytic_signal(x).iter().map(|c| c.norm()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn frequencies_span_to_nyquist() {
        let f = rfft_frequencies(8, 100.0);
        assert_eq!(f.len(), 5);
        assert_eq!(f[4], 50.0);
        assert_eq!(f[1], 12.5);
    }

    #[test]
    fn analytic_signal_of_cosine_is_complex_exponential() {
        let n = 256;
        let x: Vec<f64> = (0..n).map(|i| (2.0 * PI * 8.0 * i as f64 / n as f64).cos()).collect();
        let z = analytic_signal(&x);
        for (i, c) in z.iter().enumerate() {
            let phase = 2.0 * PI * 8.0 * i as f64 / n as f64;
            assert!((c.re - phase.cos()).abs() < 1e-9);
            assert!((c.im - phase.sin()).abs() < 1e-9);
        }
    }

    #[test]
    fn envelope_of_modulated_carrier() {
        let n = 2000;
        let fs = 1000.0;
        let x: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                (1.0 + 0.5 * (2.0 * PI * 5.0 * t).cos()) * (2.0 * PI * 100.0 * t).cos()
            })
            .collect();
        let env = envelope(&x);
        // Away from the edges the envelope tracks the modulator.
        for i in 200..1800 {
            let t = i as f64 / fs;
            let expected = 1.0 + 0.5 * (2.0 * PI * 5.0 * t).cos();
            assert!((env[i] - expected).abs() < 1e-6, "sample {i}");
        }
    }

    #[test]
    fn odd_length_supported() {
        let x: Vec<f64> = (0..7).map(|i| i as f64).collect();
        let z = analytic_signal(&x);
        assert_eq!(z.len(), 7);
        for (a, c) in x.iter().zip(&z) {
            assert!((a - c.re).abs() < 1e-9);
        }
    }

    #[test]
    fn segment_fft_zero_pads() {
        let mut fft = SegmentFft::new(8);
        let spec = fft.one_sided(&[1.0, 1.0], &[1.0, 1.0]);
        assert_eq!(spec.len(), 5);
        assert!((spec[0].re - 2.0).abs() < 1e-12);
    }
}

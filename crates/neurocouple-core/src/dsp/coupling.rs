//! Phase-amplitude coupling: modulation index, mean vector length and
//! phase-locking value.
//!
//! Phase comes from the analytic signal of a band-limited phase signal and
//! amplitude from the envelope of a band-limited amplitude signal. Inputs of
//! different lengths are truncated to the shorter one.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use super::filter::SosFilter;
use super::fourier::{envelope, instantaneous_phase};
use crate::error::Result;
use crate::types::FrequencyBand;

/// Added inside the logarithm of the entropy so empty bins contribute 0.
const ENTROPY_EPS: f64 = 1e-15;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// The three coupling metrics for one signal pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PacValues {
    /// Modulation index in `[0, 1]`.
    pub mi: f64,
    /// Mean vector length, in amplitude units.
    pub mvl: f64,
    /// Phase-locking value in `[0, 1]`.
    pub plv: f64,
}

/// Intermediate vectors behind [`PacValues`], for plotting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PacProfile {
    /// Phase bin centers in radians.
    pub bin_centers: Vec<f64>,
    /// Normalized mean amplitude per phase bin.
    pub distribution: Vec<f64>,
    /// Mean of `amp·e^{iφ}` as `(re, im)`.
    pub mvl_vector: (f64, f64),
    /// Mean of `e^{i(φ - φ_env)}` as `(re, im)`.
    pub plv_vector: (f64, f64),
}

/// MI/MVL/PLV over consecutive windows of one slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlidingPac {
    /// Window centers in seconds.
    pub times: Vec<f64>,
    pub mi: Vec<f64>,
    pub mvl: Vec<f64>,
    pub plv: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Phase bin of `phi` among `n_bins` equal bins over `[-π, π]`; `π` joins the
/// last bin.
fn phase_bin(phi: f64, n_bins: usize) -> usize {
    let width = 2.0 * PI / n_bins as f64;
    (((phi + PI) / width).floor().max(0.0) as usize).min(n_bins - 1)
}

/// Tort modulation index and the normalized amplitude distribution.
///
/// Empty bins keep amplitude 0. A distribution with no amplitude at all has
/// no preferred phase and gives MI 0.
pub fn modulation_index(phase: &[f64], amplitude: &[f64], n_bins: usize) -> (f64, Vec<f64>) {
    let n_bins = n_bins.max(2);
    let mut sums = vec![0.0; n_bins];
    let mut counts = vec![0usize; n_bins];
    for (&phi, &amp) in phase.iter().zip(amplitude) {
        let bin = phase_bin(phi, n_bins);
        sums[bin] += amp;
        counts[bin] += 1;
    }
    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
        .collect();
    let total: f64 = means.iter().sum();
    if !(total > ENTROPY_EPS) {
        return (0.0, vec![0.0; n_bins]);
    }
    let dist: Vec<f64> = means.iter().map(|m| m / total).collect();
    let entropy: f64 = -dist.iter().map(|p| p * (p + ENTROPY_EPS).ln()).sum::<f64>();
    let max_entropy = (n_bins as f64).ln();
    (((max_entropy - entropy) / max_entropy).clamp(0.0, 1.0), dist)
}

/// MI, MVL and PLV of an already band-limited phase/amplitude pair.
pub fn pac_metrics(phase_signal: &[f64], amp_signal: &[f64], n_bins: usize) -> (PacValues, PacProfile) {
    let n = phase_signal.len().min(amp_signal.len());
    if n == 0 {
        return (PacValues::default(), PacProfile::default());
    }
    let phase = instantaneous_phase(&phase_signal[..n]);
    let amp = envelope(&amp_signal[..n]);
    let amp_phase = instantaneous_phase(&amp);

    let (mi, distribution) = modulation_index(&phase, &amp, n_bins);

    let inv_n = 1.0 / n as f64;
    let mvl_vec = phase
        .iter()
        .zip(&amp)
        .map(|(&phi, &a)| Complex::from_polar(a, phi))
        .sum::<Complex<f64>>()
        * inv_n;
    let plv_vec = phase
        .iter()
        .zip(&amp_phase)
        .map(|(&phi, &psi)| Complex::from_polar(1.0, phi - psi))
        .sum::<Complex<f64>>()
        * inv_n;

    let bins = distribution.len();
    let width = 2.0 * PI / bins as f64;
    let profile = PacProfile {
        bin_centers: (0..bins).map(|i| -PI + (i as f64 + 0.5) * width).collect(),
        distribution,
        mvl_vector: (mvl_vec.re, mvl_vec.im),
        plv_vector: (plv_vec.re, plv_vec.im),
    };
    let values = PacValues {
        mi,
        mvl: mvl_vec.norm(),
        plv: plv_vec.norm().min(1.0),
    };
    (values, profile)
}

/// Phase and amplitude signals isolated with zero-phase Butterworth filters.
pub fn band_limit(
    phase_signal: &[f64],
    amp_signal: &[f64],
    sample_rate: f64,
    phase_band: &FrequencyBand,
    amp_band: &FrequencyBand,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let phase = SosFilter::for_band(sample_rate, phase_band)?.filtfilt(phase_signal);
    let amp = SosFilter::for_band(sample_rate, amp_band)?.filtfilt(amp_signal);
    Ok((phase, amp))
}

/// Window placement for sliding PAC: `(start, len)` pairs in samples.
///
/// `window = floor(duration·fs)`, `overlap = floor(window·ratio)` and
/// `count = floor((N - overlap) / (window - overlap))`. Windows that would
/// read past the end are dropped.
pub fn sliding_windows(len: usize, sample_rate: f64, duration: f64, overlap: f64) -> Vec<(usize, usize)> {
    let window = (duration * sample_rate).floor() as usize;
    let overlap_samples = (window as f64 * overlap).floor() as usize;
    if window == 0 || overlap_samples >= window || len < overlap_samples {
        return Vec::new();
    }
    let step = window - overlap_samples;
    let count = (len - overlap_samples) / step;
    (0..count)
        .map(|i| (i * step, window))
        .filter(|&(start, w)| start + w <= len)
        .collect()
}

/// PAC over consecutive windows of band-limited signals.
///
/// Window centers are `start_time + duration/2 + i·duration·(1 - overlap)`.
pub fn sliding_pac(
    phase_signal: &[f64],
    amp_signal: &[f64],
    sample_rate: f64,
    duration: f64,
    overlap: f64,
    n_bins: usize,
    start_time: f64,
) -> SlidingPac {
    let n = phase_signal.len().min(amp_signal.len());
    let step_seconds = duration * (1.0 - overlap);
    let mut out = SlidingPac::default();
    for (i, (start, len)) in sliding_windows(n, sample_rate, duration, overlap)
        .into_iter()
        .enumerate()
    {
        let range = start..start + len;
        let (values, _) = pac_metrics(&phase_signal[range.clone()], &amp_signal[range], n_bins);
        out.times
            .push(start_time + duration / 2.0 + i as f64 * step_seconds);
        out.mi.push(values.mi);
        out.mvl.push(values.mvl);
        out.plv.push(values.plv);
    }
    out
}

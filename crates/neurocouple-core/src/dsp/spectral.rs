//! Welch spectra, band power and spectrograms.

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::fourier::{SegmentFft, rfft_frequencies};
use super::window::{Symmetry, detrend_constant, hamming, hann};
use crate::types::FrequencyBand;

/// Segment length used when a signal is shorter than the requested window.
pub const FALLBACK_NPERSEG: usize = 1024;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One-sided power spectral density.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Bin frequencies in Hz.
    pub frequencies: Vec<f64>,
    /// Density in units²/Hz.
    pub power: Vec<f64>,
}

/// Per-band mean of a spectrum and its standard error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPower {
    pub means: Vec<f64>,
    pub sems: Vec<f64>,
}

/// Time-frequency power, `power[f][t]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrogram {
    pub frequencies: Vec<f64>,
    /// Frame centers in seconds, offset by the slice start.
    pub times: Vec<f64>,
    pub power: Vec<Vec<f64>>,
}

impl Spectrogram {
    /// Power in decibels; non-positive values become `-inf`.
    pub fn to_db(&self) -> Vec<Vec<f64>> {
        self.power
            .iter()
            .map(|row| row.iter().map(|p| 10.0 * p.log10()).collect())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Welch estimation
// ---------------------------------------------------------------------------

/// Segmenting parameters for Welch's method.
#[derive(Debug, Clone, PartialEq)]
pub struct WelchParams {
    pub window: Vec<f64>,
    pub noverlap: usize,
    pub nfft: usize,
}

impl WelchParams {
    /// Hamming window of `floor(fs / resolution)` samples with half overlap.
    pub fn for_resolution(sample_rate: f64, resolution: f64) -> Self {
        let nfft = ((sample_rate / resolution).floor() as usize).max(1);
        Self {
            window: hamming(nfft, Symmetry::Symmetric),
            noverlap: nfft / 2,
            nfft,
        }
    }

    /// 1024-sample Hann window with 512 overlap, shrunk to the signal when
    /// even that does not fit.
    pub fn fallback(len: usize) -> Self {
        let nperseg = FALLBACK_NPERSEG.min(len);
        Self {
            window: hann(nperseg, Symmetry::Symmetric),
            noverlap: nperseg / 2,
            nfft: FALLBACK_NPERSEG,
        }
    }
}

/// Welch averaged cross-spectral density `mean(conj(X)·Y)` with density
/// scaling and one-sided doubling. Inputs must be the same length and at
/// least one window long.
pub(crate) fn welch_cross(
    x: &[f64],
    y: &[f64],
    sample_rate: f64,
    params: &WelchParams,
) -> Vec<Complex<f64>> {
    let nperseg = params.window.len();
    let n = x.len().min(y.len());
    let bins = params.nfft / 2 + 1;
    if nperseg == 0 || n < nperseg {
        return vec![Complex::new(0.0, 0.0); bins];
    }
    let step = (nperseg - params.noverlap.min(nperseg - 1)).max(1);
    let segments = (n - nperseg) / step + 1;

    let win_energy: f64 = params.window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate * win_energy);

    let mut fft = SegmentFft::new(params.nfft);
    let mut acc = vec![Complex::new(0.0, 0.0); bins];
    let mut seg_x = vec![0.0; nperseg];
    let mut seg_y = vec![0.0; nperseg];
    let same = std::ptr::eq(x, y);

    for s in 0..segments {
        let start = s * step;
        seg_x.copy_from_slice(&x[start..start + nperseg]);
        detrend_constant(&mut seg_x);
        let fx: Vec<Complex<f64>> = fft.one_sided(&seg_x, &params.window).to_vec();
        if same {
            for (a, v) in acc.iter_mut().zip(&fx) {
                *a += Complex::new(v.norm_sqr(), 0.0);
            }
        } else {
            seg_y.copy_from_slice(&y[start..start + nperseg]);
            detrend_constant(&mut seg_y);
            let fy = fft.one_sided(&seg_y, &params.window);
            for ((a, vx), vy) in acc.iter_mut().zip(&fx).zip(fy) {
                *a += vx.conj() * vy;
            }
        }
    }

    let last = bins - 1;
    for (k, a) in acc.iter_mut().enumerate() {
        let doubled = k != 0 && !(params.nfft % 2 == 0 && k == last);
        let factor = if doubled { 2.0 } else { 1.0 };
        *a *= factor * scale / segments as f64;
    }
    acc
}

/// Welch power spectral density.
///
/// Signals shorter than `params.window` fall back to
/// [`WelchParams::fallback`]. An empty signal yields an empty spectrum.
pub fn welch_psd(signal: &[f64], sample_rate: f64, params: &WelchParams) -> Spectrum {
    if signal.is_empty() {
        return Spectrum::default();
    }
    let fallback;
    let params = if signal.len() < params.window.len() {
        log::debug!(
            "signal of {} samples shorter than {}-sample window, using fallback",
            signal.len(),
            params.window.len()
        );
        fallback = WelchParams::fallback(signal.len());
        &fallback
    } else {
        params
    };
    let power = welch_cross(signal, signal, sample_rate, params)
        .into_iter()
        .map(|c| c.re)
        .collect();
    Spectrum {
        frequencies: rfft_frequencies(params.nfft, sample_rate),
        power,
    }
}

/// Mean and standard error of the spectrum inside each band.
///
/// Frequencies are matched inclusively. One matching bin gives SEM 0 and no
/// matching bin gives `(0, 0)`.
pub fn band_power(spectrum: &Spectrum, bands: &[FrequencyBand]) -> BandPower {
    let mut means = Vec::with_capacity(bands.len());
    let mut sems = Vec::with_capacity(bands.len());
    for band in bands {
        let values: Vec<f64> = spectrum
            .frequencies
            .iter()
            .zip(&spectrum.power)
            .filter(|(f, _)| band.contains(**f))
            .map(|(_, p)| *p)
            .collect();
        let (mean, sem) = mean_and_sem(&values);
        means.push(mean);
        sems.push(sem);
    }
    BandPower { means, sems }
}

/// Mean and sample standard error (ddof 1), `(0, 0)` for no values.
pub(crate) fn mean_and_sem(values: &[f64]) -> (f64, f64) {
    match values.len() {
        0 => (0.0, 0.0),
        1 => (values[0], 0.0),
        n => {
            let mean = values.iter().mean();
            let sem = values.iter().std_dev() / (n as f64).sqrt();
            (mean, sem)
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrogram
// ---------------------------------------------------------------------------

/// Window length and overlap in samples for a spectrogram.
///
/// `window = round(fs / freq_res)`, `hop = round(fs * time_res)` and
/// `overlap = window - hop`, clamped to `window - 1` when negative or not
/// below the window.
pub fn spectrogram_params(sample_rate: f64, freq_res: f64, time_res: f64) -> (usize, usize) {
    let window = ((sample_rate / freq_res).round() as i64).max(1);
    let hop = (sample_rate * time_res).round() as i64;
    let overlap = window - hop;
    let overlap = if overlap < 0 || overlap >= window {
        window - 1
    } else {
        overlap
    };
    (window as usize, overlap as usize)
}

/// Short-time power spectral density with a Hamming window, restricted to
/// `range`. `offset` shifts the time axis, usually to the slice start.
pub fn spectrogram(
    signal: &[f64],
    sample_rate: f64,
    window_len: usize,
    overlap: usize,
    range: &FrequencyBand,
    offset: f64,
) -> Spectrogram {
    if window_len == 0 || signal.len() < window_len {
        return Spectrogram::default();
    }
    let window = hamming(window_len, Symmetry::Symmetric);
    let step = (window_len - overlap.min(window_len - 1)).max(1);
    let frames = (signal.len() - window_len) / step + 1;

    let win_energy: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate * win_energy);
    let all_freqs = rfft_frequencies(window_len, sample_rate);
    let keep: Vec<usize> = (0..all_freqs.len())
        .filter(|&k| range.contains(all_freqs[k]))
        .collect();
    let last = all_freqs.len() - 1;

    let mut fft = SegmentFft::new(window_len);
    let mut power = vec![Vec::with_capacity(frames); keep.len()];
    let mut times = Vec::with_capacity(frames);
    let mut seg = vec![0.0; window_len];
    for t in 0..frames {
        let start = t * step;
        seg.copy_from_slice(&signal[start..start + window_len]);
        detrend_constant(&mut seg);
        let spec = fft.one_sided(&seg, &window);
        for (row, &k) in power.iter_mut().zip(&keep) {
            let doubled = k != 0 && !(window_len % 2 == 0 && k == last);
            let factor = if doubled { 2.0 } else { 1.0 };
            row.push(spec[k].norm_sqr() * scale * factor);
        }
        times.push(offset + (start as f64 + window_len as f64 / 2.0) / sample_rate);
    }

    Spectrogram {
        frequencies: keep.iter().map(|&k| all_freqs[k]).collect(),
        times,
        power,
    }
}

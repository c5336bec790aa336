//! Magnitude-squared coherence between two channels, averaged over a slice
//! or resolved in time.

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use super::fourier::{SegmentFft, rfft_frequencies};
use super::spectral::{WelchParams, welch_cross};
use super::window::{Symmetry, detrend_constant, hann};

/// Guard added to the coheregram denominator.
const COHEREGRAM_EPS: f64 = 1e-15;

/// Frames averaged by the coheregram's moving-average smoother.
pub const SMOOTHING_FRAMES: usize = 5;

/// Coherence spectrum of one pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coherence {
    pub frequencies: Vec<f64>,
    /// Values in `[0, 1]`.
    pub values: Vec<f64>,
}

/// Time-resolved coherence, `values[f][t]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coheregram {
    pub frequencies: Vec<f64>,
    pub times: Vec<f64>,
    pub values: Vec<Vec<f64>>,
}

/// Samples per Welch segment for slice coherence: two seconds.
pub fn coherence_nperseg(sample_rate: f64) -> usize {
    (2.0 * sample_rate).round() as usize
}

/// Welch magnitude-squared coherence with 2-second periodic Hann segments
/// and half overlap.
///
/// Returns `None` when the signals are shorter than one segment. Bins where
/// either auto-spectrum vanishes are 0.
pub fn coherence(x: &[f64], y: &[f64], sample_rate: f64) -> Option<Coherence> {
    let nperseg = coherence_nperseg(sample_rate);
    let n = x.len().min(y.len());
    if nperseg == 0 || n < nperseg {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let params = WelchParams {
        window: hann(nperseg, Symmetry::Periodic),
        noverlap: nperseg / 2,
        nfft: nperseg,
    };
    let pxx = welch_cross(x, x, sample_rate, &params);
    let pyy = welch_cross(y, y, sample_rate, &params);
    let pxy = welch_cross(x, y, sample_rate, &params);

    let values = pxy
        .iter()
        .zip(pxx.iter().zip(&pyy))
        .map(|(cross, (a, b))| msc(cross.norm_sqr(), a.re * b.re))
        .collect();
    Some(Coherence {
        frequencies: rfft_frequencies(nperseg, sample_rate),
        values,
    })
}

fn msc(cross_sq: f64, denom: f64) -> f64 {
    if denom > 0.0 {
        (cross_sq / denom).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Segment length and overlap for a coheregram.
///
/// `nperseg = floor(fs / freq_res)` and `noverlap = nperseg - floor(fs *
/// time_res)`, set to `nperseg - 1` when not below `nperseg` and to 0 when
/// negative.
pub fn coheregram_params(sample_rate: f64, freq_res: f64, time_res: f64) -> (usize, usize) {
    let nperseg = ((sample_rate / freq_res).floor() as i64).max(1);
    let noverlap = nperseg - (sample_rate * time_res).floor() as i64;
    let noverlap = if noverlap >= nperseg {
        nperseg - 1
    } else {
        noverlap.max(0)
    };
    (nperseg as usize, noverlap as usize)
}

/// Centered moving average along time with truncated edges.
fn smooth_frames<T>(frames: &[T], width: usize) -> Vec<T>
where
    T: Copy + Default + std::ops::Add<Output = T> + std::ops::Div<f64, Output = T>,
{
    let half = width / 2;
    (0..frames.len())
        .map(|t| {
            let lo = t.saturating_sub(half);
            let hi = (t + half + 1).min(frames.len());
            let sum = frames[lo..hi].iter().fold(T::default(), |acc, &v| acc + v);
            sum / (hi - lo) as f64
        })
        .collect()
}

/// Coherence over time from smoothed short-time spectra.
///
/// Both signals are mean-removed, transformed with a periodic Hann STFT, and
/// their auto- and cross-spectra are smoothed over [`SMOOTHING_FRAMES`]
/// frames before `|Pxy|² / (Pxx·Pyy + ε)`. Frequencies above `max_freq` are
/// dropped; `offset` shifts the time axis.
pub fn coheregram(
    x: &[f64],
    y: &[f64],
    sample_rate: f64,
    freq_res: f64,
    time_res: f64,
    max_freq: f64,
    offset: f64,
) -> Coheregram {
    let (nperseg, noverlap) = coheregram_params(sample_rate, freq_res, time_res);
    let n = x.len().min(y.len());
    if n < nperseg {
        return Coheregram::default();
    }
    let mut x = x[..n].to_vec();
    let mut y = y[..n].to_vec();
    detrend_constant(&mut x);
    detrend_constant(&mut y);

    let window = hann(nperseg, Symmetry::Periodic);
    let step = nperseg - noverlap;
    let frames = (n - nperseg) / step + 1;
    let freqs = rfft_frequencies(nperseg, sample_rate);
    let keep = freqs.iter().take_while(|f| **f <= max_freq).count();

    let mut fft = SegmentFft::new(nperseg);
    // [f][t]
    let mut sxx = vec![Vec::with_capacity(frames); keep];
    let mut syy = vec![Vec::with_capacity(frames); keep];
    let mut sxy = vec![Vec::with_capacity(frames); keep];
    let mut times = Vec::with_capacity(frames);
    for t in 0..frames {
        let start = t * step;
        let fx: Vec<Complex<f64>> = fft.one_sided(&x[start..start + nperseg], &window)[..keep].to_vec();
        let fy = &fft.one_sided(&y[start..start + nperseg], &window)[..keep];
        for k in 0..keep {
            sxx[k].push(fx[k].norm_sqr());
            syy[k].push(fy[k].norm_sqr());
            sxy[k].push(fx[k] * fy[k].conj());
        }
        times.push(offset + (start as f64 + nperseg as f64 / 2.0) / sample_rate);
    }

    let values = (0..keep)
        .map(|k| {
            let pxx = smooth_frames(&sxx[k], SMOOTHING_FRAMES);
            let pyy = smooth_frames(&syy[k], SMOOTHING_FRAMES);
            let pxy = smooth_frames(&sxy[k], SMOOTHING_FRAMES);
            pxy.iter()
                .zip(pxx.iter().zip(&pyy))
                .map(|(c, (a, b))| (c.norm_sqr() / (a * b + COHEREGRAM_EPS)).clamp(0.0, 1.0))
                .collect()
        })
        .collect();

    Coheregram {
        frequencies: freqs[..keep].to_vec(),
        times,
        values,
    }
}

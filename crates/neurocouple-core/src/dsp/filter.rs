//! IIR filters applied forward and backward for zero phase distortion.
//!
//! Filters are cascades of second-order sections. Two designs are provided:
//! the standard second-order notch used for mains rejection and a
//! 4th-order Butterworth (bandpass, or lowpass when the band starts at 0)
//! used to isolate phase and amplitude bands.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use crate::error::{Error, Result};
use crate::types::FrequencyBand;

/// Butterworth prototype order used for band isolation.
pub const BUTTERWORTH_ORDER: usize = 4;

/// Mains frequency removed by [`notch_cascade`].
pub const MAINS_HZ: f64 = 50.0;

// ---------------------------------------------------------------------------
// Second-order sections
// ---------------------------------------------------------------------------

/// One second-order section, `a[0]` normalized to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct Biquad {
    /// Numerator coefficients [b0, b1, b2]
    pub b: [f64; 3],
    /// Denominator coefficients [1, a1, a2]
    pub a: [f64; 3],
}

impl Biquad {
    /// Second-order notch at `f0` Hz with quality factor `q`.
    #[must_use]
    pub fn notch(sample_rate: f64, f0: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * f0 / sample_rate;
        let bw = w0 / q;
        let beta = (bw / 2.0).tan();
        let gain = 1.0 / (1.0 + beta);
        let cos_w0 = w0.cos();
        Self {
            b: [gain, -2.0 * gain * cos_w0, gain],
            a: [1.0, -2.0 * gain * cos_w0, 2.0 * gain - 1.0],
        }
    }

    fn dc_gain(&self) -> f64 {
        let den = self.a.iter().sum::<f64>();
        if den.abs() < 1e-300 {
            return 0.0;
        }
        self.b.iter().sum::<f64>() / den
    }

    /// State for a unit step already in steady state.
    fn step_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        let z2 = self.b[2] - self.a[2] * y;
        let z1 = self.b[1] + self.b[2] - (self.a[1] + self.a[2]) * y;
        [z1, z2]
    }

    /// Transposed direct form II, state updated in place.
    #[inline]
    fn step(&self, x: f64, state: &mut [f64; 2]) -> f64 {
        let y = self.b[0] * x + state[0];
        state[0] = self.b[1] * x - self.a[1] * y + state[1];
        state[1] = self.b[2] * x - self.a[2] * y;
        y
    }
}

/// Cascade of second-order sections.
#[derive(Clone, Debug, PartialEq)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    #[must_use]
    pub fn new(sections: Vec<Biquad>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// 4th-order Butterworth bandpass, or lowpass at `band.high` when
    /// `band.low <= 0`.
    pub fn for_band(sample_rate: f64, band: &FrequencyBand) -> Result<Self> {
        if band.low <= 0.0 {
            Self::butter_lowpass(sample_rate, band.high)
        } else {
            Self::butter_bandpass(sample_rate, band.low, band.high)
        }
    }

    pub fn butter_lowpass(sample_rate: f64, cutoff: f64) -> Result<Self> {
        check_edges(sample_rate, 0.0, cutoff)?;
        let wc = prewarp(cutoff, sample_rate);

        let poles: Vec<Complex<f64>> = upper_prototype_poles(BUTTERWORTH_ORDER)
            .into_iter()
            .map(|p| p * wc)
            .collect();
        let gain = wc.powi(BUTTERWORTH_ORDER as i32);
        // Every analog zero sits at infinity and maps to z = -1.
        Ok(Self::from_analog(&poles, gain, 0, [1.0, 2.0, 1.0]))
    }

    pub fn butter_bandpass(sample_rate: f64, low: f64, high: f64) -> Result<Self> {
        check_edges(sample_rate, low, high)?;
        let wl = prewarp(low, sample_rate);
        let wh = prewarp(high, sample_rate);
        let bw = wh - wl;
        let w0_sq = wl * wh;

        let mut poles = Vec::with_capacity(BUTTERWORTH_ORDER);
        for p in upper_prototype_poles(BUTTERWORTH_ORDER) {
            let scaled = p * (bw / 2.0);
            let root = (scaled * scaled - w0_sq).sqrt();
            // Each prototype pole splits in two; keep the members of each
            // conjugate pair that lie in the upper half plane.
            for candidate in [scaled + root, scaled - root] {
                if candidate.im > 0.0 {
                    poles.push(candidate);
                } else {
                    poles.push(candidate.conj());
                }
            }
        }
        let gain = bw.powi(BUTTERWORTH_ORDER as i32);
        // Half the zeros at s = 0 (z = 1), half at infinity (z = -1).
        Ok(Self::from_analog(
            &poles,
            gain,
            BUTTERWORTH_ORDER,
            [1.0, 0.0, -1.0],
        ))
    }

    /// Bilinear-transform upper-half-plane analog poles into sections.
    ///
    /// `zeros_at_origin` analog zeros at s = 0 enter the overall gain; each
    /// section's numerator is `numerator` and the gain goes on the first one.
    fn from_analog(
        upper_poles: &[Complex<f64>],
        analog_gain: f64,
        zeros_at_origin: usize,
        numerator: [f64; 3],
    ) -> Self {
        // Analog frequencies are prewarped against a normalized rate of 2.
        let fs2: f64 = 4.0;
        let mut gain = analog_gain * fs2.powi(zeros_at_origin as i32);
        let mut sections = Vec::with_capacity(upper_poles.len());
        for &p in upper_poles {
            gain /= (Complex::new(fs2, 0.0) - p).norm_sqr();
            let z = (Complex::new(fs2, 0.0) + p) / (Complex::new(fs2, 0.0) - p);
            sections.push(Biquad {
                b: numerator,
                a: [1.0, -2.0 * z.re, z.norm_sqr()],
            });
        }
        if let Some(first) = sections.first_mut() {
            for c in first.b.iter_mut() {
                *c *= gain;
            }
        }
        Self { sections }
    }

    /// Single forward pass from the given initial states.
    fn run(&self, x: &[f64], mut states: Vec<[f64; 2]>) -> Vec<f64> {
        x.iter()
            .map(|&sample| {
                self.sections
                    .iter()
                    .zip(states.iter_mut())
                    .fold(sample, |acc, (section, state)| section.step(acc, state))
            })
            .collect()
    }

    /// Steady-state section states for a unit step at the cascade input.
    fn step_states(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let [z1, z2] = s.step_state();
                let state = [z1 * scale, z2 * scale];
                scale *= s.dc_gain();
                state
            })
            .collect()
    }

    /// Default edge padding: three times the cascade's coefficient count.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// The input is extended at both ends by odd reflection and each pass
    /// starts from the steady state of its first sample, which keeps edge
    /// transients small. Inputs shorter than the pad length use a shorter
    /// pad instead of failing.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n < 2 || self.sections.is_empty() {
            return x.to_vec();
        }
        let pad = self.pad_len().min(n - 1);
        let ext = odd_extend(x, pad);
        let unit = self.step_states();

        let scaled = |first: f64| -> Vec<[f64; 2]> {
            unit.iter().map(|s| [s[0] * first, s[1] * first]).collect()
        };

        let forward = self.run(&ext, scaled(ext[0]));
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let first = reversed[0];
        reversed = self.run(&reversed, scaled(first));
        reversed.reverse();
        reversed[pad..pad + n].to_vec()
    }
}

/// Analog frequency for a digital edge, against a normalized rate of 2.
fn prewarp(freq: f64, sample_rate: f64) -> f64 {
    let wn = 2.0 * freq / sample_rate;
    4.0 * (PI * wn / 2.0).tan()
}

fn check_edges(sample_rate: f64, low: f64, high: f64) -> Result<()> {
    let nyquist = sample_rate / 2.0;
    let reason = if !(sample_rate > 0.0) {
        "sampling rate must be positive"
    } else if !(low < high) {
        "low edge must be below high edge"
    } else if high >= nyquist {
        "high edge must be below Nyquist"
    } else if low < 0.0 {
        "edges must be non-negative"
    } else {
        return Ok(());
    };
    Err(Error::FilterDesign {
        low,
        high,
        fs: sample_rate,
        reason,
    })
}

/// Upper-half-plane poles of the unit-cutoff Butterworth prototype.
fn upper_prototype_poles(order: usize) -> Vec<Complex<f64>> {
    (0..order / 2)
        .map(|k| {
            let theta = PI * (2 * k + 1 + order) as f64 / (2 * order) as f64;
            Complex::from_polar(1.0, theta)
        })
        .collect()
}

fn odd_extend(x: &[f64], pad: usize) -> Vec<f64> {
    let n = x.len();
    let mut ext = Vec::with_capacity(n + 2 * pad);
    let first = x[0];
    let last = x[n - 1];
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));
    ext
}

// ---------------------------------------------------------------------------
// Mains rejection
// ---------------------------------------------------------------------------

/// Harmonics of the mains frequency removed for a given highest frequency of
/// interest: `50·i` for `i` in `1..=floor((max_freq - 1) / 50)`.
pub fn notch_frequencies(max_freq: f64) -> Vec<f64> {
    let count = ((max_freq - 1.0) / MAINS_HZ).floor();
    if count < 1.0 {
        return Vec::new();
    }
    (1..=count as usize).map(|i| MAINS_HZ * i as f64).collect()
}

/// Remove mains interference with a cascade of zero-phase notches.
///
/// Each harmonic `f0` uses `Q = f0 / 2`; harmonics at or above Nyquist are
/// skipped.
pub fn notch_cascade(signal: &[f64], sample_rate: f64, max_freq: f64) -> Vec<f64> {
    let mut out = signal.to_vec();
    for f0 in notch_frequencies(max_freq) {
        if f0 >= sample_rate / 2.0 {
            log::debug!("skipping {f0} Hz notch above Nyquist at {sample_rate} Hz");
            continue;
        }
        let notch = SosFilter::new(vec![Biquad::notch(sample_rate, f0, f0 / 2.0)]);
        out = notch.filtfilt(&out);
    }
    out
}

//! Modulation index over a grid of phase and amplitude frequencies.

use serde::{Deserialize, Serialize};

use super::coupling::modulation_index;
use super::filter::SosFilter;
use super::fourier::{envelope, instantaneous_phase};
use crate::config::FrequencyAxis;
use crate::parallel::parallel_map;
use crate::types::FrequencyBand;

/// Highest amplitude band edge as a fraction of Nyquist.
const NYQUIST_MARGIN: f64 = 0.99;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comodulogram {
    /// Phase band centers in Hz (columns).
    pub phase_frequencies: Vec<f64>,
    /// Amplitude band centers in Hz (rows).
    pub amplitude_frequencies: Vec<f64>,
    /// `mi[amp][phase]`; NaN where a band could not be filtered.
    pub mi: Vec<Vec<f64>>,
}

/// Phase band of width `2·step` centered on `center`. A band reaching 0 Hz
/// is filtered as a lowpass.
pub fn phase_band(center: f64, step: f64) -> FrequencyBand {
    FrequencyBand::new(center - step, center + step)
}

/// Amplitude band `[center - phase, center + phase]`, wide enough for the
/// sidebands a phase frequency puts on the carrier. The low edge stays at or
/// above the axis minimum and the high edge below Nyquist.
pub fn amplitude_band(center: f64, phase_center: f64, sample_rate: f64) -> FrequencyBand {
    let low = (center - phase_center).max(FrequencyAxis::MIN_START);
    let high = (center + phase_center).min(NYQUIST_MARGIN * sample_rate / 2.0);
    FrequencyBand::new(low, high)
}

/// Tort MI for every (amplitude, phase) pair of the two axes.
///
/// Phase columns are spread over `workers` threads.
pub fn comodulogram(
    phase_signal: &[f64],
    amp_signal: &[f64],
    sample_rate: f64,
    phase_axis: &FrequencyAxis,
    amp_axis: &FrequencyAxis,
    n_bins: usize,
    workers: usize,
) -> Comodulogram {
    let n = phase_signal.len().min(amp_signal.len());
    let (phase_signal, amp_signal) = (&phase_signal[..n], &amp_signal[..n]);
    let phase_frequencies = phase_axis.centers();
    let amplitude_frequencies = amp_axis.centers();

    let columns: Vec<Vec<f64>> = parallel_map(&phase_frequencies, workers, |&fp| {
        let phase = match SosFilter::for_band(sample_rate, &phase_band(fp, phase_axis.step)) {
            Ok(filter) => instantaneous_phase(&filter.filtfilt(phase_signal)),
            Err(err) => {
                log::debug!("comodulogram phase column {fp} Hz skipped: {err}");
                return vec![f64::NAN; amplitude_frequencies.len()];
            }
        };
        amplitude_frequencies
            .iter()
            .map(|&fa| {
                let band = amplitude_band(fa, fp, sample_rate);
                match SosFilter::for_band(sample_rate, &band) {
                    Ok(filter) => {
                        let amp = envelope(&filter.filtfilt(amp_signal));
                        modulation_index(&phase, &amp, n_bins).0
                    }
                    Err(_) => f64::NAN,
                }
            })
            .collect()
    });

    let mi = (0..amplitude_frequencies.len())
        .map(|a| columns.iter().map(|col| col[a]).collect())
        .collect();

    Comodulogram {
        phase_frequencies,
        amplitude_frequencies,
        mi,
    }
}

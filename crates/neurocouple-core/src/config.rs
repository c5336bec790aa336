//! Analysis configuration.
//!
//! [`AnalysisConfig`] carries every tunable parameter of a run. All fields
//! have defaults, and JSON files may name any subset of them:
//!
//! ```
//! use neurocouple_core::AnalysisConfig;
//!
//! let cfg: AnalysisConfig = serde_json::from_str(r#"{"normalize": true}"#).unwrap();
//! assert!(cfg.normalize);
//! assert_eq!(cfg.sampling_rate, 2000.0);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{BandSet, FrequencyBand};

/// Parameters shared by every metric family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sampling rate in Hz used when a channel has no usable time axis.
    ///
    /// Default: `2000.0`.
    pub sampling_rate: f64,

    /// Highest frequency of interest in Hz. Sets the number of 50 Hz mains
    /// harmonics removed by the notch cascade.
    ///
    /// Default: `100.0`.
    pub max_frequency: f64,

    /// Apply the mains notch cascade before any metric.
    ///
    /// Default: `true`.
    pub notch: bool,

    /// Z-score each channel after notch filtering (PSD only).
    ///
    /// Default: `false`.
    pub normalize: bool,

    /// Welch frequency resolution in Hz; the segment length is
    /// `floor(fs / frequency_resolution)` samples.
    ///
    /// Default: `0.25`.
    pub frequency_resolution: f64,

    /// Edges of the six canonical bands.
    pub bands: BandSet,

    pub spectrogram: SpectrogramConfig,
    pub pac: PacConfig,
    pub coherence: CoherenceConfig,
    pub comodulogram: ComodulogramConfig,

    /// Worker threads for per-slice jobs. `0` uses the available parallelism.
    ///
    /// Default: `0`.
    pub workers: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 2000.0,
            max_frequency: 100.0,
            notch: true,
            normalize: false,
            frequency_resolution: 0.25,
            bands: BandSet::default(),
            spectrogram: SpectrogramConfig::default(),
            pac: PacConfig::default(),
            coherence: CoherenceConfig::default(),
            comodulogram: ComodulogramConfig::default(),
            workers: 0,
        }
    }
}

/// Optional per-slice spectrogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    pub enabled: bool,
    /// Frequency resolution in Hz (`window = round(fs / freq_resolution)`).
    pub freq_resolution: f64,
    /// Hop between frames in seconds.
    pub time_resolution: f64,
    /// Frequency range kept in the output.
    pub range: FrequencyBand,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            freq_resolution: 1.0,
            time_resolution: 0.25,
            range: FrequencyBand::new(0.0, 100.0),
        }
    }
}

/// Phase-amplitude coupling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacConfig {
    /// Bands whose instantaneous phase is tested. Default: `4 10`.
    pub phase_bands: Vec<FrequencyBand>,
    /// Bands whose amplitude envelope is tested. Default: `30 55; 55 100`.
    pub amplitude_bands: Vec<FrequencyBand>,
    /// Phase bins for the modulation index. Default: `18`.
    pub n_bins: usize,
    /// Take phase and amplitude from configured channel pairs instead of
    /// from the same channel.
    pub cross_channel: bool,
    pub sliding: SlidingConfig,
}

impl Default for PacConfig {
    fn default() -> Self {
        Self {
            phase_bands: vec![FrequencyBand::new(4.0, 10.0)],
            amplitude_bands: vec![
                FrequencyBand::new(30.0, 55.0),
                FrequencyBand::new(55.0, 100.0),
            ],
            n_bins: 18,
            cross_channel: false,
            sliding: SlidingConfig::default(),
        }
    }
}

impl PacConfig {
    /// Replace both band lists from UI-style range text such as `"4 10"` and
    /// `"30 55; 55 100"`.
    pub fn with_band_text(mut self, phase: &str, amplitude: &str) -> Result<Self> {
        self.phase_bands = parse_bands(phase, "pac.phase_bands")?;
        self.amplitude_bands = parse_bands(amplitude, "pac.amplitude_bands")?;
        Ok(self)
    }
}

/// Sliding-window PAC inside each slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlidingConfig {
    pub enabled: bool,
    /// Window length in seconds. Default: `10.0`.
    pub duration: f64,
    /// Fraction of a window shared with the next one, in `[0, 1)`.
    /// Default: `0.5`.
    pub overlap: f64,
}

impl Default for SlidingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: 10.0,
            overlap: 0.5,
        }
    }
}

/// Coherence and coheregram settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceConfig {
    /// Also compute the time-resolved coherence surface.
    pub coheregram: bool,
    /// Coheregram hop in seconds. Default: `1.0`.
    pub time_resolution: f64,
    /// Coheregram frequency resolution in Hz. Default: `1.0`.
    pub freq_resolution: f64,
    /// Highest coheregram frequency kept. Default: `100.0`.
    pub max_frequency: f64,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            coheregram: false,
            time_resolution: 1.0,
            freq_resolution: 1.0,
            max_frequency: 100.0,
        }
    }
}

/// One comodulogram frequency axis, expanded like `arange(start, end, step)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyAxis {
    pub start: f64,
    pub step: f64,
    pub end: f64,
}

impl FrequencyAxis {
    /// Lowest center used when `start` is not positive.
    pub const MIN_START: f64 = 0.1;

    pub fn centers(&self) -> Vec<f64> {
        let start = if self.start <= 0.0 {
            Self::MIN_START
        } else {
            self.start
        };
        if self.step <= 0.0 || self.end <= start {
            return Vec::new();
        }
        let count = ((self.end - start) / self.step).ceil() as usize;
        (0..count).map(|i| start + i as f64 * self.step).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComodulogramConfig {
    pub phase_axis: FrequencyAxis,
    pub amplitude_axis: FrequencyAxis,
}

impl Default for ComodulogramConfig {
    fn default() -> Self {
        let axis = FrequencyAxis {
            start: 0.0,
            step: 2.0,
            end: 100.0,
        };
        Self {
            phase_axis: axis,
            amplitude_axis: axis,
        }
    }
}

impl AnalysisConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings no metric can run with.
    pub fn validate(&self) -> Result<()> {
        positive(self.sampling_rate, "sampling_rate")?;
        positive(self.max_frequency, "max_frequency")?;
        positive(self.frequency_resolution, "frequency_resolution")?;
        for band in self.bands.to_array() {
            ordered(&band, "bands")?;
        }
        if self.spectrogram.enabled {
            positive(self.spectrogram.freq_resolution, "spectrogram.freq_resolution")?;
            positive(self.spectrogram.time_resolution, "spectrogram.time_resolution")?;
            ordered(&self.spectrogram.range, "spectrogram.range")?;
        }

        if self.pac.phase_bands.is_empty() || self.pac.amplitude_bands.is_empty() {
            return Err(Error::config("pac", "at least one phase and one amplitude band"));
        }
        for band in self.pac.phase_bands.iter().chain(&self.pac.amplitude_bands) {
            ordered(band, "pac bands")?;
        }
        if self.pac.n_bins < 2 {
            return Err(Error::config("pac.n_bins", "need at least 2 phase bins"));
        }
        if self.pac.sliding.enabled {
            positive(self.pac.sliding.duration, "pac.sliding.duration")?;
            let overlap = self.pac.sliding.overlap;
            if !(0.0..1.0).contains(&overlap) {
                return Err(Error::config(
                    "pac.sliding.overlap",
                    format!("{overlap} is outside [0, 1)"),
                ));
            }
        }

        if self.coherence.coheregram {
            positive(self.coherence.time_resolution, "coherence.time_resolution")?;
            positive(self.coherence.freq_resolution, "coherence.freq_resolution")?;
            positive(self.coherence.max_frequency, "coherence.max_frequency")?;
        }
        positive(self.comodulogram.phase_axis.step, "comodulogram.phase_axis.step")?;
        positive(
            self.comodulogram.amplitude_axis.step,
            "comodulogram.amplitude_axis.step",
        )?;
        Ok(())
    }

    /// Worker count with `0` resolved to the machine's parallelism.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

fn positive(value: f64, field: &str) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::config(field, format!("{value} must be a positive number")))
    }
}

fn ordered(band: &FrequencyBand, field: &str) -> Result<()> {
    if band.low.is_finite() && band.high.is_finite() && band.low >= 0.0 && band.low < band.high {
        Ok(())
    } else {
        Err(Error::config(
            field,
            format!("band {}-{} needs 0 <= low < high", band.low, band.high),
        ))
    }
}

// ---------------------------------------------------------------------------
// Range text
// ---------------------------------------------------------------------------

/// Parse range text such as `"10 20; 30 40"` into `(start, end)` pairs.
///
/// Pairs are separated by `;`, numbers within a pair by whitespace. Every
/// pair must hold exactly two numbers with `start < end`. Empty pairs (for
/// example a trailing `;`) are ignored.
pub fn parse_ranges(text: &str) -> Result<Vec<(f64, f64)>> {
    let mut ranges = Vec::new();
    for part in text.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let numbers = part
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|_| Error::config(text, format!("'{tok}' is not a number")))
            })
            .collect::<Result<Vec<f64>>>()?;
        let &[start, end] = numbers.as_slice() else {
            return Err(Error::config(
                text,
                format!("'{part}' must hold exactly two numbers"),
            ));
        };
        if !(start.is_finite() && end.is_finite()) || start >= end {
            return Err(Error::config(
                text,
                format!("start {start} must be below end {end}"),
            ));
        }
        ranges.push((start, end));
    }
    if ranges.is_empty() {
        return Err(Error::config(text, "no ranges given"));
    }
    Ok(ranges)
}

fn parse_bands(text: &str, field: &str) -> Result<Vec<FrequencyBand>> {
    let bands: Vec<FrequencyBand> = parse_ranges(text)?
        .into_iter()
        .map(|(low, high)| FrequencyBand::new(low, high))
        .collect();
    for band in &bands {
        ordered(band, field)?;
    }
    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = AnalysisConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pac.n_bins, 18);
        assert_eq!(cfg.pac.amplitude_bands.len(), 2);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: AnalysisConfig =
            serde_json::from_str(r#"{"pac": {"n_bins": 12}, "workers": 2}"#).unwrap();
        assert_eq!(cfg.pac.n_bins, 12);
        assert_eq!(cfg.pac.phase_bands, vec![FrequencyBand::new(4.0, 10.0)]);
        assert_eq!(cfg.worker_count(), 2);
        assert_eq!(cfg.frequency_resolution, 0.25);
    }

    #[test]
    fn parse_ranges_accepts_pairs() {
        let ranges = parse_ranges("10 20; 30 40").unwrap();
        assert_eq!(ranges, vec![(10.0, 20.0), (30.0, 40.0)]);
        let ranges = parse_ranges("  0.5   2.5 ;").unwrap();
        assert_eq!(ranges, vec![(0.5, 2.5)]);
    }

    #[test]
    fn parse_ranges_rejects_bad_pairs() {
        assert!(parse_ranges("10").is_err());
        assert!(parse_ranges("10 20 30").is_err());
        assert!(parse_ranges("20 10").is_err());
        assert!(parse_ranges("5 5").is_err());
        assert!(parse_ranges("a b").is_err());
        assert!(parse_ranges("").is_err());
        assert!(matches!(parse_ranges("1 2; 3"), Err(Error::Config { .. })));
    }

    #[test]
    fn band_text_replaces_lists() {
        let pac = PacConfig::default()
            .with_band_text("2 4; 4 8", "60 90")
            .unwrap();
        assert_eq!(pac.phase_bands.len(), 2);
        assert_eq!(pac.amplitude_bands, vec![FrequencyBand::new(60.0, 90.0)]);
        assert!(PacConfig::default().with_band_text("-2 4", "60 90").is_err());
    }

    #[test]
    fn validate_rejects_bad_sliding_overlap() {
        let mut cfg = AnalysisConfig::default();
        cfg.pac.sliding.enabled = true;
        cfg.pac.sliding.overlap = 1.0;
        assert!(cfg.validate().is_err());
        cfg.pac.sliding.overlap = 0.75;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_band() {
        let mut cfg = AnalysisConfig::default();
        cfg.bands.alpha = FrequencyBand::new(14.0, 10.0);
        assert!(matches!(cfg.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn axis_centers_floor_start() {
        let axis = FrequencyAxis {
            start: 0.0,
            step: 2.0,
            end: 6.0,
        };
        let centers = axis.centers();
        assert_eq!(centers.len(), 3);
        assert!((centers[0] - 0.1).abs() < 1e-12);
        assert!((centers[2] - 4.1).abs() < 1e-12);
        let axis = FrequencyAxis {
            start: 2.0,
            step: 2.0,
            end: 8.0,
        };
        assert_eq!(axis.centers(), vec![2.0, 4.0, 6.0]);
    }
}

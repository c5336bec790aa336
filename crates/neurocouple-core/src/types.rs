//! Time slices, frequency bands and the labels used to key results.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Time slices
// ---------------------------------------------------------------------------

/// A user-selected analysis window in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSlice {
    pub start: f64,
    pub end: f64,
}

impl TimeSlice {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Canonical label, e.g. `10-20s` or `2.5-7.5s`.
    pub fn label(&self) -> String {
        format!("{}-{}s", self.start, self.end)
    }

    /// Parse a label produced by [`TimeSlice::label`].
    pub fn parse_label(label: &str) -> Option<Self> {
        let body = label.trim().strip_suffix('s')?;
        // Skip the first char so a leading minus sign is not taken as the separator.
        let split = body.char_indices().skip(1).find(|&(_, c)| c == '-')?.0;
        let start = body[..split].parse::<f64>().ok()?;
        let end = body[split + 1..].parse::<f64>().ok()?;
        Some(Self { start, end })
    }

    /// Sample index range `[floor(start*fs), floor(end*fs))` clamped to `len`.
    ///
    /// Returns `None` for windows that start before zero or select no samples.
    pub fn sample_range(&self, fs: f64, len: usize) -> Option<std::ops::Range<usize>> {
        if self.start < 0.0 || !self.start.is_finite() || !self.end.is_finite() {
            return None;
        }
        let start = ((self.start * fs).floor() as usize).min(len);
        let end = ((self.end * fs).floor() as usize).min(len);
        if end <= start {
            return None;
        }
        Some(start..end)
    }
}

impl fmt::Display for TimeSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Weight of a slice for duration-weighted means: its duration when the
/// label parses to a positive span, 1 otherwise.
///
/// This is the requested duration from the label. A slice that runs past the
/// end of its recording is analyzed on the clamped [`TimeSlice::sample_range`]
/// but still weighs its full requested span.
pub fn slice_weight(label: &str) -> f64 {
    match TimeSlice::parse_label(label) {
        Some(slice) if slice.duration() > 0.0 => slice.duration(),
        _ => 1.0,
    }
}

// ---------------------------------------------------------------------------
// Frequency bands
// ---------------------------------------------------------------------------

/// A frequency band `[low, high]` in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low: f64,
    pub high: f64,
}

impl FrequencyBand {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Inclusive membership test.
    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low && freq <= self.high
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.low, self.high)
    }
}

/// Names of the six canonical spectral bands, in order.
pub const BAND_NAMES: [&str; 6] = ["Delta", "Theta", "Alpha", "Beta", "Low-Gamma", "High-Gamma"];

/// The six canonical bands with user-adjustable edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSet {
    pub delta: FrequencyBand,
    pub theta: FrequencyBand,
    pub alpha: FrequencyBand,
    pub beta: FrequencyBand,
    pub low_gamma: FrequencyBand,
    pub high_gamma: FrequencyBand,
}

impl Default for BandSet {
    fn default() -> Self {
        Self {
            delta: FrequencyBand::new(1.0, 4.0),
            theta: FrequencyBand::new(4.0, 10.0),
            alpha: FrequencyBand::new(10.0, 14.0),
            beta: FrequencyBand::new(14.0, 30.0),
            low_gamma: FrequencyBand::new(30.0, 55.0),
            high_gamma: FrequencyBand::new(55.0, 100.0),
        }
    }
}

impl BandSet {
    /// Bands in canonical order, matching [`BAND_NAMES`].
    pub fn to_array(&self) -> [FrequencyBand; 6] {
        [
            self.delta,
            self.theta,
            self.alpha,
            self.beta,
            self.low_gamma,
            self.high_gamma,
        ]
    }
}

/// Label for one phase/amplitude band combination.
pub fn pac_band_label(phase: &FrequencyBand, amp: &FrequencyBand) -> String {
    format!(
        "Phase_{}-{}_Amp_{}-{}",
        phase.low, phase.high, amp.low, amp.high
    )
}

// ---------------------------------------------------------------------------
// Channel names
// ---------------------------------------------------------------------------

/// Trailing `Ch<digits>` of a channel name, or the whole name.
///
/// Equivalent to matching `Ch\d+$` and keeping the match.
///
/// Container formats often prefix channels with device paths; reports only
/// need the short identifier.
pub fn short_channel_name(name: &str) -> &str {
    let digits = name
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return name;
    }
    let prefix_end = name.len() - digits;
    if prefix_end >= 2 && name.get(prefix_end - 2..prefix_end) == Some("Ch") {
        &name[prefix_end - 2..]
    } else {
        name
    }
}

/// Unit name for a cross-channel PAC pair.
pub fn pac_pair_name(phase_channel: &str, amp_channel: &str) -> String {
    format!(
        "Phase({})_Amp({})",
        short_channel_name(phase_channel),
        short_channel_name(amp_channel)
    )
}

/// Unit name for a coherence pair.
pub fn coherence_pair_name(first: &str, second: &str) -> String {
    format!(
        "{} vs {}",
        short_channel_name(first),
        short_channel_name(second)
    )
}

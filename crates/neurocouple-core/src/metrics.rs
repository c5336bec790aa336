//! Per-slice metric results stored at the leaves of a [`ResultTree`].
//!
//! Every leaf exposes its summary numbers as named components so the
//! aggregation engine and the row exporter can treat all families alike.
//!
//! [`ResultTree`]: crate::tree::ResultTree

use serde::{Deserialize, Serialize};

use crate::dsp::coherence::{Coherence, Coheregram};
use crate::dsp::comodulogram::Comodulogram;
use crate::dsp::coupling::{PacValues, SlidingPac};
use crate::dsp::spectral::{BandPower, Spectrogram, Spectrum};
use crate::types::{BAND_NAMES, slice_weight};

/// The four metric families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Psd,
    Pac,
    Coherence,
    Comodulogram,
}

impl MetricFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Psd => "psd",
            Self::Pac => "pac",
            Self::Coherence => "coherence",
            Self::Comodulogram => "comodulogram",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "psd" => Some(Self::Psd),
            "pac" => Some(Self::Pac),
            "coherence" | "coh" => Some(Self::Coherence),
            "comodulogram" | "comod" => Some(Self::Comodulogram),
            _ => None,
        }
    }

    /// How slices are weighted when averaged into their unit.
    pub fn weighting(self) -> Weighting {
        match self {
            Self::Psd => Weighting::SliceDuration,
            _ => Weighting::Uniform,
        }
    }

    /// Whether component values are powers that also read well in dB.
    pub fn reports_db(self) -> bool {
        matches!(self, Self::Psd)
    }
}

/// Weight of one slice in a slice→unit mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    Uniform,
    /// Slice duration parsed from its label, 1 when unparsable.
    SliceDuration,
}

impl Weighting {
    pub fn weight(self, slice_label: &str) -> f64 {
        match self {
            Self::Uniform => 1.0,
            Self::SliceDuration => slice_weight(slice_label),
        }
    }
}

/// A leaf value the aggregation engine can summarize.
pub trait Metric {
    /// Component names, in the order of [`Metric::values`].
    fn component_names(&self) -> Vec<String>;

    fn values(&self) -> Vec<f64>;

    /// Per-component standard errors, when the leaf carries its own.
    fn sems(&self) -> Option<Vec<f64>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

fn band_names() -> Vec<String> {
    BAND_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Spectral power of one channel slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdMetric {
    pub spectrum: Spectrum,
    pub bands: BandPower,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectrogram: Option<Spectrogram>,
}

impl Metric for PsdMetric {
    fn component_names(&self) -> Vec<String> {
        band_names()
    }

    fn values(&self) -> Vec<f64> {
        self.bands.means.clone()
    }

    fn sems(&self) -> Option<Vec<f64>> {
        Some(self.bands.sems.clone())
    }
}

/// Coupling of one phase/amplitude band pair in one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacMetric {
    #[serde(flatten)]
    pub values: PacValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sliding: Option<SlidingPac>,
}

impl Metric for PacMetric {
    fn component_names(&self) -> Vec<String> {
        vec!["MI".into(), "MVL".into(), "PLV".into()]
    }

    fn values(&self) -> Vec<f64> {
        vec![self.values.mi, self.values.mvl, self.values.plv]
    }
}

/// Coherence of one channel pair in one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceMetric {
    pub coherence: Coherence,
    pub bands: BandPower,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coheregram: Option<Coheregram>,
}

impl Metric for CoherenceMetric {
    fn component_names(&self) -> Vec<String> {
        band_names()
    }

    fn values(&self) -> Vec<f64> {
        self.bands.means.clone()
    }

    fn sems(&self) -> Option<Vec<f64>> {
        Some(self.bands.sems.clone())
    }
}

/// Comodulogram of one channel slice; components are the matrix cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComodulogramMetric {
    #[serde(flatten)]
    pub comodulogram: Comodulogram,
}

impl Metric for ComodulogramMetric {
    fn component_names(&self) -> Vec<String> {
        let c = &self.comodulogram;
        c.amplitude_frequencies
            .iter()
            .flat_map(|fa| {
                c.phase_frequencies
                    .iter()
                    .map(move |fp| format!("Amp_{fa}_Phase_{fp}"))
            })
            .collect()
    }

    fn values(&self) -> Vec<f64> {
        self.comodulogram.mi.iter().flatten().copied().collect()
    }
}

/// A leaf rebuilt from exported rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMetric {
    pub names: Vec<String>,
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sems: Option<Vec<f64>>,
}

impl Metric for RowMetric {
    fn component_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn values(&self) -> Vec<f64> {
        self.values.clone()
    }

    fn sems(&self) -> Option<Vec<f64>> {
        self.sems.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_names_roundtrip() {
        for family in [
            MetricFamily::Psd,
            MetricFamily::Pac,
            MetricFamily::Coherence,
            MetricFamily::Comodulogram,
        ] {
            assert_eq!(MetricFamily::parse(family.as_str()), Some(family));
        }
        assert_eq!(MetricFamily::parse("COH"), Some(MetricFamily::Coherence));
        assert_eq!(MetricFamily::parse("erp"), None);
    }

    #[test]
    fn only_psd_is_duration_weighted() {
        assert_eq!(MetricFamily::Psd.weighting().weight("10-40s"), 30.0);
        assert_eq!(MetricFamily::Pac.weighting().weight("10-40s"), 1.0);
    }

    #[test]
    fn comodulogram_components_are_row_major() {
        let metric = ComodulogramMetric {
            comodulogram: Comodulogram {
                phase_frequencies: vec![4.0, 6.0],
                amplitude_frequencies: vec![40.0],
                mi: vec![vec![0.1, 0.2]],
            },
        };
        assert_eq!(metric.component_names(), vec!["Amp_40_Phase_4", "Amp_40_Phase_6"]);
        assert_eq!(metric.values(), vec![0.1, 0.2]);
        assert!(metric.sems().is_none());
    }

    #[test]
    fn pac_components() {
        let metric = PacMetric {
            values: PacValues {
                mi: 0.5,
                mvl: 0.2,
                plv: 0.3,
            },
            sliding: None,
        };
        assert_eq!(metric.values(), vec![0.5, 0.2, 0.3]);
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["mi"], 0.5);
    }
}

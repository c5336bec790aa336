//! # neurocouple-core
//!
//! **Spectral power, cross-frequency coupling and synchrony for multichannel
//! biosignals, rolled up into mean ± SEM at every level of a study.**
//!
//! `neurocouple-core` turns raw channel samples into per-slice metrics (Welch
//! PSD and band power, phase-amplitude coupling, coherence, comodulograms),
//! stores them in a typed Result Tree and aggregates that tree
//! slice → unit → file → grand.
//!
//! ## Quick Start
//!
//! ```no_run
//! use neurocouple_core::{AnalysisConfig, Analyzer, JsonRecordingLoader, RecordingCache, Report, Selection};
//!
//! let config = AnalysisConfig::default();
//! let cache = RecordingCache::new(JsonRecordingLoader, config.sampling_rate);
//!
//! let mut selection = Selection::new();
//! selection.add_ranges("session1.json", "Ch1", "0 10; 10 40").unwrap();
//!
//! let run = Analyzer::new(&config, &cache).psd(&selection);
//! let theta = &run.tree.grand["all"];
//! println!("theta {} ± {}", theta.mean[1], theta.sem[1]);
//!
//! let report = Report::from_run(&run).unwrap();
//! println!("{}", report.to_json_pretty().unwrap());
//! ```
//!
//! ## Architecture
//!
//! Recording → notch (+ z-score) → slices → metric → Result Tree → aggregation → report
//!
//! - [`dsp`]: filters, spectra, coupling and coherence. Pure functions.
//! - [`pipeline`]: the [`Analyzer`] runs one metric family over a
//!   [`Selection`], one file at a time, with per-slice jobs on a bounded
//!   worker pool.
//! - [`tree`] and [`aggregate`]: the Result Tree and its mean/SEM rollup.
//! - [`report`]: sanitized JSON and CSV output.
//!
//! Files that cannot be loaded or analyzed are excluded and listed in
//! [`Run::failures`]; they never abort a run.

pub mod aggregate;
pub mod config;
pub mod dsp;
pub mod error;
pub mod metrics;
pub mod parallel;
pub mod pipeline;
pub mod recording;
pub mod report;
pub mod tree;
pub mod types;

pub use aggregate::{Aggregate, Observation, SemPolicy, combine};
pub use config::{
    AnalysisConfig, CoherenceConfig, ComodulogramConfig, FrequencyAxis, PacConfig,
    SlidingConfig, SpectrogramConfig, parse_ranges,
};
pub use error::{Error, Result};
pub use metrics::{
    CoherenceMetric, ComodulogramMetric, Metric, MetricFamily, PacMetric, PsdMetric, RowMetric,
    Weighting,
};
pub use pipeline::{Analyzer, FileFailure, Run, Selection};
pub use recording::{
    Channel, JsonRecordingLoader, RawChannel, Recording, RecordingCache, RecordingLoader,
    derive_sampling_rate,
};
pub use report::{Report, SummaryReport, write_rows_csv, write_summary_csv};
pub use tree::{ALL_BANDS, ResultTree, Row};
pub use types::{BAND_NAMES, BandSet, FrequencyBand, TimeSlice};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Orchestration: selections in, aggregated Result Trees out.
//!
//! For each file the [`Analyzer`] loads the recording through the cache,
//! notch-filters the channels it needs, cuts the selected slices and runs the
//! per-slice metric on the worker pool. A file that cannot be loaded, names an
//! unknown channel or asks for an impossible filter is logged, recorded in
//! [`Run::failures`] and left out of the tree.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, parse_ranges};
use crate::dsp::coherence::{coherence, coheregram};
use crate::dsp::comodulogram::comodulogram;
use crate::dsp::coupling::{band_limit, pac_metrics, sliding_pac};
use crate::dsp::filter::notch_cascade;
use crate::dsp::spectral::{Spectrum, WelchParams, band_power, spectrogram, spectrogram_params, welch_psd};
use crate::dsp::window::zscore;
use crate::error::Result;
use crate::metrics::{
    CoherenceMetric, ComodulogramMetric, Metric, MetricFamily, PacMetric, PsdMetric,
};
use crate::parallel::parallel_map;
use crate::recording::{Recording, RecordingCache, RecordingLoader};
use crate::tree::{ALL_BANDS, ResultTree};
use crate::types::{TimeSlice, coherence_pair_name, pac_band_label, pac_pair_name};

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// What to analyze: slices per channel, and channel pairs per file.
///
/// Pairs take their slices from their first (source) channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    /// file → channel → slices
    pub channels: BTreeMap<String, BTreeMap<String, Vec<TimeSlice>>>,
    /// file → `(source, paired)` channel pairs
    pub pairs: BTreeMap<String, Vec<(String, String)>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_slices(&mut self, file: &str, channel: &str, slices: impl IntoIterator<Item = TimeSlice>) {
        self.channels
            .entry(file.to_string())
            .or_default()
            .entry(channel.to_string())
            .or_default()
            .extend(slices);
    }

    /// Add slices from range text such as `"0 10; 10 40"`.
    pub fn add_ranges(&mut self, file: &str, channel: &str, text: &str) -> Result<()> {
        let slices = parse_ranges(text)?
            .into_iter()
            .map(|(start, end)| TimeSlice::new(start, end));
        self.add_slices(file, channel, slices);
        Ok(())
    }

    pub fn add_pair(&mut self, file: &str, source: &str, paired: &str) {
        self.pairs
            .entry(file.to_string())
            .or_default()
            .push((source.to_string(), paired.to_string()));
    }

    /// Every file named by either map.
    pub fn files(&self) -> BTreeSet<&str> {
        self.channels
            .keys()
            .chain(self.pairs.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn slices(&self, file: &str, channel: &str) -> &[TimeSlice] {
        self.channels
            .get(file)
            .and_then(|channels| channels.get(channel))
            .map_or(&[], Vec::as_slice)
    }

    /// One job per (channel, slice) of `file`.
    fn channel_jobs(&self, file: &str) -> Vec<Job<'_>> {
        let Some(channels) = self.channels.get(file) else {
            return Vec::new();
        };
        channels
            .iter()
            .flat_map(|(channel, slices)| {
                slices.iter().map(move |&slice| Job {
                    unit: channel.clone(),
                    first: channel,
                    second: channel,
                    slice,
                })
            })
            .collect()
    }

    /// One job per (pair, slice of the source channel) of `file`.
    fn pair_jobs(&self, file: &str, unit_name: fn(&str, &str) -> String) -> Vec<Job<'_>> {
        let Some(pairs) = self.pairs.get(file) else {
            return Vec::new();
        };
        let mut jobs = Vec::new();
        for (source, paired) in pairs {
            let slices = self.slices(file, source);
            if slices.is_empty() {
                log::warn!("{file}: pair {source}/{paired} has no slices selected on {source}");
            }
            jobs.extend(slices.iter().map(|&slice| Job {
                unit: unit_name(source, paired),
                first: source,
                second: paired,
                slice,
            }));
        }
        jobs
    }
}

/// One unit of per-slice work. Single-channel jobs use the same channel for
/// `first` and `second`.
#[derive(Debug, Clone)]
struct Job<'s> {
    unit: String,
    first: &'s str,
    second: &'s str,
    slice: TimeSlice,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// A file excluded from a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub reason: String,
}

/// The aggregated tree of one metric family plus the files left out of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run<M> {
    pub tree: ResultTree<M>,
    pub failures: Vec<FileFailure>,
}

/// A leaf produced by a job, not yet in the tree.
struct Leaf<M> {
    unit: String,
    band: String,
    slice: String,
    metric: M,
}

/// A channel after pre-processing.
struct Prepared {
    sample_rate: f64,
    signal: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Runs metric families over a [`Selection`].
pub struct Analyzer<'a, L> {
    config: &'a AnalysisConfig,
    cache: &'a RecordingCache<L>,
}

impl<'a, L: RecordingLoader> Analyzer<'a, L> {
    pub fn new(config: &'a AnalysisConfig, cache: &'a RecordingCache<L>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.config
    }

    /// Welch PSD and band power per (channel, slice).
    pub fn psd(&self, selection: &Selection) -> Run<PsdMetric> {
        self.run(MetricFamily::Psd, selection, |rec| {
            let jobs = selection.channel_jobs(&rec.file);
            let prepared = self.prepare(rec, &jobs, self.config.normalize)?;
            let leaves = parallel_map(&jobs, self.config.worker_count(), |job| {
                let (fs, segment, _) = cut(&prepared, job, &rec.file)?;
                Some(Leaf {
                    unit: job.unit.clone(),
                    band: ALL_BANDS.to_string(),
                    slice: job.slice.label(),
                    metric: self.psd_metric(segment, fs, &job.slice),
                })
            });
            Ok(leaves.into_iter().flatten().collect())
        })
    }

    /// MI/MVL/PLV per (unit, phase band × amplitude band, slice).
    ///
    /// Units are channels, or `Phase(..)_Amp(..)` pairs when
    /// `pac.cross_channel` is set.
    pub fn pac(&self, selection: &Selection) -> Run<PacMetric> {
        self.run(MetricFamily::Pac, selection, |rec| {
            let jobs = if self.config.pac.cross_channel {
                selection.pair_jobs(&rec.file, pac_pair_name)
            } else {
                selection.channel_jobs(&rec.file)
            };
            let prepared = self.prepare(rec, &jobs, false)?;
            let per_job = parallel_map(&jobs, self.config.worker_count(), |job| {
                match cut(&prepared, job, &rec.file) {
                    Some((fs, phase, amp)) => self.pac_leaves(job, fs, phase, amp),
                    None => Ok(Vec::new()),
                }
            });
            Ok(per_job
                .into_iter()
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect())
        })
    }

    /// Slice coherence and band-averaged coherence per (pair, slice).
    pub fn coherence(&self, selection: &Selection) -> Run<CoherenceMetric> {
        self.run(MetricFamily::Coherence, selection, |rec| {
            let jobs = selection.pair_jobs(&rec.file, coherence_pair_name);
            let prepared = self.prepare(rec, &jobs, false)?;
            let leaves = parallel_map(&jobs, self.config.worker_count(), |job| {
                let (fs, x, y) = cut(&prepared, job, &rec.file)?;
                let Some(coh) = coherence(x, y, fs) else {
                    log::warn!(
                        "{}: {} slice {} shorter than one coherence segment, skipped",
                        rec.file,
                        job.unit,
                        job.slice
                    );
                    return None;
                };
                let bands = band_power(
                    &Spectrum {
                        frequencies: coh.frequencies.clone(),
                        power: coh.values.clone(),
                    },
                    &self.config.bands.to_array(),
                );
                let cc = &self.config.coherence;
                let coheregram = cc.coheregram.then(|| {
                    coheregram(
                        x,
                        y,
                        fs,
                        cc.freq_resolution,
                        cc.time_resolution,
                        cc.max_frequency,
                        job.slice.start,
                    )
                });
                Some(Leaf {
                    unit: job.unit.clone(),
                    band: ALL_BANDS.to_string(),
                    slice: job.slice.label(),
                    metric: CoherenceMetric {
                        coherence: coh,
                        bands,
                        coheregram,
                    },
                })
            });
            Ok(leaves.into_iter().flatten().collect())
        })
    }

    /// Comodulogram per (channel, slice). Slices run one after another; the
    /// worker pool spreads the phase columns of each.
    pub fn comodulogram(&self, selection: &Selection) -> Run<ComodulogramMetric> {
        self.run(MetricFamily::Comodulogram, selection, |rec| {
            let jobs = selection.channel_jobs(&rec.file);
            let prepared = self.prepare(rec, &jobs, false)?;
            let cfg = &self.config.comodulogram;
            let mut leaves = Vec::new();
            for job in &jobs {
                let Some((fs, segment, _)) = cut(&prepared, job, &rec.file) else {
                    continue;
                };
                log::debug!("{}: comodulogram {} {}", rec.file, job.unit, job.slice);
                let comodulogram = comodulogram(
                    segment,
                    segment,
                    fs,
                    &cfg.phase_axis,
                    &cfg.amplitude_axis,
                    self.config.pac.n_bins,
                    self.config.worker_count(),
                );
                leaves.push(Leaf {
                    unit: job.unit.clone(),
                    band: ALL_BANDS.to_string(),
                    slice: job.slice.label(),
                    metric: ComodulogramMetric { comodulogram },
                });
            }
            Ok(leaves)
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Drive `per_file` over every selected file, then aggregate.
    fn run<M, F>(&self, family: MetricFamily, selection: &Selection, per_file: F) -> Run<M>
    where
        M: Metric,
        F: Fn(&Recording) -> Result<Vec<Leaf<M>>>,
    {
        let mut tree = ResultTree::new(family);
        let mut failures = Vec::new();
        for file in selection.files() {
            match self.cache.get(file).and_then(|rec| per_file(rec.as_ref())) {
                Ok(leaves) => {
                    log::debug!("{file}: {} {} leaves", leaves.len(), family.as_str());
                    for leaf in leaves {
                        tree.insert(file, &leaf.unit, &leaf.band, &leaf.slice, leaf.metric);
                    }
                }
                Err(err) => {
                    log::warn!("{file} excluded from {} run: {err}", family.as_str());
                    failures.push(FileFailure {
                        file: file.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        tree.aggregate();
        Run { tree, failures }
    }

    /// Notch (and optionally z-score) every channel the jobs touch.
    fn prepare(&self, rec: &Recording, jobs: &[Job<'_>], normalize: bool) -> Result<BTreeMap<String, Prepared>> {
        let names: BTreeSet<&str> = jobs.iter().flat_map(|j| [j.first, j.second]).collect();
        let mut prepared = BTreeMap::new();
        for name in names {
            let channel = rec.channel(name)?;
            let fs = channel.sampling_rate;
            let mut signal = if self.config.notch {
                notch_cascade(&channel.values, fs, self.config.max_frequency)
            } else {
                channel.values.clone()
            };
            if normalize {
                signal = zscore(&signal);
            }
            prepared.insert(
                name.to_string(),
                Prepared {
                    sample_rate: fs,
                    signal,
                },
            );
        }
        Ok(prepared)
    }

    fn psd_metric(&self, segment: &[f64], fs: f64, slice: &TimeSlice) -> PsdMetric {
        let spectrum = welch_psd(
            segment,
            fs,
            &WelchParams::for_resolution(fs, self.config.frequency_resolution),
        );
        let bands = band_power(&spectrum, &self.config.bands.to_array());
        let sc = &self.config.spectrogram;
        let spectrogram = sc.enabled.then(|| {
            let (window, overlap) = spectrogram_params(fs, sc.freq_resolution, sc.time_resolution);
            spectrogram(segment, fs, window, overlap, &sc.range, slice.start)
        });
        PsdMetric {
            spectrum,
            bands,
            spectrogram,
        }
    }

    fn pac_leaves(&self, job: &Job<'_>, fs: f64, phase: &[f64], amp: &[f64]) -> Result<Vec<Leaf<PacMetric>>> {
        let pac = &self.config.pac;
        let mut leaves = Vec::with_capacity(pac.phase_bands.len() * pac.amplitude_bands.len());
        for phase_band in &pac.phase_bands {
            for amp_band in &pac.amplitude_bands {
                let (phase_sig, amp_sig) = band_limit(phase, amp, fs, phase_band, amp_band)?;
                let (values, _) = pac_metrics(&phase_sig, &amp_sig, pac.n_bins);
                let sliding = pac.sliding.enabled.then(|| {
                    sliding_pac(
                        &phase_sig,
                        &amp_sig,
                        fs,
                        pac.sliding.duration,
                        pac.sliding.overlap,
                        pac.n_bins,
                        job.slice.start,
                    )
                });
                leaves.push(Leaf {
                    unit: job.unit.clone(),
                    band: pac_band_label(phase_band, amp_band),
                    slice: job.slice.label(),
                    metric: PacMetric { values, sliding },
                });
            }
        }
        Ok(leaves)
    }
}

/// The job's slice of both channels, with the first channel's rate.
///
/// `None`, with a warning, when the slice selects nothing in either channel.
fn cut<'p>(
    prepared: &'p BTreeMap<String, Prepared>,
    job: &Job<'_>,
    file: &str,
) -> Option<(f64, &'p [f64], &'p [f64])> {
    let first = prepared.get(job.first)?;
    let second = prepared.get(job.second)?;
    let a = job.slice.sample_range(first.sample_rate, first.signal.len());
    let b = job.slice.sample_range(second.sample_rate, second.signal.len());
    match (a, b) {
        (Some(a), Some(b)) => Some((first.sample_rate, &first.signal[a], &second.signal[b])),
        _ => {
            log::warn!("{file}: slice {} outside {}, skipped", job.slice, job.unit);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::recording::RawChannel;
    use std::f64::consts::PI;

    const FS: f64 = 500.0;

    /// In-memory recordings keyed by file name.
    struct MemoryLoader(BTreeMap<String, BTreeMap<String, RawChannel>>);

    impl RecordingLoader for MemoryLoader {
        fn load(&self, file: &str) -> Result<BTreeMap<String, RawChannel>> {
            self.0.get(file).cloned().ok_or_else(|| Error::FileUnreadable {
                file: file.to_string(),
                reason: "not in memory".into(),
            })
        }
    }

    fn channel(values: Vec<f64>) -> RawChannel {
        let times = (0..values.len()).map(|i| i as f64 / FS).collect();
        RawChannel {
            values,
            times: Some(times),
        }
    }

    fn coupled(seconds: f64) -> Vec<f64> {
        let n = (seconds * FS) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / FS;
                let slow = (2.0 * PI * 6.0 * t).cos();
                slow + (1.0 + 0.8 * slow) * 0.3 * (2.0 * PI * 40.0 * t).cos()
            })
            .collect()
    }

    fn fixture() -> RecordingCache<MemoryLoader> {
        let mut files = BTreeMap::new();
        let mut a = BTreeMap::new();
        a.insert("Ch1".to_string(), channel(coupled(20.0)));
        a.insert("Ch2".to_string(), channel(coupled(20.0)));
        files.insert("a".to_string(), a);
        RecordingCache::new(MemoryLoader(files), 2000.0)
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            workers: 2,
            frequency_resolution: 1.0,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn selection_files_and_ranges() {
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch1", "0 10; 10 20").unwrap();
        sel.add_pair("b", "Ch1", "Ch2");
        assert_eq!(sel.files().into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(sel.slices("a", "Ch1").len(), 2);
        assert!(sel.slices("a", "Ch9").is_empty());
        assert!(sel.add_ranges("a", "Ch1", "5").is_err());
    }

    #[test]
    fn psd_run_builds_leaves_and_aggregates() {
        let cache = fixture();
        let cfg = config();
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch1", "0 10; 10 20").unwrap();
        let run = Analyzer::new(&cfg, &cache).psd(&sel);
        assert!(run.failures.is_empty());
        assert_eq!(run.tree.leaf_count(), 2);
        let leaf = run.tree.leaf("a", "Ch1", ALL_BANDS, "0-10s").unwrap();
        assert_eq!(leaf.bands.means.len(), 6);
        assert!(leaf.spectrogram.is_none());
        assert_eq!(run.tree.grand[ALL_BANDS].mean.len(), 6);
    }

    #[test]
    fn out_of_range_slices_are_skipped() {
        let cache = fixture();
        let cfg = config();
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch1", "0 10; 100 110").unwrap();
        let run = Analyzer::new(&cfg, &cache).psd(&sel);
        assert!(run.failures.is_empty());
        assert_eq!(run.tree.leaf_count(), 1);
    }

    #[test]
    fn pac_keys_each_band_pair() {
        let cache = fixture();
        let cfg = config();
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch1", "0 10").unwrap();
        let run = Analyzer::new(&cfg, &cache).pac(&sel);
        assert_eq!(run.tree.leaf_count(), 2);
        let leaf = run
            .tree
            .leaf("a", "Ch1", "Phase_4-10_Amp_30-55", "0-10s")
            .unwrap();
        assert!(leaf.values.mi > 0.005, "MI {}", leaf.values.mi);
        assert_eq!(run.tree.grand.len(), 2);
    }

    #[test]
    fn cross_channel_pac_uses_pairs() {
        let cache = fixture();
        let mut cfg = config();
        cfg.pac.cross_channel = true;
        cfg.pac.sliding.enabled = true;
        cfg.pac.sliding.duration = 4.0;
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch1", "0 10").unwrap();
        sel.add_pair("a", "Ch1", "Ch2");
        let run = Analyzer::new(&cfg, &cache).pac(&sel);
        let leaf = run
            .tree
            .leaf("a", "Phase(Ch1)_Amp(Ch2)", "Phase_4-10_Amp_30-55", "0-10s")
            .unwrap();
        let sliding = leaf.sliding.as_ref().unwrap();
        assert_eq!(sliding.times, vec![2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn impossible_band_excludes_the_file() {
        let cache = fixture();
        let mut cfg = config();
        cfg.pac.amplitude_bands = vec![crate::types::FrequencyBand::new(200.0, 300.0)];
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch1", "0 10").unwrap();
        let run = Analyzer::new(&cfg, &cache).pac(&sel);
        assert!(run.tree.is_empty());
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].file, "a");
    }

    #[test]
    fn coherence_of_identical_channels() {
        let cache = fixture();
        let mut cfg = config();
        cfg.coherence.coheregram = true;
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch1", "0 20").unwrap();
        sel.add_pair("a", "Ch1", "Ch2");
        let run = Analyzer::new(&cfg, &cache).coherence(&sel);
        let leaf = run.tree.leaf("a", "Ch1 vs Ch2", ALL_BANDS, "0-20s").unwrap();
        // Theta carries the shared 6 Hz tone.
        assert!(leaf.bands.means[1] > 0.99);
        assert!(leaf.coheregram.is_some());
    }

    #[test]
    fn unknown_channel_and_missing_file_are_failures() {
        let cache = fixture();
        let cfg = config();
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch9", "0 10").unwrap();
        sel.add_ranges("nowhere", "Ch1", "0 10").unwrap();
        let run = Analyzer::new(&cfg, &cache).psd(&sel);
        assert_eq!(run.failures.len(), 2);
        assert!(run.tree.is_empty());
        assert!(run.tree.grand.is_empty());
    }

    #[test]
    fn comodulogram_run() {
        let cache = fixture();
        let mut cfg = config();
        cfg.comodulogram.phase_axis = crate::config::FrequencyAxis {
            start: 4.0,
            step: 2.0,
            end: 8.0,
        };
        cfg.comodulogram.amplitude_axis = crate::config::FrequencyAxis {
            start: 30.0,
            step: 10.0,
            end: 50.0,
        };
        let mut sel = Selection::new();
        sel.add_ranges("a", "Ch1", "0 10").unwrap();
        let run = Analyzer::new(&cfg, &cache).comodulogram(&sel);
        let leaf = run.tree.leaf("a", "Ch1", ALL_BANDS, "0-10s").unwrap();
        assert_eq!(leaf.comodulogram.amplitude_frequencies, vec![30.0, 40.0]);
        assert_eq!(leaf.comodulogram.phase_frequencies, vec![4.0, 6.0]);
        assert_eq!(run.tree.grand[ALL_BANDS].mean.len(), 4);
    }
}

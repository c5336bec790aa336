//! Channel recordings, the loader seam and the memoizing cache.
//!
//! Loaders return raw `{values, times?}` channels; [`RecordingCache`] turns
//! them into [`Recording`]s with a sampling rate and keeps one per file
//! identity until [`RecordingCache::reload`] is called.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A channel as delivered by a loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChannel {
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<Vec<f64>>,
}

/// A channel with a usable time axis and sampling rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub values: Vec<f64>,
    pub times: Vec<f64>,
    pub sampling_rate: f64,
}

impl Channel {
    /// Derive the sampling rate from `raw.times` and synthesize `i / fs`
    /// times when the raw axis is missing or does not match the values.
    pub fn from_raw(raw: RawChannel, fallback_rate: f64) -> Self {
        let times = raw.times.filter(|t| t.len() == raw.values.len());
        let sampling_rate = times
            .as_deref()
            .map_or(fallback_rate, |t| derive_sampling_rate(t, fallback_rate));
        let times = times.unwrap_or_else(|| {
            (0..raw.values.len())
                .map(|i| i as f64 / sampling_rate)
                .collect()
        });
        Self {
            values: raw.values,
            times,
            sampling_rate,
        }
    }

    /// Recording length in seconds.
    pub fn duration(&self) -> f64 {
        self.values.len() as f64 / self.sampling_rate
    }
}

/// `round((n - 1) / (t_last - t_first))`, or `fallback` when the axis spans
/// no positive duration.
pub fn derive_sampling_rate(times: &[f64], fallback: f64) -> f64 {
    let (Some(first), Some(last)) = (times.first(), times.last()) else {
        return fallback;
    };
    let span = last - first;
    if times.len() < 2 || span <= 0.0 || !span.is_finite() {
        return fallback;
    }
    let rate = ((times.len() - 1) as f64 / span).round();
    if rate > 0.0 { rate } else { fallback }
}

/// All channels of one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recording {
    pub file: String,
    pub channels: BTreeMap<String, Channel>,
}

impl Recording {
    pub fn channel(&self, name: &str) -> Result<&Channel> {
        self.channels.get(name).ok_or_else(|| Error::UnknownChannel {
            file: self.file.clone(),
            channel: name.to_string(),
        })
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Loader seam
// ---------------------------------------------------------------------------

/// Source of raw channel data.
pub trait RecordingLoader: Send + Sync {
    fn load(&self, file: &str) -> Result<BTreeMap<String, RawChannel>>;
}

/// Reads `{"<channel>": {"values": [...], "times": [...]}}` JSON files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordingLoader;

impl RecordingLoader for JsonRecordingLoader {
    fn load(&self, file: &str) -> Result<BTreeMap<String, RawChannel>> {
        let unreadable = |reason: String| Error::FileUnreadable {
            file: file.to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(Path::new(file)).map_err(|e| unreadable(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| unreadable(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Memoizes loaded recordings by file identity.
pub struct RecordingCache<L> {
    loader: L,
    fallback_rate: f64,
    entries: Mutex<HashMap<String, Arc<Recording>>>,
}

impl<L: RecordingLoader> RecordingCache<L> {
    /// `fallback_rate` applies to channels without a usable time axis.
    pub fn new(loader: L, fallback_rate: f64) -> Self {
        Self {
            loader,
            fallback_rate,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cached recording for `file`, loading it on first use.
    pub fn get(&self, file: &str) -> Result<Arc<Recording>> {
        if let Some(hit) = self.lock().get(file) {
            return Ok(Arc::clone(hit));
        }
        self.reload(file)
    }

    /// Load `file` again and replace any cached copy.
    pub fn reload(&self, file: &str) -> Result<Arc<Recording>> {
        log::debug!("loading {file}");
        let channels = self
            .loader
            .load(file)?
            .into_iter()
            .map(|(name, raw)| (name, Channel::from_raw(raw, self.fallback_rate)))
            .collect();
        let recording = Arc::new(Recording {
            file: file.to_string(),
            channels,
        });
        self.lock().insert(file.to_string(), Arc::clone(&recording));
        Ok(recording)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Recording>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl RecordingLoader for CountingLoader {
        fn load(&self, file: &str) -> Result<BTreeMap<String, RawChannel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if file == "missing" {
                return Err(Error::FileUnreadable {
                    file: file.into(),
                    reason: "no such file".into(),
                });
            }
            let mut channels = BTreeMap::new();
            channels.insert(
                "Ch1".to_string(),
                RawChannel {
                    values: vec![0.0; 4],
                    times: Some(vec![0.0, 0.001, 0.002, 0.003]),
                },
            );
            Ok(channels)
        }
    }

    #[test]
    fn sampling_rate_from_times() {
        assert_eq!(derive_sampling_rate(&[0.0, 0.0005, 0.001, 0.0015], 100.0), 2000.0);
        // Slightly irregular axes still round to an integer rate.
        assert_eq!(derive_sampling_rate(&[0.0, 0.00101, 0.00199], 100.0), 1005.0);
        assert_eq!(derive_sampling_rate(&[1.0, 1.0], 250.0), 250.0);
        assert_eq!(derive_sampling_rate(&[], 250.0), 250.0);
    }

    #[test]
    fn missing_times_are_synthesized() {
        let ch = Channel::from_raw(
            RawChannel {
                values: vec![1.0, 2.0, 3.0],
                times: None,
            },
            2000.0,
        );
        assert_eq!(ch.sampling_rate, 2000.0);
        assert_eq!(ch.times, vec![0.0, 0.0005, 0.001]);
    }

    #[test]
    fn mismatched_times_are_ignored() {
        let ch = Channel::from_raw(
            RawChannel {
                values: vec![1.0, 2.0, 3.0],
                times: Some(vec![0.0, 1.0]),
            },
            10.0,
        );
        assert_eq!(ch.sampling_rate, 10.0);
        assert_eq!(ch.times.len(), 3);
    }

    #[test]
    fn cache_memoizes_until_reload() {
        let cache = RecordingCache::new(
            CountingLoader {
                loads: AtomicUsize::new(0),
            },
            2000.0,
        );
        let first = cache.get("a").unwrap();
        let second = cache.get("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.loader().loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.channel("Ch1").unwrap().sampling_rate, 1000.0);

        let reloaded = cache.reload("a").unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(cache.loader().loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = RecordingCache::new(
            CountingLoader {
                loads: AtomicUsize::new(0),
            },
            2000.0,
        );
        assert!(matches!(cache.get("missing"), Err(Error::FileUnreadable { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn unknown_channel_error() {
        let rec = Recording {
            file: "a".into(),
            channels: BTreeMap::new(),
        };
        assert!(matches!(rec.channel("Ch9"), Err(Error::UnknownChannel { .. })));
    }

    #[test]
    fn json_loader_reads_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.json");
        std::fs::write(
            &path,
            r#"{"Ch1": {"values": [1, 2, 3]}, "Ch2": {"values": [4, 5, 6], "times": [0, 0.5, 1]}}"#,
        )
        .unwrap();
        let channels = JsonRecordingLoader.load(path.to_str().unwrap()).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels["Ch2"].times.as_deref(), Some(&[0.0, 0.5, 1.0][..]));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "not json").unwrap();
        assert!(matches!(
            JsonRecordingLoader.load(bad.to_str().unwrap()),
            Err(Error::FileUnreadable { .. })
        ));
    }
}

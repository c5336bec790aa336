//! Error types for the metric engine, configuration and loader seam.
//!
//! Shape problems (mismatched lengths, slices outside the signal) and numeric
//! singularities are recovered where they occur and never surface here. What
//! does surface is either a rejected configuration or a per-file failure that
//! excludes one file from a batch.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unparsable or inconsistent user configuration.
    #[error("invalid configuration for {field}: {reason}")]
    Config {
        /// Configuration field or input text that was rejected
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// A filter could not be designed for the requested band.
    #[error("cannot design filter for {low}-{high} Hz at {fs} Hz: {reason}")]
    FilterDesign {
        /// Lower band edge in Hz
        low: f64,
        /// Upper band edge in Hz
        high: f64,
        /// Sampling rate in Hz
        fs: f64,
        /// Why the design was rejected
        reason: &'static str,
    },

    /// The loader could not read or decode a file.
    #[error("cannot load {file}: {reason}")]
    FileUnreadable {
        /// File identity as given to the loader
        file: String,
        /// Underlying cause
        reason: String,
    },

    /// A selection names a channel the file does not contain.
    #[error("channel {channel} not found in {file}")]
    UnknownChannel { file: String, channel: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for failures that exclude a single file rather than the whole run.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Error::FileUnreadable { .. } | Error::UnknownChannel { .. } | Error::FilterDesign { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_message_names_field() {
        let err = Error::config("time_ranges", "start must be below end");
        assert_eq!(
            err.to_string(),
            "invalid configuration for time_ranges: start must be below end"
        );
        assert!(!err.is_per_file());
    }

    #[test]
    fn load_failures_are_per_file() {
        let err = Error::FileUnreadable {
            file: "a.json".into(),
            reason: "missing".into(),
        };
        assert!(err.is_per_file());
        let err = Error::UnknownChannel {
            file: "a.json".into(),
            channel: "Ch9".into(),
        };
        assert!(err.is_per_file());
    }
}

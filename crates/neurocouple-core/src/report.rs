//! Final reports: sanitized JSON and CSV row export.
//!
//! NaN and infinities can reach the tree from degenerate slices and propagate
//! through aggregation. Summaries go through [`finite`]; leaves rely on
//! `serde_json`, which writes non-finite floats as `null`. CSV writes an
//! empty field.
//!
//! # CSV layout
//!
//! - `rows.csv`: `file,unit,band,slice,component,value,sem,value_db`, one line
//!   per leaf component; `value_db` only for PSD.
//! - `summary.csv`: `level,file,unit,band,component,mean,sem,weight,count`,
//!   one line per aggregate component at the unit, file and grand levels.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::metrics::{Metric, MetricFamily};
use crate::pipeline::{FileFailure, Run};
use crate::tree::{ResultTree, Row};

/// A finite number, or `None` for the missing marker.
pub fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

// ---------------------------------------------------------------------------
// JSON report
// ---------------------------------------------------------------------------

/// An aggregate with component names and missing markers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub components: Vec<String>,
    pub mean: Vec<Option<f64>>,
    pub sem: Vec<Option<f64>>,
    pub weight: Option<f64>,
    pub count: usize,
}

impl SummaryReport {
    pub fn new(components: Vec<String>, agg: &Aggregate) -> Self {
        Self {
            components,
            mean: agg.mean.iter().copied().map(finite).collect(),
            sem: agg.sem.iter().copied().map(finite).collect(),
            weight: finite(agg.weight),
            count: agg.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandReport {
    /// Leaf detail keyed by slice label.
    pub slices: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    /// unit → band key → band report
    pub units: BTreeMap<String, BTreeMap<String, BandReport>>,
    pub summary: BTreeMap<String, SummaryReport>,
}

/// The complete, sanitized output of one metric family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub run_id: String,
    pub version: String,
    pub family: MetricFamily,
    pub files: BTreeMap<String, FileReport>,
    pub grand: BTreeMap<String, SummaryReport>,
    pub failures: Vec<FileFailure>,
}

impl Report {
    /// Build the report of an aggregated run.
    pub fn from_run<M: Metric + Serialize>(run: &Run<M>) -> serde_json::Result<Self> {
        let tree = &run.tree;
        let names: BTreeMap<&str, Vec<String>> = tree
            .leaves()
            .map(|(_, _, band, ..)| band)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .map(|band| (band, tree.component_names(band)))
            .collect();
        let summarize = |band: &str, agg: &Aggregate| {
            SummaryReport::new(names.get(band).cloned().unwrap_or_default(), agg)
        };

        let mut files = BTreeMap::new();
        for (file, file_node) in &tree.files {
            let mut units = BTreeMap::new();
            for (unit, unit_node) in &file_node.units {
                let mut bands = BTreeMap::new();
                for (band, band_node) in &unit_node.bands {
                    let slices = band_node
                        .slices
                        .iter()
                        .map(|(label, leaf)| {
                            serde_json::to_value(leaf).map(|v| (label.clone(), v))
                        })
                        .collect::<serde_json::Result<BTreeMap<_, _>>>()?;
                    bands.insert(
                        band.clone(),
                        BandReport {
                            slices,
                            summary: band_node.summary.as_ref().map(|agg| summarize(band, agg)),
                        },
                    );
                }
                units.insert(unit.clone(), bands);
            }
            let summary = file_node
                .summary
                .iter()
                .map(|(band, agg)| (band.clone(), summarize(band, agg)))
                .collect();
            files.insert(file.clone(), FileReport { units, summary });
        }

        Ok(Self {
            run_id: Uuid::new_v4().to_string(),
            version: crate::VERSION.to_string(),
            family: tree.family,
            files,
            grand: tree
                .grand
                .iter()
                .map(|(band, agg)| (band.clone(), summarize(band, agg)))
                .collect(),
            failures: run.failures.clone(),
        })
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json_pretty().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn csv_number(x: Option<f64>) -> String {
    x.and_then(finite).map(|v| v.to_string()).unwrap_or_default()
}

/// Write leaf rows; `value_db` is filled only when `family` reports dB.
pub fn write_rows_csv(path: &Path, family: MetricFamily, rows: &[Row]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "file,unit,band,slice,component,value,sem,value_db")?;
    for row in rows {
        let db = family.reports_db().then(|| row.value_db());
        writeln!(
            w,
            "{},{},{},{},{},{},{},{}",
            csv_field(&row.file),
            csv_field(&row.unit),
            csv_field(&row.band),
            csv_field(&row.slice),
            csv_field(&row.component),
            csv_number(Some(row.value)),
            csv_number(row.sem),
            csv_number(db),
        )?;
    }
    w.flush()
}

/// Write every aggregate of an aggregated tree, one line per component.
pub fn write_summary_csv<M: Metric>(path: &Path, tree: &ResultTree<M>) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "level,file,unit,band,component,mean,sem,weight,count")?;

    let mut emit = |level: &str, file: &str, unit: &str, band: &str, agg: &Aggregate| {
        let names = tree.component_names(band);
        for (k, mean) in agg.mean.iter().enumerate() {
            let component = names.get(k).cloned().unwrap_or_else(|| k.to_string());
            writeln!(
                w,
                "{level},{},{},{},{},{},{},{},{}",
                csv_field(file),
                csv_field(unit),
                csv_field(band),
                csv_field(&component),
                csv_number(Some(*mean)),
                csv_number(agg.sem.get(k).copied()),
                csv_number(Some(agg.weight)),
                agg.count,
            )?;
        }
        Ok::<(), std::io::Error>(())
    };

    for (file, file_node) in &tree.files {
        for (unit, unit_node) in &file_node.units {
            for (band, band_node) in &unit_node.bands {
                if let Some(agg) = &band_node.summary {
                    emit("unit", file, unit, band, agg)?;
                }
            }
        }
        for (band, agg) in &file_node.summary {
            emit("file", file, "", band, agg)?;
        }
    }
    for (band, agg) in &tree.grand {
        emit("grand", "", "", band, agg)?;
    }
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RowMetric;
    use crate::tree::ALL_BANDS;
    use serde_json::json;

    fn leaf(values: &[f64]) -> RowMetric {
        RowMetric {
            names: (0..values.len()).map(|i| format!("c{i}")).collect(),
            values: values.to_vec(),
            sems: None,
        }
    }

    fn run_with(values: &[&[f64]]) -> Run<RowMetric> {
        let mut tree = ResultTree::new(MetricFamily::Pac);
        for (i, v) in values.iter().enumerate() {
            tree.insert("f", "Ch1", ALL_BANDS, &format!("{i}-{}s", i + 1), leaf(v));
        }
        tree.aggregate();
        Run {
            tree,
            failures: vec![FileFailure {
                file: "bad".into(),
                reason: "cannot load bad".into(),
            }],
        }
    }

    #[test]
    fn finite_marks_missing() {
        assert_eq!(finite(f64::NAN), None);
        assert_eq!(finite(f64::NEG_INFINITY), None);
        assert_eq!(finite(1.5), Some(1.5));
    }

    #[test]
    fn nan_becomes_null_in_report() {
        let run = run_with(&[&[f64::NAN, 1.0], &[2.0, f64::INFINITY]]);
        let report = Report::from_run(&run).unwrap();
        let json: Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

        let grand = &json["grand"][ALL_BANDS];
        assert_eq!(grand["mean"][0], Value::Null);
        assert_eq!(grand["mean"][1], Value::Null);
        assert_eq!(grand["components"], json!(["c0", "c1"]));
        let slices = &json["files"]["f"]["units"]["Ch1"][ALL_BANDS]["slices"];
        assert_eq!(slices["0-1s"]["values"][0], Value::Null);
        assert_eq!(slices["1-2s"]["values"][1], Value::Null);
        assert_eq!(slices["1-2s"]["values"][0], 2.0);
        assert_eq!(json["failures"][0]["file"], "bad");
        assert_eq!(json["family"], "pac");
        assert_eq!(json["version"], crate::VERSION);
        assert!(Uuid::parse_str(json["run_id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn run_ids_differ() {
        let run = run_with(&[&[1.0]]);
        let a = Report::from_run(&run).unwrap();
        let b = Report::from_run(&run).unwrap();
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn rows_csv_has_db_only_for_psd() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![Row {
            file: "a,b".into(),
            unit: "Ch1".into(),
            band: ALL_BANDS.into(),
            slice: "0-10s".into(),
            component: "Theta".into(),
            value: 100.0,
            sem: None,
        }];

        let psd = dir.path().join("psd.csv");
        write_rows_csv(&psd, MetricFamily::Psd, &rows).unwrap();
        let text = std::fs::read_to_string(&psd).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "file,unit,band,slice,component,value,sem,value_db");
        assert_eq!(lines[1], "\"a,b\",Ch1,all,0-10s,Theta,100,,20");

        let pac = dir.path().join("pac.csv");
        write_rows_csv(&pac, MetricFamily::Pac, &rows).unwrap();
        let text = std::fs::read_to_string(&pac).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with(",100,,"));
    }

    #[test]
    fn summary_csv_covers_every_level() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_with(&[&[1.0], &[3.0]]);
        let path = dir.path().join("summary.csv");
        write_summary_csv(&path, &run.tree).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let levels: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(levels, vec!["unit", "file", "grand"]);
        assert!(text.contains("grand,,,all,c0,2,"));
    }
}

//! Result Tree: per-slice metric leaves keyed `file → unit → band → slice`.
//!
//! A *unit* is a channel (PSD, comodulogram, within-channel PAC) or a channel
//! pair (coherence, cross-channel PAC). A *band key* is [`ALL_BANDS`] for
//! every family except PAC, which keys each phase/amplitude band pair
//! separately. Non-leaf levels carry [`Aggregate`] slots that only
//! [`ResultTree::aggregate`](crate::aggregate) fills; leaves are never
//! removed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::metrics::{Metric, MetricFamily, RowMetric};

/// Band key used by families that do not split results by band pair.
pub const ALL_BANDS: &str = "all";

/// Slice leaves of one (unit, band key) with their aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandNode<M> {
    /// Leaves keyed by slice label.
    pub slices: BTreeMap<String, M>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Aggregate>,
}

impl<M> Default for BandNode<M> {
    fn default() -> Self {
        Self {
            slices: BTreeMap::new(),
            summary: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitNode<M> {
    pub bands: BTreeMap<String, BandNode<M>>,
}

impl<M> Default for UnitNode<M> {
    fn default() -> Self {
        Self {
            bands: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode<M> {
    pub units: BTreeMap<String, UnitNode<M>>,
    /// One aggregate per band key over this file's units.
    pub summary: BTreeMap<String, Aggregate>,
}

impl<M> Default for FileNode<M> {
    fn default() -> Self {
        Self {
            units: BTreeMap::new(),
            summary: BTreeMap::new(),
        }
    }
}

/// Every leaf of one metric family for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTree<M> {
    pub family: MetricFamily,
    pub files: BTreeMap<String, FileNode<M>>,
    /// One aggregate per band key over all files.
    pub grand: BTreeMap<String, Aggregate>,
}

/// One component of one leaf, the unit of row export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub file: String,
    pub unit: String,
    pub band: String,
    pub slice: String,
    pub component: String,
    pub value: f64,
    pub sem: Option<f64>,
}

impl Row {
    /// `10·log10(value)`; `-inf` for zero power.
    pub fn value_db(&self) -> f64 {
        10.0 * self.value.log10()
    }
}

impl<M> ResultTree<M> {
    pub fn new(family: MetricFamily) -> Self {
        Self {
            family,
            files: BTreeMap::new(),
            grand: BTreeMap::new(),
        }
    }

    /// Add or replace one leaf.
    pub fn insert(&mut self, file: &str, unit: &str, band: &str, slice: &str, metric: M) {
        self.files
            .entry(file.to_string())
            .or_default()
            .units
            .entry(unit.to_string())
            .or_default()
            .bands
            .entry(band.to_string())
            .or_default()
            .slices
            .insert(slice.to_string(), metric);
    }

    pub fn leaf(&self, file: &str, unit: &str, band: &str, slice: &str) -> Option<&M> {
        self.files
            .get(file)?
            .units
            .get(unit)?
            .bands
            .get(band)?
            .slices
            .get(slice)
    }

    pub fn band_node(&self, file: &str, unit: &str, band: &str) -> Option<&BandNode<M>> {
        self.files.get(file)?.units.get(unit)?.bands.get(band)
    }

    /// Iterate `(file, unit, band, slice, leaf)` in key order.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &str, &str, &str, &M)> {
        self.files.iter().flat_map(|(file, file_node)| {
            file_node.units.iter().flat_map(move |(unit, unit_node)| {
                unit_node.bands.iter().flat_map(move |(band, band_node)| {
                    band_node.slices.iter().map(move |(slice, leaf)| {
                        (file.as_str(), unit.as_str(), band.as_str(), slice.as_str(), leaf)
                    })
                })
            })
        })
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<M: Metric> ResultTree<M> {
    /// Component names of the first leaf under `band`, used to label
    /// aggregates.
    pub fn component_names(&self, band: &str) -> Vec<String> {
        self.leaves()
            .find(|(_, _, b, _, _)| *b == band)
            .map(|(.., leaf)| leaf.component_names())
            .unwrap_or_default()
    }

    /// One row per leaf component, in key order.
    pub fn flatten(&self) -> Vec<Row> {
        let mut rows = Vec::new();
        for (file, unit, band, slice, leaf) in self.leaves() {
            let sems = leaf.sems();
            for (k, (component, value)) in leaf
                .component_names()
                .into_iter()
                .zip(leaf.values())
                .enumerate()
            {
                rows.push(Row {
                    file: file.to_string(),
                    unit: unit.to_string(),
                    band: band.to_string(),
                    slice: slice.to_string(),
                    component,
                    value,
                    sem: sems.as_ref().and_then(|s| s.get(k).copied()),
                });
            }
        }
        rows
    }
}

impl ResultTree<RowMetric> {
    /// Rebuild a tree from rows produced by [`ResultTree::flatten`].
    ///
    /// Components keep their row order. A leaf keeps SEMs only when every
    /// one of its rows has one.
    pub fn from_rows(family: MetricFamily, rows: &[Row]) -> Self {
        let mut tree = Self::new(family);
        let mut partial: BTreeMap<(&str, &str, &str, &str), (RowMetric, bool)> = BTreeMap::new();
        for row in rows {
            let key = (
                row.file.as_str(),
                row.unit.as_str(),
                row.band.as_str(),
                row.slice.as_str(),
            );
            let (leaf, all_sems) = partial.entry(key).or_insert_with(|| (RowMetric::default(), true));
            leaf.names.push(row.component.clone());
            leaf.values.push(row.value);
            match row.sem {
                Some(sem) if *all_sems => leaf.sems.get_or_insert_with(Vec::new).push(sem),
                _ => *all_sems = false,
            }
        }
        for ((file, unit, band, slice), (mut leaf, all_sems)) in partial {
            if !all_sems {
                leaf.sems = None;
            }
            tree.insert(file, unit, band, slice, leaf);
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(values: &[f64], sems: Option<&[f64]>) -> RowMetric {
        RowMetric {
            names: (0..values.len()).map(|i| format!("c{i}")).collect(),
            values: values.to_vec(),
            sems: sems.map(|s| s.to_vec()),
        }
    }

    #[test]
    fn insert_and_lookup() {
        let mut tree = ResultTree::new(MetricFamily::Pac);
        tree.insert("a.json", "Ch1", "Phase_4-10_Amp_30-55", "0-10s", leaf(&[0.1], None));
        tree.insert("a.json", "Ch1", "Phase_4-10_Amp_30-55", "10-20s", leaf(&[0.2], None));
        tree.insert("b.json", "Ch1", "Phase_4-10_Amp_30-55", "0-10s", leaf(&[0.3], None));
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(
            tree.leaf("a.json", "Ch1", "Phase_4-10_Amp_30-55", "10-20s")
                .map(|l| l.values[0]),
            Some(0.2)
        );
        assert!(tree.leaf("a.json", "Ch2", ALL_BANDS, "0-10s").is_none());
    }

    #[test]
    fn flatten_emits_one_row_per_component() {
        let mut tree = ResultTree::new(MetricFamily::Psd);
        tree.insert("f", "Ch1", ALL_BANDS, "0-10s", leaf(&[1.0, 2.0], Some(&[0.1, 0.2])));
        let rows = tree.flatten();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].component, "c1");
        assert_eq!(rows[1].sem, Some(0.2));
        assert!((rows[0].value_db() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn from_rows_restores_leaves() {
        let mut tree = ResultTree::new(MetricFamily::Coherence);
        tree.insert("f", "Ch1 vs Ch2", ALL_BANDS, "0-10s", leaf(&[0.5, 0.6], Some(&[0.01, 0.02])));
        tree.insert("f", "Ch1 vs Ch3", ALL_BANDS, "0-10s", leaf(&[0.7, 0.8], None));
        let rebuilt = ResultTree::from_rows(MetricFamily::Coherence, &tree.flatten());
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn partial_sems_are_dropped() {
        let mut rows = ResultTree::new(MetricFamily::Psd);
        rows.insert("f", "Ch1", ALL_BANDS, "0-10s", leaf(&[1.0, 2.0], Some(&[0.1, 0.2])));
        let mut flat = rows.flatten();
        flat[1].sem = None;
        let rebuilt = ResultTree::from_rows(MetricFamily::Psd, &flat);
        let restored = rebuilt.leaf("f", "Ch1", ALL_BANDS, "0-10s").unwrap();
        assert!(restored.sems.is_none());
    }
}

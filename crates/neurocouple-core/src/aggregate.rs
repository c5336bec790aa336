//! Hierarchical mean/SEM rollup of a [`ResultTree`].
//!
//! One routine, [`combine`], serves every level and family; callers choose
//! the child weights and the [`SemPolicy`]. The rollup runs
//! slice → (unit, band) → file → grand:
//!
//! | level          | mean                       | SEM                                  |
//! |----------------|----------------------------|--------------------------------------|
//! | slice → unit   | duration-weighted for PSD  | quadrature of leaf SEMs when present |
//! | unit → file    | arithmetic                 | sample SEM of unit means             |
//! | file → grand   | arithmetic                 | sample SEM of file means             |
//!
//! A group of one child always has SEM 0. Empty groups produce no
//! aggregate. NaN inputs propagate into the affected components.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::metrics::Metric;
use crate::tree::ResultTree;

/// Summary of one group of children, per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub mean: Vec<f64>,
    pub sem: Vec<f64>,
    /// Sum of child weights.
    pub weight: f64,
    /// Number of children.
    pub count: usize,
}

/// How the SEM of a group is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemPolicy {
    /// `sqrt(Σ sem²) / n` when every child carries its own SEM, otherwise
    /// the sample SEM of the child values.
    Propagate,
    /// Sample SEM (ddof 1) of the child values.
    Sample,
}

/// One child of a group.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub values: Vec<f64>,
    pub sems: Option<Vec<f64>>,
    pub weight: f64,
}

impl Observation {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            sems: None,
            weight: 1.0,
        }
    }
}

/// Weighted mean and SEM of a group, component by component.
///
/// The component count is taken from the first child; missing components of
/// shorter children count as NaN. Returns `None` for an empty group.
pub fn combine(children: &[Observation], policy: SemPolicy) -> Option<Aggregate> {
    let first = children.first()?;
    let width = first.values.len();
    let n = children.len();
    let total_weight: f64 = children.iter().map(|c| c.weight).sum();
    let weighted = total_weight > 0.0 && total_weight.is_finite();

    let propagate = policy == SemPolicy::Propagate && children.iter().all(|c| c.sems.is_some());

    let mut mean = Vec::with_capacity(width);
    let mut sem = Vec::with_capacity(width);
    for k in 0..width {
        let column: Vec<f64> = children
            .iter()
            .map(|c| c.values.get(k).copied().unwrap_or(f64::NAN))
            .collect();

        mean.push(if weighted {
            children
                .iter()
                .zip(&column)
                .map(|(c, v)| c.weight * v)
                .sum::<f64>()
                / total_weight
        } else {
            column.iter().mean()
        });

        sem.push(if n == 1 {
            0.0
        } else if propagate {
            let sum_sq: f64 = children
                .iter()
                .map(|c| {
                    let s = c
                        .sems
                        .as_ref()
                        .and_then(|s| s.get(k).copied())
                        .unwrap_or(f64::NAN);
                    s * s
                })
                .sum();
            sum_sq.sqrt() / n as f64
        } else {
            column.iter().std_dev() / (n as f64).sqrt()
        });
    }

    Some(Aggregate {
        mean,
        sem,
        weight: total_weight,
        count: n,
    })
}

impl<M: Metric> ResultTree<M> {
    /// Fill every aggregate slot from the leaves.
    ///
    /// Existing aggregates are recomputed, so calling this twice is harmless.
    pub fn aggregate(&mut self) {
        let weighting = self.family.weighting();
        let mut band_keys = BTreeSet::new();

        for file in self.files.values_mut() {
            for unit in file.units.values_mut() {
                for (band_key, band) in unit.bands.iter_mut() {
                    band_keys.insert(band_key.clone());
                    let children: Vec<Observation> = band
                        .slices
                        .iter()
                        .map(|(label, leaf)| Observation {
                            values: leaf.values(),
                            sems: leaf.sems(),
                            weight: weighting.weight(label),
                        })
                        .collect();
                    band.summary = combine(&children, SemPolicy::Propagate);
                }
            }

            file.summary = BTreeMap::new();
            for band_key in &band_keys {
                let children: Vec<Observation> = file
                    .units
                    .values()
                    .filter_map(|unit| unit.bands.get(band_key)?.summary.as_ref())
                    .map(|agg| Observation::new(agg.mean.clone()))
                    .collect();
                if let Some(agg) = combine(&children, SemPolicy::Sample) {
                    file.summary.insert(band_key.clone(), agg);
                }
            }
        }

        self.grand = BTreeMap::new();
        for band_key in &band_keys {
            let children: Vec<Observation> = self
                .files
                .values()
                .filter_map(|file| file.summary.get(band_key))
                .map(|agg| Observation::new(agg.mean.clone()))
                .collect();
            if let Some(agg) = combine(&children, SemPolicy::Sample) {
                self.grand.insert(band_key.clone(), agg);
            }
        }
        log::debug!(
            "aggregated {} {} files over {} band keys",
            self.files.len(),
            self.family.as_str(),
            band_keys.len()
        );
    }
}

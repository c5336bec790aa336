//! `neurocouple analyze`: run metric families and write reports.

use std::path::Path;

use neurocouple_core::{
    AnalysisConfig, Analyzer, Error, FrequencyBand, JsonRecordingLoader, Metric, MetricFamily,
    RecordingCache, Report, Run, Selection, write_rows_csv, write_summary_csv,
};
use serde::Serialize;

/// Components printed per band key before the list is cut short.
const MAX_PRINTED_COMPONENTS: usize = 8;

pub struct AnalyzeCommandConfig<'a> {
    pub files: &'a [String],
    pub channels: &'a str,
    pub ranges: &'a str,
    pub pairs: &'a str,
    pub selection_path: Option<&'a str>,
    pub config_path: Option<&'a str>,
    pub metrics: &'a str,
    pub phase_bands: Option<&'a str>,
    pub amp_bands: Option<&'a str>,
    pub cross_channel: bool,
    pub normalize: bool,
    pub notch: bool,
    pub workers: Option<usize>,
    pub output_dir: Option<&'a str>,
}

pub fn run(cfg: AnalyzeCommandConfig<'_>) {
    let config = build_config(&cfg).unwrap_or_else(|e| super::fail(e));
    let families = parse_families(cfg.metrics).unwrap_or_else(|e| super::fail(e));
    let selection = build_selection(&cfg).unwrap_or_else(|e| super::fail(e));
    if selection.files().is_empty() {
        super::fail("Nothing selected. Pass --selection, or --files with --channels and --ranges.");
    }
    if let Some(dir) = cfg.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            super::fail(format!("Cannot create {dir}: {e}"));
        }
    }

    let cache = RecordingCache::new(JsonRecordingLoader, config.sampling_rate);
    let analyzer = Analyzer::new(&config, &cache);
    println!(
        "Analyzing {} file(s) with {} worker(s)...\n",
        selection.files().len(),
        config.worker_count()
    );

    let mut failed = false;
    for family in families {
        let outcome = match family {
            MetricFamily::Psd => emit(&analyzer.psd(&selection), cfg.output_dir),
            MetricFamily::Pac => emit(&analyzer.pac(&selection), cfg.output_dir),
            MetricFamily::Coherence => emit(&analyzer.coherence(&selection), cfg.output_dir),
            MetricFamily::Comodulogram => emit(&analyzer.comodulogram(&selection), cfg.output_dir),
        };
        if let Err(e) = outcome {
            eprintln!("Failed to write {} reports: {e}", family.as_str());
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn build_config(cfg: &AnalyzeCommandConfig<'_>) -> neurocouple_core::Result<AnalysisConfig> {
    let mut config = match cfg.config_path {
        Some(path) => AnalysisConfig::from_path(Path::new(path))?,
        None => AnalysisConfig::default(),
    };
    if cfg.phase_bands.is_some() || cfg.amp_bands.is_some() {
        let phase = cfg
            .phase_bands
            .map_or_else(|| band_text(&config.pac.phase_bands), str::to_string);
        let amp = cfg
            .amp_bands
            .map_or_else(|| band_text(&config.pac.amplitude_bands), str::to_string);
        config.pac = config.pac.with_band_text(&phase, &amp)?;
    }
    config.pac.cross_channel |= cfg.cross_channel;
    config.normalize |= cfg.normalize;
    config.notch &= cfg.notch;
    if let Some(workers) = cfg.workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn band_text(bands: &[FrequencyBand]) -> String {
    bands
        .iter()
        .map(|b| format!("{} {}", b.low, b.high))
        .collect::<Vec<_>>()
        .join("; ")
}

fn parse_families(text: &str) -> Result<Vec<MetricFamily>, String> {
    let mut families = Vec::new();
    for name in super::split_list(text) {
        let family = MetricFamily::parse(name).ok_or_else(|| {
            format!("Unknown metric '{name}'. Expected psd, pac, coherence or comodulogram.")
        })?;
        if !families.contains(&family) {
            families.push(family);
        }
    }
    if families.is_empty() {
        return Err("No metric families given.".to_string());
    }
    Ok(families)
}

fn build_selection(cfg: &AnalyzeCommandConfig<'_>) -> neurocouple_core::Result<Selection> {
    if let Some(path) = cfg.selection_path {
        let raw = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&raw)?);
    }
    let mut selection = Selection::new();
    let channels = super::split_list(cfg.channels);
    let pairs = super::split_list(cfg.pairs)
        .into_iter()
        .map(|pair| {
            pair.split_once(':')
                .map(|(source, paired)| (source.trim(), paired.trim()))
                .ok_or_else(|| Error::Config {
                    field: "pairs".to_string(),
                    reason: format!("'{pair}' must look like Ch1:Ch2"),
                })
        })
        .collect::<neurocouple_core::Result<Vec<_>>>()?;

    for file in cfg.files {
        for channel in &channels {
            selection.add_ranges(file, channel, cfg.ranges)?;
        }
        for (source, paired) in &pairs {
            if !channels.contains(source) {
                selection.add_ranges(file, source, cfg.ranges)?;
            }
            selection.add_pair(file, source, paired);
        }
    }
    Ok(selection)
}

/// Print the grand summary of one run and write its reports.
fn emit<M: Metric + Serialize>(run: &Run<M>, output_dir: Option<&str>) -> std::io::Result<()> {
    print_summary(run);
    let Some(dir) = output_dir else {
        return Ok(());
    };
    let dir = Path::new(dir);
    let family = run.tree.family.as_str();

    let report = Report::from_run(run).map_err(std::io::Error::other)?;
    report.write_json(&dir.join(format!("{family}.json")))?;
    write_rows_csv(
        &dir.join(format!("{family}_rows.csv")),
        run.tree.family,
        &run.tree.flatten(),
    )?;
    write_summary_csv(&dir.join(format!("{family}_summary.csv")), &run.tree)?;
    println!("  Written to {}/{family}{{.json,_rows.csv,_summary.csv}}\n", dir.display());
    Ok(())
}

fn print_summary<M: Metric>(run: &Run<M>) {
    let tree = &run.tree;
    println!("── {} ──", tree.family.as_str().to_uppercase());
    println!("  {} leaves across {} file(s)", tree.leaf_count(), tree.files.len());
    for (band, agg) in &tree.grand {
        println!("  [{band}] n = {}", agg.count);
        let names = tree.component_names(band);
        for (k, (mean, sem)) in agg.mean.iter().zip(&agg.sem).enumerate().take(MAX_PRINTED_COMPONENTS) {
            let name = names.get(k).map_or("?", String::as_str);
            println!("    {name:<24} {mean:>12.6} ± {sem:.6}");
        }
        if agg.mean.len() > MAX_PRINTED_COMPONENTS {
            println!("    ... {} more", agg.mean.len() - MAX_PRINTED_COMPONENTS);
        }
    }
    for failure in &run.failures {
        println!("  excluded {}: {}", failure.file, failure.reason);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command<'a>(files: &'a [String]) -> AnalyzeCommandConfig<'a> {
        AnalyzeCommandConfig {
            files,
            channels: "Ch1, Ch2",
            ranges: "0 10; 10 40",
            pairs: "Ch1:Ch3",
            selection_path: None,
            config_path: None,
            metrics: "psd",
            phase_bands: None,
            amp_bands: None,
            cross_channel: false,
            normalize: false,
            notch: true,
            workers: None,
            output_dir: None,
        }
    }

    #[test]
    fn families_are_deduplicated() {
        assert_eq!(
            parse_families("psd, PAC, psd, coh").unwrap(),
            vec![MetricFamily::Psd, MetricFamily::Pac, MetricFamily::Coherence]
        );
        assert!(parse_families("erp").is_err());
        assert!(parse_families("").is_err());
    }

    #[test]
    fn selection_from_flags() {
        let files = vec!["a.json".to_string()];
        let selection = build_selection(&command(&files)).unwrap();
        assert_eq!(selection.slices("a.json", "Ch1").len(), 2);
        assert_eq!(selection.slices("a.json", "Ch2").len(), 2);
        assert_eq!(
            selection.pairs["a.json"],
            vec![("Ch1".to_string(), "Ch3".to_string())]
        );
    }

    #[test]
    fn spaced_pair_names_are_trimmed() {
        let files = vec!["a.json".to_string()];
        let cmd = AnalyzeCommandConfig {
            channels: "",
            pairs: "Ch1 : Ch3",
            ..command(&files)
        };
        let selection = build_selection(&cmd).unwrap();
        assert_eq!(
            selection.channels["a.json"].keys().collect::<Vec<_>>(),
            vec!["Ch1"]
        );
        assert_eq!(selection.slices("a.json", "Ch1").len(), 2);
        assert_eq!(
            selection.pairs["a.json"],
            vec![("Ch1".to_string(), "Ch3".to_string())]
        );
    }

    #[test]
    fn bad_pair_is_rejected() {
        let files = vec!["a.json".to_string()];
        let cmd = AnalyzeCommandConfig {
            pairs: "Ch1-Ch3",
            ..command(&files)
        };
        assert!(build_selection(&cmd).is_err());
    }

    #[test]
    fn selection_file_overrides_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sel.json");
        std::fs::write(
            &path,
            r#"{"channels": {"b.json": {"Ch7": [{"start": 0, "end": 5}]}}}"#,
        )
        .unwrap();
        let files = vec!["a.json".to_string()];
        let path = path.to_string_lossy().into_owned();
        let cmd = AnalyzeCommandConfig {
            selection_path: Some(&path),
            ..command(&files)
        };
        let selection = build_selection(&cmd).unwrap();
        assert_eq!(selection.files().into_iter().collect::<Vec<_>>(), vec!["b.json"]);
    }

    #[test]
    fn flag_overrides_apply_to_config() {
        let files = vec![];
        let cmd = AnalyzeCommandConfig {
            amp_bands: Some("60 90"),
            cross_channel: true,
            notch: false,
            workers: Some(3),
            ..command(&files)
        };
        let config = build_config(&cmd).unwrap();
        assert_eq!(config.pac.phase_bands, vec![FrequencyBand::new(4.0, 10.0)]);
        assert_eq!(config.pac.amplitude_bands, vec![FrequencyBand::new(60.0, 90.0)]);
        assert!(config.pac.cross_channel);
        assert!(!config.notch);
        assert_eq!(config.worker_count(), 3);
    }
}

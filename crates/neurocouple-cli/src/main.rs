//! CLI for neurocouple: spectral power, coupling and coherence over recordings.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "neurocouple")]
#[command(about = "neurocouple: spectral power, cross-frequency coupling and coherence with mean/SEM rollups")]
#[command(version = neurocouple_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run metric families over JSON recordings and report grand means.
    /// Slices come from --selection, or from --files/--channels/--ranges.
    Analyze {
        /// Recording files (JSON: {"<channel>": {"values": [...], "times": [...]}})
        #[arg(long, num_args = 1..)]
        files: Vec<String>,

        /// Comma-separated channels to slice in every file
        #[arg(long, default_value = "")]
        channels: String,

        /// Time slices in seconds, e.g. "0 10; 10 40"
        #[arg(long, default_value = "")]
        ranges: String,

        /// Comma-separated channel pairs for coherence and cross-channel PAC, e.g. "Ch1:Ch2"
        #[arg(long, default_value = "")]
        pairs: String,

        /// Selection JSON ({"channels": {file: {channel: [{start, end}]}}, "pairs": {...}}); overrides --files
        #[arg(long)]
        selection: Option<String>,

        /// Analysis configuration JSON; missing fields take defaults
        #[arg(long)]
        config: Option<String>,

        /// Comma-separated metric families: psd, pac, coherence, comodulogram
        #[arg(long, default_value = "psd")]
        metrics: String,

        /// PAC phase bands, e.g. "4 10"
        #[arg(long)]
        phase_bands: Option<String>,

        /// PAC amplitude bands, e.g. "30 55; 55 100"
        #[arg(long)]
        amp_bands: Option<String>,

        /// Take PAC phase and amplitude from --pairs instead of one channel
        #[arg(long)]
        cross_channel: bool,

        /// Z-score channels before PSD
        #[arg(long)]
        normalize: bool,

        /// Skip the mains notch cascade
        #[arg(long)]
        no_notch: bool,

        /// Worker threads (0 = all cores)
        #[arg(long)]
        workers: Option<usize>,

        /// Directory for <family>.json, <family>_rows.csv and <family>_summary.csv
        #[arg(long)]
        output_dir: Option<String>,
    },

    /// List channels, sampling rates and durations of recordings
    Channels {
        /// Recording files
        #[arg(required = true)]
        files: Vec<String>,

        /// Sampling rate for channels without a time axis
        #[arg(long, default_value = "2000")]
        sampling_rate: f64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            files,
            channels,
            ranges,
            pairs,
            selection,
            config,
            metrics,
            phase_bands,
            amp_bands,
            cross_channel,
            normalize,
            no_notch,
            workers,
            output_dir,
        } => commands::analyze::run(commands::analyze::AnalyzeCommandConfig {
            files: &files,
            channels: &channels,
            ranges: &ranges,
            pairs: &pairs,
            selection_path: selection.as_deref(),
            config_path: config.as_deref(),
            metrics: &metrics,
            phase_bands: phase_bands.as_deref(),
            amp_bands: amp_bands.as_deref(),
            cross_channel,
            normalize,
            notch: !no_notch,
            workers,
            output_dir: output_dir.as_deref(),
        }),
        Commands::Channels {
            files,
            sampling_rate,
        } => commands::channels::run(&files, sampling_rate),
    }
}

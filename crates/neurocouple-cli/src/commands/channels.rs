//! `neurocouple channels`: list what a recording contains.

use neurocouple_core::{JsonRecordingLoader, RecordingCache};

/// Run the channels command.
pub fn run(files: &[String], sampling_rate: f64) {
    let cache = RecordingCache::new(JsonRecordingLoader, sampling_rate);
    let mut failed = false;
    for file in files {
        let recording = match cache.get(file) {
            Ok(rec) => rec,
            Err(e) => {
                eprintln!("{e}");
                failed = true;
                continue;
            }
        };
        println!("{file}");
        if recording.channels.is_empty() {
            println!("  (no channels)");
        }
        for (name, channel) in &recording.channels {
            println!(
                "  {:<24} {:>8} samples  {:>8.1} Hz  {:>9.2} s",
                name,
                channel.values.len(),
                channel.sampling_rate,
                channel.duration()
            );
        }
    }
    if failed {
        std::process::exit(1);
    }
}

//! Terminal front end: records one lecture, stopping on Enter.
//!
//! Usage: `lecture-recorder [path/to/recorder.toml]`

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use lecture_capture_core::{Recorder, RecorderConfig};
use lecture_capture_host::CpalBackend;

const STATUS_POLL: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(RecorderConfig::default_path);
    let config = RecorderConfig::load_or_default(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let recorder = Recorder::new(config, Arc::new(CpalBackend::new())).context("initializing recorder")?;
    let started = recorder.start().context("starting recording")?;
    println!("{}", serde_json::to_string_pretty(&started)?);
    eprintln!("Recording #{}. Press Enter to stop.", started.sequence_number);

    let signal = recorder.stop_signal();
    thread::Builder::new()
        .name("stop-key".into())
        .spawn(move || {
            let mut line = String::new();
            if let Err(e) = io::stdin().read_line(&mut line) {
                log::warn!("Could not read stdin: {}", e);
            }
            signal.trigger();
        })
        .context("spawning stop listener")?;

    loop {
        thread::sleep(STATUS_POLL);
        let status = recorder.status();
        if !status.recording {
            if let Some(error) = &status.error {
                log::error!("Capture stopped: {}", error);
            }
            break;
        }
        log::debug!(
            "Recording {:.1}s, {} chunks",
            status.duration_seconds,
            status.chunks_captured
        );
    }

    let report = recorder.stop();
    println!("{}", serde_json::to_string_pretty(&report)?);

    let cleanup = recorder.cleanup();
    if !cleanup.clean {
        log::warn!("{}", cleanup.message);
    }

    match report.error {
        Some(error) if report.filename.is_none() => anyhow::bail!("recording failed: {}", error),
        _ => Ok(()),
    }
}

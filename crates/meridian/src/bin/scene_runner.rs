//! # Scene Runner
//!
//! Headless runner for a rhai scene against a local host.
//!
//! ```bash
//! scene_runner demos/rotating_cube.rhai demos/session.toml 300
//! RUST_LOG=meridian::script=debug scene_runner scene.rhai
//! ```
//!
//! Ticks are paced at the configured tick rate. The process exits non-zero
//! if the scene fails to load or is terminated by a fault.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Instant;

use tracing::{error, info, warn};

use meridian::{init_telemetry, SceneSession, SessionConfig, SessionError, SessionSummary};

const DEFAULT_TICKS: u64 = 300;

struct Args {
    script: PathBuf,
    config: Option<PathBuf>,
    ticks: u64,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let script = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| "usage: scene_runner <script.rhai> [config.toml] [ticks]".to_string())?;
    let config = args.next().map(PathBuf::from);
    let ticks = match args.next() {
        Some(text) => text
            .parse()
            .map_err(|_| format!("invalid tick count: {text}"))?,
        None => DEFAULT_TICKS,
    };
    Ok(Args {
        script,
        config,
        ticks,
    })
}

fn run(args: &Args) -> Result<SessionSummary, SessionError> {
    let config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    init_telemetry(&config.log_level)?;

    let interval = config.tick_interval();
    let dt = config.delta_time();
    let mut session = SceneSession::from_script_file(&args.script, config)?;
    session.start()?;
    info!(script = %args.script.display(), ticks = args.ticks, "Scene started");

    for _ in 0..args.ticks {
        let started = Instant::now();
        if let meridian::TickOutcome::Terminated(err) = session.tick(dt)? {
            error!(error = %err, "Scene terminated");
            break;
        }
        let elapsed = started.elapsed();
        if elapsed > interval {
            warn!(elapsed_us = elapsed.as_micros() as u64, "Tick over budget");
        } else {
            thread::sleep(interval - elapsed);
        }
    }

    session.shutdown()
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(summary) => {
            info!(
                completed = summary.completed,
                rejected = summary.rejected,
                faulted = summary.faulted,
                "Scene finished"
            );
            if summary.faulted {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            // The subscriber may not be installed yet.
            eprintln!("scene_runner: {err}");
            ExitCode::FAILURE
        }
    }
}

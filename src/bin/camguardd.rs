//! camguardd - the camguard monitor daemon.
//!
//! Captures frames from the configured camera on a dedicated worker
//! thread, publishes the latest JPEG for viewers, scores motion, and
//! persists throttled alert snapshots until the process is stopped.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camguard::{open_source, GuardConfig, Monitor};

#[derive(Parser, Debug)]
#[command(name = "camguardd", about = "Single-camera motion monitor daemon")]
struct Args {
    /// Path to a JSON config file (falls back to CAMGUARD_CONFIG).
    #[arg(long, env = "CAMGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the snapshot directory.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Override the camera URL (stub:// or http(s)://).
    #[arg(long)]
    camera_url: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => GuardConfig::load_from(path)?,
        None => GuardConfig::load()?,
    };
    if let Some(dir) = args.snapshot_dir {
        cfg.snapshot_dir = dir;
    }
    if let Some(url) = args.camera_url {
        cfg.camera.url = url;
    }

    log::info!(
        "camguardd starting: camera={} snapshot_dir={} threshold={} max_snapshots={}",
        cfg.camera.url,
        cfg.snapshot_dir.display(),
        cfg.motion_threshold,
        cfg.max_snapshots
    );

    let mut source = open_source(&cfg.camera)?;
    source.connect().context("connect camera source")?;

    let monitor = Monitor::new(cfg)?;
    let _worker = monitor.spawn(source)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("install ctrl-c handler")?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("camguardd shutting down");
    Ok(())
}

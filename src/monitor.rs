//! Capture loop orchestrator and the query interface for the web layer.
//!
//! One `Monitor` is the explicit context object for the whole process:
//! it owns the shared frame buffer, the motion history, the snapshot store,
//! the alert throttle, and the outbound alert channel. The capture loop
//! runs on a single long-lived worker thread; request handlers call the
//! query methods concurrently from their own threads.
//!
//! Nothing in the loop is fatal: capture, encode, store, and delivery
//! failures are logged in place and the loop continues.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::alert::{AlertChannel, NullChannel, TelegramChannel};
use crate::camera::FrameSource;
use crate::config::GuardConfig;
use crate::frame::{Frame, LatestFrame};
use crate::motion::MotionEngine;
use crate::now_s;
use crate::series::{MotionSeries, SeriesView};
use crate::store::SnapshotStore;
use crate::throttle::AlertThrottle;

/// Counters handed to the status endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct MonitorStatus {
    pub motion_score: u64,
    pub threshold: u64,
    pub last_alert_epoch: u64,
    pub snapshot_count: usize,
    pub bytes_used: u64,
}

/// Outcome of a delete request; missing snapshots are not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Process-wide monitor context. Shared via `Arc`; no implicit singletons.
pub struct Monitor {
    cfg: GuardConfig,
    latest: LatestFrame,
    series: MotionSeries,
    store: SnapshotStore,
    throttle: Mutex<AlertThrottle>,
    last_score: AtomicU64,
    alerts: Box<dyn AlertChannel>,
}

impl Monitor {
    pub fn new(cfg: GuardConfig) -> Result<Arc<Self>> {
        let store = SnapshotStore::open(&cfg.snapshot_dir, cfg.max_snapshots, cfg.retention())?;
        let series = MotionSeries::new(cfg.bucket_seconds, cfg.window_hours)?;
        let alerts: Box<dyn AlertChannel> = match &cfg.telegram {
            Some(tg) => Box::new(TelegramChannel::new(&tg.bot_token, &tg.chat_id)),
            None => Box::new(NullChannel),
        };
        let throttle = Mutex::new(AlertThrottle::new(cfg.notify_interval_secs));
        Ok(Arc::new(Self {
            cfg,
            latest: LatestFrame::new(),
            series,
            store,
            throttle,
            last_score: AtomicU64::new(0),
            alerts,
        }))
    }

    pub fn config(&self) -> &GuardConfig {
        &self.cfg
    }

    // ------------------------------------------------------------------
    // Capture loop
    // ------------------------------------------------------------------

    /// Run the capture loop on a named worker thread.
    pub fn spawn(self: &Arc<Self>, source: Box<dyn FrameSource>) -> Result<JoinHandle<()>> {
        let monitor = Arc::clone(self);
        std::thread::Builder::new()
            .name("camguard-capture".to_string())
            .spawn(move || monitor.run(source))
            .context("spawn capture thread")
    }

    /// The capture loop. Runs forever; only process shutdown ends it.
    pub fn run(&self, mut source: Box<dyn FrameSource>) {
        let mut engine = MotionEngine::new(self.cfg.motion_threshold);
        let mut last_health_log = std::time::Instant::now();
        log::info!(
            "capture loop running (threshold={}, snapshot dir {})",
            self.cfg.motion_threshold,
            self.cfg.snapshot_dir.display()
        );

        loop {
            match source.next_frame() {
                Ok(frame) => {
                    let now = now_s().unwrap_or(0);
                    self.process_frame(&mut engine, &frame, now);
                }
                Err(e) => {
                    log::warn!("frame capture failed: {}", e);
                }
            }

            if last_health_log.elapsed() >= std::time::Duration::from_secs(30) {
                let stats = source.stats();
                log::info!(
                    "camera health={} frames={} source={} score={}",
                    source.is_healthy(),
                    stats.frames_captured,
                    stats.source,
                    self.last_score.load(Ordering::Relaxed)
                );
                last_health_log = std::time::Instant::now();
            }

            if !self.cfg.frame_interval.is_zero() {
                std::thread::sleep(self.cfg.frame_interval);
            }
        }
    }

    /// One capture iteration: publish, score, and alert on trigger.
    ///
    /// Exposed separately from [`run`](Self::run) so tests can drive
    /// iterations with controlled clocks.
    pub fn process_frame(&self, engine: &mut MotionEngine, frame: &Frame, now: u64) {
        // Publish first so viewers track the stream even when scoring or
        // alerting fails. A failed encode keeps the stale frame visible.
        let encoded = match frame.encode_jpeg() {
            Ok(jpeg) => {
                self.latest.publish(jpeg.clone());
                Some(jpeg)
            }
            Err(e) => {
                log::warn!("jpeg encode failed; keeping previous frame: {}", e);
                None
            }
        };

        let detection = match engine.score(frame, now, &self.series) {
            Ok(detection) => detection,
            Err(e) => {
                log::warn!("motion scoring failed: {}", e);
                return;
            }
        };
        self.last_score.store(detection.score, Ordering::Relaxed);

        if !detection.triggered {
            return;
        }

        let allowed = match self.throttle.lock() {
            Ok(mut throttle) => throttle.allow(now),
            Err(_) => {
                log::error!("alert throttle lock poisoned; suppressing alert");
                false
            }
        };
        if !allowed {
            return;
        }

        log::info!("motion detected (score={}); handling", detection.score);
        if let Some(jpeg) = &encoded {
            self.alerts.notify(jpeg);
        }
        if let Err(e) = self
            .store
            .add(frame, &format!("motion_{}.jpg", now))
        {
            log::warn!("failed to persist motion snapshot: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Interface for the (external) web layer
    // ------------------------------------------------------------------

    /// Most recent published JPEG, or `None` before the first capture.
    pub fn latest_frame(&self) -> Option<Vec<u8>> {
        self.latest.snapshot()
    }

    pub fn status(&self) -> Result<MonitorStatus> {
        let last_alert_epoch = self
            .throttle
            .lock()
            .map_err(|_| anyhow!("alert throttle lock poisoned"))?
            .last_notify();
        Ok(MonitorStatus {
            motion_score: self.last_score.load(Ordering::Relaxed),
            threshold: self.cfg.motion_threshold,
            last_alert_epoch,
            snapshot_count: self.store.count()?,
            bytes_used: self.store.bytes_used()?,
        })
    }

    /// Snapshot file names in current index order.
    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list()?
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    pub fn motion_series(&self, hours: u64) -> Result<SeriesView> {
        self.series.query(hours, now_s()?)
    }

    /// Persist the latest published frame as `manual_<epoch>.jpg`.
    pub fn save_manual_snapshot(&self) -> Result<String> {
        let Some(jpeg) = self.latest.snapshot() else {
            bail!("no frame captured yet");
        };
        let frame = Frame::from_jpeg(&jpeg)?;
        let filename = format!("manual_{}.jpg", now_s()?);
        self.store.add(&frame, &filename)?;
        Ok(filename)
    }

    /// Delete one snapshot by file name. Names that escape the snapshot
    /// directory are treated as not found.
    pub fn delete_snapshot(&self, name: &str) -> Result<DeleteOutcome> {
        if !is_safe_snapshot_name(name) {
            return Ok(DeleteOutcome::NotFound);
        }
        let path = self.store.dir().join(name);
        if !path.exists() {
            return Ok(DeleteOutcome::NotFound);
        }
        self.store.remove(&path)?;
        Ok(DeleteOutcome::Deleted)
    }
}

/// Reject path traversal: plain `*.jpg` file names only.
fn is_safe_snapshot_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && name.ends_with(".jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_name_guard_rejects_traversal() {
        assert!(is_safe_snapshot_name("motion_123.jpg"));
        assert!(is_safe_snapshot_name("manual_123.jpg"));
        assert!(!is_safe_snapshot_name("../etc/passwd"));
        assert!(!is_safe_snapshot_name("a/b.jpg"));
        assert!(!is_safe_snapshot_name("a\\b.jpg"));
        assert!(!is_safe_snapshot_name("notes.txt"));
        assert!(!is_safe_snapshot_name(""));
    }
}

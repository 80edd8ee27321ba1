//! camguard - single-camera motion monitor.
//!
//! Continuously captures frames from one camera, scores each frame for
//! motion, throttles and persists alerts, and exposes the latest encoded
//! frame plus alert history to a web layer (out of scope for this crate).
//!
//! # Module Structure
//!
//! - `frame`: RGB frame model, JPEG codec, shared latest-frame buffer
//! - `camera`: frame sources (HTTP MJPEG/snapshot cameras, synthetic stub)
//! - `motion`: motion scoring engine (blur, diff, threshold, dilate)
//! - `series`: time-bucketed motion score history
//! - `store`: directory-backed, capacity/age-bounded snapshot store
//! - `throttle`: minimum-interval alert gate
//! - `alert`: outbound push-notification channel (Telegram)
//! - `monitor`: the capture loop orchestrator and the query interface
//!
//! One long-lived worker thread runs the capture loop; request-handling
//! threads read shared state through `Monitor`. All shared state is behind
//! short mutex-guarded critical sections.

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod alert;
pub mod camera;
pub mod config;
pub mod frame;
pub mod monitor;
pub mod motion;
pub mod series;
pub mod store;
pub mod throttle;

pub use alert::{AlertChannel, NullChannel, TelegramChannel};
pub use camera::{open_source, CameraConfig, FrameSource, SourceStats, SyntheticSource};
pub use config::GuardConfig;
pub use frame::{Frame, LatestFrame};
pub use monitor::{DeleteOutcome, Monitor, MonitorStatus};
pub use motion::{Detection, MotionEngine};
pub use series::{MotionSeries, SeriesView};
pub use store::SnapshotStore;
pub use throttle::AlertThrottle;

/// Seconds since the Unix epoch.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::CameraConfig;

const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_TARGET_FPS: u32 = 20;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
const DEFAULT_FRAME_INTERVAL_MS: u64 = 50;
const DEFAULT_NOTIFY_INTERVAL_SECS: u64 = 60;
const DEFAULT_MOTION_THRESHOLD: u64 = 500_000;
const DEFAULT_MAX_SNAPSHOTS: usize = 200;
const DEFAULT_RETENTION_DAYS: u64 = 20;
const DEFAULT_BUCKET_SECONDS: u64 = 5;
const DEFAULT_WINDOW_HOURS: u64 = 24;

#[derive(Debug, Deserialize, Default)]
struct GuardConfigFile {
    camera: Option<CameraConfigFile>,
    snapshot_dir: Option<PathBuf>,
    frame_interval_ms: Option<u64>,
    notify_interval_secs: Option<u64>,
    motion_threshold: Option<u64>,
    max_snapshots: Option<usize>,
    retention_days: Option<u64>,
    bucket_seconds: Option<u64>,
    window_hours: Option<u64>,
    telegram: Option<TelegramConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TelegramConfigFile {
    bot_token: Option<String>,
    chat_id: Option<String>,
}

/// Alert delivery credentials; alerts are disabled when absent.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub camera: CameraConfig,
    pub snapshot_dir: PathBuf,
    /// Minimum pause between capture iterations (rate limiter, not a
    /// precise scheduler).
    pub frame_interval: Duration,
    pub notify_interval_secs: u64,
    pub motion_threshold: u64,
    pub max_snapshots: usize,
    pub retention_days: u64,
    pub bucket_seconds: u64,
    pub window_hours: u64,
    pub telegram: Option<TelegramSettings>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::from_file(GuardConfigFile::default())
    }
}

impl GuardConfig {
    /// Load configuration: optional JSON file named by `CAMGUARD_CONFIG`,
    /// then field-by-field environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMGUARD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file path (CLI override), plus env and
    /// validation as in [`load`](Self::load).
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuardConfigFile) -> Self {
        let camera = CameraConfig {
            url: file
                .camera
                .as_ref()
                .and_then(|cam| cam.url.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|cam| cam.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            width: file
                .camera
                .as_ref()
                .and_then(|cam| cam.width)
                .unwrap_or(DEFAULT_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|cam| cam.height)
                .unwrap_or(DEFAULT_HEIGHT),
        };
        let telegram = file.telegram.and_then(|tg| match (tg.bot_token, tg.chat_id) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramSettings { bot_token, chat_id }),
            _ => None,
        });
        Self {
            camera,
            snapshot_dir: file
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            frame_interval: Duration::from_millis(
                file.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
            ),
            notify_interval_secs: file
                .notify_interval_secs
                .unwrap_or(DEFAULT_NOTIFY_INTERVAL_SECS),
            motion_threshold: file.motion_threshold.unwrap_or(DEFAULT_MOTION_THRESHOLD),
            max_snapshots: file.max_snapshots.unwrap_or(DEFAULT_MAX_SNAPSHOTS),
            retention_days: file.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            bucket_seconds: file.bucket_seconds.unwrap_or(DEFAULT_BUCKET_SECONDS),
            window_hours: file.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS),
            telegram,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CAMGUARD_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(dir) = std::env::var("CAMGUARD_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot_dir = PathBuf::from(dir);
            }
        }
        if let Ok(threshold) = std::env::var("CAMGUARD_MOTION_THRESHOLD") {
            self.motion_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("CAMGUARD_MOTION_THRESHOLD must be an integer"))?;
        }
        if let Ok(interval) = std::env::var("CAMGUARD_NOTIFY_INTERVAL_SECS") {
            self.notify_interval_secs = interval.parse().map_err(|_| {
                anyhow!("CAMGUARD_NOTIFY_INTERVAL_SECS must be an integer number of seconds")
            })?;
        }
        if let Ok(max) = std::env::var("CAMGUARD_MAX_SNAPSHOTS") {
            self.max_snapshots = max
                .parse()
                .map_err(|_| anyhow!("CAMGUARD_MAX_SNAPSHOTS must be an integer"))?;
        }
        let bot_token = std::env::var("CAMGUARD_TELEGRAM_BOT_TOKEN").ok();
        let chat_id = std::env::var("CAMGUARD_TELEGRAM_CHAT_ID").ok();
        if let (Some(bot_token), Some(chat_id)) = (bot_token, chat_id) {
            if !bot_token.trim().is_empty() && !chat_id.trim().is_empty() {
                self.telegram = Some(TelegramSettings { bot_token, chat_id });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be greater than zero"));
        }
        if self.bucket_seconds == 0 {
            return Err(anyhow!("bucket_seconds must be greater than zero"));
        }
        if self.window_hours == 0 {
            return Err(anyhow!("window_hours must be greater than zero"));
        }
        if self.max_snapshots == 0 {
            return Err(anyhow!("max_snapshots must be greater than zero"));
        }
        Ok(())
    }

    /// Snapshot retention bound as a duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }
}

fn read_config_file(path: &Path) -> Result<GuardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

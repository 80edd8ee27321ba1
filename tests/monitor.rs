use std::time::Duration;

use camguard::{now_s, DeleteOutcome, Frame, GuardConfig, Monitor, MotionEngine};
use tempfile::TempDir;

const W: u32 = 64;
const H: u32 = 48;

fn background() -> Frame {
    Frame::new(vec![24u8; (W * H * 3) as usize], W, H).unwrap()
}

fn with_bright_block() -> Frame {
    let mut data = vec![24u8; (W * H * 3) as usize];
    for y in 8..32 {
        for x in 8..48 {
            let i = ((y * W + x) * 3) as usize;
            data[i] = 235;
            data[i + 1] = 235;
            data[i + 2] = 235;
        }
    }
    Frame::new(data, W, H).unwrap()
}

fn test_config(dir: &TempDir) -> GuardConfig {
    let mut cfg = GuardConfig::default();
    cfg.snapshot_dir = dir.path().to_path_buf();
    cfg.motion_threshold = 10_000;
    cfg.notify_interval_secs = 60;
    cfg.max_snapshots = 5;
    cfg.frame_interval = Duration::from_millis(0);
    cfg
}

#[test]
fn warm_up_never_triggers() {
    let dir = TempDir::new().unwrap();
    let monitor = Monitor::new(test_config(&dir)).unwrap();
    let mut engine = MotionEngine::new(monitor.config().motion_threshold);

    let now = now_s().unwrap();
    monitor.process_frame(&mut engine, &with_bright_block(), now);

    // Loud first frame: published, but no alert and no snapshot.
    assert!(monitor.latest_frame().is_some());
    assert!(monitor.list_snapshots().unwrap().is_empty());
    let status = monitor.status().unwrap();
    assert_eq!(status.motion_score, 0);
    assert_eq!(status.last_alert_epoch, 0);
}

#[test]
fn motion_trigger_persists_snapshot_and_updates_status() {
    let dir = TempDir::new().unwrap();
    let monitor = Monitor::new(test_config(&dir)).unwrap();
    let mut engine = MotionEngine::new(monitor.config().motion_threshold);

    let t0 = now_s().unwrap();
    monitor.process_frame(&mut engine, &background(), t0);
    monitor.process_frame(&mut engine, &with_bright_block(), t0 + 1);

    let names = monitor.list_snapshots().unwrap();
    assert_eq!(names, vec![format!("motion_{}.jpg", t0 + 1)]);
    assert!(dir.path().join(&names[0]).exists());

    let status = monitor.status().unwrap();
    assert!(status.motion_score > status.threshold);
    assert_eq!(status.last_alert_epoch, t0 + 1);
    assert_eq!(status.snapshot_count, 1);
    assert!(status.bytes_used > 0);
}

#[test]
fn throttle_suppresses_alerts_within_interval() {
    let dir = TempDir::new().unwrap();
    let monitor = Monitor::new(test_config(&dir)).unwrap();
    let mut engine = MotionEngine::new(monitor.config().motion_threshold);

    let t0 = now_s().unwrap();
    monitor.process_frame(&mut engine, &background(), t0);
    monitor.process_frame(&mut engine, &with_bright_block(), t0 + 1);
    // Back to background: still a large diff, but inside the window.
    monitor.process_frame(&mut engine, &background(), t0 + 10);
    assert_eq!(monitor.status().unwrap().snapshot_count, 1);

    // Past the interval the next trigger lands.
    monitor.process_frame(&mut engine, &with_bright_block(), t0 + 90);
    assert_eq!(monitor.status().unwrap().snapshot_count, 2);
    assert_eq!(monitor.status().unwrap().last_alert_epoch, t0 + 90);
}

#[test]
fn motion_series_reflects_recorded_samples() {
    let dir = TempDir::new().unwrap();
    let monitor = Monitor::new(test_config(&dir)).unwrap();
    let mut engine = MotionEngine::new(monitor.config().motion_threshold);

    let t0 = now_s().unwrap();
    monitor.process_frame(&mut engine, &background(), t0 - 10);
    monitor.process_frame(&mut engine, &with_bright_block(), t0);

    let view = monitor.motion_series(1).unwrap();
    assert_eq!(view.bucket_seconds, monitor.config().bucket_seconds);
    assert!(!view.scores.is_empty());
    assert_eq!(view.timestamps.len(), view.scores.len());
    assert!(view.scores.iter().max().copied().unwrap() > 10_000);
}

#[test]
fn manual_snapshot_requires_a_published_frame() {
    let dir = TempDir::new().unwrap();
    let monitor = Monitor::new(test_config(&dir)).unwrap();
    assert!(monitor.save_manual_snapshot().is_err());
    assert!(monitor.latest_frame().is_none());
}

#[test]
fn manual_snapshot_save_and_delete() {
    let dir = TempDir::new().unwrap();
    let monitor = Monitor::new(test_config(&dir)).unwrap();
    let mut engine = MotionEngine::new(monitor.config().motion_threshold);

    monitor.process_frame(&mut engine, &background(), now_s().unwrap());
    let filename = monitor.save_manual_snapshot().unwrap();
    assert!(filename.starts_with("manual_"));
    assert!(dir.path().join(&filename).exists());
    assert!(monitor.list_snapshots().unwrap().contains(&filename));

    assert_eq!(
        monitor.delete_snapshot(&filename).unwrap(),
        DeleteOutcome::Deleted
    );
    assert!(!dir.path().join(&filename).exists());
    assert_eq!(
        monitor.delete_snapshot(&filename).unwrap(),
        DeleteOutcome::NotFound
    );
}

#[test]
fn delete_rejects_traversal_names() {
    let dir = TempDir::new().unwrap();
    let monitor = Monitor::new(test_config(&dir)).unwrap();
    assert_eq!(
        monitor.delete_snapshot("../outside.jpg").unwrap(),
        DeleteOutcome::NotFound
    );
    assert_eq!(
        monitor.delete_snapshot("").unwrap(),
        DeleteOutcome::NotFound
    );
}

#[test]
fn capacity_bound_holds_across_triggers() {
    let dir = TempDir::new().unwrap();
    let mut cfg = test_config(&dir);
    cfg.max_snapshots = 2;
    cfg.notify_interval_secs = 0;
    let monitor = Monitor::new(cfg).unwrap();
    let mut engine = MotionEngine::new(monitor.config().motion_threshold);

    let t0 = now_s().unwrap();
    monitor.process_frame(&mut engine, &background(), t0);
    for i in 1..6u64 {
        // Alternate so every frame differs from its baseline.
        let frame = if i % 2 == 0 {
            background()
        } else {
            with_bright_block()
        };
        monitor.process_frame(&mut engine, &frame, t0 + i);
        assert!(monitor.status().unwrap().snapshot_count <= 2);
    }
    // The two most recent triggers survive.
    let names = monitor.list_snapshots().unwrap();
    assert_eq!(
        names,
        vec![
            format!("motion_{}.jpg", t0 + 4),
            format!("motion_{}.jpg", t0 + 5)
        ]
    );
}

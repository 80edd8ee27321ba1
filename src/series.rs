//! Time-bucketed motion score history.
//!
//! The capture loop is the only writer; chart and status queries read
//! concurrently from request threads, so the series carries its own lock,
//! independent of the scoring engine's baseline state.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::VecDeque;

/// Parallel timestamp/score sequences returned to the chart layer.
#[derive(Clone, Debug, Serialize)]
pub struct SeriesView {
    pub timestamps: Vec<u64>,
    pub scores: Vec<u64>,
    pub bucket_seconds: u64,
}

struct SeriesInner {
    /// `(bucket_timestamp, max score seen in bucket)`, ascending by bucket.
    samples: VecDeque<(u64, u64)>,
    last_bucket: Option<u64>,
}

/// Bounded ring buffer of per-bucket motion scores.
///
/// Capacity is `window_hours * 3600 / bucket_seconds`. Eviction is by slot
/// count (FIFO), not wall-clock age: a stalled writer leaves old samples in
/// place until new buckets push them out.
pub struct MotionSeries {
    bucket_seconds: u64,
    capacity: usize,
    inner: std::sync::Mutex<SeriesInner>,
}

impl MotionSeries {
    pub fn new(bucket_seconds: u64, window_hours: u64) -> Result<Self> {
        if bucket_seconds == 0 {
            return Err(anyhow!("bucket width must be > 0 seconds"));
        }
        let capacity = (window_hours * 3600 / bucket_seconds) as usize;
        if capacity == 0 {
            return Err(anyhow!(
                "window of {} hours holds no {}-second buckets",
                window_hours,
                bucket_seconds
            ));
        }
        Ok(Self {
            bucket_seconds,
            capacity,
            inner: std::sync::Mutex::new(SeriesInner {
                samples: VecDeque::with_capacity(capacity),
                last_bucket: None,
            }),
        })
    }

    pub fn bucket_seconds(&self) -> u64 {
        self.bucket_seconds
    }

    /// Record a score observed at `now` (seconds since epoch).
    ///
    /// Scores landing in the most recently written bucket only ever raise
    /// its value; a new bucket appends and evicts the oldest slot once the
    /// ring is full. The single writer calls with non-decreasing `now`, so
    /// buckets stay in ascending order by construction.
    pub fn record(&self, score: u64, now: u64) -> Result<()> {
        let bucket = now / self.bucket_seconds * self.bucket_seconds;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("motion series lock poisoned"))?;

        if inner.last_bucket == Some(bucket) {
            if let Some(last) = inner.samples.back_mut() {
                if score > last.1 {
                    last.1 = score;
                }
                return Ok(());
            }
        }

        inner.samples.push_back((bucket, score));
        if inner.samples.len() > self.capacity {
            inner.samples.pop_front();
        }
        inner.last_bucket = Some(bucket);
        Ok(())
    }

    /// Samples from the trailing `hours` window, ascending by bucket.
    pub fn query(&self, hours: u64, now: u64) -> Result<SeriesView> {
        let cutoff = now.saturating_sub(hours * 3600);
        let inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("motion series lock poisoned"))?;

        let mut timestamps = Vec::new();
        let mut scores = Vec::new();
        for &(bucket, score) in inner.samples.iter().filter(|(b, _)| *b >= cutoff) {
            timestamps.push(bucket);
            scores.push(score);
        }
        Ok(SeriesView {
            timestamps,
            scores,
            bucket_seconds: self.bucket_seconds,
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().samples.len()
    }
}

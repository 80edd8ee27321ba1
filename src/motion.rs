//! Motion scoring engine.
//!
//! Pure in-memory computation: each frame is converted to grayscale, blurred
//! to suppress sensor noise, and differenced against the previous blurred
//! frame. Changed pixels are binarized, dilated into contiguous blobs, and
//! summed into an integer score proportional to the changed area.
//!
//! The baseline is a single previous frame, replaced wholesale on every
//! call. There is no rolling average or decay; that is the intended model,
//! not a shortcut.

use anyhow::Result;
use image::{imageops, GrayImage, RgbImage};

use crate::frame::Frame;
use crate::series::MotionSeries;

/// Gaussian sigma equivalent to OpenCV's 21x21 kernel with auto sigma.
const BLUR_SIGMA: f32 = 3.5;

/// Per-pixel intensity delta below which a change is treated as noise.
const DIFF_CUTOFF: u8 = 25;

/// Dilation passes merging nearby changed pixels into blobs.
const DILATE_ITERATIONS: u32 = 2;

/// Contribution of one changed pixel to the score.
const CHANGED_WEIGHT: u64 = 255;

/// Outcome of scoring one frame.
#[derive(Clone, Copy, Debug)]
pub struct Detection {
    pub triggered: bool,
    pub score: u64,
}

impl Detection {
    fn warm_up() -> Self {
        Self {
            triggered: false,
            score: 0,
        }
    }
}

/// Frame-difference motion scorer.
///
/// Exclusively owned by the capture loop; the baseline is not shared. The
/// history series passed to [`score`](Self::score) carries its own lock for
/// concurrent chart queries.
pub struct MotionEngine {
    threshold: u64,
    baseline: Option<GrayImage>,
}

impl MotionEngine {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            baseline: None,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Score one frame against the stored baseline and record the sample.
    ///
    /// The first call after engine creation only establishes the baseline
    /// and always reports `triggered=false, score=0`; the warm-up sample is
    /// still recorded (as score 0) so the chart has no gap at startup.
    pub fn score(&mut self, frame: &Frame, now: u64, series: &MotionSeries) -> Result<Detection> {
        let gray = blurred_grayscale(frame);

        let detection = match self.baseline.take() {
            None => Detection::warm_up(),
            Some(prev) if prev.dimensions() != gray.dimensions() => {
                // Mid-stream resolution change; the old baseline is
                // meaningless, so warm up again.
                log::debug!(
                    "frame size changed {:?} -> {:?}; resetting motion baseline",
                    prev.dimensions(),
                    gray.dimensions()
                );
                Detection::warm_up()
            }
            Some(prev) => {
                let score = changed_area_score(&prev, &gray);
                Detection {
                    triggered: score > self.threshold,
                    score,
                }
            }
        };

        self.baseline = Some(gray);
        series.record(detection.score, now)?;
        Ok(detection)
    }
}

/// Blurred single-channel intensity image for differencing.
fn blurred_grayscale(frame: &Frame) -> GrayImage {
    let rgb = RgbImage::from_raw(frame.width(), frame.height(), frame.as_raw().to_vec())
        .expect("frame buffer size validated at construction");
    let gray = imageops::grayscale(&rgb);
    imageops::blur(&gray, BLUR_SIGMA)
}

/// Integer score proportional to the changed area between two blurred
/// grayscale frames. Each changed pixel contributes [`CHANGED_WEIGHT`].
fn changed_area_score(prev: &GrayImage, cur: &GrayImage) -> u64 {
    let mask = changed_mask(prev, cur);
    let mut dilated = mask;
    for _ in 0..DILATE_ITERATIONS {
        dilated = dilate3x3(&dilated);
    }
    dilated
        .pixels()
        .filter(|p| p.0[0] != 0)
        .count() as u64
        * CHANGED_WEIGHT
}

/// Absolute per-pixel difference, binarized at [`DIFF_CUTOFF`].
fn changed_mask(prev: &GrayImage, cur: &GrayImage) -> GrayImage {
    let (width, height) = cur.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (m, (a, b)) in mask
        .pixels_mut()
        .zip(prev.pixels().zip(cur.pixels()))
    {
        let delta = a.0[0].abs_diff(b.0[0]);
        m.0[0] = if delta > DIFF_CUTOFF { 255 } else { 0 };
    }
    mask
}

/// One pass of 3x3 morphological dilation over a binary mask.
fn dilate3x3(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut hit = false;
            'probe: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    if mask.get_pixel(nx as u32, ny as u32).0[0] != 0 {
                        hit = true;
                        break 'probe;
                    }
                }
            }
            out.put_pixel(x, y, image::Luma([if hit { 255 } else { 0 }]));
        }
    }
    out
}

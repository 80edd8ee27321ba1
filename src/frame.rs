//! Frame model and the shared latest-frame buffer.
//!
//! - `Frame`: in-memory RGB8 raster, produced once per capture iteration.
//!   Frames are ephemeral; only the JPEG encoding or the blurred grayscale
//!   derivative survive an iteration.
//! - `LatestFrame`: single-slot, overwrite-only buffer holding the most
//!   recent encoded frame. The writer replaces the value wholesale under a
//!   lock; readers copy out under the same lock, so a reader always sees a
//!   complete, previously-published JPEG or none at all.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GenericImageView, ImageEncoder};
use std::sync::Mutex;

/// JPEG quality used for the stream buffer and persisted snapshots.
pub const JPEG_QUALITY: u8 = 85;

/// In-memory RGB8 raster (height x width x 3 channels).
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Create a frame from raw RGB8 pixel data (row-major).
    ///
    /// A wrong-sized buffer is a programming error in the capture layer,
    /// reported here rather than deferred to the scoring pipeline.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer size {} does not match {}x{} rgb ({} bytes)",
                data.len(),
                width,
                height,
                expected
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Decode a JPEG byte sequence into an RGB frame.
    pub fn from_jpeg(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode jpeg")?;
        let (width, height) = image.dimensions();
        let rgb = image.into_rgb8();
        Self::new(rgb.into_raw(), width, height)
    }

    /// Encode this frame as JPEG.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        encoder
            .write_image(
                &self.data,
                self.width,
                self.height,
                ExtendedColorType::Rgb8,
            )
            .context("encode jpeg")?;
        Ok(out)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB8 pixel data, row-major.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

/// Single-slot shared buffer for the most recent encoded frame.
///
/// Overwrite-only: every publish replaces the previous value wholesale.
/// Readers never block the writer beyond the copy-out under the lock.
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Vec<u8>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the published frame.
    pub fn publish(&self, jpeg: Vec<u8>) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(jpeg),
            Err(_) => log::error!("latest frame lock poisoned; dropping frame"),
        }
    }

    /// Copy out the most recently published frame, if any.
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => {
                log::error!("latest frame lock poisoned; reporting no frame");
                None
            }
        }
    }
}

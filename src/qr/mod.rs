//! QR receipt decoding.
//!
//! Banking apps put the transaction id in a QR code on the confirmation
//! screen. Screenshots arrive in every size and colour scheme, so decoding is
//! layered:
//!
//! ```text
//! image bytes
//!      │
//!      ▼
//! ┌──────────────────────────┐  payload
//! │ Stage A: ScanningDecoder │──────────▶ done
//! │ raw luma, both polarities│
//! └────────────┬─────────────┘
//!              │ nothing
//!              ▼
//! ┌──────────────────────────┐  payload
//! │ Stage B: BitmapDecoder   │──────────▶ done
//! │ downscale, contrast,     │
//! │ grayscale, both polarities│
//! └────────────┬─────────────┘
//!              │ nothing
//!              ▼
//!        QrNotDetected
//! ```
//!
//! The raw image goes first because preprocessing sometimes destroys fine
//! modules the scanner could read directly.

mod bitmap;
mod normalize;
mod scanning;

pub use bitmap::BitmapDecoder;
pub use normalize::Normalizer;
pub use scanning::ScanningDecoder;

use crate::config::QrConfig;
use crate::error::{Error, Result};
use image::{DynamicImage, GrayImage};
use std::path::Path;
use tracing::debug;

/// One way of pulling a QR payload out of an image.
pub trait Decoder: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decoded payload, or `None` if nothing was found.
    fn decode(&self, image: &DynamicImage) -> Option<String>;
}

/// Ordered decoder chain; the first non-empty payload wins.
pub struct QrPipeline {
    decoders: Vec<Box<dyn Decoder>>,
}

impl QrPipeline {
    /// Standard two-stage pipeline.
    #[must_use]
    pub fn new(config: &QrConfig) -> Self {
        Self::with_decoders(vec![
            Box::new(ScanningDecoder),
            Box::new(BitmapDecoder::new(Normalizer::from_config(config))),
        ])
    }

    /// Pipeline over an explicit decoder list.
    #[must_use]
    pub fn with_decoders(decoders: Vec<Box<dyn Decoder>>) -> Self {
        Self { decoders }
    }

    /// Extract the transaction id from a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QrNotDetected`] if no decoder finds a payload.
    pub fn decode(&self, image: &DynamicImage) -> Result<String> {
        for decoder in &self.decoders {
            if let Some(payload) = decoder.decode(image).as_deref().and_then(clean_payload) {
                debug!("QR payload found by {}", decoder.name());
                return Ok(payload);
            }
            debug!("{} found no QR code", decoder.name());
        }
        Err(Error::QrNotDetected)
    }

    /// Extract the transaction id from encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Image`] if the bytes are not a supported image, or
    /// [`Error::QrNotDetected`].
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<String> {
        let image = image::load_from_memory(bytes).map_err(|e| Error::Image(e.to_string()))?;
        self.decode(&image)
    }

    /// Extract the transaction id from an image file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`QrPipeline::decode_bytes`].
    pub fn decode_file(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        self.decode_bytes(&bytes)
    }
}

impl Default for QrPipeline {
    fn default() -> Self {
        Self::new(&QrConfig::default())
    }
}

fn clean_payload(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Run `scan` on the image as given, then on its negative.
fn with_both_polarities(
    gray: &GrayImage,
    scan: impl Fn(&GrayImage) -> Option<String>,
) -> Option<String> {
    scan(gray).or_else(|| {
        let mut inverted = gray.clone();
        image::imageops::invert(&mut inverted);
        scan(&inverted)
    })
}

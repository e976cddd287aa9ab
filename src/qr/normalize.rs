//! Image normalization for the fallback decoder.

use crate::config::QrConfig;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, Rgb};

/// Mid point of an 8-bit channel.
const MID: f32 = 127.5;

/// Downscale, boost contrast and brightness, then average to grayscale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    max_dimension: u32,
    contrast: f32,
    brightness: f32,
}

impl Normalizer {
    /// Create a normalizer.
    #[must_use]
    pub fn new(max_dimension: u32, contrast: f32, brightness: f32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            contrast,
            brightness,
        }
    }

    /// Normalizer using the `[qr]` settings.
    #[must_use]
    pub fn from_config(config: &QrConfig) -> Self {
        Self::new(config.max_dimension, config.contrast, config.brightness)
    }

    /// Produce the grayscale image fed to the bitmap decoder.
    #[must_use]
    pub fn normalize(&self, image: &DynamicImage) -> GrayImage {
        let rgb = match self.target_size(image.width(), image.height()) {
            Some((width, height)) => image
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgb8(),
            None => image.to_rgb8(),
        };

        GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let Rgb(channels) = *rgb.get_pixel(x, y);
            let sum: f32 = channels.iter().map(|&c| self.adjust(c)).sum();
            Luma([to_channel(sum / 3.0)])
        })
    }

    /// Size after downscaling, or `None` if the image already fits.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn target_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let longest = width.max(height);
        if longest <= self.max_dimension {
            return None;
        }
        let scale = f64::from(self.max_dimension) / f64::from(longest);
        let scaled = |side: u32| ((f64::from(side) * scale).floor() as u32).max(1);
        Some((scaled(width), scaled(height)))
    }

    fn adjust(&self, channel: u8) -> f32 {
        let contrasted = (f32::from(channel) - MID)
            .mul_add(self.contrast, MID)
            .clamp(0.0, 255.0);
        (contrasted * self.brightness).clamp(0.0, 255.0)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

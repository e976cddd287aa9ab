//! Stage B: raw bitmap decoder over the normalized image.

use super::{with_both_polarities, Decoder, Normalizer};
use image::{DynamicImage, GrayImage};
use quircs::Quirc;

/// Low-level bitmap decoder (`quircs`) run after [`Normalizer`].
#[derive(Debug, Clone, Copy)]
pub struct BitmapDecoder {
    normalizer: Normalizer,
}

impl BitmapDecoder {
    /// Create a decoder that normalizes with `normalizer` first.
    #[must_use]
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    fn scan(gray: &GrayImage) -> Option<String> {
        let mut quirc = Quirc::default();
        let codes = quirc.identify(gray.width() as usize, gray.height() as usize, gray.as_raw());
        let payload = codes
            .filter_map(Result::ok)
            .filter_map(|code| code.decode().ok())
            .filter_map(|data| String::from_utf8(data.payload).ok())
            .find(|payload| !payload.trim().is_empty());
        payload
    }
}

impl Decoder for BitmapDecoder {
    fn name(&self) -> &'static str {
        "bitmap"
    }

    fn decode(&self, image: &DynamicImage) -> Option<String> {
        let gray = self.normalizer.normalize(image);
        with_both_polarities(&gray, Self::scan)
    }
}

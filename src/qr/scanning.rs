//! Stage A: full scanning decoder over the untouched image.

use super::{with_both_polarities, Decoder};
use image::{DynamicImage, GrayImage};

/// Grid-detecting decoder (`rqrr`) run on the raw luma channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanningDecoder;

impl ScanningDecoder {
    fn scan(gray: &GrayImage) -> Option<String> {
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        let raw = gray.as_raw();

        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| raw[y * width + x]);
        let payload = prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| grid.decode().ok())
            .map(|(_meta, content)| content)
            .find(|content| !content.trim().is_empty());
        payload
    }
}

impl Decoder for ScanningDecoder {
    fn name(&self) -> &'static str {
        "scanner"
    }

    fn decode(&self, image: &DynamicImage) -> Option<String> {
        with_both_polarities(&image.to_luma8(), Self::scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::test_support::{blank, render};

    #[test]
    fn test_reads_clean_code() {
        let image = render("FT25001ABC", 6, false);
        assert_eq!(ScanningDecoder.decode(&image).as_deref(), Some("FT25001ABC"));
    }

    #[test]
    fn test_reads_light_on_dark_code() {
        let image = render("FT25001ABC", 6, true);
        assert_eq!(ScanningDecoder.decode(&image).as_deref(), Some("FT25001ABC"));
    }

    #[test]
    fn test_nothing_on_blank_image() {
        assert_eq!(ScanningDecoder.decode(&blank(120)), None);
    }
}

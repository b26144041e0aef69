use std::io::Write;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};

use crate::{EncodeError, Format};

const JPEG_QUALITY: u8 = 90;

pub struct Png;

impl Format for Png {
    fn name(&self) -> &'static str {
        "png"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png"]
    }

    fn encode(&self, out: &mut dyn Write, image: &RgbaImage) -> Result<(), EncodeError> {
        let (width, height) = image.dimensions();
        PngEncoder::new(out).write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)?;
        Ok(())
    }
}

/// JPEG has no alpha channel; it is dropped.
pub struct Jpeg;

impl Format for Jpeg {
    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["jpg", "jpeg"]
    }

    fn encode(&self, out: &mut dyn Write, image: &RgbaImage) -> Result<(), EncodeError> {
        let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
        let (width, height) = rgb.dimensions();
        JpegEncoder::new_with_quality(out, JPEG_QUALITY).write_image(
            rgb.as_raw(),
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker() -> RgbaImage {
        RgbaImage::from_fn(4, 2, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn png_is_lossless() {
        let mut out = Vec::new();
        Png.encode(&mut out, &checker()).unwrap();
        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!(decoded, checker());
    }

    #[test]
    fn jpeg_decodes_to_the_same_size() {
        let mut out = Vec::new();
        Jpeg.encode(&mut out, &checker()).unwrap();
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
    }
}

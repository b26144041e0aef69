use std::io::Write;
use std::time::Duration;

use crossbeam_channel::Receiver;
use image::RgbaImage;

use crate::{check_size, EncodeError, Format};

/// Packed 8-bit RGB with no header, one frame after the other.
///
/// Each frame is flushed as soon as it is written so that LED matrix
/// drivers reading from a pipe see it immediately.
pub struct Rgb24;

impl Rgb24 {
    fn write_frame(
        out: &mut dyn Write,
        image: &RgbaImage,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        buf.clear();
        buf.extend(image.pixels().flat_map(|p| [p[0], p[1], p[2]]));
        out.write_all(buf)?;
        out.flush()?;
        Ok(())
    }
}

impl Format for Rgb24 {
    fn name(&self) -> &'static str {
        "rgb24"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rgb24", "rgb"]
    }

    fn supports_animation(&self) -> bool {
        true
    }

    fn encode(&self, out: &mut dyn Write, image: &RgbaImage) -> Result<(), EncodeError> {
        Self::write_frame(out, image, &mut Vec::new())
    }

    fn encode_animation(
        &self,
        out: &mut dyn Write,
        frames: &Receiver<RgbaImage>,
        _interval: Duration,
    ) -> Result<(), EncodeError> {
        let mut buf = Vec::new();
        let mut size = None;
        for image in frames.iter() {
            let (width, height) = *size.get_or_insert(image.dimensions());
            check_size(&image, width, height)?;
            Self::write_frame(out, &image, &mut buf)?;
        }
        Ok(())
    }
}

use std::io::Write;
use std::time::Duration;

use crossbeam_channel::Receiver;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, ExtendedColorType, Frame, RgbaImage};
use tracing::debug;

use crate::{check_size, EncodeError, Format};

/// Animated GIF that loops forever.
pub struct Gif;

impl Format for Gif {
    fn name(&self) -> &'static str {
        "gif"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["gif"]
    }

    fn supports_animation(&self) -> bool {
        true
    }

    fn encode(&self, out: &mut dyn Write, image: &RgbaImage) -> Result<(), EncodeError> {
        let (width, height) = image.dimensions();
        GifEncoder::new(out).encode(image.as_raw(), width, height, ExtendedColorType::Rgba8)?;
        Ok(())
    }

    fn encode_animation(
        &self,
        out: &mut dyn Write,
        frames: &Receiver<RgbaImage>,
        interval: Duration,
    ) -> Result<(), EncodeError> {
        let mut encoder = GifEncoder::new(out);
        encoder.set_repeat(Repeat::Infinite)?;
        let delay = Delay::from_saturating_duration(interval);

        let mut size = None;
        let mut count = 0u64;
        for image in frames.iter() {
            let (width, height) = *size.get_or_insert(image.dimensions());
            check_size(&image, width, height)?;
            encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
            count += 1;
        }
        debug!(frames = count, "finished gif");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::frames;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgba};
    use std::io::Cursor;

    fn solid(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(3, 3, Rgba([value, value, value, 255]))
    }

    #[test]
    fn animation_keeps_every_frame_and_delay() {
        let mut out = Vec::new();
        Gif.encode_animation(
            &mut out,
            &frames(vec![solid(0), solid(128), solid(255)]),
            Duration::from_millis(100),
        )
        .unwrap();

        let decoder = GifDecoder::new(Cursor::new(out)).unwrap();
        let decoded = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 3);
        for frame in &decoded {
            assert_eq!(Duration::from(frame.delay()), Duration::from_millis(100));
        }
        let last = decoded[2].buffer().get_pixel(1, 1);
        assert!(last.0[..3].iter().all(|&c| c >= 250), "{last:?}");
    }

    #[test]
    fn mismatched_frame_sizes_are_rejected() {
        let mut out = Vec::new();
        let err = Gif
            .encode_animation(
                &mut out,
                &frames(vec![solid(0), RgbaImage::new(2, 2)]),
                Duration::from_millis(50),
            )
            .err()
            .unwrap();
        assert!(matches!(err, EncodeError::FrameSize { width: 3, actual_width: 2, .. }));
    }
}

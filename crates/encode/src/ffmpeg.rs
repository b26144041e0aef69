use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use image::RgbaImage;
use tracing::debug;

use crate::{check_size, EncodeError, Format};

const PROGRAM: &str = "ffmpeg";

/// H.264 in a fragmented MP4 container, encoded by an `ffmpeg` child.
///
/// Fragmented output needs no seeking, so it can be streamed to stdout.
pub struct Mp4;

impl Mp4 {
    fn spawn(width: u32, height: u32, interval: Duration) -> Result<Child, EncodeError> {
        // Frame rate as an exact rational so that e.g. 29.97 fps survives.
        let rate = format!("1000000000/{}", interval.as_nanos().max(1));
        let size = format!("{width}x{height}");
        let child = Command::new(PROGRAM)
            .args(["-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .args(["-s", size.as_str(), "-r", rate.as_str(), "-i", "pipe:0"])
            .args(["-an", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .args(["-movflags", "frag_keyframe+empty_moov", "-f", "mp4", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                program: PROGRAM,
                source,
            })?;
        debug!(pid = child.id(), %size, %rate, "spawned mp4 encoder");
        Ok(child)
    }
}

impl Format for Mp4 {
    fn name(&self) -> &'static str {
        "mp4"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mp4"]
    }

    fn supports_animation(&self) -> bool {
        true
    }

    fn supports_still(&self) -> bool {
        false
    }

    fn encode(&self, _out: &mut dyn Write, _image: &RgbaImage) -> Result<(), EncodeError> {
        Err(EncodeError::StillUnsupported(self.name()))
    }

    fn encode_animation(
        &self,
        out: &mut dyn Write,
        frames: &Receiver<RgbaImage>,
        interval: Duration,
    ) -> Result<(), EncodeError> {
        // The frame size is only known once the first frame arrives.
        let Ok(first) = frames.recv() else {
            return Ok(());
        };
        let (width, height) = first.dimensions();
        if width % 2 != 0 || height % 2 != 0 {
            return Err(EncodeError::OddDimensions {
                format: self.name(),
                width,
                height,
            });
        }

        let mut child = Self::spawn(width, height, interval)?;
        let (Some(stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("ffmpeg pipes were not captured").into());
        };

        let (fed, diagnostics, copied) = thread::scope(|scope| {
            let feeder = thread::Builder::new()
                .name("mp4-feed".into())
                .spawn_scoped(scope, move || feed(stdin, first, frames, width, height));
            let collector = thread::Builder::new()
                .name("mp4-stderr".into())
                .spawn_scoped(scope, move || {
                    let mut text = String::new();
                    let _ = stderr.read_to_string(&mut text);
                    text
                });
            let copied = io::copy(&mut stdout, out).and_then(|n| out.flush().map(|()| n));
            // Closing our end makes ffmpeg fail fast if it is still writing.
            drop(stdout);
            let fed = feeder.and_then(join);
            let diagnostics = collector.and_then(join).unwrap_or_default();
            (fed, diagnostics, copied)
        });

        let status = child.wait()?;
        if !status.success() {
            return Err(EncodeError::Subprocess {
                program: PROGRAM,
                status,
                stderr: diagnostics.trim().to_string(),
            });
        }
        fed??;
        let bytes = copied?;
        debug!(bytes, "finished mp4");
        Ok(())
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> io::Result<T> {
    handle
        .join()
        .map_err(|_| io::Error::other("mp4 worker thread panicked"))
}

/// Writes raw RGBA frames to ffmpeg until the channel closes.
fn feed(
    mut stdin: ChildStdin,
    first: RgbaImage,
    rest: &Receiver<RgbaImage>,
    width: u32,
    height: u32,
) -> Result<u64, EncodeError> {
    stdin.write_all(first.as_raw())?;
    let mut count = 1;
    for image in rest.iter() {
        check_size(&image, width, height)?;
        stdin.write_all(image.as_raw())?;
        count += 1;
    }
    debug!(frames = count, "all frames handed to ffmpeg");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::frames;

    #[test]
    fn stills_are_rejected() {
        let mut out = Vec::new();
        let err = Mp4.encode(&mut out, &RgbaImage::new(2, 2)).err().unwrap();
        assert!(matches!(err, EncodeError::StillUnsupported("mp4")));
    }

    #[test]
    fn empty_animation_writes_nothing() {
        let mut out = Vec::new();
        Mp4.encode_animation(&mut out, &frames(Vec::new()), Duration::from_millis(40))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn odd_dimensions_are_rejected_before_spawning() {
        let mut out = Vec::new();
        let err = Mp4
            .encode_animation(
                &mut out,
                &frames(vec![RgbaImage::new(3, 2)]),
                Duration::from_millis(40),
            )
            .err()
            .unwrap();
        assert!(matches!(err, EncodeError::OddDimensions { width: 3, .. }));
    }
}

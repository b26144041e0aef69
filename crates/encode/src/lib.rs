//! Output encoders for rendered frames.
//!
//! Every encoder implements [`Format`]. Stills are encoded from a single
//! image; animations drain a channel of frames until the sender hangs up,
//! which lets the encoder run on its own thread next to the renderer.

mod ffmpeg;
mod gif;
mod raw;
mod still;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use crossbeam_channel::Receiver;
use image::RgbaImage;

pub use ffmpeg::Mp4;
pub use gif::Gif;
pub use raw::Rgb24;
pub use still::{Jpeg, Png};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("unknown output format {name:?}; valid formats are: {known}")]
    UnknownFormat { name: String, known: String },
    #[error("unable to detect the output format of {0}; set --ofmt")]
    Undetectable(PathBuf),
    #[error("the {0} format can not encode a single image")]
    StillUnsupported(&'static str),
    #[error("the {0} format does not support animation")]
    AnimationUnsupported(&'static str),
    #[error("frame is {actual_width}x{actual_height}, expected {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("{format} output needs even dimensions, got {width}x{height}")]
    OddDimensions {
        format: &'static str,
        width: u32,
        height: u32,
    },
    #[error("failed to spawn {program} (is it installed and on PATH?)")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Subprocess {
        program: &'static str,
        status: ExitStatus,
        stderr: String,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// An output encoding.
pub trait Format: Send + Sync {
    /// The name accepted by `--ofmt`.
    fn name(&self) -> &'static str;

    /// File extensions that select this format, lowercase.
    fn extensions(&self) -> &'static [&'static str];

    fn supports_animation(&self) -> bool {
        false
    }

    fn supports_still(&self) -> bool {
        true
    }

    fn encode(&self, out: &mut dyn Write, image: &RgbaImage) -> Result<(), EncodeError>;

    /// Encodes frames until `frames` is closed. `interval` is the time
    /// between two consecutive frames.
    fn encode_animation(
        &self,
        _out: &mut dyn Write,
        _frames: &Receiver<RgbaImage>,
        _interval: Duration,
    ) -> Result<(), EncodeError> {
        Err(EncodeError::AnimationUnsupported(self.name()))
    }
}

static FORMATS: [&dyn Format; 5] = [&Png, &Jpeg, &Gif, &Rgb24, &Mp4];

/// All known formats, in the order they are listed to users.
pub fn formats() -> &'static [&'static dyn Format] {
    &FORMATS
}

pub fn format_names() -> Vec<&'static str> {
    FORMATS.iter().map(|format| format.name()).collect()
}

/// Finds a format by name or by one of its extensions.
pub fn lookup(name: &str) -> Result<&'static dyn Format, EncodeError> {
    let wanted = name.to_ascii_lowercase();
    FORMATS
        .iter()
        .copied()
        .find(|format| format.name() == wanted || format.extensions().contains(&wanted.as_str()))
        .ok_or_else(|| EncodeError::UnknownFormat {
            name: name.to_string(),
            known: format_names().join(", "),
        })
}

/// Picks the format from the extension of an output path.
pub fn detect(path: &Path) -> Result<&'static dyn Format, EncodeError> {
    let undetectable = || EncodeError::Undetectable(path.to_path_buf());
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(undetectable)?
        .to_ascii_lowercase();
    FORMATS
        .iter()
        .copied()
        .find(|format| format.extensions().contains(&extension.as_str()))
        .ok_or_else(undetectable)
}

pub(crate) fn check_size(image: &RgbaImage, width: u32, height: u32) -> Result<(), EncodeError> {
    let (actual_width, actual_height) = image.dimensions();
    if (actual_width, actual_height) == (width, height) {
        Ok(())
    } else {
        Err(EncodeError::FrameSize {
            width,
            height,
            actual_width,
            actual_height,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    pub(crate) fn frames(images: Vec<RgbaImage>) -> Receiver<RgbaImage> {
        let (tx, rx) = unbounded();
        for image in images {
            tx.send(image).unwrap();
        }
        rx
    }

    #[test]
    fn lookup_accepts_names_and_aliases() {
        assert_eq!(lookup("png").unwrap().name(), "png");
        assert_eq!(lookup("JPG").unwrap().name(), "jpeg");
        assert_eq!(lookup("mp4").unwrap().name(), "mp4");
        let err = lookup("webm").err().unwrap();
        assert!(err.to_string().contains("png, jpeg, gif, rgb24, mp4"));
    }

    #[test]
    fn detection_uses_the_extension() {
        assert_eq!(detect(Path::new("out/frame.PNG")).unwrap().name(), "png");
        assert_eq!(detect(Path::new("loop.gif")).unwrap().name(), "gif");
        assert_eq!(detect(Path::new("matrix.rgb24")).unwrap().name(), "rgb24");
        assert!(matches!(
            detect(Path::new("-")),
            Err(EncodeError::Undetectable(_))
        ));
        assert!(detect(Path::new("clip.avi")).is_err());
    }

    #[test]
    fn animation_support_is_declared_per_format() {
        let animated: Vec<_> = formats()
            .iter()
            .filter(|format| format.supports_animation())
            .map(|format| format.name())
            .collect();
        assert_eq!(animated, ["gif", "rgb24", "mp4"]);
        assert!(!lookup("mp4").unwrap().supports_still());
        assert!(lookup("gif").unwrap().supports_still());
    }

    #[test]
    fn still_formats_reject_animation() {
        let mut out = Vec::new();
        let err = Png
            .encode_animation(&mut out, &frames(Vec::new()), Duration::from_millis(40))
            .err()
            .unwrap();
        assert!(matches!(err, EncodeError::AnimationUnsupported("png")));
    }
}

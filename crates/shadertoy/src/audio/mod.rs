//! Audio inputs: PCM sources and the texture they are rendered into.

mod source;
mod texture;
mod transcode;

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use crate::mapping::{AudioMapping, SampleFormat};

pub use source::RawSource;
pub use texture::{encode_sample, AudioTexture, AUDIO_TEXTURE_HEIGHT, AUDIO_TEXTURE_WIDTH};
pub use transcode::{TranscodedStream, TRANSCODE_CHANNELS, TRANSCODE_RATE};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("could not open audio source {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unimplemented sample format {0}; only s16le is supported")]
    UnsupportedFormat(SampleFormat),
    #[error("invalid PCM stream: {0}")]
    InvalidStream(String),
    #[error("failed to spawn {program} (is it installed and on PATH?)")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} could not transcode {path} ({status}): {stderr}")]
    Transcode {
        program: String,
        path: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A stream of PCM audio consumed one frame interval at a time.
pub trait AudioSource {
    fn sample_rate(&self) -> f32;

    /// Returns `round(rate * period)` normalised samples of the first channel.
    ///
    /// An exhausted or failing stream yields silence rather than an error.
    fn read_samples(&mut self, period: Duration) -> Result<Vec<f32>, AudioError>;
}

impl<T: AudioSource + ?Sized> AudioSource for Box<T> {
    fn sample_rate(&self) -> f32 {
        (**self).sample_rate()
    }

    fn read_samples(&mut self, period: Duration) -> Result<Vec<f32>, AudioError> {
        (**self).read_samples(period)
    }
}

/// Opens the source described by an audio mapping.
///
/// Opaque paths go through the transcoder, so a missing or failing `ffmpeg`
/// is reported here rather than on the first frame.
pub fn open_source(mapping: &AudioMapping) -> Result<Box<dyn AudioSource>, AudioError> {
    match mapping {
        AudioMapping::Opaque(path) => Ok(Box::new(transcoded(TranscodedStream::spawn(path)?)?)),
        AudioMapping::Explicit {
            path,
            rate,
            channels,
            format,
        } => Ok(Box::new(RawSource::open(path, *rate, *channels, *format)?)),
    }
}

/// Reads a transcoder's output in its canonical layout.
fn transcoded(stream: TranscodedStream) -> Result<RawSource<TranscodedStream>, AudioError> {
    RawSource::new(
        stream,
        TRANSCODE_RATE,
        TRANSCODE_CHANNELS,
        SampleFormat::S16LE,
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn transcoded_audio_reports_the_canonical_rate() {
        let dir = tempfile::tempdir().unwrap();
        // 22 full-scale samples, one millisecond at 22 kHz.
        let program = transcode::tests::script(
            dir.path(),
            "fake-ffmpeg",
            "i=0\nwhile [ $i -lt 22 ]; do printf '\\377\\177'; i=$((i+1)); done",
        );
        let stream =
            TranscodedStream::spawn_program(program.to_str().unwrap(), Path::new("song.mp3"))
                .unwrap();
        let mut source = transcoded(stream).unwrap();

        assert_eq!(source.sample_rate(), 22000.0);
        let samples = source.read_samples(Duration::from_millis(1)).unwrap();
        assert_eq!(samples, vec![1.0; 22]);
    }
}

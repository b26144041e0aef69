use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::{AudioError, AudioSource};
use crate::mapping::{Endian, SampleFormat};

/// Packed PCM read from any byte stream with a declared layout.
pub struct RawSource<R> {
    reader: R,
    rate: u32,
    channels: u16,
    format: SampleFormat,
    exhausted: bool,
}

impl RawSource<BufReader<File>> {
    pub fn open(
        path: &Path,
        rate: u32,
        channels: u16,
        format: SampleFormat,
    ) -> Result<Self, AudioError> {
        ensure_supported(format)?;
        let file = File::open(path).map_err(|source| AudioError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), rate, channels, %format, "opened raw PCM source");
        Self::new(BufReader::new(file), rate, channels, format)
    }
}

impl<R: Read> RawSource<R> {
    pub fn new(
        reader: R,
        rate: u32,
        channels: u16,
        format: SampleFormat,
    ) -> Result<Self, AudioError> {
        ensure_supported(format)?;
        if rate == 0 {
            return Err(AudioError::InvalidStream("sample rate must be positive".into()));
        }
        if channels == 0 {
            return Err(AudioError::InvalidStream(
                "channel count must be at least 1".into(),
            ));
        }
        Ok(Self {
            reader,
            rate,
            channels,
            format,
            exhausted: false,
        })
    }

    fn frames_for(&self, period: Duration) -> usize {
        (f64::from(self.rate) * period.as_secs_f64()).round() as usize
    }
}

impl<R: Read> AudioSource for RawSource<R> {
    fn sample_rate(&self) -> f32 {
        self.rate as f32
    }

    fn read_samples(&mut self, period: Duration) -> Result<Vec<f32>, AudioError> {
        let frames = self.frames_for(period);
        let frame_bytes = usize::from(self.channels) * self.format.bytes_per_sample();
        let mut buf = vec![0u8; frames * frame_bytes];
        if let Err(err) = self.reader.read_exact(&mut buf) {
            if !self.exhausted {
                debug!(error = %err, "audio stream ran dry; substituting silence");
                self.exhausted = true;
            }
            return Ok(vec![0.0; frames]);
        }
        decode_first_channel(self.format, self.channels, &buf)
    }
}

fn ensure_supported(format: SampleFormat) -> Result<(), AudioError> {
    if format == SampleFormat::S16LE {
        Ok(())
    } else {
        Err(AudioError::UnsupportedFormat(format))
    }
}

/// Decodes the first channel of every interleaved frame in `bytes` to `[-1, 1]`.
pub(crate) fn decode_first_channel(
    format: SampleFormat,
    channels: u16,
    bytes: &[u8],
) -> Result<Vec<f32>, AudioError> {
    let frame_bytes = usize::from(channels) * format.bytes_per_sample();
    match format {
        SampleFormat {
            signed: true,
            bits: 16,
            endian: Endian::Little,
        } => Ok(bytes
            .chunks_exact(frame_bytes)
            .map(|frame| f32::from(i16::from_le_bytes([frame[0], frame[1]])) / 32767.0)
            .collect()),
        other => Err(AudioError::UnsupportedFormat(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn reads_one_period_of_mono_samples() {
        let bytes = pcm(&[0, 32767, -32767, 16384, 1, 2, 3, 4]);
        let mut source = RawSource::new(Cursor::new(bytes), 4, 1, SampleFormat::S16LE).unwrap();

        let samples = source.read_samples(Duration::from_secs(1)).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 1.0);
        assert_eq!(samples[2], -1.0);
        assert!((samples[3] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn keeps_first_channel_of_interleaved_frames() {
        let bytes = pcm(&[100, -1, 200, -2, 300, -3]);
        let mut source = RawSource::new(Cursor::new(bytes), 3, 2, SampleFormat::S16LE).unwrap();
        let samples = source.read_samples(Duration::from_secs(1)).unwrap();
        let expected: Vec<f32> = [100.0, 200.0, 300.0].iter().map(|v| v / 32767.0).collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn exhausted_stream_degrades_to_silence() {
        let mut source =
            RawSource::new(Cursor::new(pcm(&[5, 6, 7])), 44100, 1, SampleFormat::S16LE).unwrap();
        let period = Duration::from_secs_f64(1.0 / 30.0);
        let samples = source.read_samples(period).unwrap();
        assert_eq!(samples.len(), 1470);
        assert!(samples.iter().all(|&s| s == 0.0));

        let samples = source.read_samples(period).unwrap();
        assert_eq!(samples.len(), 1470);
    }

    #[test]
    fn silence_length_rounds_rate_times_period() {
        let mut source =
            RawSource::new(Cursor::new(Vec::new()), 22000, 1, SampleFormat::S16LE).unwrap();
        let samples = source
            .read_samples(Duration::from_secs_f64(1.0 / 29.97))
            .unwrap();
        assert_eq!(samples.len(), 734);
        assert!(source.read_samples(Duration::ZERO).unwrap().is_empty());
    }

    #[test]
    fn unimplemented_formats_are_structured_errors() {
        let format: SampleFormat = "u8le".parse().unwrap();
        let err = RawSource::new(Cursor::new(Vec::new()), 8000, 1, format)
            .err()
            .unwrap();
        assert!(matches!(err, AudioError::UnsupportedFormat(f) if f == format));

        let big_endian: SampleFormat = "s16be".parse().unwrap();
        assert!(decode_first_channel(big_endian, 1, &[0, 1]).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RawSource::open(
            Path::new("/nonexistent/shadecast.raw"),
            44100,
            2,
            SampleFormat::S16LE,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("/nonexistent/shadecast.raw"));
    }
}

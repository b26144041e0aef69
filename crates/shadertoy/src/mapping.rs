//! Parsing of `--map NAME=KIND:VALUE` input descriptors.
//!
//! Audio values take one of two forms:
//!
//! - `PATH`: any file ffmpeg can decode; it is transcoded on the fly.
//! - `PATH;RATE:CHANNELS:FORMAT`: raw PCM read straight from the file, where
//!   `FORMAT` is `[su]BITS[lb]e`, e.g. `s16le`.
//!
//! Everything is validated here so later stages never re-check a descriptor.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("mapping {0:?} is not of the form NAME=KIND:VALUE")]
    Syntax(String),
    #[error("mapping {0:?} has an invalid uniform name")]
    InvalidName(String),
    #[error("unknown mapping kind {kind:?} in {mapping:?}; expected 'audio' or 'image'")]
    UnknownKind { kind: String, mapping: String },
    #[error("could not parse audio value {0:?} (expected PATH or PATH;RATE:CHANNELS:FORMAT, e.g. track.raw;44100:2:s16le)")]
    AudioValue(String),
    #[error("invalid sample rate {0:?}; expected a positive integer")]
    SampleRate(String),
    #[error("invalid channel count {0:?}; expected a positive integer")]
    Channels(String),
    #[error("invalid PCM sample format {0:?}; expected [su]BITS[lb]e, e.g. s16le")]
    Format(String),
    #[error("the number of PCM sample bits must be a multiple of 8, format: {0:?}")]
    BitWidth(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Encoding of one PCM sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    pub signed: bool,
    pub bits: u8,
    pub endian: Endian,
}

impl SampleFormat {
    /// The canonical format produced by the transcoder.
    pub const S16LE: SampleFormat = SampleFormat {
        signed: true,
        bits: 16,
        endian: Endian::Little,
    };

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits / 8)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.signed { 's' } else { 'u' };
        let endian = match self.endian {
            Endian::Little => 'l',
            Endian::Big => 'b',
        };
        write!(f, "{sign}{}{endian}e", self.bits)
    }
}

impl FromStr for SampleFormat {
    type Err = MappingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || MappingError::Format(value.to_string());
        let bytes = value.as_bytes();
        if !value.is_ascii() || !(4..=5).contains(&bytes.len()) {
            return Err(invalid());
        }

        let signed = match bytes[0] {
            b's' => true,
            b'u' => false,
            _ => return Err(invalid()),
        };
        let (digits, suffix) = value[1..].split_at(bytes.len() - 3);
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let endian = match suffix {
            "le" => Endian::Little,
            "be" => Endian::Big,
            _ => return Err(invalid()),
        };
        let bits: u8 = digits.parse().map_err(|_| invalid())?;
        if bits == 0 || bits % 8 != 0 {
            return Err(MappingError::BitWidth(value.to_string()));
        }

        Ok(SampleFormat {
            signed,
            bits,
            endian,
        })
    }
}

/// Where an audio binding gets its samples from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioMapping {
    /// Arbitrary media file, transcoded to canonical PCM.
    Opaque(PathBuf),
    /// Raw PCM with a declared layout.
    Explicit {
        path: PathBuf,
        rate: u32,
        channels: u16,
        format: SampleFormat,
    },
}

impl AudioMapping {
    pub fn parse(value: &str) -> Result<Self, MappingError> {
        let Some((path, layout)) = value.split_once(';') else {
            if value.is_empty() {
                return Err(MappingError::AudioValue(value.to_string()));
            }
            return Ok(AudioMapping::Opaque(PathBuf::from(value)));
        };

        let mut fields = layout.split(':');
        let (Some(rate), Some(channels), Some(format), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(MappingError::AudioValue(value.to_string()));
        };
        if path.is_empty() || format.contains(';') {
            return Err(MappingError::AudioValue(value.to_string()));
        }

        let rate = parse_positive::<u32>(rate).ok_or_else(|| MappingError::SampleRate(rate.into()))?;
        let channels =
            parse_positive::<u16>(channels).ok_or_else(|| MappingError::Channels(channels.into()))?;
        let format = format.parse()?;

        Ok(AudioMapping::Explicit {
            path: PathBuf::from(path),
            rate,
            channels,
            format,
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            AudioMapping::Opaque(path) | AudioMapping::Explicit { path, .. } => path,
        }
    }

    fn path_mut(&mut self) -> &mut PathBuf {
        match self {
            AudioMapping::Opaque(path) | AudioMapping::Explicit { path, .. } => path,
        }
    }
}

fn parse_positive<T: FromStr + Default + PartialEq>(value: &str) -> Option<T> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok().filter(|parsed| *parsed != T::default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingKind {
    Audio(AudioMapping),
    Image(PathBuf),
}

/// Binds a named sampler uniform to an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub name: String,
    pub kind: MappingKind,
}

impl Mapping {
    /// Builds a mapping from a uniform name and a `KIND:VALUE` string, the
    /// shape used by profile files.
    pub fn from_parts(name: &str, value: &str) -> Result<Self, MappingError> {
        let original = format!("{name}={value}");
        if !is_identifier(name) {
            return Err(MappingError::InvalidName(original));
        }
        let (kind, value) = value
            .split_once(':')
            .ok_or_else(|| MappingError::Syntax(original.clone()))?;
        let kind = match kind {
            "audio" => MappingKind::Audio(AudioMapping::parse(value)?),
            "image" if !value.is_empty() => MappingKind::Image(PathBuf::from(value)),
            "image" => return Err(MappingError::Syntax(original)),
            other => {
                return Err(MappingError::UnknownKind {
                    kind: other.to_string(),
                    mapping: original,
                })
            }
        };
        Ok(Mapping {
            name: name.to_string(),
            kind,
        })
    }

    /// Resolves relative paths against `base`, normally the shader's directory.
    pub fn resolve(mut self, base: &Path) -> Self {
        let path = match &mut self.kind {
            MappingKind::Audio(audio) => audio.path_mut(),
            MappingKind::Image(path) => path,
        };
        if path.is_relative() {
            *path = base.join(&*path);
        }
        self
    }

    /// The `N` of an `iChannelN` uniform name.
    pub fn channel_index(&self) -> Option<usize> {
        channel_index(&self.name)
    }
}

impl FromStr for Mapping {
    type Err = MappingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, rest) = value
            .split_once('=')
            .ok_or_else(|| MappingError::Syntax(value.to_string()))?;
        Mapping::from_parts(name.trim(), rest)
    }
}

pub(crate) fn channel_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("iChannel")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Keeps only the last mapping for each uniform name, preserving first-seen order.
pub fn dedup_by_name(mappings: Vec<Mapping>) -> Vec<Mapping> {
    let mut result: Vec<Mapping> = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        match result.iter_mut().find(|existing| existing.name == mapping.name) {
            Some(existing) => *existing = mapping,
            None => result.push(mapping),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_pcm_descriptor() {
        let mapping = AudioMapping::parse("track.raw;44100:2:s16le").unwrap();
        assert_eq!(
            mapping,
            AudioMapping::Explicit {
                path: PathBuf::from("track.raw"),
                rate: 44100,
                channels: 2,
                format: SampleFormat {
                    signed: true,
                    bits: 16,
                    endian: Endian::Little,
                },
            }
        );
    }

    #[test]
    fn rejects_bit_widths_that_are_not_whole_bytes() {
        assert_eq!(
            AudioMapping::parse("track.raw;44100:2:s5be"),
            Err(MappingError::BitWidth("s5be".into()))
        );
        assert!(matches!(
            AudioMapping::parse("track.raw;44100:2:u0le"),
            Err(MappingError::BitWidth(_))
        ));
        let format: SampleFormat = "u24be".parse().unwrap();
        assert_eq!(format.bytes_per_sample(), 3);
        assert_eq!(format.to_string(), "u24be");
    }

    #[test]
    fn anything_without_semicolon_is_opaque() {
        assert_eq!(
            AudioMapping::parse("music/song.mp3").unwrap(),
            AudioMapping::Opaque(PathBuf::from("music/song.mp3"))
        );
        assert!(AudioMapping::parse("").is_err());
    }

    #[test]
    fn malformed_pcm_descriptors_are_errors() {
        for value in [
            "track.raw;44100:2",
            "track.raw;44100:2:s16le:extra",
            ";44100:2:s16le",
            "track.raw;44100:2:s16me",
            "track.raw;44100:2:x16le",
            "track.raw;44100:2:s123le",
            "track.raw;fast:2:s16le",
            "track.raw;44100:0:s16le",
            "track.raw;0:2:s16le",
        ] {
            assert!(AudioMapping::parse(value).is_err(), "{value} should not parse");
        }
    }

    #[test]
    fn parses_cli_mappings() {
        let mapping: Mapping = "iChannel0=audio:song.mp3".parse().unwrap();
        assert_eq!(mapping.name, "iChannel0");
        assert_eq!(mapping.channel_index(), Some(0));
        assert_eq!(
            mapping.kind,
            MappingKind::Audio(AudioMapping::Opaque("song.mp3".into()))
        );

        let mapping: Mapping = "iChannel2=image:noise.png".parse().unwrap();
        assert_eq!(mapping.kind, MappingKind::Image("noise.png".into()));

        assert!(matches!(
            "iChannel0=video:clip.mp4".parse::<Mapping>(),
            Err(MappingError::UnknownKind { .. })
        ));
        assert!(matches!(
            "iChannel0".parse::<Mapping>(),
            Err(MappingError::Syntax(_))
        ));
        assert!(matches!(
            "0bad=image:x.png".parse::<Mapping>(),
            Err(MappingError::InvalidName(_))
        ));
    }

    #[test]
    fn resolves_relative_paths_against_base() {
        let base = Path::new("/shaders");
        let mapping: Mapping = "iChannel1=audio:beat.raw;8000:1:s16le".parse().unwrap();
        let resolved = mapping.resolve(base);
        let MappingKind::Audio(audio) = &resolved.kind else {
            panic!("expected audio mapping");
        };
        assert_eq!(audio.path(), Path::new("/shaders/beat.raw"));

        let absolute: Mapping = "iChannel1=image:/tmp/a.png".parse().unwrap();
        assert_eq!(
            absolute.resolve(base).kind,
            MappingKind::Image("/tmp/a.png".into())
        );
    }

    #[test]
    fn later_mappings_override_earlier_ones() {
        let mappings = vec![
            "iChannel0=image:a.png".parse().unwrap(),
            "iChannel1=image:b.png".parse().unwrap(),
            "iChannel0=audio:c.mp3".parse().unwrap(),
        ];
        let deduped = dedup_by_name(mappings);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "iChannel0");
        assert_eq!(
            deduped[0].kind,
            MappingKind::Audio(AudioMapping::Opaque("c.mp3".into()))
        );
    }
}

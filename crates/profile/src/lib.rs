//! Render profiles: TOML files holding defaults for a `shadecast` run.
//!
//! ```toml
//! version = 1
//! geometry = "64x32"
//! framerate = 30
//! duration = "10s"
//! realtime = true
//! ofmt = "rgb24"
//!
//! [map]
//! iChannel0 = "audio:song.mp3"
//! ```
//!
//! Every value is optional; command line flags take precedence.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read profile {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid profile: {0}")]
    Invalid(String),
    #[error("invalid geometry {0:?}; expected WIDTHxHEIGHT with non-zero dimensions")]
    Geometry(String),
}

/// Output size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Geometry {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Geometry(value.to_string());
        let (width, height) = value.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = width.parse().map_err(|_| invalid())?;
        let height: u32 = height.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Geometry { width, height })
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderProfile {
    pub version: u32,
    #[serde(default, deserialize_with = "deserialize_geometry_opt")]
    pub geometry: Option<Geometry>,
    /// Shader environment name, `shadertoy` or `glslsandbox`.
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub ofmt: Option<String>,
    #[serde(default)]
    pub framerate: Option<f64>,
    #[serde(default)]
    pub numframes: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub realtime: Option<bool>,
    /// Uniform name to `KIND:VALUE`, e.g. `iChannel0 = "audio:song.mp3"`.
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

fn deserialize_geometry_opt<'de, D>(deserializer: D) -> Result<Option<Geometry>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|raw| raw.parse::<Geometry>().map_err(de::Error::custom))
        .transpose()
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v)
                .map(|secs| Some(Duration::from_secs(secs)))
                .map_err(|_| E::custom("duration must be non-negative"))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|_| E::custom("duration must be a non-negative number of seconds"))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl RenderProfile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RenderProfile = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported profile version {}; expected 1",
                self.version
            )));
        }

        if let Some(framerate) = self.framerate {
            if !framerate.is_finite() || framerate <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "framerate must be a positive number, got {framerate}"
                )));
            }
        }

        if self.numframes.is_some() && self.duration.is_some() {
            return Err(ConfigError::Invalid(
                "numframes and duration are mutually exclusive".into(),
            ));
        }

        if let Some(env) = &self.env {
            if env.trim().is_empty() {
                return Err(ConfigError::Invalid("env may not be empty".into()));
            }
        }

        for (name, value) in &self.map {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("map keys may not be empty".into()));
            }
            if !value.contains(':') {
                return Err(ConfigError::Invalid(format!(
                    "map entry '{name}' must be of the form KIND:VALUE, got '{value}'"
                )));
            }
        }

        Ok(())
    }

    /// The `[map]` table as `(name, KIND:VALUE)` pairs, sorted by name.
    pub fn mappings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
geometry = "64x32"
env = "shadertoy"
ofmt = "rgb24"
framerate = 29.97
duration = "1m 30s"
realtime = true

[map]
iChannel0 = "audio:song.mp3"
iChannel1 = "image:noise.png"
"#;

    #[test]
    fn parses_sample_profile() {
        let profile = RenderProfile::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            profile.geometry,
            Some(Geometry {
                width: 64,
                height: 32
            })
        );
        assert_eq!(profile.framerate, Some(29.97));
        assert_eq!(profile.duration, Some(Duration::from_secs(90)));
        assert_eq!(profile.realtime, Some(true));
        assert_eq!(
            profile.mappings().collect::<Vec<_>>(),
            [
                ("iChannel0", "audio:song.mp3"),
                ("iChannel1", "image:noise.png")
            ]
        );
    }

    #[test]
    fn everything_but_the_version_is_optional() {
        let profile = RenderProfile::from_toml_str("version = 1").unwrap();
        assert!(profile.geometry.is_none());
        assert!(profile.map.is_empty());
    }

    #[test]
    fn durations_accept_plain_seconds() {
        let profile = RenderProfile::from_toml_str("version = 1\nduration = 2.5").unwrap();
        assert_eq!(profile.duration, Some(Duration::from_millis(2500)));
        let profile = RenderProfile::from_toml_str("version = 1\nduration = 4").unwrap();
        assert_eq!(profile.duration, Some(Duration::from_secs(4)));
    }

    #[test]
    fn rejects_conflicting_limits() {
        let err = RenderProfile::from_toml_str("version = 1\nnumframes = 10\nduration = \"1s\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_values() {
        for input in [
            "version = 2",
            "version = 1\nframerate = 0",
            "version = 1\ngeometry = \"0x10\"",
            "version = 1\nduration = \"soon\"",
            "version = 1\n[map]\niChannel0 = \"song.mp3\"",
            "version = 1\nfps = 30",
        ] {
            assert!(
                RenderProfile::from_toml_str(input).is_err(),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn geometry_round_trips_through_display() {
        let geometry: Geometry = "128X64".parse().unwrap();
        assert_eq!(geometry.to_string(), "128x64");
        assert!("128".parse::<Geometry>().is_err());
        assert!("axb".parse::<Geometry>().is_err());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("led.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert!(RenderProfile::load(&path).is_ok());

        let err = RenderProfile::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}

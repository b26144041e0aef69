use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use encode::{EncodeError, Format};
use profile::{Geometry, RenderProfile};
use renderer::Environment;
use scheduler::{AnimationRequest, RunPlan};
use shadertoy::{dedup_by_name, Mapping};

use crate::cli::Cli;

pub const GEOMETRY_ENV: &str = "LEDCAT_GEOMETRY";

/// A run after merging command line flags over the profile, validated
/// before any shader is read or any GPU state exists.
pub struct Settings {
    pub plan: RunPlan,
    pub geometry: Geometry,
    pub format: &'static dyn Format,
    /// `None` means detect from the shader source.
    pub environment: Option<Environment>,
    /// Paths already resolved against the shader's directory.
    pub mappings: Vec<Mapping>,
}

impl Settings {
    pub fn resolve(
        cli: &Cli,
        profile: &RenderProfile,
        geometry_env: Option<String>,
    ) -> Result<Self> {
        let plan = animation_request(cli, profile)?.resolve()?;
        let geometry = resolve_geometry(cli, profile, geometry_env)?;
        let format = resolve_format(cli, profile)?;
        match plan {
            RunPlan::Still if !format.supports_still() => {
                return Err(EncodeError::StillUnsupported(format.name()))
                    .context("rendering a single image; pass --framerate to animate");
            }
            RunPlan::Animate(_) if !format.supports_animation() => {
                return Err(EncodeError::AnimationUnsupported(format.name()).into());
            }
            _ => {}
        }

        let environment = cli
            .environment
            .as_deref()
            .or(profile.env.as_deref())
            .map(str::parse::<Environment>)
            .transpose()?;

        let base = mapping_base(cli);
        let mappings = collect_mappings(cli, profile)?
            .into_iter()
            .map(|mapping| mapping.resolve(&base))
            .collect();

        Ok(Settings {
            plan,
            geometry,
            format,
            environment,
            mappings,
        })
    }
}

fn animation_request(cli: &Cli, profile: &RenderProfile) -> Result<AnimationRequest> {
    let duration = cli
        .duration
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|_| anyhow!("--duration must be a non-negative number of seconds, got {secs}"))
        })
        .transpose()?;

    // Frame limits override as a pair so that a profile duration never
    // conflicts with a --numframes given on the command line.
    let (num_frames, duration) = if cli.numframes.is_some() || duration.is_some() {
        (cli.numframes, duration)
    } else {
        (profile.numframes, profile.duration)
    };

    Ok(AnimationRequest {
        framerate: cli.framerate.or(profile.framerate),
        num_frames,
        duration,
        realtime: cli.realtime || profile.realtime.unwrap_or(false),
    })
}

fn resolve_geometry(
    cli: &Cli,
    profile: &RenderProfile,
    geometry_env: Option<String>,
) -> Result<Geometry> {
    let requested = match (&cli.geometry, profile.geometry) {
        (Some(value), _) => value.as_str(),
        (None, Some(geometry)) => return Ok(geometry),
        (None, None) => "env",
    };
    if requested != "env" {
        return Ok(requested.parse()?);
    }

    let value = geometry_env.unwrap_or_default();
    if value.trim().is_empty() {
        bail!("{GEOMETRY_ENV} is empty or unset; pass --geometry WIDTHxHEIGHT");
    }
    value
        .parse()
        .with_context(|| format!("reading geometry from {GEOMETRY_ENV}"))
}

fn resolve_format(cli: &Cli, profile: &RenderProfile) -> Result<&'static dyn Format> {
    if let Some(name) = cli.ofmt.as_deref().or(profile.ofmt.as_deref()) {
        return Ok(encode::lookup(name)?);
    }
    if cli.writes_stdout() {
        bail!(
            "--ofmt is required when writing to stdout; valid formats are: {}",
            encode::format_names().join(", ")
        );
    }
    Ok(encode::detect(Path::new(&cli.output))?)
}

/// Profile mappings first so that `--map` entries replace them by name.
fn collect_mappings(cli: &Cli, profile: &RenderProfile) -> Result<Vec<Mapping>> {
    let mut mappings = Vec::with_capacity(profile.map.len() + cli.mappings.len());
    for (name, value) in profile.mappings() {
        mappings.push(
            Mapping::from_parts(name, value)
                .with_context(|| format!("invalid profile mapping for {name}"))?,
        );
    }
    for raw in &cli.mappings {
        mappings.push(raw.parse().with_context(|| format!("invalid --map {raw:?}"))?);
    }
    Ok(dedup_by_name(mappings))
}

/// Relative mapping paths are relative to the shader, or to the working
/// directory when the shader is read from stdin.
fn mapping_base(cli: &Cli) -> PathBuf {
    if cli.reads_stdin() {
        return PathBuf::from(".");
    }
    match Path::new(&cli.input).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

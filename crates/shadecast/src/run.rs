use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use encode::Format;
use profile::RenderProfile;
use renderer::{Environment, HeadlessRenderer, RendererConfig};
use scheduler::{
    render_still, run_animation, AnimationPlan, CancelReason, CancellationToken, FrameMetrics,
    RunPlan,
};
use shadertoy::ShadertoyInputs;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::producer::ShaderProducer;
use crate::settings::{Settings, GEOMETRY_ENV};

type Output = Box<dyn Write + Send>;

pub fn initialise_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let profile = match &cli.profile {
        Some(path) => RenderProfile::load(path)?,
        None => RenderProfile::default(),
    };
    let settings = Settings::resolve(&cli, &profile, std::env::var(GEOMETRY_ENV).ok())?;

    let source = read_shader(&cli)?;
    let environment = match settings.environment {
        Some(environment) => environment,
        None => Environment::detect(&source).ok_or_else(|| {
            anyhow!(
                "unable to detect the shader environment; set --env to one of: {}",
                Environment::NAMES.join(", ")
            )
        })?,
    };
    debug!(
        %environment,
        geometry = %settings.geometry,
        format = settings.format.name(),
        plan = ?settings.plan,
        "resolved run settings"
    );

    let mappings = if environment.supports_channels() || settings.mappings.is_empty() {
        settings.mappings
    } else {
        warn!(
            %environment,
            count = settings.mappings.len(),
            "input mappings are ignored by this environment"
        );
        Vec::new()
    };

    let mut renderer = HeadlessRenderer::new(RendererConfig {
        width: settings.geometry.width,
        height: settings.geometry.height,
        environment,
        source,
    })
    .context("failed to initialise shader renderer")?;
    let inputs = ShadertoyInputs::build(&mappings, renderer.program_mut())?;
    if !inputs.is_empty() {
        renderer.add_pre_render(inputs);
    }

    let mut output = open_output(&cli)?;
    let producer = ShaderProducer::new(renderer);
    match settings.plan {
        RunPlan::Still => {
            let image = render_still(producer)?;
            settings.format.encode(&mut output, &image)?;
            output.flush().context("failed to flush output")?;
            info!(output = %cli.output, "wrote still image");
            Ok(())
        }
        RunPlan::Animate(plan) => animate(producer, &plan, settings.format, output, cli.verbose),
    }
}

fn animate(
    producer: ShaderProducer,
    plan: &AnimationPlan,
    format: &'static dyn Format,
    mut output: Output,
    verbose: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        info!("interrupt received, finishing the current output");
        interrupt.cancel(CancelReason::Interrupted);
    })
    .context("failed to install interrupt handler")?;

    let report = run_animation(
        producer,
        plan,
        &cancel,
        |metrics| {
            if verbose {
                print_progress(metrics);
            }
        },
        |frames, interval| {
            format.encode_animation(&mut output, frames, interval)?;
            output.flush().context("failed to flush output")
        },
    )?;
    if verbose {
        eprintln!();
    }

    info!(
        rendered = report.frames_rendered,
        delivered = report.frames_delivered,
        state = ?report.state,
        "animation finished"
    );
    report.into_result()?;
    Ok(())
}

fn print_progress(metrics: &FrameMetrics) {
    let target = metrics
        .target
        .map_or_else(|| "∞".to_string(), |target| target.to_string());
    eprint!(
        "\rfps={:.2} frames={}/{} speed={:.2}",
        metrics.fps, metrics.frames, target, metrics.speed
    );
}

fn read_shader(cli: &Cli) -> Result<String> {
    let mut source = String::new();
    if cli.reads_stdin() {
        io::stdin()
            .read_to_string(&mut source)
            .context("failed to read shader from stdin")?;
    } else {
        source = std::fs::read_to_string(&cli.input)
            .with_context(|| format!("failed to read shader {}", cli.input))?;
    }
    Ok(source)
}

fn open_output(cli: &Cli) -> Result<Output> {
    if cli.writes_stdout() {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let path = Path::new(&cli.output);
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

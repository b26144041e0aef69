use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "shadecast",
    author,
    version,
    about = "Render GLSL fragment shaders to images, animations and LED matrix streams"
)]
pub struct Cli {
    /// Shader source file, `-` reads it from stdin.
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub input: String,

    /// Output file, `-` writes to stdout (requires `--ofmt`).
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub output: String,

    /// Output size as `WIDTHxHEIGHT`, or `env` to read `LEDCAT_GEOMETRY`.
    #[arg(short, long, value_name = "WIDTHxHEIGHT|env")]
    pub geometry: Option<String>,

    /// Shader dialect (`shadertoy` or `glslsandbox`); detected from the source when unset.
    #[arg(long = "env", value_name = "NAME")]
    pub environment: Option<String>,

    /// Output format; detected from the output extension when unset.
    #[arg(long, value_name = "FORMAT")]
    pub ofmt: Option<String>,

    /// Frames per second. Without it a single still image is rendered.
    #[arg(long, value_name = "FPS")]
    pub framerate: Option<f64>,

    /// Stop after this many frames.
    #[arg(long, value_name = "N")]
    pub numframes: Option<u64>,

    /// Stop after this many seconds of animation.
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<f64>,

    /// Deliver frames at wall-clock pace instead of as fast as possible.
    #[arg(long = "rt")]
    pub realtime: bool,

    /// Debug logging and a progress line on stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Bind an input to a sampler, `NAME=KIND:VALUE` (e.g. `iChannel0=audio:song.mp3`).
    #[arg(long = "map", value_name = "NAME=KIND:VALUE")]
    pub mappings: Vec<String>,

    /// TOML profile holding defaults for the flags above.
    #[arg(long, value_name = "FILE", env = "SHADECAST_PROFILE")]
    pub profile: Option<PathBuf>,
}

impl Cli {
    pub fn reads_stdin(&self) -> bool {
        self.input == "-"
    }

    pub fn writes_stdout(&self) -> bool {
        self.output == "-"
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

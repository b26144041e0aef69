use bytemuck::{Pod, Zeroable};
use chrono::{Datelike, Local, Timelike};

use crate::environment::Environment;
use crate::program::{RenderState, UniformValue};
use crate::CHANNEL_COUNT;

/// Mirrors the `ShaderParams` block injected ahead of ShaderToy shaders.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub(crate) struct ShadertoyUniforms {
    pub i_resolution: [f32; 3],
    pub i_time: f32,
    pub i_time_delta: f32,
    pub i_frame: i32,
    pub i_sample_rate: f32,
    pub i_padding0: f32,
    pub i_mouse: [f32; 4],
    pub i_date: [f32; 4],
    pub i_channel_time: [[f32; 4]; CHANNEL_COUNT],
    pub i_channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

unsafe impl Zeroable for ShadertoyUniforms {}
unsafe impl Pod for ShadertoyUniforms {}

/// Mirrors the `SandboxParams` block injected ahead of GLSL Sandbox shaders.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub(crate) struct SandboxUniforms {
    pub resolution: [f32; 2],
    pub mouse: [f32; 2],
    pub surface_size: [f32; 2],
    pub time: f32,
    pub padding0: f32,
}

unsafe impl Zeroable for SandboxUniforms {}
unsafe impl Pod for SandboxUniforms {}

/// A uniform the wrapped shaders expose, addressed by its GLSL name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    Resolution,
    Time,
    TimeDelta,
    Frame,
    Mouse,
    Date,
    SampleRate,
    ChannelTime(usize),
    ChannelResolution(usize),
    Channel(usize),
    SandboxTime,
    SandboxResolution,
    SandboxMouse,
    SandboxSurfaceSize,
}

impl Slot {
    /// Resolves a uniform name to a slot, returning the identifier that must
    /// appear in the user source for the slot to count as used.
    pub(crate) fn parse(environment: Environment, name: &str) -> Option<(Slot, &str)> {
        match environment {
            Environment::ShaderToy => Self::parse_shadertoy(name),
            Environment::GlslSandbox => {
                let slot = match name {
                    "time" => Slot::SandboxTime,
                    "resolution" => Slot::SandboxResolution,
                    "mouse" => Slot::SandboxMouse,
                    "surfaceSize" => Slot::SandboxSurfaceSize,
                    _ => return None,
                };
                Some((slot, name))
            }
        }
    }

    fn parse_shadertoy(name: &str) -> Option<(Slot, &str)> {
        let simple = match name {
            "iResolution" => Some(Slot::Resolution),
            "iTime" => Some(Slot::Time),
            "iTimeDelta" => Some(Slot::TimeDelta),
            "iFrame" => Some(Slot::Frame),
            "iMouse" => Some(Slot::Mouse),
            "iDate" => Some(Slot::Date),
            "iSampleRate" => Some(Slot::SampleRate),
            _ => None,
        };
        if let Some(slot) = simple {
            return Some((slot, name));
        }

        if let Some(rest) = name.strip_prefix("iChannel") {
            if let Some(index) = parse_channel_index(rest) {
                return Some((Slot::Channel(index), name));
            }
        }

        let (base, rest) = name.split_once('[')?;
        let index = parse_channel_index(rest.strip_suffix(']')?)?;
        match base {
            "iChannelTime" => Some((Slot::ChannelTime(index), base)),
            "iChannelResolution" => Some((Slot::ChannelResolution(index), base)),
            _ => None,
        }
    }
}

fn parse_channel_index(digits: &str) -> Option<usize> {
    if digits.len() != 1 {
        return None;
    }
    let index: usize = digits.parse().ok()?;
    (index < CHANNEL_COUNT).then_some(index)
}

/// CPU copy of the uniform block of the active environment.
#[derive(Clone, Copy, Debug)]
pub(crate) enum UniformBlock {
    ShaderToy(ShadertoyUniforms),
    Sandbox(SandboxUniforms),
}

impl UniformBlock {
    pub fn new(environment: Environment, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        match environment {
            Environment::ShaderToy => UniformBlock::ShaderToy(ShadertoyUniforms {
                i_resolution: [w, h, 1.0],
                i_time: 0.0,
                i_time_delta: 0.0,
                i_frame: 0,
                i_sample_rate: 44100.0,
                i_padding0: 0.0,
                i_mouse: [0.0; 4],
                i_date: [0.0; 4],
                i_channel_time: [[0.0; 4]; CHANNEL_COUNT],
                i_channel_resolution: [[0.0; 4]; CHANNEL_COUNT],
            }),
            Environment::GlslSandbox => UniformBlock::Sandbox(SandboxUniforms {
                resolution: [w, h],
                mouse: [0.0; 2],
                surface_size: [w / h.max(1.0), 1.0],
                time: 0.0,
                padding0: 0.0,
            }),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            UniformBlock::ShaderToy(uniforms) => bytemuck::bytes_of(uniforms),
            UniformBlock::Sandbox(uniforms) => bytemuck::bytes_of(uniforms),
        }
    }

    pub fn size() -> u64 {
        std::mem::size_of::<ShadertoyUniforms>().max(std::mem::size_of::<SandboxUniforms>()) as u64
    }

    /// Writes the built-in per-frame inputs. Pre-render hooks run afterwards
    /// and may override any of them.
    pub fn begin_frame(&mut self, state: &RenderState) {
        let seconds = state.time.as_secs_f32();
        match self {
            UniformBlock::ShaderToy(uniforms) => {
                uniforms.i_time = seconds;
                uniforms.i_time_delta = state.interval.as_secs_f32();
                uniforms.i_frame = state.frame.min(i32::MAX as u64) as i32;
                for channel in &mut uniforms.i_channel_time {
                    channel[0] = seconds;
                }
                uniforms.i_date = current_date();
            }
            UniformBlock::Sandbox(uniforms) => {
                uniforms.time = seconds;
            }
        }
    }

    /// Applies a value to `slot`. Returns `false` when the slot does not take
    /// a value of that type, in which case nothing changes.
    pub fn set(&mut self, slot: Slot, value: UniformValue) -> bool {
        match (self, slot, value) {
            (UniformBlock::ShaderToy(u), Slot::Resolution, UniformValue::Vec3(v)) => {
                u.i_resolution = v
            }
            (UniformBlock::ShaderToy(u), Slot::Time, UniformValue::Float(v)) => u.i_time = v,
            (UniformBlock::ShaderToy(u), Slot::TimeDelta, UniformValue::Float(v)) => {
                u.i_time_delta = v
            }
            (UniformBlock::ShaderToy(u), Slot::Frame, UniformValue::Int(v)) => u.i_frame = v,
            (UniformBlock::ShaderToy(u), Slot::Mouse, UniformValue::Vec4(v)) => u.i_mouse = v,
            (UniformBlock::ShaderToy(u), Slot::Date, UniformValue::Vec4(v)) => u.i_date = v,
            (UniformBlock::ShaderToy(u), Slot::SampleRate, UniformValue::Float(v)) => {
                u.i_sample_rate = v
            }
            (UniformBlock::ShaderToy(u), Slot::ChannelTime(i), UniformValue::Float(v)) => {
                u.i_channel_time[i][0] = v
            }
            (UniformBlock::ShaderToy(u), Slot::ChannelResolution(i), UniformValue::Vec3(v)) => {
                u.i_channel_resolution[i] = [v[0], v[1], v[2], 0.0]
            }
            (UniformBlock::Sandbox(u), Slot::SandboxTime, UniformValue::Float(v)) => u.time = v,
            (UniformBlock::Sandbox(u), Slot::SandboxResolution, UniformValue::Vec2(v)) => {
                u.resolution = v
            }
            (UniformBlock::Sandbox(u), Slot::SandboxMouse, UniformValue::Vec2(v)) => u.mouse = v,
            (UniformBlock::Sandbox(u), Slot::SandboxSurfaceSize, UniformValue::Vec2(v)) => {
                u.surface_size = v
            }
            _ => return false,
        }
        true
    }
}

fn current_date() -> [f32; 4] {
    let local_now = Local::now();
    let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
        + local_now.nanosecond() as f32 / 1_000_000_000.0;
    [
        local_now.year() as f32,
        // ShaderToy months are zero-based.
        local_now.month0() as f32,
        local_now.day() as f32,
        seconds_since_midnight,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn shadertoy_block_matches_std140_layout() {
        assert_eq!(std::mem::size_of::<ShadertoyUniforms>(), 192);
        assert_eq!(std::mem::offset_of!(ShadertoyUniforms, i_time), 12);
        assert_eq!(std::mem::offset_of!(ShadertoyUniforms, i_mouse), 32);
        assert_eq!(std::mem::offset_of!(ShadertoyUniforms, i_channel_time), 64);
        assert_eq!(
            std::mem::offset_of!(ShadertoyUniforms, i_channel_resolution),
            128
        );
        assert_eq!(std::mem::size_of::<SandboxUniforms>(), 32);
        assert_eq!(std::mem::offset_of!(SandboxUniforms, time), 24);
    }

    #[test]
    fn parses_indexed_shadertoy_names() {
        let env = Environment::ShaderToy;
        assert_eq!(
            Slot::parse(env, "iChannelTime[2]"),
            Some((Slot::ChannelTime(2), "iChannelTime"))
        );
        assert_eq!(
            Slot::parse(env, "iChannelResolution[0]"),
            Some((Slot::ChannelResolution(0), "iChannelResolution"))
        );
        assert_eq!(Slot::parse(env, "iChannel3"), Some((Slot::Channel(3), "iChannel3")));
        assert_eq!(Slot::parse(env, "iChannel4"), None);
        assert_eq!(Slot::parse(env, "iChannelTime[7]"), None);
        assert_eq!(Slot::parse(env, "time"), None);
        assert_eq!(
            Slot::parse(Environment::GlslSandbox, "time"),
            Some((Slot::SandboxTime, "time"))
        );
    }

    #[test]
    fn begin_frame_publishes_virtual_time() {
        let mut block = UniformBlock::new(Environment::ShaderToy, 64, 32);
        block.begin_frame(&RenderState {
            time: Duration::from_millis(1500),
            interval: Duration::from_millis(40),
            frame: 37,
        });
        let UniformBlock::ShaderToy(uniforms) = block else {
            panic!("expected shadertoy uniforms");
        };
        assert_eq!(uniforms.i_resolution, [64.0, 32.0, 1.0]);
        assert!((uniforms.i_time - 1.5).abs() < 1e-6);
        assert!((uniforms.i_time_delta - 0.04).abs() < 1e-6);
        assert_eq!(uniforms.i_frame, 37);
    }

    #[test]
    fn mismatched_value_types_are_ignored() {
        let mut block = UniformBlock::new(Environment::ShaderToy, 8, 8);
        assert!(!block.set(Slot::Time, UniformValue::Vec2([1.0, 2.0])));
        assert!(block.set(Slot::SampleRate, UniformValue::Float(22000.0)));
        assert!(!block.set(Slot::SandboxTime, UniformValue::Float(1.0)));
    }
}

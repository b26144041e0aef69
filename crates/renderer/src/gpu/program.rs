use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::compile::references;
use crate::environment::Environment;
use crate::program::{
    ShaderProgram, TextureSpec, TextureUnit, UniformLocation, UniformValue,
};
use crate::CHANNEL_COUNT;

use super::channels::{self, ChannelResources};
use super::pipeline::build_channel_entries;
use super::uniforms::{Slot, UniformBlock};

const CHANNEL_TIME_BASE: u32 = 16;
const CHANNEL_RESOLUTION_BASE: u32 = 32;
const CHANNEL_BASE: u32 = 48;
const SANDBOX_BASE: u32 = 64;

fn encode_slot(slot: Slot) -> u32 {
    match slot {
        Slot::Resolution => 0,
        Slot::Time => 1,
        Slot::TimeDelta => 2,
        Slot::Frame => 3,
        Slot::Mouse => 4,
        Slot::Date => 5,
        Slot::SampleRate => 6,
        Slot::ChannelTime(index) => CHANNEL_TIME_BASE + index as u32,
        Slot::ChannelResolution(index) => CHANNEL_RESOLUTION_BASE + index as u32,
        Slot::Channel(index) => CHANNEL_BASE + index as u32,
        Slot::SandboxTime => SANDBOX_BASE,
        Slot::SandboxResolution => SANDBOX_BASE + 1,
        Slot::SandboxMouse => SANDBOX_BASE + 2,
        Slot::SandboxSurfaceSize => SANDBOX_BASE + 3,
    }
}

fn decode_slot(code: u32) -> Option<Slot> {
    let channel = |base: u32| {
        let index = code.checked_sub(base)? as usize;
        (index < CHANNEL_COUNT).then_some(index)
    };
    let slot = match code {
        0 => Slot::Resolution,
        1 => Slot::Time,
        2 => Slot::TimeDelta,
        3 => Slot::Frame,
        4 => Slot::Mouse,
        5 => Slot::Date,
        6 => Slot::SampleRate,
        c if c >= SANDBOX_BASE => match c - SANDBOX_BASE {
            0 => Slot::SandboxTime,
            1 => Slot::SandboxResolution,
            2 => Slot::SandboxMouse,
            3 => Slot::SandboxSurfaceSize,
            _ => return None,
        },
        c if c >= CHANNEL_BASE => Slot::Channel(channel(CHANNEL_BASE)?),
        c if c >= CHANNEL_RESOLUTION_BASE => {
            Slot::ChannelResolution(channel(CHANNEL_RESOLUTION_BASE)?)
        }
        c if c >= CHANNEL_TIME_BASE => Slot::ChannelTime(channel(CHANNEL_TIME_BASE)?),
        _ => return None,
    };
    Some(slot)
}

/// Uniform and texture state of the compiled shader, owned by the render thread.
pub(crate) struct WgpuProgram {
    device: wgpu::Device,
    queue: wgpu::Queue,
    environment: Environment,
    source: String,
    pub(crate) uniforms: UniformBlock,
    units: BTreeMap<TextureUnit, ChannelResources>,
    channels: [Option<TextureUnit>; CHANNEL_COUNT],
    placeholder: ChannelResources,
    channel_bind_group: wgpu::BindGroup,
    channels_dirty: bool,
}

impl WgpuProgram {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        channel_layout: &wgpu::BindGroupLayout,
        environment: Environment,
        source: String,
        width: u32,
        height: u32,
    ) -> Self {
        let placeholder = channels::create_placeholder_texture(device, queue);
        let channel_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("channel bind group"),
            layout: channel_layout,
            entries: &build_channel_entries(&[&placeholder; CHANNEL_COUNT]),
        });
        Self {
            device: device.clone(),
            queue: queue.clone(),
            environment,
            source,
            uniforms: UniformBlock::new(environment, width, height),
            units: BTreeMap::new(),
            channels: [None; CHANNEL_COUNT],
            placeholder,
            channel_bind_group,
            channels_dirty: false,
        }
    }

    /// Rebuilds the channel bind group if a sampler or texture changed.
    pub fn channel_bind_group(&mut self, layout: &wgpu::BindGroupLayout) -> &wgpu::BindGroup {
        if self.channels_dirty {
            let resources: [&ChannelResources; CHANNEL_COUNT] = std::array::from_fn(|index| {
                self.channels[index]
                    .and_then(|unit| self.units.get(&unit))
                    .unwrap_or(&self.placeholder)
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("channel bind group"),
                layout,
                entries: &build_channel_entries(&resources),
            });
            self.channel_bind_group = bind_group;
            self.channels_dirty = false;
        }
        &self.channel_bind_group
    }
}

impl ShaderProgram for WgpuProgram {
    fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        let (slot, identifier) = Slot::parse(self.environment, name)?;
        references(&self.source, identifier).then(|| UniformLocation::new(encode_slot(slot)))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(slot) = decode_slot(location.index()) else {
            warn!(location = location.index(), "ignoring unknown uniform location");
            return;
        };
        if !self.uniforms.set(slot, value) {
            warn!(?slot, ?value, "ignoring uniform value of mismatched type");
        }
    }

    fn create_texture(&mut self, unit: TextureUnit, spec: TextureSpec) -> Result<()> {
        let resources = channels::create_unit_texture(&self.device, &self.queue, unit, spec)?;
        self.units.insert(unit, resources);
        self.channels_dirty = true;
        Ok(())
    }

    fn update_texture(&mut self, unit: TextureUnit, data: &[u8]) -> Result<()> {
        self.units
            .get(&unit)
            .ok_or_else(|| anyhow!("texture unit {} has no texture", unit.index()))?
            .write(&self.queue, data)
    }

    fn bind_sampler(&mut self, location: UniformLocation, unit: TextureUnit) {
        match decode_slot(location.index()) {
            Some(Slot::Channel(index)) => {
                if self.channels[index] != Some(unit) {
                    self.channels[index] = Some(unit);
                    self.channels_dirty = true;
                }
            }
            other => warn!(slot = ?other, "uniform is not a sampler; ignoring binding"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_codes_round_trip() {
        let slots = [
            Slot::Resolution,
            Slot::SampleRate,
            Slot::ChannelTime(3),
            Slot::ChannelResolution(0),
            Slot::Channel(2),
            Slot::SandboxSurfaceSize,
        ];
        for slot in slots {
            assert_eq!(decode_slot(encode_slot(slot)), Some(slot));
        }
        assert_eq!(decode_slot(7), None);
        assert_eq!(decode_slot(CHANNEL_BASE + 4), None);
        assert_eq!(decode_slot(SANDBOX_BASE + 9), None);
    }
}

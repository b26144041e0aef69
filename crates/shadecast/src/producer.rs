use anyhow::Result;
use image::RgbaImage;
use renderer::{HeadlessRenderer, RenderState};
use scheduler::{FrameProducer, Tick};

/// Adapts the GPU renderer to the scheduler's tick-driven producer interface.
pub struct ShaderProducer {
    renderer: HeadlessRenderer,
}

impl ShaderProducer {
    pub fn new(renderer: HeadlessRenderer) -> Self {
        Self { renderer }
    }
}

impl FrameProducer for ShaderProducer {
    type Frame = RgbaImage;

    fn render(&mut self, tick: &Tick) -> Result<RgbaImage> {
        self.renderer.render(&RenderState {
            time: tick.timestamp,
            interval: tick.interval,
            frame: tick.index,
        })
    }
}

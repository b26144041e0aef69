use std::sync::Arc;

use anyhow::{Context, Result};
use num_complex::Complex;
use renderer::{
    PreRender, RenderState, ShaderProgram, TexelFormat, TextureFilter, TextureSpec, TextureUnit,
    UniformLocation, UniformValue,
};
use rustfft::{Fft, FftPlanner};
use tracing::{debug, trace};

use super::AudioSource;

/// Samples per analysis window; also the texture width.
pub const AUDIO_TEXTURE_WIDTH: usize = 512;
/// Row 0 is the spectrum, row 1 the waveform.
pub const AUDIO_TEXTURE_HEIGHT: usize = 2;

const SPEC: TextureSpec = TextureSpec {
    width: AUDIO_TEXTURE_WIDTH as u32,
    height: AUDIO_TEXTURE_HEIGHT as u32,
    format: TexelFormat::Luminance8,
    filter: TextureFilter::Nearest,
};

/// Maps a value in `[-1, 1]` onto `[0, 255]`; out of range values saturate.
pub fn encode_sample(value: f32) -> u8 {
    ((value * 0.5 + 0.5) * 255.0).round() as u8
}

/// Turns the latest window of samples into the two texture rows.
struct Synthesizer {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    pixels: Vec<u8>,
}

impl Synthesizer {
    fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(AUDIO_TEXTURE_WIDTH);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            buffer: vec![Complex::default(); AUDIO_TEXTURE_WIDTH],
            scratch: vec![Complex::default(); scratch_len],
            pixels: vec![0; AUDIO_TEXTURE_WIDTH * AUDIO_TEXTURE_HEIGHT],
        }
    }

    fn synthesize(&mut self, samples: &[f32]) -> &[u8] {
        let recent = &samples[samples.len().saturating_sub(AUDIO_TEXTURE_WIDTH)..];
        let padding = AUDIO_TEXTURE_WIDTH - recent.len();

        let (spectrum_row, wave_row) = self.pixels.split_at_mut(AUDIO_TEXTURE_WIDTH);
        for (i, (bin, byte)) in self.buffer.iter_mut().zip(wave_row.iter_mut()).enumerate() {
            let sample = if i < padding { 0.0 } else { recent[i - padding] };
            *bin = Complex::new(sample, 0.0);
            *byte = encode_sample(sample);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (bin, pair) in self
            .buffer
            .iter()
            .take(AUDIO_TEXTURE_WIDTH / 2)
            .zip(spectrum_row.chunks_exact_mut(2))
        {
            pair[0] = encode_sample(bin.re);
            pair[1] = encode_sample(bin.im);
        }
        &self.pixels
    }
}

/// An audio source rendered into a 512x2 luminance texture every frame.
pub struct AudioTexture {
    name: String,
    unit: TextureUnit,
    source: Box<dyn AudioSource>,
    sampler: Option<UniformLocation>,
    channel_time: Option<UniformLocation>,
    channel_resolution: Option<UniformLocation>,
    sample_rate: Option<UniformLocation>,
    synthesizer: Synthesizer,
}

impl AudioTexture {
    /// Binds `source` to the sampler uniform `name` on texture `unit`.
    ///
    /// The texture is only created when the shader references `name`.
    pub fn new(
        name: &str,
        unit: TextureUnit,
        source: Box<dyn AudioSource>,
        program: &mut dyn ShaderProgram,
    ) -> Result<Self> {
        let sampler = program.uniform_location(name);
        if sampler.is_some() {
            program
                .create_texture(unit, SPEC)
                .with_context(|| format!("failed to create audio texture for {name}"))?;
        } else {
            debug!(uniform = name, "shader does not reference audio input; skipping uploads");
        }

        let channel = crate::mapping::channel_index(name);
        let indexed = |base: &str| {
            channel.and_then(|n| program.uniform_location(&format!("{base}[{n}]")))
        };
        let channel_time = indexed("iChannelTime");
        let channel_resolution = indexed("iChannelResolution");

        Ok(Self {
            name: name.to_string(),
            unit,
            source,
            sampler,
            channel_time,
            channel_resolution,
            sample_rate: program.uniform_location("iSampleRate"),
            synthesizer: Synthesizer::new(),
        })
    }
}

impl PreRender for AudioTexture {
    fn pre_render(&mut self, program: &mut dyn ShaderProgram, state: &RenderState) -> Result<()> {
        let samples = self
            .source
            .read_samples(state.interval)
            .with_context(|| format!("failed to read audio for {}", self.name))?;
        trace!(uniform = %self.name, frame = state.frame, samples = samples.len(), "read audio");

        if let Some(location) = self.sampler {
            let pixels = self.synthesizer.synthesize(&samples);
            program
                .update_texture(self.unit, pixels)
                .with_context(|| format!("failed to upload audio texture for {}", self.name))?;
            program.bind_sampler(location, self.unit);
        }

        if let Some(location) = self.channel_resolution {
            let value = [AUDIO_TEXTURE_WIDTH as f32, AUDIO_TEXTURE_HEIGHT as f32, 1.0];
            program.set_uniform(location, UniformValue::Vec3(value));
        }
        if let Some(location) = self.channel_time {
            program.set_uniform(location, UniformValue::Float(state.time.as_secs_f32()));
        }
        if let Some(location) = self.sample_rate {
            program.set_uniform(location, UniformValue::Float(self.source.sample_rate()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::testing::RecordingProgram;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Scripted {
        rate: f32,
        reads: VecDeque<Vec<f32>>,
        periods: Arc<Mutex<Vec<Duration>>>,
    }

    impl AudioSource for Scripted {
        fn sample_rate(&self) -> f32 {
            self.rate
        }

        fn read_samples(&mut self, period: Duration) -> Result<Vec<f32>, AudioError> {
            self.periods.lock().unwrap().push(period);
            Ok(self.reads.pop_front().unwrap_or_default())
        }
    }

    fn scripted(reads: Vec<Vec<f32>>) -> Box<Scripted> {
        Box::new(Scripted {
            rate: 44100.0,
            reads: reads.into(),
            periods: Arc::default(),
        })
    }

    fn state(frame: u64) -> RenderState {
        RenderState {
            time: Duration::from_millis(40 * frame),
            interval: Duration::from_millis(40),
            frame,
        }
    }

    #[test]
    fn encoding_maps_unit_range_onto_bytes() {
        assert_eq!(encode_sample(0.0), 128);
        assert_eq!(encode_sample(-1.0), 0);
        assert_eq!(encode_sample(1.0), 255);
        assert_eq!(encode_sample(0.5), 191);
        assert_eq!(encode_sample(4.0), 255);
        assert_eq!(encode_sample(-4.0), 0);
    }

    #[test]
    fn silence_encodes_to_midpoint() {
        let mut synth = Synthesizer::new();
        let pixels = synth.synthesize(&[]);
        assert_eq!(pixels.len(), AUDIO_TEXTURE_WIDTH * AUDIO_TEXTURE_HEIGHT);
        assert!(pixels.iter().all(|&b| b == 128));
    }

    #[test]
    fn short_windows_are_left_padded() {
        let mut synth = Synthesizer::new();
        let pixels = synth.synthesize(&[1.0, -1.0]).to_vec();
        let wave = &pixels[AUDIO_TEXTURE_WIDTH..];
        assert!(wave[..AUDIO_TEXTURE_WIDTH - 2].iter().all(|&b| b == 128));
        assert_eq!(wave[AUDIO_TEXTURE_WIDTH - 2..], [255, 0]);
    }

    #[test]
    fn long_windows_keep_the_most_recent_samples() {
        let mut samples = vec![1.0; 100];
        samples.extend(std::iter::repeat(-1.0).take(AUDIO_TEXTURE_WIDTH));
        let mut synth = Synthesizer::new();
        let pixels = synth.synthesize(&samples);
        assert!(pixels[AUDIO_TEXTURE_WIDTH..].iter().all(|&b| b == 0));
    }

    #[test]
    fn spectrum_row_interleaves_real_and_imaginary_parts() {
        let mut synth = Synthesizer::new();
        let pixels = synth.synthesize(&vec![0.001; AUDIO_TEXTURE_WIDTH]).to_vec();
        let spectrum = &pixels[..AUDIO_TEXTURE_WIDTH];

        // DC bin: 512 * 0.001 = 0.512 real, no imaginary part.
        assert_eq!(spectrum[0], encode_sample(0.512));
        assert_eq!(spectrum[1], 128);
        assert!(spectrum[2..].iter().all(|&b| b == 128));
    }

    #[test]
    fn uploads_and_publishes_when_declared() {
        let mut program = RecordingProgram::declaring(&[
            "iChannel1",
            "iChannelTime[1]",
            "iChannelResolution[1]",
            "iSampleRate",
        ]);
        let unit = TextureUnit::new(0);
        let mut texture =
            AudioTexture::new("iChannel1", unit, scripted(vec![vec![0.5; 8]]), &mut program)
                .unwrap();

        texture.pre_render(&mut program, &state(3)).unwrap();

        let (spec, uploads) = &program.textures[&unit];
        assert_eq!(spec.format, TexelFormat::Luminance8);
        assert_eq!(spec.filter, TextureFilter::Nearest);
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0][2 * AUDIO_TEXTURE_WIDTH - 1], 191);
        assert_eq!(program.samplers, [("iChannel1".to_string(), unit)]);
        assert_eq!(
            program.last_uniform("iChannelResolution[1]"),
            Some(UniformValue::Vec3([512.0, 2.0, 1.0]))
        );
        assert_eq!(
            program.last_uniform("iChannelTime[1]"),
            Some(UniformValue::Float(0.12))
        );
        assert_eq!(
            program.last_uniform("iSampleRate"),
            Some(UniformValue::Float(44100.0))
        );
    }

    #[test]
    fn undeclared_input_still_consumes_audio() {
        let mut program = RecordingProgram::declaring(&["iTime"]);
        let unit = TextureUnit::new(2);
        let mut texture =
            AudioTexture::new("iChannel0", unit, scripted(Vec::new()), &mut program).unwrap();

        texture.pre_render(&mut program, &state(0)).unwrap();
        texture.pre_render(&mut program, &state(1)).unwrap();

        assert!(program.textures.is_empty());
        assert!(program.samplers.is_empty());
        assert!(program.uniforms.is_empty());
    }

    #[test]
    fn reads_one_frame_interval_per_tick() {
        let mut program = RecordingProgram::declaring(&["iChannel0"]);
        let source = scripted(Vec::new());
        let periods = Arc::clone(&source.periods);
        let mut texture =
            AudioTexture::new("iChannel0", TextureUnit::new(0), source, &mut program).unwrap();
        for frame in 0..3 {
            texture.pre_render(&mut program, &state(frame)).unwrap();
        }
        assert_eq!(*periods.lock().unwrap(), vec![Duration::from_millis(40); 3]);
        assert_eq!(program.uploads(TextureUnit::new(0)).len(), 3);
    }
}

use std::borrow::Cow;

use anyhow::{anyhow, Result};
use wgpu::naga::ShaderStage;

use crate::environment::Environment;

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile_checked(
        device,
        "fullscreen triangle vertex",
        Cow::Borrowed(VERTEX_SHADER_GLSL),
        ShaderStage::Vertex,
    )
}

/// Wraps the user shader with the prelude of its environment and compiles it as GLSL.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    source: &str,
    environment: Environment,
) -> Result<wgpu::ShaderModule> {
    let wrapped = wrap_fragment(source, environment);
    tracing::trace!(environment = %environment, wrapped = %wrapped, "wrapped fragment shader");
    compile_checked(
        device,
        "shadecast fragment",
        Cow::Owned(wrapped),
        ShaderStage::Fragment,
    )
}

fn compile_checked(
    device: &wgpu::Device,
    label: &str,
    shader: Cow<'_, str>,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader,
            stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(anyhow!("failed to compile {label}: {error}")),
        None => Ok(module),
    }
}

pub(crate) fn wrap_fragment(source: &str, environment: Environment) -> String {
    match environment {
        Environment::ShaderToy => wrap_shadertoy_fragment(source),
        Environment::GlslSandbox => wrap_sandbox_fragment(source),
    }
}

/// Whether `identifier` occurs in `source` as a whole token.
pub(crate) fn references(source: &str, identifier: &str) -> bool {
    if identifier.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    source.match_indices(identifier).any(|(start, _)| {
        let before = source[..start].chars().next_back();
        let after = source[start + identifier.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

const SHADERTOY_UNIFORMS: [&str; 13] = [
    "iResolution",
    "iTime",
    "iTimeDelta",
    "iFrame",
    "iMouse",
    "iDate",
    "iSampleRate",
    "iChannelTime",
    "iChannelResolution",
    "iChannel0",
    "iChannel1",
    "iChannel2",
    "iChannel3",
];

const SANDBOX_UNIFORMS: [&str; 5] = ["time", "resolution", "mouse", "surfaceSize", "backbuffer"];

/// Drops the `#version` line and any declaration of a uniform we inject ourselves.
fn sanitize(source: &str, injected: &[&str], drop_line: impl Fn(&str) -> bool) -> String {
    let mut sanitized = String::with_capacity(source.len());
    let mut skipped_version = false;
    for line in source.lines() {
        let trimmed = line.trim_start();
        if !skipped_version && trimmed.starts_with("#version") {
            skipped_version = true;
            continue;
        }
        let injected_uniform = trimmed.starts_with("uniform ")
            && injected.iter().any(|name| references(trimmed, name));
        if injected_uniform || drop_line(trimmed) {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }
    sanitized
}

/// Produces a self-contained GLSL fragment shader from raw ShaderToy code.
///
/// The header declares the uniform block and channel samplers behind macros
/// named like the ShaderToy inputs; the footer remaps `gl_FragCoord` to a
/// bottom-left origin and calls `mainImage`.
fn wrap_shadertoy_fragment(source: &str) -> String {
    let sanitized = sanitize(source, &SHADERTOY_UNIFORMS, |_| false);
    format!("{SHADERTOY_HEADER}\n#line 1\n{sanitized}{SHADERTOY_FOOTER}")
}

/// Produces a self-contained GLSL fragment shader from GLSL Sandbox code.
///
/// The user's `main` is renamed through the preprocessor so the footer can
/// run it and copy `gl_FragColor` into the real output.
fn wrap_sandbox_fragment(source: &str) -> String {
    let sanitized = sanitize(source, &SANDBOX_UNIFORMS, |line| {
        line.starts_with("precision ")
            || line.starts_with("#extension")
            || (line.starts_with("varying ") && references(line, "surfacePosition"))
    });
    format!("{SANDBOX_HEADER}\n#line 1\n{sanitized}{SANDBOX_FOOTER}")
}

/// The uniform block layout must match `ShadertoyUniforms` in `gpu/uniforms.rs`.
const SHADERTOY_HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform ShaderParams {
    vec3 _iResolution;
    float _iTime;
    float _iTimeDelta;
    int _iFrame;
    float _iSampleRate;
    float _padding0;
    vec4 _iMouse;
    vec4 _iDate;
    float _iChannelTime[4];
    vec3 _iChannelResolution[4];
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrame ubo._iFrame
#define iMouse ubo._iMouse
#define iDate ubo._iDate
#define iSampleRate ubo._iSampleRate
#define iChannelTime ubo._iChannelTime
#define iChannelResolution ubo._iChannelResolution

layout(set = 1, binding = 0) uniform texture2D shadecast_channel0_texture;
layout(set = 1, binding = 1) uniform sampler shadecast_channel0_sampler;
layout(set = 1, binding = 2) uniform texture2D shadecast_channel1_texture;
layout(set = 1, binding = 3) uniform sampler shadecast_channel1_sampler;
layout(set = 1, binding = 4) uniform texture2D shadecast_channel2_texture;
layout(set = 1, binding = 5) uniform sampler shadecast_channel2_sampler;
layout(set = 1, binding = 6) uniform texture2D shadecast_channel3_texture;
layout(set = 1, binding = 7) uniform sampler shadecast_channel3_sampler;

#define iChannel0 sampler2D(shadecast_channel0_texture, shadecast_channel0_sampler)
#define iChannel1 sampler2D(shadecast_channel1_texture, shadecast_channel1_sampler)
#define iChannel2 sampler2D(shadecast_channel2_texture, shadecast_channel2_sampler)
#define iChannel3 sampler2D(shadecast_channel3_texture, shadecast_channel3_sampler)

vec4 shadecast_gl_FragCoord;
#define gl_FragCoord shadecast_gl_FragCoord
";

const SHADERTOY_FOOTER: &str = r"void main() {
    #undef gl_FragCoord
    vec2 builtinFC = vec2(gl_FragCoord.x, gl_FragCoord.y);
    #define gl_FragCoord shadecast_gl_FragCoord

    vec2 fragCoord = vec2(builtinFC.x, iResolution.y - builtinFC.y);
    shadecast_gl_FragCoord = vec4(fragCoord, 0.0, 1.0);

    vec4 color = vec4(0.0);
    mainImage(color, fragCoord);
    outColor = vec4(color.rgb, 1.0);
}
";

/// The uniform block layout must match `SandboxUniforms` in `gpu/uniforms.rs`.
const SANDBOX_HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform SandboxParams {
    vec2 _resolution;
    vec2 _mouse;
    vec2 _surfaceSize;
    float _time;
    float _padding0;
} ubo;

#define time ubo._time
#define resolution ubo._resolution
#define mouse ubo._mouse
#define surfaceSize ubo._surfaceSize

vec2 surfacePosition;
vec4 shadecast_frag_color;
#define gl_FragColor shadecast_frag_color
vec4 shadecast_gl_FragCoord;
#define gl_FragCoord shadecast_gl_FragCoord
#define main shadecast_sandbox_main
";

const SANDBOX_FOOTER: &str = r"#undef main
void main() {
    #undef gl_FragCoord
    vec2 builtinFC = vec2(gl_FragCoord.x, gl_FragCoord.y);
    #define gl_FragCoord shadecast_gl_FragCoord

    shadecast_gl_FragCoord = vec4(builtinFC.x, resolution.y - builtinFC.y, 0.0, 1.0);
    surfacePosition = (v_uv * 2.0 - 1.0) * surfaceSize * 0.5;
    shadecast_frag_color = vec4(0.0, 0.0, 0.0, 1.0);
    shadecast_sandbox_main();
    outColor = vec4(shadecast_frag_color.rgb, 1.0);
}
";

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

//! WGSL sources. Compute kernels mirror the CPU kernels in
//! `dyntex_device::software` texel for texel.

/// Concentric rings that drift outward over time. Output only.
pub const COLOR_CIRCLES: &str = r#"
struct TimeUniform {
    seconds: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0)
var output: texture_storage_2d<rgba8unorm, write>;

@group(0) @binding(1)
var<uniform> time: TimeUniform;

@compute @workgroup_size(16, 16)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(output);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let uv = (vec2<f32>(id.xy) + 0.5) / vec2<f32>(size);
    let d = length(uv - vec2<f32>(0.5));
    let ring = sin(d * 20.0 - time.seconds * 3.0) * 0.5 + 0.5;
    let shade = sin(time.seconds + d * 6.0) * 0.5 + 0.5;
    textureStore(output, vec2<i32>(id.xy), vec4<f32>(ring, shade, 1.0 - ring, 1.0));
}
"#;

/// Input with a travelling alpha wave.
pub const WAVY_TRANSPARENCY: &str = r#"
struct TimeUniform {
    seconds: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0)
var input: texture_2d<f32>;

@group(0) @binding(1)
var output: texture_storage_2d<rgba8unorm, write>;

@group(0) @binding(2)
var<uniform> time: TimeUniform;

fn load_input(uv: vec2<f32>) -> vec4<f32> {
    let size = textureDimensions(input);
    let texel = min(vec2<u32>(clamp(uv, vec2<f32>(0.0), vec2<f32>(1.0)) * vec2<f32>(size)), size - vec2<u32>(1u));
    return textureLoad(input, texel, 0);
}

@compute @workgroup_size(16, 16)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(output);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let uv = (vec2<f32>(id.xy) + 0.5) / vec2<f32>(size);
    let color = load_input(uv);
    let wave = sin(uv.x * 10.0 + uv.y * 4.0 + time.seconds * 2.0) * 0.5 + 0.5;
    textureStore(output, vec2<i32>(id.xy), vec4<f32>(color.rgb, color.a * wave));
}
"#;

/// Input resampled to the output extent, dimmed outside a circling mask.
pub const SIMULATE_MASKING: &str = r#"
struct TimeUniform {
    seconds: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0)
var input: texture_2d<f32>;

@group(0) @binding(1)
var output: texture_storage_2d<rgba8unorm, write>;

@group(0) @binding(2)
var<uniform> time: TimeUniform;

fn load_input(uv: vec2<f32>) -> vec4<f32> {
    let size = textureDimensions(input);
    let texel = min(vec2<u32>(clamp(uv, vec2<f32>(0.0), vec2<f32>(1.0)) * vec2<f32>(size)), size - vec2<u32>(1u));
    return textureLoad(input, texel, 0);
}

@compute @workgroup_size(16, 16)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(output);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let uv = (vec2<f32>(id.xy) + 0.5) / vec2<f32>(size);
    let center = vec2<f32>(0.5 + 0.3 * cos(time.seconds), 0.5 + 0.3 * sin(time.seconds));
    let color = load_input(uv);
    var out = color;
    if (length(uv - center) >= 0.35) {
        out = vec4<f32>(color.rgb * 0.25, color.a);
    }
    textureStore(output, vec2<i32>(id.xy), out);
}
"#;

/// Color inversion. Reads no time uniform.
pub const INVERT: &str = r#"
@group(0) @binding(0)
var input: texture_2d<f32>;

@group(0) @binding(1)
var output: texture_storage_2d<rgba8unorm, write>;

fn load_input(uv: vec2<f32>) -> vec4<f32> {
    let size = textureDimensions(input);
    let texel = min(vec2<u32>(clamp(uv, vec2<f32>(0.0), vec2<f32>(1.0)) * vec2<f32>(size)), size - vec2<u32>(1u));
    return textureLoad(input, texel, 0);
}

@compute @workgroup_size(16, 16)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(output);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }
    let uv = (vec2<f32>(id.xy) + 0.5) / vec2<f32>(size);
    let color = load_input(uv);
    textureStore(output, vec2<i32>(id.xy), vec4<f32>(vec3<f32>(1.0) - color.rgb, color.a));
}
"#;

/// Entry point shared by every compute kernel.
pub const KERNEL_ENTRY: &str = "cs_main";

/// WGSL source of a built-in kernel.
pub fn kernel_source(name: &str) -> Option<&'static str> {
    let source = match name {
        "color_circles" => COLOR_CIRCLES,
        "wavy_transparency" => WAVY_TRANSPARENCY,
        "simulate_masking" => SIMULATE_MASKING,
        "invert" => INVERT,
        _ => return None,
    };
    Some(source)
}

/// Textured, tinted quads. Flat-color quads sample a white texel.
pub const QUAD_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

@group(1) @binding(0)
var material_texture: texture_2d<f32>;

@group(1) @binding(1)
var material_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
};

struct InstanceInput {
    @location(2) model_0: vec4<f32>,
    @location(3) model_1: vec4<f32>,
    @location(4) model_2: vec4<f32>,
    @location(5) model_3: vec4<f32>,
    @location(6) tint: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) tint: vec4<f32>,
};

@vertex
fn vs_main(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(
        instance.model_0,
        instance.model_1,
        instance.model_2,
        instance.model_3,
    );
    var out: VertexOutput;
    out.clip_position = camera.view_proj * model * vec4<f32>(vertex.position, 1.0);
    out.uv = vertex.uv;
    out.tint = instance.tint;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(material_texture, material_sampler, in.uv) * in.tint;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use dyntex_device::{BUILTIN_KERNELS, KernelLayout};

    #[test]
    fn every_builtin_has_wgsl() {
        for info in BUILTIN_KERNELS {
            let source = kernel_source(info.name).unwrap();
            assert!(source.contains("@workgroup_size(16, 16)"), "{}", info.name);
            assert!(source.contains(&format!("fn {KERNEL_ENTRY}")), "{}", info.name);
        }
    }

    #[test]
    fn bindings_follow_kernel_layout() {
        for info in BUILTIN_KERNELS {
            let source = kernel_source(info.name).unwrap();
            let layout = info.signature.layout;
            let output = format!("@binding({})\nvar output", layout.output_slot());
            assert!(source.contains(&output), "{}", info.name);
            if layout == KernelLayout::InputOutput {
                assert!(source.contains("@binding(0)\nvar input"), "{}", info.name);
            }
            let time = format!("@binding({})\nvar<uniform> time", layout.time_binding());
            assert_eq!(source.contains(&time), info.signature.time_driven, "{}", info.name);
        }
    }
}

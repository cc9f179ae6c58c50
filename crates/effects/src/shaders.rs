//! WGSL sources for every effect program.
//!
//! Bind layout shared by all programs:
//! - group 0, binding 0: `Globals` (view-projection, quad origin and size).
//! - group 1, binding 0: `Params`, the packed uniform set. Each non-texture
//!   uniform takes one `vec4<f32>` slot in declaration order.
//! - group 1, binding 1: a linear sampler.
//! - group 1, bindings 2..: textures in declaration order.

pub const GLASS: &str = "glass";
pub const FLUID: &str = "fluid";
pub const DISTORTION: &str = "distortion";
pub const CAROUSEL: &str = "carousel";

macro_rules! quad_prelude {
    () => {
        r#"
struct Globals {
    view_proj: mat4x4<f32>,
    origin: vec4<f32>,
    size: vec4<f32>,
};
@group(0) @binding(0) var<uniform> globals: Globals;

struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vid: u32) -> VsOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-0.5, -0.5), vec2<f32>(0.5, -0.5), vec2<f32>(0.5, 0.5),
        vec2<f32>(-0.5, -0.5), vec2<f32>(0.5, 0.5), vec2<f32>(-0.5, 0.5),
    );
    let c = corners[vid];
    let world = vec4<f32>(globals.origin.xy + c * globals.size.xy, globals.origin.z, 1.0);
    var out: VsOut;
    out.position = globals.view_proj * world;
    out.uv = vec2<f32>(c.x + 0.5, 0.5 - c.y);
    return out;
}
"#
    };
}

pub const GLASS_SHADER: &str = concat!(
    quad_prelude!(),
    r#"
struct Params {
    transmission: vec4<f32>,
    roughness: vec4<f32>,
    thickness: vec4<f32>,
    ior: vec4<f32>,
    chromatic_aberration: vec4<f32>,
    distortion: vec4<f32>,
    scale: vec4<f32>,
    time: vec4<f32>,
    pointer: vec4<f32>,
    hover: vec4<f32>,
};
@group(1) @binding(0) var<uniform> params: Params;

fn ripple(uv: vec2<f32>, t: f32) -> vec2<f32> {
    let d = params.distortion.x;
    return vec2<f32>(sin(uv.y * 12.0 + t), cos(uv.x * 12.0 + t * 0.8)) * 0.01 * d;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let t = params.time.x;
    let uv = (in.uv - 0.5) / max(params.scale.x, 0.001) + 0.5;
    let offset = ripple(uv, t);
    let ca = params.chromatic_aberration.x * 0.02;
    let r = 0.92 + offset.x + ca;
    let g = 0.95 + offset.y;
    let b = 1.0 - ca;
    let edge = pow(1.0 - abs(dot(normalize(vec3<f32>(uv - 0.5, 1.0)), vec3<f32>(0.0, 0.0, 1.0))), 3.0);
    let fresnel = edge * params.thickness.x * (params.ior.x - 1.0) * 4.0;
    let frost = params.roughness.x * 0.35;
    let pointer_uv = params.pointer.xy * vec2<f32>(0.5, -0.5) + 0.5;
    let glow = params.hover.x * 0.25 * exp(-8.0 * distance(uv, pointer_uv));
    let alpha = clamp((1.0 - params.transmission.x) + frost + fresnel + glow + 0.08, 0.0, 1.0);
    return vec4<f32>(vec3<f32>(r, g, b) * alpha, alpha);
}
"#
);

pub const FLUID_SHADER: &str = concat!(
    quad_prelude!(),
    r#"
struct Params {
    time: vec4<f32>,
    pointer: vec4<f32>,
    velocity: vec4<f32>,
    intensity: vec4<f32>,
    radius: vec4<f32>,
    color: vec4<f32>,
    dissipation: vec4<f32>,
};
@group(1) @binding(0) var<uniform> params: Params;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let p = in.uv * 2.0 - 1.0;
    let toward = p - params.pointer.xy * vec2<f32>(1.0, -1.0);
    let speed = length(params.velocity.xy);
    let trail = toward + params.velocity.xy * 0.5;
    let falloff = exp(-dot(trail, trail) / max(params.radius.x * params.radius.x, 0.0001));
    let swirl = 0.5 + 0.5 * sin(params.time.x + p.x * 6.0 + p.y * 4.0);
    let a = clamp(falloff * speed * params.intensity.x * (0.6 + 0.4 * swirl), 0.0, 1.0);
    return vec4<f32>(params.color.rgb * a, a * params.color.a);
}
"#
);

pub const DISTORTION_SHADER: &str = concat!(
    quad_prelude!(),
    r#"
struct Params {
    fallback: vec4<f32>,
    hover: vec4<f32>,
    strength: vec4<f32>,
    scale: vec4<f32>,
    time: vec4<f32>,
    pointer: vec4<f32>,
    image_aspect: vec4<f32>,
};
@group(1) @binding(0) var<uniform> params: Params;
@group(1) @binding(1) var samp: sampler;
@group(1) @binding(2) var image: texture_2d<f32>;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let centered = (in.uv - 0.5) / max(params.scale.x, 0.001);
    let wave = sin(centered.y * 10.0 + params.time.x) * params.strength.x * params.hover.x * 0.05;
    let uv = centered + vec2<f32>(wave, 0.0) + 0.5;
    let sampled = textureSample(image, samp, clamp(uv, vec2<f32>(0.0), vec2<f32>(1.0)));
    let neutral = vec4<f32>(vec3<f32>(0.18 + 0.1 * in.uv.y), 1.0);
    return mix(sampled, neutral, params.fallback.x);
}
"#
);

pub const CAROUSEL_SHADER: &str = concat!(
    quad_prelude!(),
    r#"
struct Params {
    progress: vec4<f32>,
    direction: vec4<f32>,
};
@group(1) @binding(0) var<uniform> params: Params;
@group(1) @binding(1) var samp: sampler;
@group(1) @binding(2) var from_tex: texture_2d<f32>;
@group(1) @binding(3) var to_tex: texture_2d<f32>;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let p = params.progress.x;
    let dir = params.direction.x;
    let shift = vec2<f32>(dir * p, 0.0);
    let a = textureSample(from_tex, samp, fract(in.uv + shift));
    let b = textureSample(to_tex, samp, fract(in.uv + shift - vec2<f32>(dir, 0.0)));
    let edge = smoothstep(p - 0.1, p + 0.1, select(1.0 - in.uv.x, in.uv.x, dir > 0.0));
    return mix(b, a, edge);
}
"#
);

/// Source for `program`, if it is one of the effect programs.
pub fn source(program: &str) -> Option<&'static str> {
    match program {
        GLASS => Some(GLASS_SHADER),
        FLUID => Some(FLUID_SHADER),
        DISTORTION => Some(DISTORTION_SHADER),
        CAROUSEL => Some(CAROUSEL_SHADER),
        _ => None,
    }
}

/// Number of textures `program` samples.
pub fn texture_count(program: &str) -> usize {
    source(program).map_or(0, |src| src.matches("texture_2d<f32>").count())
}

//! Common utilities for binding integration tests.
//!
//! Shader fixtures are WGSL so they run through the same reflection path as
//! SPIR-V on both backends.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_binding::{
    BackendType, BindingConfig, GraphicsDevice, HeadlessDevice, HitGroupDesc, LoggingConfig,
    Mesh, MeshDescriptor, RayTracingLibraryDesc, Renderer, ShaderCode, ShaderDescriptor,
    ShaderLibrary, ShaderProgram, ShaderStage, StageBytecode, Submesh, Texture,
    TextureDescriptor, TextureFormat,
};

// ============================================================================
// Shader fixtures
// ============================================================================

/// Forward shading: per-object and material constants, two textures, one sampler.
pub const FORWARD_WGSL: &str = r#"
struct PerObject {
    gWorld: mat4x4<f32>,
    gTint: vec4<f32>,
}

struct MaterialParams {
    gRoughness: f32,
    gMetallic: f32,
    gLayer: i32,
    gFlags: u32,
}

@group(0) @binding(0) var<uniform> cbPerObject: PerObject;
@group(0) @binding(1) var<uniform> cbMaterial: MaterialParams;
@group(0) @binding(2) var gAlbedo: texture_2d<f32>;
@group(0) @binding(3) var gNormal: texture_2d<f32>;
@group(0) @binding(4) var gLinearWrap: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = cbPerObject.gWorld * vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn ps_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = textureSample(gAlbedo, gLinearWrap, input.uv);
    let normal = textureSample(gNormal, gLinearWrap, input.uv);
    let shade = cbMaterial.gRoughness * f32(cbMaterial.gLayer) + cbMaterial.gMetallic * f32(cbMaterial.gFlags);
    return albedo * normal.z * shade * cbPerObject.gTint;
}
"#;

/// Image filter: reads one texture, writes one storage texture.
pub const FILTER_WGSL: &str = r#"
struct Params {
    gScale: f32,
    gCount: u32,
}

@group(0) @binding(0) var<uniform> cbParams: Params;
@group(0) @binding(1) var gInput: texture_2d<f32>;
@group(0) @binding(2) var gOutput: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= cbParams.gCount) {
        return;
    }
    let color = textureLoad(gInput, vec2<i32>(id.xy), 0) * cbParams.gScale;
    textureStore(gOutput, vec2<i32>(id.xy), color);
}
"#;

/// Ray tracing library: camera constants, the scene and an output image.
pub const RAYTRACE_WGSL: &str = r#"
struct Camera {
    gViewInverse: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> cbCamera: Camera;
@group(0) @binding(1) var gScene: acceleration_structure;
@group(0) @binding(2) var gOutput: texture_storage_2d<rgba8unorm, write>;

fn raygen() {
    textureStore(gOutput, vec2<i32>(0, 0), cbCamera.gViewInverse[0]);
}

fn miss() {
}

fn closest_hit() {
}
"#;

pub fn forward_descriptor() -> ShaderDescriptor {
    ShaderDescriptor::new()
        .with_wgsl(ShaderStage::Vertex, FORWARD_WGSL, "vs_main")
        .with_wgsl(ShaderStage::Pixel, FORWARD_WGSL, "ps_main")
        .with_targets([TextureFormat::Rgba8UnormSrgb], Some(TextureFormat::Depth32Float))
}

pub fn filter_descriptor() -> ShaderDescriptor {
    ShaderDescriptor::new().with_wgsl(ShaderStage::Compute, FILTER_WGSL, "main")
}

pub fn raytrace_descriptor() -> ShaderDescriptor {
    ShaderDescriptor::new()
        .with_stage(StageBytecode::new(
            ShaderStage::RayTracing,
            ShaderCode::Wgsl(RAYTRACE_WGSL.to_string()),
        ))
        .with_raytracing(
            RayTracingLibraryDesc::new("raygen")
                .with_miss("miss")
                .with_hit_group(HitGroupDesc::triangles("opaque", "closest_hit")),
        )
}

// ============================================================================
// Test Context
// ============================================================================

/// A headless device, a library and a renderer over one backend.
pub struct TestContext {
    pub device: Arc<GraphicsDevice>,
    pub gpu: Arc<HeadlessDevice>,
    pub library: Arc<ShaderLibrary>,
    pub renderer: Renderer,
}

impl TestContext {
    pub fn new(backend: BackendType) -> Self {
        Self::with_config(BindingConfig::new(backend))
    }

    pub fn with_config(config: BindingConfig) -> Self {
        redlilium_binding::init_logging(LoggingConfig::for_tests());
        let (device, gpu) = GraphicsDevice::headless(config).expect("Failed to create device");
        let library = Arc::new(ShaderLibrary::new(device.clone()));
        let renderer = Renderer::new(device.clone(), library.clone());
        Self {
            device,
            gpu,
            library,
            renderer,
        }
    }

    pub fn load(&self, path: &str, descriptor: ShaderDescriptor) -> Arc<ShaderProgram> {
        self.library
            .load(path, descriptor)
            .unwrap_or_else(|e| panic!("Failed to load '{path}': {e}"))
    }

    pub fn texture_2d(&self, label: &str) -> Arc<Texture> {
        self.device
            .create_texture(
                &TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm).with_label(label),
            )
            .expect("Failed to create texture")
    }

    /// A quad with two triangle submeshes.
    pub fn quad(&self) -> Arc<Mesh> {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Vertex {
            position: [f32; 3],
            uv: [f32; 2],
        }

        let vertices = [
            Vertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 1.0] },
            Vertex { position: [1.0, -1.0, 0.0], uv: [1.0, 1.0] },
            Vertex { position: [1.0, 1.0, 0.0], uv: [1.0, 0.0] },
            Vertex { position: [-1.0, 1.0, 0.0], uv: [0.0, 0.0] },
        ];
        let descriptor = MeshDescriptor::from_vertices(&vertices, vec![0, 1, 2, 0, 2, 3])
            .with_label("quad")
            .with_submesh(Submesh::new(0, 3))
            .with_submesh(Submesh::new(3, 3));
        self.device.create_mesh(&descriptor).expect("Failed to create mesh")
    }
}

//! Pipeline state cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{
    ComputePipelineDescriptor, GraphicsPipelineDescriptor, PipelineHandle,
    RayTracingPipelineDescriptor,
};
use crate::device::GraphicsDevice;
use crate::error::{DeviceError, GraphicsError, PipelineBuildError};
use crate::shader::{CompiledProgram, ProgramStatus, ShaderId, ShaderProgram};
use crate::types::{FixedFunctionState, ShaderStage};

use super::state::{PipelineState, PipelineStateKey};

/// Builds each pipeline key at most once.
///
/// Hits return the stored state without validation. The only way back to
/// unbuilt is [`invalidate_shader`](Self::invalidate_shader), called when a
/// program is recompiled or unloaded.
#[derive(Debug, Default)]
pub struct PipelineCache {
    states: Mutex<HashMap<PipelineStateKey, Arc<PipelineState>>>,
    builds: AtomicU64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached state for `key`, building it on a miss.
    ///
    /// # Errors
    ///
    /// Fails if the program is invalid, lacks the stages or exports the key
    /// needs, or the device cannot build the pipeline.
    pub fn get_or_build(
        &self,
        device: &GraphicsDevice,
        program: &ShaderProgram,
        key: PipelineStateKey,
    ) -> Result<Arc<PipelineState>, GraphicsError> {
        if let ProgramStatus::Invalid { reason } = program.status() {
            return Err(PipelineBuildError::InvalidProgram {
                path: program.path().to_string(),
                reason,
            }
            .into());
        }

        let mut states = self.states.lock();
        if let Some(state) = states.get(&key) {
            return Ok(Arc::clone(state));
        }

        let compiled = program.compiled();
        let handle = build(device, program.path(), &compiled, &key)?;
        let state = Arc::new(PipelineState::new(
            key,
            handle,
            program.path().to_string(),
            compiled.revision(),
        ));
        states.insert(key, Arc::clone(&state));
        self.builds.fetch_add(1, Ordering::Relaxed);

        log::debug!("Built pipeline {:?} for '{}'", handle, program.path());
        Ok(state)
    }

    /// Evict every key of a program. Returns how many were removed.
    pub fn invalidate_shader(&self, shader: ShaderId) -> usize {
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|key, _| key.shader() != shader);
        before - states.len()
    }

    pub fn contains(&self, key: &PipelineStateKey) -> bool {
        self.states.lock().contains_key(key)
    }

    /// Number of cached states.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }

    /// Number of pipelines built since creation.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.states.lock().clear();
    }
}

fn build(
    device: &GraphicsDevice,
    path: &str,
    compiled: &CompiledProgram,
    key: &PipelineStateKey,
) -> Result<PipelineHandle, PipelineBuildError> {
    let backend = device.backend();
    let descriptor = compiled.descriptor();
    let root_signature = compiled.contract().root_signature().map(|s| s.handle());
    let stage = |stage: ShaderStage| {
        descriptor
            .stage(stage)
            .ok_or_else(|| PipelineBuildError::MissingStage {
                path: path.to_string(),
                stage,
            })
    };
    let device_error = |source: DeviceError| PipelineBuildError::Device {
        path: path.to_string(),
        source,
    };

    match *key {
        PipelineStateKey::Graphics {
            topology,
            rasterizer,
            blend,
            depth_stencil,
            ..
        } => {
            stage(ShaderStage::Vertex)?;
            let stages = descriptor
                .stages
                .iter()
                .filter(|bytecode| bytecode.stage.is_graphics())
                .map(|bytecode| backend.pipeline_stage(path, bytecode))
                .collect::<Result<Vec<_>, _>>()?;

            let pipeline = GraphicsPipelineDescriptor {
                label: path.to_string(),
                stages,
                input_layout: compiled.table().input_layout().to_vec(),
                vertex_stride: compiled.table().vertex_stride(),
                topology,
                state: FixedFunctionState {
                    rasterizer,
                    blend,
                    depth_stencil,
                },
                color_formats: descriptor.color_formats.clone(),
                depth_format: descriptor.depth_format,
                root_signature,
            };
            device.gpu().create_graphics_pipeline(&pipeline).map_err(device_error)
        }
        PipelineStateKey::Compute(_) => {
            let pipeline = ComputePipelineDescriptor {
                label: path.to_string(),
                stage: backend.pipeline_stage(path, stage(ShaderStage::Compute)?)?,
                root_signature,
            };
            device.gpu().create_compute_pipeline(&pipeline).map_err(device_error)
        }
        PipelineStateKey::RayTracing(_) => {
            let (Some(root_signature), true) = (root_signature, backend.supports_raytracing()) else {
                return Err(PipelineBuildError::Unsupported(format!(
                    "ray tracing on the {} backend",
                    backend.name()
                )));
            };
            let library = stage(ShaderStage::RayTracing)?;
            let desc = descriptor.raytracing.as_ref().ok_or_else(|| {
                PipelineBuildError::InvalidProgram {
                    path: path.to_string(),
                    reason: "ray tracing library has no export description".to_string(),
                }
            })?;
            if let Some(missing) = desc
                .referenced_shaders()
                .find(|name| !compiled.exports().iter().any(|export| export == name))
            {
                return Err(PipelineBuildError::MissingExport {
                    path: path.to_string(),
                    export: missing.to_string(),
                });
            }

            let mut exports = vec![desc.ray_generation.clone()];
            exports.extend(desc.miss.iter().cloned());
            let pipeline = RayTracingPipelineDescriptor {
                label: path.to_string(),
                library: backend.pipeline_stage(path, library)?,
                exports,
                hit_groups: desc.hit_groups.clone(),
                max_payload_size: desc.max_payload_size,
                max_attribute_size: desc.max_attribute_size,
                max_recursion_depth: desc.max_recursion_depth,
                root_signature,
            };
            device.gpu().create_raytracing_pipeline(&pipeline).map_err(device_error)
        }
    }
}

// Ensure PipelineCache is Send + Sync
static_assertions::assert_impl_all!(PipelineCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendType, BindingConfig};
    use crate::shader::{ShaderDescriptor, ShaderLibrary};
    use crate::types::{PrimitiveTopology, RasterizerState, TextureFormat};

    const TRIANGLE: &str = r#"
        @vertex
        fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
            return vec4<f32>(position, 1.0);
        }

        @fragment
        fn ps_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0, 0.0, 0.0, 1.0);
        }
    "#;

    fn triangle() -> ShaderDescriptor {
        ShaderDescriptor::new()
            .with_wgsl(ShaderStage::Vertex, TRIANGLE, "vs_main")
            .with_wgsl(ShaderStage::Pixel, TRIANGLE, "ps_main")
            .with_targets([TextureFormat::Rgba8Unorm], Some(TextureFormat::Depth32Float))
    }

    #[test]
    fn test_graphics_hit_and_miss() {
        let (device, gpu) = GraphicsDevice::headless(BindingConfig::default()).unwrap();
        let library = ShaderLibrary::new(device.clone());
        let program = library.load("triangle.wgsl", triangle()).unwrap();
        let cache = library.pipeline_cache();

        let key = PipelineStateKey::graphics(
            program.id(),
            PrimitiveTopology::TriangleList,
            FixedFunctionState::default(),
        );
        let first = cache.get_or_build(&device, &program, key).unwrap();
        let second = cache.get_or_build(&device, &program, key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.build_count(), 1);

        let wireframe = PipelineStateKey::graphics(
            program.id(),
            PrimitiveTopology::TriangleList,
            FixedFunctionState {
                rasterizer: RasterizerState::WIREFRAME,
                ..Default::default()
            },
        );
        let third = cache.get_or_build(&device, &program, wireframe).unwrap();
        assert_ne!(first.handle(), third.handle());
        assert_eq!(gpu.pipeline_count(), 2);
    }

    #[test]
    fn test_invalidate_only_that_shader() {
        let (device, _) = GraphicsDevice::headless(BindingConfig::new(BackendType::Implicit)).unwrap();
        let library = ShaderLibrary::new(device.clone());
        let a = library.load("a.wgsl", triangle()).unwrap();
        let b = library.load("b.wgsl", triangle()).unwrap();
        let cache = library.pipeline_cache();

        for program in [&a, &b] {
            let key = PipelineStateKey::graphics(
                program.id(),
                PrimitiveTopology::TriangleList,
                FixedFunctionState::default(),
            );
            cache.get_or_build(&device, program, key).unwrap();
        }

        assert_eq!(cache.invalidate_shader(a.id()), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_stage_and_device_failure() {
        let (device, gpu) = GraphicsDevice::headless(BindingConfig::default()).unwrap();
        let library = ShaderLibrary::new(device.clone());
        let program = library.load("triangle.wgsl", triangle()).unwrap();
        let cache = library.pipeline_cache();

        let err = cache
            .get_or_build(&device, &program, PipelineStateKey::Compute(program.id()))
            .unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::PipelineBuild(PipelineBuildError::MissingStage { stage: ShaderStage::Compute, .. })
        ));

        gpu.set_fail_pipelines(true);
        let key = PipelineStateKey::graphics(
            program.id(),
            PrimitiveTopology::LineList,
            FixedFunctionState::default(),
        );
        let err = cache.get_or_build(&device, &program, key).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::PipelineBuild(PipelineBuildError::Device { .. })
        ));
        assert!(!cache.contains(&key));
    }
}

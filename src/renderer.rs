//! The render dispatch façade.
//!
//! [`Renderer`] records draws, compute dispatches and ray dispatches into a
//! [`CommandList`]. Every call resolves a cached pipeline, binds the program's
//! constant buffers and the material's resources through the device's
//! backend, then records the work itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{BindPoint, CommandList, RenderCommand};
use crate::device::GraphicsDevice;
use crate::error::{BindingError, GraphicsError, PipelineBuildError};
use crate::materials::Material;
use crate::pipeline::{PipelineState, PipelineStateKey};
use crate::raytracing::{RaytracingScene, ShaderBindingTable};
use crate::resources::{Mesh, Submesh};
use crate::shader::{ShaderId, ShaderLibrary};
use crate::types::{
    BlendState, DepthStencilState, FixedFunctionState, PrimitiveTopology, RasterizerState,
    ResourceKind,
};

/// Records work for one command stream.
///
/// Fixed-function state set on the renderer applies to every following
/// [`submit`](Self::submit), like an immediate context.
///
/// # Example
///
/// ```ignore
/// let mut renderer = Renderer::new(device.clone(), library.clone());
///
/// renderer.begin_frame()?;
/// let mut map = program.map_next(&device, Some("cbPerObject"))?;
/// map.set_matrix("gWorld", &world);
/// map.unmap()?;
/// renderer.submit(&mesh, &material, None, PrimitiveTopology::TriangleList, 1)?;
/// renderer.end_frame()?;
/// ```
pub struct Renderer {
    device: Arc<GraphicsDevice>,
    library: Arc<ShaderLibrary>,
    commands: CommandList,
    frame: Option<u64>,
    state: FixedFunctionState,
    scene: RaytracingScene,
    shader_tables: HashMap<ShaderId, ShaderBindingTable>,
}

impl Renderer {
    pub fn new(device: Arc<GraphicsDevice>, library: Arc<ShaderLibrary>) -> Self {
        Self {
            device,
            library,
            commands: CommandList::new(),
            frame: None,
            state: FixedFunctionState::default(),
            scene: RaytracingScene::new(),
            shader_tables: HashMap::new(),
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn library(&self) -> &Arc<ShaderLibrary> {
        &self.library
    }

    /// Current frame, if one was started.
    pub fn frame(&self) -> Option<u64> {
        self.frame
    }

    /// Advance the frame counter, release GPU memory no frame in flight can
    /// still read, and reset every program's constant rings.
    ///
    /// The caller waits for the frame's fence before calling this.
    pub fn begin_frame(&mut self) -> Result<u64, GraphicsError> {
        let frame = self.frame.map_or(0, |frame| frame + 1);
        self.device.begin_frame(frame);
        self.library.begin_frame(frame)?;
        self.frame = Some(frame);
        log::trace!("Renderer: begin frame {frame}");
        Ok(frame)
    }

    /// Hand the recorded commands to the device and start a new list.
    pub fn end_frame(&mut self) -> Result<(), GraphicsError> {
        log::trace!(
            "Renderer: executing {} commands for frame {:?}",
            self.commands.len(),
            self.frame
        );
        self.device.gpu().execute(&self.commands)?;
        self.commands.clear();
        Ok(())
    }

    /// Commands recorded since the last [`end_frame`](Self::end_frame).
    pub fn commands(&self) -> &CommandList {
        &self.commands
    }

    pub fn state(&self) -> FixedFunctionState {
        self.state
    }

    pub fn set_rasterizer_state(&mut self, rasterizer: RasterizerState) {
        self.state.rasterizer = rasterizer;
    }

    pub fn set_blend_state(&mut self, blend: BlendState) {
        self.state.blend = blend;
    }

    pub fn set_depth_stencil_state(&mut self, depth_stencil: DepthStencilState) {
        self.state.depth_stencil = depth_stencil;
    }

    /// Geometry instances and top-level structure used by ray dispatches.
    pub fn scene(&self) -> &RaytracingScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut RaytracingScene {
        &mut self.scene
    }

    /// Shader tables last built for a ray tracing program.
    pub fn shader_table(&self, shader: ShaderId) -> Option<&ShaderBindingTable> {
        self.shader_tables.get(&shader)
    }

    /// Draw a mesh with a material.
    ///
    /// Draws one submesh if `submesh` is set, otherwise every submesh.
    /// Returns the pipeline state used.
    ///
    /// # Errors
    ///
    /// Fails if the submesh doesn't exist, the pipeline can't be built, the
    /// program's constant buffers are mapped, or a ring is exhausted.
    ///
    /// Errors for which [`GraphicsError::is_fatal`] holds (ring exhaustion,
    /// pipeline build, map and device failures) are unrecoverable: stop the
    /// frame loop instead of retrying the draw.
    pub fn submit(
        &mut self,
        mesh: &Mesh,
        material: &Material,
        submesh: Option<usize>,
        topology: PrimitiveTopology,
        instance_count: u32,
    ) -> Result<Arc<PipelineState>, GraphicsError> {
        let submeshes: &[Submesh] = match submesh {
            Some(index) => std::slice::from_ref(mesh.submesh(index).ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "mesh {:?} has no submesh {index}",
                    mesh.label()
                ))
            })?),
            None => mesh.submeshes(),
        };

        let key = PipelineStateKey::graphics(material.shader().id(), topology, self.state);
        let state = self.bind_material(material, BindPoint::Graphics, key)?;

        self.commands.push(RenderCommand::SetPrimitiveTopology(topology));
        self.commands.push(RenderCommand::SetVertexBuffer {
            buffer: mesh.vertex_buffer().id(),
            stride: mesh.vertex_stride(),
        });
        self.commands.push(RenderCommand::SetIndexBuffer {
            buffer: mesh.index_buffer().id(),
            format: mesh.index_format(),
        });
        for submesh in submeshes {
            self.commands.push(RenderCommand::DrawIndexedInstanced {
                index_count: submesh.index_count,
                instance_count,
                start_index: submesh.start_index,
                base_vertex: submesh.base_vertex,
                start_instance: 0,
            });
        }

        log::trace!(
            "Renderer: drew {} submeshes of {:?} with '{}'",
            submeshes.len(),
            mesh.label(),
            material.shader().path()
        );
        Ok(state)
    }

    /// Dispatch a compute program over `x * y * z` thread groups.
    ///
    /// # Errors
    ///
    /// As for [`submit`](Self::submit); fatal errors are not retried.
    pub fn dispatch_compute(
        &mut self,
        material: &Material,
        x: u32,
        y: u32,
        z: u32,
    ) -> Result<Arc<PipelineState>, GraphicsError> {
        let key = PipelineStateKey::Compute(material.shader().id());
        let state = self.bind_material(material, BindPoint::Compute, key)?;
        self.commands.push(RenderCommand::Dispatch { x, y, z });
        log::trace!(
            "Renderer: dispatched '{}' ({x}, {y}, {z})",
            material.shader().path()
        );
        Ok(state)
    }

    /// Trace `width * height * depth` rays against the scene.
    ///
    /// Shader tables are rebuilt when the scene's instances or the program's
    /// pipeline changed since the last dispatch.
    ///
    /// # Errors
    ///
    /// Fails on backends without ray tracing, and for programs whose
    /// libraries lack an export the scene references.
    pub fn dispatch_rays(
        &mut self,
        material: &Material,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<Arc<PipelineState>, GraphicsError> {
        let backend = self.device.backend();
        if !backend.supports_raytracing() {
            return Err(PipelineBuildError::Unsupported(format!(
                "ray dispatch on the {} backend",
                backend.name()
            ))
            .into());
        }

        let program = Arc::clone(material.shader());
        let state = self.bind_material(material, BindPoint::Compute, PipelineStateKey::RayTracing(program.id()))?;

        let compiled = program.compiled();
        let library = compiled.descriptor().raytracing.as_ref().ok_or_else(|| {
            PipelineBuildError::InvalidProgram {
                path: program.path().to_string(),
                reason: "ray tracing library has no export description".to_string(),
            }
        })?;

        let desc = match self.shader_tables.get(&program.id()) {
            Some(table) if table.is_current(state.handle(), self.scene.revision()) => {
                table.dispatch_desc(width, height, depth)
            }
            _ => {
                let table = ShaderBindingTable::build(
                    self.device.release_queue(),
                    program.path(),
                    state.handle(),
                    library,
                    &self.scene,
                )?;
                let desc = table.dispatch_desc(width, height, depth);
                self.shader_tables.insert(program.id(), table);
                desc
            }
        };

        self.commands.push(RenderCommand::DispatchRays(desc));
        log::trace!(
            "Renderer: traced '{}' ({width}, {height}, {depth})",
            program.path()
        );
        Ok(state)
    }

    /// Bind the pipeline, contract, constants and resources of a material.
    fn bind_material(
        &mut self,
        material: &Material,
        bind_point: BindPoint,
        key: PipelineStateKey,
    ) -> Result<Arc<PipelineState>, GraphicsError> {
        let program = material.shader();
        let state = self
            .library
            .pipeline_cache()
            .get_or_build(&self.device, program, key)?;

        let backend = self.device.backend();
        let compiled = program.compiled();
        let contract = compiled.contract();

        self.commands.push(RenderCommand::SetPipelineState(state.handle()));
        backend.bind_signature(&mut self.commands, contract, bind_point);

        let mut constants = program.bind_constants()?;
        let slots = constants.prepare_for_draw(&self.device)?;
        for (index, (ring, slot)) in constants.rings().iter().zip(slots).enumerate() {
            backend.bind_constant_buffer(&mut self.commands, contract, bind_point, index, ring, slot);
        }
        drop(constants);

        for binding in compiled.table().bindings() {
            let texture = match binding.kind {
                ResourceKind::Texture => material.texture(&binding.name),
                ResourceKind::Uav => material.uav(&binding.name),
                ResourceKind::AccelerationStructure => {
                    if let Some(structure) = self.scene.top_level() {
                        backend.bind_acceleration_structure(
                            &mut self.commands,
                            contract,
                            bind_point,
                            &binding.name,
                            structure.address(),
                        );
                    }
                    continue;
                }
                ResourceKind::Sampler => continue,
            };
            match texture {
                // A material seeded before a recompile may hold the old dimension.
                Some(texture) if texture.dimension() != binding.dimension => log::warn!(
                    "{}: skipping {}",
                    program.path(),
                    BindingError::DimensionMismatch {
                        name: binding.name.clone(),
                        expected: binding.dimension,
                        found: texture.dimension(),
                    }
                ),
                Some(texture) => {
                    backend.bind_resource(&mut self.commands, contract, bind_point, binding, texture)
                }
                // Unbound slots keep whatever the device had bound.
                None => log::trace!("{}: '{}' is unbound", program.path(), binding.name),
            }
        }

        backend.bind_samplers(&mut self.commands, contract);
        Ok(state)
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("frame", &self.frame)
            .field("commands", &self.commands.len())
            .field("state", &self.state)
            .field("instances", &self.scene.instances().len())
            .finish()
    }
}

// Ensure Renderer is Send + Sync
static_assertions::assert_impl_all!(Renderer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendType, BindingConfig};
    use crate::resources::MeshDescriptor;
    use crate::shader::ShaderDescriptor;
    use crate::types::{ShaderStage, TextureFormat};

    const FORWARD: &str = r#"
        struct PerObject {
            gWorld: mat4x4<f32>,
        }
        @group(0) @binding(0) var<uniform> cbPerObject: PerObject;

        @vertex
        fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
            return cbPerObject.gWorld * vec4<f32>(position, 1.0);
        }

        @fragment
        fn ps_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0);
        }
    "#;

    fn setup(backend: BackendType) -> (Renderer, Material, Arc<Mesh>) {
        let (device, _) = GraphicsDevice::headless(BindingConfig::new(backend)).unwrap();
        let library = Arc::new(ShaderLibrary::new(device.clone()));
        let program = library
            .load(
                "forward.wgsl",
                ShaderDescriptor::new()
                    .with_wgsl(ShaderStage::Vertex, FORWARD, "vs_main")
                    .with_wgsl(ShaderStage::Pixel, FORWARD, "ps_main")
                    .with_targets([TextureFormat::Rgba8Unorm], None),
            )
            .unwrap();
        let mesh = device
            .create_mesh(&MeshDescriptor::new(vec![0; 36], 12, vec![0, 1, 2]))
            .unwrap();
        (Renderer::new(device, library), Material::create(program), mesh)
    }

    #[test]
    fn test_frame_counter() {
        let (mut renderer, _, _) = setup(BackendType::Explicit);
        assert_eq!(renderer.frame(), None);
        assert_eq!(renderer.begin_frame().unwrap(), 0);
        assert_eq!(renderer.begin_frame().unwrap(), 1);
    }

    #[test]
    fn test_submit_records_draw() {
        let (mut renderer, material, mesh) = setup(BackendType::Implicit);
        renderer.begin_frame().unwrap();
        renderer
            .submit(&mesh, &material, None, PrimitiveTopology::TriangleList, 2)
            .unwrap();

        let commands = renderer.commands().commands();
        assert!(matches!(commands[0], RenderCommand::SetPipelineState(_)));
        assert!(commands
            .iter()
            .any(|c| matches!(c, RenderCommand::SetConstantBuffer { stage: ShaderStage::Vertex, slot: 0, .. })));
        assert!(matches!(
            commands.last(),
            Some(RenderCommand::DrawIndexedInstanced {
                index_count: 3,
                instance_count: 2,
                ..
            })
        ));

        renderer.end_frame().unwrap();
        assert!(renderer.commands().is_empty());
    }

    #[test]
    fn test_submit_unknown_submesh() {
        let (mut renderer, material, mesh) = setup(BackendType::Explicit);
        renderer.begin_frame().unwrap();
        assert!(renderer
            .submit(&mesh, &material, Some(3), PrimitiveTopology::TriangleList, 1)
            .is_err());
    }

    #[test]
    fn test_state_changes_key() {
        let (mut renderer, material, mesh) = setup(BackendType::Explicit);
        renderer.begin_frame().unwrap();
        let solid = renderer
            .submit(&mesh, &material, None, PrimitiveTopology::TriangleList, 1)
            .unwrap();
        renderer.set_rasterizer_state(RasterizerState::WIREFRAME);
        let wireframe = renderer
            .submit(&mesh, &material, None, PrimitiveTopology::TriangleList, 1)
            .unwrap();
        assert!(!Arc::ptr_eq(&solid, &wireframe));
    }

    #[test]
    fn test_rays_need_explicit_backend() {
        let (mut renderer, material, _) = setup(BackendType::Implicit);
        let err = renderer.dispatch_rays(&material, 8, 8, 1).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::PipelineBuild(PipelineBuildError::Unsupported(_))
        ));
    }
}

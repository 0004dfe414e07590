//! Loaded shader programs.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::backend::BindingContract;
use crate::constants::{ConstantBufferMap, ConstantBuffers, RingSlot};
use crate::device::GraphicsDevice;
use crate::error::{GraphicsError, LoadError, MapError};
use crate::types::{ShaderStage, ShaderStageFlags};

use super::binding_table::ResourceBindingTable;
use super::reflect::library_exports;
use super::{ShaderDescriptor, ShaderId};

/// Whether a program can be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    Ready,
    /// The last recompile failed. The previous compiled state is kept for
    /// inspection but the program refuses to bind.
    Invalid { reason: String },
}

/// Everything derived from a program's bytecode.
///
/// Replaced as a whole on recompile; readers hold an `Arc` to a consistent
/// snapshot.
#[derive(Debug)]
pub struct CompiledProgram {
    descriptor: ShaderDescriptor,
    table: ResourceBindingTable,
    contract: BindingContract,
    exports: Vec<String>,
    revision: u32,
}

impl CompiledProgram {
    fn compile(
        device: &GraphicsDevice,
        path: &str,
        descriptor: ShaderDescriptor,
        revision: u32,
    ) -> Result<Self, LoadError> {
        let backend = device.backend();
        let table = backend.reflect(path, &descriptor.stages)?;
        let contract = backend.synthesize_contract(path, &table, device.gpu())?;

        let exports = match descriptor.stage(ShaderStage::RayTracing) {
            Some(library) => library_exports(path, library)?,
            None => Vec::new(),
        };

        Ok(Self {
            descriptor,
            table,
            contract,
            exports,
            revision,
        })
    }

    pub fn descriptor(&self) -> &ShaderDescriptor {
        &self.descriptor
    }

    pub fn table(&self) -> &ResourceBindingTable {
        &self.table
    }

    pub fn contract(&self) -> &BindingContract {
        &self.contract
    }

    /// Function names a ray tracing library exports.
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    /// Bumped by every successful recompile.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn stages(&self) -> ShaderStageFlags {
        self.table.stages()
    }
}

/// A shader program loaded by the [`ShaderLibrary`](super::ShaderLibrary).
///
/// The id never changes. Recompiling swaps the compiled state and the
/// constant buffers in place, so materials holding the program see the new
/// code on their next draw.
pub struct ShaderProgram {
    id: ShaderId,
    path: String,
    compiled: RwLock<Arc<CompiledProgram>>,
    status: RwLock<ProgramStatus>,
    constants: Mutex<ConstantBuffers>,
}

impl ShaderProgram {
    pub(crate) fn load(
        device: &GraphicsDevice,
        id: ShaderId,
        path: &str,
        descriptor: ShaderDescriptor,
        frame: Option<u64>,
    ) -> Result<Self, GraphicsError> {
        let compiled = CompiledProgram::compile(device, path, descriptor, 0)?;
        let constants = ConstantBuffers::new(device, compiled.table.constant_buffers(), frame)?;

        log::info!(
            "Loaded shader '{path}' as {:?}: {} constant buffers, {} bindings",
            id,
            compiled.table.constant_buffers().len(),
            compiled.table.bindings().len()
        );

        Ok(Self {
            id,
            path: path.to_string(),
            compiled: RwLock::new(Arc::new(compiled)),
            status: RwLock::new(ProgramStatus::Ready),
            constants: Mutex::new(constants),
        })
    }

    /// Rebuild from new bytecode, keeping the id.
    ///
    /// On failure the program is marked invalid and the error returned.
    pub(crate) fn recompile(
        &self,
        device: &GraphicsDevice,
        descriptor: ShaderDescriptor,
        frame: Option<u64>,
    ) -> Result<(), GraphicsError> {
        let mut constants = self
            .constants
            .try_lock()
            .ok_or_else(|| MapError::BoundWhileMapped(self.path.clone()))?;

        let revision = self.revision() + 1;
        let result = CompiledProgram::compile(device, &self.path, descriptor, revision)
            .map_err(GraphicsError::from)
            .and_then(|compiled| {
                let buffers = ConstantBuffers::new(device, compiled.table.constant_buffers(), frame)?;
                Ok((compiled, buffers))
            });

        match result {
            Ok((compiled, buffers)) => {
                *constants = buffers;
                *self.compiled.write() = Arc::new(compiled);
                *self.status.write() = ProgramStatus::Ready;
                log::info!("Recompiled shader '{}' (revision {revision})", self.path);
                Ok(())
            }
            Err(err) => {
                log::error!("Recompiling shader '{}' failed: {err}", self.path);
                *self.status.write() = ProgramStatus::Invalid {
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }

    /// Source path the program was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Snapshot of the current compiled state.
    pub fn compiled(&self) -> Arc<CompiledProgram> {
        Arc::clone(&self.compiled.read())
    }

    pub fn revision(&self) -> u32 {
        self.compiled.read().revision
    }

    pub fn status(&self) -> ProgramStatus {
        self.status.read().clone()
    }

    pub fn is_valid(&self) -> bool {
        *self.status.read() == ProgramStatus::Ready
    }

    /// Open the constant-buffer write window for every buffer, or one by name.
    ///
    /// # Errors
    ///
    /// Fails if a window is already open, the named buffer doesn't exist, or
    /// the ring has no slot left this frame.
    pub fn map_constant_buffer<'a>(
        &'a self,
        device: &'a GraphicsDevice,
        buffer: Option<&str>,
    ) -> Result<ConstantBufferMap<'a>, GraphicsError> {
        let constants = self.lock_constants()?;
        ConstantBufferMap::open(constants, device.gpu(), &self.path, buffer)
    }

    /// Take a fresh slot in every buffer, or one by name, for the next object.
    pub fn allocate(&self, buffer: Option<&str>) -> Result<(), GraphicsError> {
        self.lock_constants()?.allocate(buffer)
    }

    /// [`allocate`](Self::allocate) then [`map_constant_buffer`](Self::map_constant_buffer).
    pub fn map_next<'a>(
        &'a self,
        device: &'a GraphicsDevice,
        buffer: Option<&str>,
    ) -> Result<ConstantBufferMap<'a>, GraphicsError> {
        let mut constants = self.lock_constants()?;
        constants.allocate(buffer)?;
        ConstantBufferMap::open(constants, device.gpu(), &self.path, buffer)
    }

    /// Reset every ring for a new frame.
    pub fn begin_frame(&self, frame: u64) -> Result<(), GraphicsError> {
        self.lock_constants()?.begin_frame(frame);
        Ok(())
    }

    /// Slot selected for a buffer in the current frame.
    ///
    /// `None` while the buffers are mapped or before the first allocation.
    pub fn current_slot(&self, buffer: &str) -> Option<RingSlot> {
        self.constants.try_lock()?.ring(buffer)?.current()
    }

    /// Lock the constant buffers for binding.
    pub(crate) fn bind_constants(&self) -> Result<MutexGuard<'_, ConstantBuffers>, MapError> {
        self.constants
            .try_lock()
            .ok_or_else(|| MapError::BoundWhileMapped(self.path.clone()))
    }

    fn lock_constants(&self) -> Result<MutexGuard<'_, ConstantBuffers>, MapError> {
        self.constants
            .try_lock()
            .ok_or_else(|| MapError::AlreadyMapped(self.path.clone()))
    }
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("revision", &self.revision())
            .field("status", &*self.status.read())
            .finish()
    }
}

// Ensure ShaderProgram is Send + Sync
static_assertions::assert_impl_all!(ShaderProgram: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendType, BindingConfig};
    use crate::shader::ShaderDescriptor;
    use glam::Vec4;

    const COLOR: &str = r#"
        struct Material {
            gTint: vec4<f32>,
            gRoughness: f32,
        }
        @group(0) @binding(2) var<uniform> cbMaterial: Material;

        @fragment
        fn main() -> @location(0) vec4<f32> {
            return cbMaterial.gTint * cbMaterial.gRoughness;
        }
    "#;

    fn load(backend: BackendType) -> (std::sync::Arc<GraphicsDevice>, ShaderProgram) {
        let (device, _) = GraphicsDevice::headless(BindingConfig::new(backend).with_ring_capacity(4)).unwrap();
        let descriptor = ShaderDescriptor::new().with_wgsl(ShaderStage::Pixel, COLOR, "main");
        let program = ShaderProgram::load(&device, ShaderId(7), "color.wgsl", descriptor, Some(0)).unwrap();
        (device, program)
    }

    #[test]
    fn test_single_map_window() {
        let (device, program) = load(BackendType::Implicit);

        let map = program.map_constant_buffer(&device, None).unwrap();
        assert!(matches!(
            program.map_constant_buffer(&device, None),
            Err(GraphicsError::Map(MapError::AlreadyMapped(_)))
        ));
        assert!(program.bind_constants().is_err());
        map.unmap().unwrap();

        assert!(program.map_constant_buffer(&device, Some("cbMaterial")).is_ok());
    }

    #[test]
    fn test_map_unknown_buffer() {
        let (device, program) = load(BackendType::Implicit);
        assert!(matches!(
            program.map_constant_buffer(&device, Some("cbMissing")),
            Err(GraphicsError::Binding(_))
        ));
    }

    #[test]
    fn test_map_next_takes_new_slots() {
        let (device, program) = load(BackendType::Explicit);

        let mut map = program.map_next(&device, None).unwrap();
        assert_eq!(map.set_float4("gTint", Vec4::ONE), 1);
        map.unmap().unwrap();
        program.map_next(&device, None).unwrap().unmap().unwrap();

        let constants = program.bind_constants().unwrap();
        let ring = constants.ring("cbMaterial").unwrap();
        assert_eq!(ring.used(), 2);
        assert_eq!(ring.current().map(|slot| slot.index), Some(1));
    }

    #[test]
    fn test_failed_recompile_marks_invalid() {
        let (device, program) = load(BackendType::Explicit);
        assert!(program.is_valid());

        let broken = ShaderDescriptor::new().with_wgsl(ShaderStage::Pixel, "fn broken(", "main");
        assert!(program.recompile(&device, broken, Some(0)).is_err());
        assert!(matches!(program.status(), ProgramStatus::Invalid { .. }));
        assert_eq!(program.revision(), 0);
        assert_eq!(program.compiled().table().constant_buffers().len(), 1);

        let fixed = ShaderDescriptor::new().with_wgsl(ShaderStage::Pixel, COLOR, "main");
        program.recompile(&device, fixed, Some(0)).unwrap();
        assert!(program.is_valid());
        assert_eq!(program.revision(), 1);
    }
}

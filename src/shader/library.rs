//! The shader program library.
//!
//! Programs are loaded once per source path and shared by every material
//! that references them. The library owns the id allocator and the pipeline
//! cache, so recompiling or unloading a program evicts its cached pipelines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::pipeline::PipelineCache;

use super::program::ShaderProgram;
use super::{ShaderDescriptor, ShaderId};

/// Hands out shader ids, starting at 1.
#[derive(Debug)]
pub struct ShaderIdAllocator {
    next: AtomicU32,
}

impl ShaderIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn allocate(&self) -> ShaderId {
        ShaderId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ShaderIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shader programs keyed by source path.
///
/// # Example
///
/// ```ignore
/// let library = ShaderLibrary::new(device.clone());
/// let forward = library.load("shaders/forward.wgsl", descriptor)?;
///
/// // Later, after the file changed on disk:
/// library.recompile("shaders/forward.wgsl", new_descriptor)?;
/// ```
pub struct ShaderLibrary {
    device: Arc<GraphicsDevice>,
    ids: ShaderIdAllocator,
    programs: RwLock<HashMap<String, Arc<ShaderProgram>>>,
    cache: Arc<PipelineCache>,
    frame: Mutex<Option<u64>>,
}

impl ShaderLibrary {
    /// Create an empty library with its own pipeline cache.
    pub fn new(device: Arc<GraphicsDevice>) -> Self {
        Self::with_cache(device, Arc::new(PipelineCache::new()))
    }

    /// Create an empty library sharing a pipeline cache.
    pub fn with_cache(device: Arc<GraphicsDevice>, cache: Arc<PipelineCache>) -> Self {
        Self {
            device,
            ids: ShaderIdAllocator::new(),
            programs: RwLock::new(HashMap::new()),
            cache,
            frame: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn pipeline_cache(&self) -> &Arc<PipelineCache> {
        &self.cache
    }

    /// Return the program loaded from `path`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Any [`LoadError`](crate::error::LoadError) aborts the load and nothing
    /// is registered.
    pub fn load(
        &self,
        path: &str,
        descriptor: ShaderDescriptor,
    ) -> Result<Arc<ShaderProgram>, GraphicsError> {
        if let Some(program) = self.get(path) {
            log::debug!("Shader '{path}' already loaded as {:?}", program.id());
            return Ok(program);
        }

        let id = self.ids.allocate();
        let frame = *self.frame.lock();
        let program = Arc::new(ShaderProgram::load(&self.device, id, path, descriptor, frame)?);
        self.programs
            .write()
            .insert(path.to_string(), Arc::clone(&program));
        Ok(program)
    }

    pub fn get(&self, path: &str) -> Option<Arc<ShaderProgram>> {
        self.programs.read().get(path).cloned()
    }

    /// Rebuild a loaded program in place and evict its cached pipelines.
    ///
    /// # Errors
    ///
    /// Fails for unknown paths, while the program's constant buffers are
    /// mapped, or when the new bytecode doesn't load. In the last case the
    /// program stays registered but is marked invalid.
    pub fn recompile(&self, path: &str, descriptor: ShaderDescriptor) -> Result<(), GraphicsError> {
        let program = self.get(path).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("shader '{path}' is not loaded"))
        })?;

        let frame = *self.frame.lock();
        let result = program.recompile(&self.device, descriptor, frame);
        let evicted = self.cache.invalidate_shader(program.id());
        log::debug!("Evicted {evicted} pipelines of '{path}'");
        result
    }

    /// Remove a program and evict its cached pipelines.
    pub fn unload(&self, path: &str) -> Option<Arc<ShaderProgram>> {
        let program = self.programs.write().remove(path)?;
        self.cache.invalidate_shader(program.id());
        log::info!("Unloaded shader '{path}'");
        Some(program)
    }

    /// Start a new frame for every program's constant buffers.
    pub fn begin_frame(&self, frame: u64) -> Result<(), GraphicsError> {
        *self.frame.lock() = Some(frame);
        for program in self.programs.read().values() {
            program.begin_frame(frame)?;
        }
        Ok(())
    }

    /// Current frame, if one was started.
    pub fn frame(&self) -> Option<u64> {
        *self.frame.lock()
    }

    /// Number of loaded programs.
    pub fn len(&self) -> usize {
        self.programs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.read().is_empty()
    }
}

impl std::fmt::Debug for ShaderLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderLibrary")
            .field("programs", &self.len())
            .field("cached_pipelines", &self.cache.len())
            .field("frame", &self.frame())
            .finish()
    }
}

// Ensure ShaderLibrary is Send + Sync
static_assertions::assert_impl_all!(ShaderLibrary: Send, Sync);

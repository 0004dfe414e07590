//! Material definition.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::BindingError;
use crate::resources::Texture;
use crate::shader::ShaderProgram;
use crate::types::{ResourceDimension, ResourceKind};

/// One declared texture or UAV of a material's shader.
#[derive(Debug, Clone)]
pub struct TextureSlot {
    dimension: ResourceDimension,
    resource: Option<Arc<Texture>>,
    last_path: Option<String>,
}

impl TextureSlot {
    fn new(dimension: ResourceDimension) -> Self {
        Self {
            dimension,
            resource: None,
            last_path: None,
        }
    }

    /// Dimension the shader declares.
    pub fn dimension(&self) -> ResourceDimension {
        self.dimension
    }

    pub fn resource(&self) -> Option<&Arc<Texture>> {
        self.resource.as_ref()
    }

    /// Label of the last bound resource, for diagnostics.
    pub fn last_path(&self) -> Option<&str> {
        self.last_path.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.resource.is_some()
    }
}

/// A shader plus the resources bound to its declared slots.
///
/// Binding an undeclared name, or a resource of the wrong dimension, is
/// logged and leaves every slot unchanged.
///
/// Slots follow the shader's compiled revision: after a recompile the next
/// [`set_texture`](Self::set_texture), [`set_uav_texture`](Self::set_uav_texture)
/// or [`refresh`](Self::refresh) re-seeds them from the new bindings.
///
/// # Example
///
/// ```ignore
/// let program = library.load("shaders/forward.wgsl", descriptor)?;
/// let mut material = Material::create(program);
/// material.set_texture("gAlbedo", &albedo);
/// renderer.submit(&mesh, &material, None, PrimitiveTopology::TriangleList, 1)?;
/// ```
#[derive(Debug, Clone)]
pub struct Material {
    shader: Arc<ShaderProgram>,
    textures: BTreeMap<String, TextureSlot>,
    uavs: BTreeMap<String, TextureSlot>,
    revision: u32,
}

impl Material {
    /// Create a material with one empty slot per declared texture and UAV.
    pub fn create(shader: Arc<ShaderProgram>) -> Self {
        let mut material = Self {
            shader,
            textures: BTreeMap::new(),
            uavs: BTreeMap::new(),
            revision: 0,
        };
        material.seed();
        material
    }

    fn seed(&mut self) {
        let compiled = self.shader.compiled();
        for binding in compiled.table().bindings() {
            let slots = match binding.kind {
                ResourceKind::Texture => &mut self.textures,
                ResourceKind::Uav => &mut self.uavs,
                ResourceKind::Sampler | ResourceKind::AccelerationStructure => continue,
            };
            slots.insert(binding.name.clone(), TextureSlot::new(binding.dimension));
        }
        self.revision = compiled.revision();
    }

    /// Re-seed the slots if the shader was recompiled since they were seeded.
    ///
    /// Resources whose name is still declared with the same dimension stay
    /// bound; the rest are dropped with a warning. Returns whether the slots
    /// were re-seeded.
    pub fn refresh(&mut self) -> bool {
        let revision = self.shader.revision();
        if revision == self.revision {
            return false;
        }

        let textures = std::mem::take(&mut self.textures);
        let uavs = std::mem::take(&mut self.uavs);
        self.seed();
        carry_over(self.shader.path(), &mut self.textures, textures);
        carry_over(self.shader.path(), &mut self.uavs, uavs);

        log::debug!(
            "{}: material re-seeded for revision {revision}",
            self.shader.path()
        );
        true
    }

    /// Compiled revision the slots were seeded from.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn shader(&self) -> &Arc<ShaderProgram> {
        &self.shader
    }

    /// Switch shaders. Every slot is re-seeded empty.
    pub fn set_shader(&mut self, shader: Arc<ShaderProgram>) {
        self.shader = shader;
        self.textures.clear();
        self.uavs.clear();
        self.seed();
    }

    /// Bind a texture to a declared texture slot. Returns whether it was bound.
    pub fn set_texture(&mut self, name: &str, texture: &Arc<Texture>) -> bool {
        self.refresh();
        let result = bind(&mut self.textures, name, texture, BindingError::UnknownTexture);
        self.report(result)
    }

    /// Bind a texture to a declared UAV slot. Returns whether it was bound.
    pub fn set_uav_texture(&mut self, name: &str, texture: &Arc<Texture>) -> bool {
        self.refresh();
        let result = bind(&mut self.uavs, name, texture, BindingError::UnknownUav);
        self.report(result)
    }

    fn report(&self, result: Result<(), BindingError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                log::warn!("{}: {err}", self.shader.path());
                false
            }
        }
    }

    /// Texture bound to a declared texture slot.
    pub fn texture(&self, name: &str) -> Option<&Arc<Texture>> {
        self.textures.get(name).and_then(TextureSlot::resource)
    }

    /// Texture bound to a declared UAV slot.
    pub fn uav(&self, name: &str) -> Option<&Arc<Texture>> {
        self.uavs.get(name).and_then(TextureSlot::resource)
    }

    pub fn texture_slot(&self, name: &str) -> Option<&TextureSlot> {
        self.textures.get(name)
    }

    pub fn uav_slot(&self, name: &str) -> Option<&TextureSlot> {
        self.uavs.get(name)
    }

    pub fn texture_slots(&self) -> impl Iterator<Item = (&str, &TextureSlot)> {
        self.textures.iter().map(|(name, slot)| (name.as_str(), slot))
    }

    pub fn uav_slots(&self) -> impl Iterator<Item = (&str, &TextureSlot)> {
        self.uavs.iter().map(|(name, slot)| (name.as_str(), slot))
    }
}

fn bind(
    slots: &mut BTreeMap<String, TextureSlot>,
    name: &str,
    texture: &Arc<Texture>,
    unknown: fn(String) -> BindingError,
) -> Result<(), BindingError> {
    let slot = slots.get_mut(name).ok_or_else(|| unknown(name.to_string()))?;
    if slot.dimension != texture.dimension() {
        return Err(BindingError::DimensionMismatch {
            name: name.to_string(),
            expected: slot.dimension,
            found: texture.dimension(),
        });
    }
    slot.resource = Some(Arc::clone(texture));
    slot.last_path = texture.label().map(str::to_string);
    Ok(())
}

fn carry_over(
    path: &str,
    slots: &mut BTreeMap<String, TextureSlot>,
    previous: BTreeMap<String, TextureSlot>,
) {
    for (name, old) in previous {
        let Some(resource) = old.resource else {
            continue;
        };
        match slots.get_mut(&name) {
            Some(slot) if slot.dimension == old.dimension => {
                slot.resource = Some(resource);
                slot.last_path = old.last_path;
            }
            Some(slot) => log::warn!(
                "{path}: unbinding '{name}', now declared {:?} instead of {:?}",
                slot.dimension,
                old.dimension
            ),
            None => log::warn!("{path}: unbinding '{name}', no longer declared"),
        }
    }
}

// Ensure Material is Send + Sync
static_assertions::assert_impl_all!(Material: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfig;
    use crate::device::GraphicsDevice;
    use crate::shader::{ShaderDescriptor, ShaderLibrary};
    use crate::types::{ShaderStage, TextureDescriptor, TextureFormat};

    const SHADER: &str = r#"
        @group(0) @binding(0) var gAlbedo: texture_2d<f32>;
        @group(0) @binding(1) var gNormal: texture_2d<f32>;
        @group(0) @binding(2) var gEnvironment: texture_cube<f32>;
        @group(0) @binding(3) var gLinearWrap: sampler;
        @group(0) @binding(4) var gOutput: texture_storage_2d<rgba8unorm, write>;

        @compute @workgroup_size(8, 8)
        fn main(@builtin(global_invocation_id) id: vec3<u32>) {
            let uv = vec2<f32>(id.xy) / 64.0;
            let albedo = textureSampleLevel(gAlbedo, gLinearWrap, uv, 0.0);
            let normal = textureSampleLevel(gNormal, gLinearWrap, uv, 0.0);
            let sky = textureSampleLevel(gEnvironment, gLinearWrap, normal.xyz, 0.0);
            textureStore(gOutput, vec2<i32>(id.xy), albedo * sky);
        }
    "#;

    /// `gEnvironment` becomes a 2D texture, `gNormal` goes away and `gDetail` appears.
    const RECOMPILED: &str = r#"
        @group(0) @binding(0) var gAlbedo: texture_2d<f32>;
        @group(0) @binding(1) var gDetail: texture_2d<f32>;
        @group(0) @binding(2) var gEnvironment: texture_2d<f32>;
        @group(0) @binding(3) var gLinearWrap: sampler;
        @group(0) @binding(4) var gOutput: texture_storage_2d<rgba8unorm, write>;

        @compute @workgroup_size(8, 8)
        fn main(@builtin(global_invocation_id) id: vec3<u32>) {
            let uv = vec2<f32>(id.xy) / 64.0;
            let albedo = textureSampleLevel(gAlbedo, gLinearWrap, uv, 0.0);
            let detail = textureSampleLevel(gDetail, gLinearWrap, uv, 0.0);
            let sky = textureSampleLevel(gEnvironment, gLinearWrap, uv, 0.0);
            textureStore(gOutput, vec2<i32>(id.xy), albedo * detail * sky);
        }
    "#;

    fn descriptor(source: &str) -> ShaderDescriptor {
        ShaderDescriptor::new().with_wgsl(ShaderStage::Compute, source, "main")
    }

    fn setup_with_library() -> (Arc<GraphicsDevice>, ShaderLibrary, Material) {
        let (device, _) = GraphicsDevice::headless(BindingConfig::default()).unwrap();
        let library = ShaderLibrary::new(device.clone());
        let program = library.load("material.wgsl", descriptor(SHADER)).unwrap();
        (device, library, Material::create(program))
    }

    fn setup() -> (Arc<GraphicsDevice>, Material) {
        let (device, _, material) = setup_with_library();
        (device, material)
    }

    #[test]
    fn test_seeded_from_shader() {
        let (_, material) = setup();
        let textures: Vec<_> = material.texture_slots().map(|(name, _)| name).collect();
        assert_eq!(textures, ["gAlbedo", "gEnvironment", "gNormal"]);
        assert_eq!(
            material.texture_slot("gEnvironment").map(TextureSlot::dimension),
            Some(ResourceDimension::TextureCube)
        );
        assert!(material.uav_slot("gOutput").is_some());
        assert!(material.texture_slots().all(|(_, slot)| !slot.is_bound()));
    }

    #[test]
    fn test_set_texture() {
        let (device, mut material) = setup();
        let brick = device
            .create_texture(
                &TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8UnormSrgb).with_label("brick.png"),
            )
            .unwrap();

        assert!(material.set_texture("gAlbedo", &brick));
        assert!(Arc::ptr_eq(material.texture("gAlbedo").unwrap(), &brick));
        assert_eq!(material.texture_slot("gAlbedo").unwrap().last_path(), Some("brick.png"));

        // Undeclared names and dimension mismatches change nothing.
        assert!(!material.set_texture("gSpecular", &brick));
        assert!(!material.set_texture("gEnvironment", &brick));
        assert!(!material.set_uav_texture("gAlbedo", &brick));
        assert!(material.texture("gEnvironment").is_none());
        assert!(Arc::ptr_eq(material.texture("gAlbedo").unwrap(), &brick));
    }

    #[test]
    fn test_set_shader_reseeds() {
        let (device, mut material) = setup();
        let brick = device
            .create_texture(&TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm))
            .unwrap();
        material.set_texture("gAlbedo", &brick);

        let shader = Arc::clone(material.shader());
        material.set_shader(shader);
        assert!(material.texture("gAlbedo").is_none());
        assert!(material.texture_slot("gAlbedo").is_some());
    }

    #[test]
    fn test_recompile_reseeds_on_next_set() {
        let (device, library, mut material) = setup_with_library();
        let brick = device
            .create_texture(&TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm))
            .unwrap();
        let sky = device
            .create_texture(&TextureDescriptor::new_cube(64, TextureFormat::Rgba16Float))
            .unwrap();
        assert!(material.set_texture("gAlbedo", &brick));
        assert!(material.set_texture("gNormal", &brick));
        assert!(material.set_texture("gEnvironment", &sky));

        library.recompile("material.wgsl", descriptor(RECOMPILED)).unwrap();
        assert_eq!(material.revision(), 0);

        // New names are settable right away.
        assert!(material.set_texture("gDetail", &brick));
        assert_eq!(material.revision(), 1);

        // Same name and dimension: kept. Changed dimension or removed: dropped.
        assert!(Arc::ptr_eq(material.texture("gAlbedo").unwrap(), &brick));
        assert!(material.texture("gEnvironment").is_none());
        assert_eq!(
            material.texture_slot("gEnvironment").map(TextureSlot::dimension),
            Some(ResourceDimension::Texture2D)
        );
        assert!(material.texture_slot("gNormal").is_none());
        assert!(!material.set_texture("gEnvironment", &sky));
        assert!(!material.refresh());
    }

    #[test]
    fn test_failed_recompile_keeps_slots() {
        let (device, library, mut material) = setup_with_library();
        let brick = device
            .create_texture(&TextureDescriptor::new_2d(64, 64, TextureFormat::Rgba8Unorm))
            .unwrap();
        material.set_texture("gAlbedo", &brick);

        assert!(library.recompile("material.wgsl", descriptor("fn broken(")).is_err());
        assert!(!material.refresh());
        assert!(material.texture("gAlbedo").is_some());
        assert!(material.texture_slot("gNormal").is_some());
    }
}

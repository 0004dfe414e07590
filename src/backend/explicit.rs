//! Root signature synthesis for the explicit backend.
//!
//! Parameters are laid out in a fixed order: one raw SRV per acceleration
//! structure, one single-range descriptor table per texture, one per UAV,
//! then one root CBV per constant buffer. Samplers never take a parameter;
//! they become static samplers resolved from the well-known dictionary.

use std::collections::HashMap;

use crate::error::LoadError;
use crate::resources::Texture;
use crate::shader::{ResourceBinding, ResourceBindingTable};
use crate::types::{ResourceKind, ResourceState, SamplerDescriptor, ShaderStage, ShaderStageFlags};

use super::samplers::resolve_sampler;
use super::{BindPoint, CommandList, GpuAddress, GpuDevice, RenderCommand, RootSignatureHandle};

/// Magic at the start of every serialized root signature.
pub const ROOT_SIGNATURE_MAGIC: [u8; 4] = *b"RLRS";

/// Version of the serialized layout.
pub const ROOT_SIGNATURE_VERSION: u32 = 1;

/// Which stages can see a root parameter or static sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVisibility {
    All,
    Vertex,
    Pixel,
    Geometry,
}

impl ShaderVisibility {
    /// The single declaring graphics stage, or `All`.
    pub fn from_stages(stages: ShaderStageFlags) -> Self {
        match stages.single() {
            Some(ShaderStage::Vertex) => Self::Vertex,
            Some(ShaderStage::Pixel) => Self::Pixel,
            Some(ShaderStage::Geometry) => Self::Geometry,
            _ => Self::All,
        }
    }

    fn code(self) -> u32 {
        match self {
            Self::All => 0,
            Self::Vertex => 1,
            Self::Pixel => 5,
            Self::Geometry => 4,
        }
    }
}

/// Descriptor type held by a table range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorRangeKind {
    Srv,
    Uav,
}

/// A contiguous run of descriptors in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub kind: DescriptorRangeKind,
    pub count: u32,
    pub base_register: u32,
    pub space: u32,
}

/// How a root parameter is bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootParameterKind {
    /// Root constant buffer view at `b{register}`.
    ConstantBufferView { register: u32, space: u32 },
    /// Raw shader resource view at `t{register}`.
    ShaderResourceView { register: u32, space: u32 },
    DescriptorTable(Vec<DescriptorRange>),
}

impl RootParameterKind {
    /// Root signature space taken by this parameter, in DWORDs.
    pub fn dword_cost(&self) -> u32 {
        match self {
            Self::ConstantBufferView { .. } | Self::ShaderResourceView { .. } => 2,
            Self::DescriptorTable(_) => 1,
        }
    }
}

/// One root parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootParameter {
    /// Name of the binding or constant buffer this parameter serves.
    pub name: String,
    pub kind: RootParameterKind,
    pub visibility: ShaderVisibility,
}

/// A sampler baked into the root signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StaticSampler {
    /// Sampler variable name in the shader.
    pub name: String,
    /// Dictionary entry the name resolved to.
    pub preset: &'static str,
    pub descriptor: SamplerDescriptor,
    pub register: u32,
    pub space: u32,
    pub visibility: ShaderVisibility,
}

/// A root signature layout before the device creates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSampler>,
}

impl RootSignatureDesc {
    /// Largest root signature the device accepts, in DWORDs.
    pub const MAX_DWORDS: u32 = 64;

    /// Lay out the parameters for a binding table.
    pub fn from_table(table: &ResourceBindingTable) -> Self {
        let mut parameters = Vec::new();

        for binding in table.bindings_of(ResourceKind::AccelerationStructure) {
            parameters.push(RootParameter {
                name: binding.name.clone(),
                kind: RootParameterKind::ShaderResourceView {
                    register: binding.register,
                    space: binding.space,
                },
                visibility: ShaderVisibility::All,
            });
        }
        for (kind, range_kind) in [
            (ResourceKind::Texture, DescriptorRangeKind::Srv),
            (ResourceKind::Uav, DescriptorRangeKind::Uav),
        ] {
            for binding in table.bindings_of(kind) {
                parameters.push(RootParameter {
                    name: binding.name.clone(),
                    kind: RootParameterKind::DescriptorTable(vec![DescriptorRange {
                        kind: range_kind,
                        count: 1,
                        base_register: binding.register,
                        space: binding.space,
                    }]),
                    visibility: ShaderVisibility::from_stages(binding.stages),
                });
            }
        }
        for layout in table.constant_buffers() {
            parameters.push(RootParameter {
                name: layout.name.clone(),
                kind: RootParameterKind::ConstantBufferView {
                    register: layout.register,
                    space: layout.space,
                },
                visibility: ShaderVisibility::from_stages(layout.stages),
            });
        }

        let static_samplers = table
            .bindings_of(ResourceKind::Sampler)
            .map(|binding| {
                let (preset, descriptor) = resolve_sampler(&binding.name);
                StaticSampler {
                    name: binding.name.clone(),
                    preset,
                    descriptor,
                    register: binding.register,
                    space: binding.space,
                    visibility: ShaderVisibility::from_stages(binding.stages),
                }
            })
            .collect();

        Self {
            parameters,
            static_samplers,
        }
    }

    /// Total root signature size in DWORDs.
    pub fn dword_cost(&self) -> u32 {
        self.parameters.iter().map(|p| p.kind.dword_cost()).sum()
    }

    /// Check the layout against device limits.
    pub fn validate(&self) -> Result<(), String> {
        let cost = self.dword_cost();
        if cost > Self::MAX_DWORDS {
            return Err(format!(
                "{} parameters take {cost} DWORDs, limit is {}",
                self.parameters.len(),
                Self::MAX_DWORDS
            ));
        }
        if let Some(parameter) = self.parameters.iter().find(|p| match &p.kind {
            RootParameterKind::DescriptorTable(ranges) => ranges.is_empty(),
            _ => false,
        }) {
            return Err(format!("descriptor table '{}' has no ranges", parameter.name));
        }
        Ok(())
    }

    /// Serialize to the versioned blob the device consumes.
    ///
    /// Every field is a little-endian `u32` after the 4-byte magic.
    pub fn serialize(&self) -> Vec<u8> {
        fn put(blob: &mut Vec<u8>, value: u32) {
            blob.extend_from_slice(&value.to_le_bytes());
        }

        let mut blob = Vec::with_capacity(16 + self.parameters.len() * 24);

        blob.extend_from_slice(&ROOT_SIGNATURE_MAGIC);
        put(&mut blob, ROOT_SIGNATURE_VERSION);
        put(&mut blob, self.parameters.len() as u32);
        put(&mut blob, self.static_samplers.len() as u32);

        for parameter in &self.parameters {
            match &parameter.kind {
                RootParameterKind::DescriptorTable(ranges) => {
                    put(&mut blob, 0);
                    put(&mut blob, parameter.visibility.code());
                    put(&mut blob, ranges.len() as u32);
                    for range in ranges {
                        put(&mut blob, range.kind as u32);
                        put(&mut blob, range.count);
                        put(&mut blob, range.base_register);
                        put(&mut blob, range.space);
                    }
                }
                RootParameterKind::ConstantBufferView { register, space } => {
                    put(&mut blob, 2);
                    put(&mut blob, parameter.visibility.code());
                    put(&mut blob, *register);
                    put(&mut blob, *space);
                }
                RootParameterKind::ShaderResourceView { register, space } => {
                    put(&mut blob, 3);
                    put(&mut blob, parameter.visibility.code());
                    put(&mut blob, *register);
                    put(&mut blob, *space);
                }
            }
        }

        for sampler in &self.static_samplers {
            let d = &sampler.descriptor;
            put(&mut blob, d.filter as u32);
            put(&mut blob, d.address_mode as u32);
            put(&mut blob, d.compare.map_or(0, |c| c as u32 + 1));
            put(&mut blob, u32::from(d.max_anisotropy));
            put(&mut blob, sampler.register);
            put(&mut blob, sampler.space);
            put(&mut blob, sampler.visibility.code());
        }

        blob
    }
}

/// A created root signature and the parameter indices the renderer binds at.
#[derive(Debug, Clone)]
pub struct RootSignature {
    desc: RootSignatureDesc,
    handle: RootSignatureHandle,
    blob: Vec<u8>,
    constant_buffers: Vec<u32>,
    resources: HashMap<String, u32>,
}

impl RootSignature {
    /// Synthesize, validate and create the root signature for a binding table.
    pub fn create(
        path: &str,
        table: &ResourceBindingTable,
        device: &dyn GpuDevice,
    ) -> Result<Self, LoadError> {
        let desc = RootSignatureDesc::from_table(table);
        desc.validate().map_err(|reason| LoadError::RootSignature {
            path: path.to_string(),
            reason,
        })?;

        let blob = desc.serialize();
        let handle = device
            .create_root_signature(&blob)
            .map_err(|source| LoadError::Device {
                path: path.to_string(),
                source,
            })?;

        let mut constant_buffers = Vec::with_capacity(table.constant_buffers().len());
        let mut resources = HashMap::new();
        for (index, parameter) in desc.parameters.iter().enumerate() {
            match parameter.kind {
                RootParameterKind::ConstantBufferView { .. } => constant_buffers.push(index as u32),
                _ => {
                    resources.insert(parameter.name.clone(), index as u32);
                }
            }
        }

        log::debug!(
            "{path}: root signature with {} parameters ({} DWORDs), {} static samplers",
            desc.parameters.len(),
            desc.dword_cost(),
            desc.static_samplers.len()
        );

        Ok(Self {
            desc,
            handle,
            blob,
            constant_buffers,
            resources,
        })
    }

    pub fn handle(&self) -> RootSignatureHandle {
        self.handle
    }

    pub fn parameters(&self) -> &[RootParameter] {
        &self.desc.parameters
    }

    pub fn static_samplers(&self) -> &[StaticSampler] {
        &self.desc.static_samplers
    }

    /// The serialized blob handed to the device.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn dword_cost(&self) -> u32 {
        self.desc.dword_cost()
    }

    /// Root parameter of the constant buffer at `index` in the binding table.
    pub fn constant_buffer_parameter(&self, index: usize) -> Option<u32> {
        self.constant_buffers.get(index).copied()
    }

    /// Root parameter of a texture, UAV or acceleration structure.
    pub fn resource_parameter(&self, name: &str) -> Option<u32> {
        self.resources.get(name).copied()
    }

    pub(crate) fn bind(&self, commands: &mut CommandList, bind_point: BindPoint) {
        commands.push(RenderCommand::SetRootSignature {
            bind_point,
            signature: self.handle,
        });
    }

    pub(crate) fn bind_constant_buffer(
        &self,
        commands: &mut CommandList,
        bind_point: BindPoint,
        index: usize,
        address: GpuAddress,
    ) {
        if let Some(parameter) = self.constant_buffer_parameter(index) {
            commands.push(RenderCommand::SetRootConstantBufferView {
                bind_point,
                parameter,
                address,
            });
        }
    }

    /// Transition the texture for the binding and point its table at it.
    pub(crate) fn bind_resource(
        &self,
        commands: &mut CommandList,
        bind_point: BindPoint,
        binding: &ResourceBinding,
        texture: &Texture,
    ) {
        let Some(parameter) = self.resource_parameter(&binding.name) else {
            return;
        };
        texture.transition(commands, required_state(binding));
        commands.push(RenderCommand::SetRootDescriptorTable {
            bind_point,
            parameter,
            textures: vec![texture.id()],
        });
    }

    pub(crate) fn bind_acceleration_structure(
        &self,
        commands: &mut CommandList,
        bind_point: BindPoint,
        name: &str,
        address: GpuAddress,
    ) {
        if let Some(parameter) = self.resource_parameter(name) {
            commands.push(RenderCommand::SetRootShaderResourceView {
                bind_point,
                parameter,
                address,
            });
        }
    }
}

/// State a resource must be in before the binding's stages read it.
fn required_state(binding: &ResourceBinding) -> ResourceState {
    if binding.kind == ResourceKind::Uav {
        return ResourceState::UnorderedAccess;
    }
    let pixel = binding.stages.contains(ShaderStageFlags::PIXEL);
    let other = !(binding.stages - ShaderStageFlags::PIXEL).is_empty();
    match (pixel, other) {
        (true, false) => ResourceState::PixelShaderResource,
        (true, true) => ResourceState::AllShaderResource,
        _ => ResourceState::NonPixelShaderResource,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;
    use crate::constants::ConstantBufferLayout;
    use crate::shader::StageReflection;
    use crate::types::ResourceDimension;

    fn binding(name: &str, kind: ResourceKind, register: u32, stages: ShaderStageFlags) -> ResourceBinding {
        ResourceBinding {
            name: name.to_string(),
            kind,
            dimension: match kind {
                ResourceKind::Texture | ResourceKind::Uav => ResourceDimension::Texture2D,
                _ => ResourceDimension::None,
            },
            stages,
            register,
            space: 0,
        }
    }

    fn layout(name: &str, register: u32) -> ConstantBufferLayout {
        ConstantBufferLayout {
            name: name.to_string(),
            size: 256,
            variables: Vec::new(),
            stages: ShaderStageFlags::VERTEX | ShaderStageFlags::PIXEL,
            register,
            space: 0,
        }
    }

    fn table(reflection: StageReflection) -> ResourceBindingTable {
        ResourceBindingTable::build("test", [reflection]).unwrap()
    }

    #[test]
    fn test_parameter_order() {
        let table = table(StageReflection {
            constant_buffers: vec![layout("cbPerFrame", 0)],
            bindings: vec![
                binding("gOutput", ResourceKind::Uav, 0, ShaderStageFlags::COMPUTE),
                binding("gAlbedo", ResourceKind::Texture, 0, ShaderStageFlags::PIXEL),
                binding("gScene", ResourceKind::AccelerationStructure, 5, ShaderStageFlags::COMPUTE),
                binding("gLinearWrap", ResourceKind::Sampler, 0, ShaderStageFlags::PIXEL),
            ],
            ..Default::default()
        });

        let desc = RootSignatureDesc::from_table(&table);
        let names: Vec<_> = desc.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["gScene", "gAlbedo", "gOutput", "cbPerFrame"]);
        assert_eq!(desc.parameters[1].visibility, ShaderVisibility::Pixel);
        assert_eq!(desc.parameters[3].visibility, ShaderVisibility::All);
        assert_eq!(desc.dword_cost(), 2 + 1 + 1 + 2);

        assert_eq!(desc.static_samplers.len(), 1);
        assert_eq!(desc.static_samplers[0].preset, "linearwrap");
    }

    #[test]
    fn test_create_and_indices() {
        let device = HeadlessDevice::new();
        let table = table(StageReflection {
            constant_buffers: vec![layout("cbPerFrame", 0), layout("cbPerObject", 1)],
            bindings: vec![binding("gAlbedo", ResourceKind::Texture, 0, ShaderStageFlags::PIXEL)],
            ..Default::default()
        });

        let signature = RootSignature::create("test", &table, &device).unwrap();
        assert_eq!(signature.resource_parameter("gAlbedo"), Some(0));
        assert_eq!(signature.constant_buffer_parameter(0), Some(1));
        assert_eq!(signature.constant_buffer_parameter(1), Some(2));
        assert_eq!(signature.constant_buffer_parameter(2), None);

        assert_eq!(&signature.blob()[..4], &ROOT_SIGNATURE_MAGIC);
        assert_eq!(
            device.root_signature_blob(signature.handle()).as_deref(),
            Some(signature.blob())
        );
    }

    #[test]
    fn test_dword_limit() {
        let device = HeadlessDevice::new();
        let table = table(StageReflection {
            constant_buffers: (0..33).map(|i| layout(&format!("cb{i}"), i)).collect(),
            ..Default::default()
        });

        let err = RootSignature::create("big", &table, &device).unwrap_err();
        assert!(matches!(err, LoadError::RootSignature { .. }));
        assert_eq!(device.root_signature_count(), 0);
    }

    #[test]
    fn test_required_state() {
        let pixel = binding("a", ResourceKind::Texture, 0, ShaderStageFlags::PIXEL);
        let both = binding("b", ResourceKind::Texture, 1, ShaderStageFlags::PIXEL | ShaderStageFlags::VERTEX);
        let compute = binding("c", ResourceKind::Texture, 2, ShaderStageFlags::COMPUTE);
        let uav = binding("d", ResourceKind::Uav, 0, ShaderStageFlags::PIXEL);

        assert_eq!(required_state(&pixel), ResourceState::PixelShaderResource);
        assert_eq!(required_state(&both), ResourceState::AllShaderResource);
        assert_eq!(required_state(&compute), ResourceState::NonPixelShaderResource);
        assert_eq!(required_state(&uav), ResourceState::UnorderedAccess);
    }
}

//! Bytecode reflection.
//!
//! Each stage's bytecode is parsed and validated with naga, then every bound
//! global the stage's entry point uses is classified into a constant buffer
//! layout, a resource binding, or an unknown binding. Ray tracing libraries
//! and stages naga has no entry point model for report every bound global.

use naga::{AddressSpace, ImageClass, ImageDimension, TypeInner};

use crate::constants::{align_up, ConstantBufferLayout, ConstantVariable, ParamType};
use crate::error::LoadError;
use crate::types::{ResourceDimension, ResourceKind, ShaderStage, VertexFormat};

use super::binding_table::{ResourceBinding, UnknownBinding};
use super::{ShaderCode, StageBytecode};

/// One element of the vertex input layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub name: String,
    pub location: u32,
    pub format: VertexFormat,
    /// Byte offset in a tightly packed vertex.
    pub offset: u32,
}

/// Everything reflected from one stage.
#[derive(Debug, Clone, Default)]
pub struct StageReflection {
    pub input_layout: Vec<InputElement>,
    pub constant_buffers: Vec<ConstantBufferLayout>,
    pub bindings: Vec<ResourceBinding>,
    pub unknown: Vec<UnknownBinding>,
}

/// Parse and validate stage bytecode.
pub(crate) fn parse_module(
    path: &str,
    stage: &StageBytecode,
) -> Result<(naga::Module, naga::valid::ModuleInfo), LoadError> {
    let module = match &stage.code {
        ShaderCode::SpirV(words) => {
            let options = naga::front::spv::Options::default();
            naga::front::spv::parse_u8_slice(bytemuck::cast_slice(words), &options).map_err(
                |e| LoadError::Parse {
                    path: path.to_string(),
                    stage: stage.stage,
                    message: e.to_string(),
                },
            )?
        }
        ShaderCode::Wgsl(source) => {
            naga::front::wgsl::parse_str(source).map_err(|e| LoadError::Parse {
                path: path.to_string(),
                stage: stage.stage,
                message: e.emit_to_string(source),
            })?
        }
    };

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| LoadError::Validation {
            path: path.to_string(),
            stage: stage.stage,
            message: e.to_string(),
        })?;

    Ok((module, info))
}

/// Index of the entry point a stage reflects, if the stage has one.
pub(crate) fn find_entry_point(
    path: &str,
    module: &naga::Module,
    stage: &StageBytecode,
) -> Result<Option<usize>, LoadError> {
    let Some(naga_stage) = stage.stage.naga_stage() else {
        return Ok(None);
    };

    let found = module.entry_points.iter().position(|ep| {
        ep.stage == naga_stage
            && stage
                .entry_point
                .as_deref()
                .map_or(true, |name| ep.name == name)
    });

    match found {
        Some(index) => Ok(Some(index)),
        None => Err(LoadError::EntryPointNotFound {
            path: path.to_string(),
            stage: stage.stage,
            entry_point: stage
                .entry_point
                .clone()
                .unwrap_or_else(|| "<any>".to_string()),
        }),
    }
}

/// Names a ray tracing library exports: its entry points and named functions.
pub(crate) fn library_exports(path: &str, stage: &StageBytecode) -> Result<Vec<String>, LoadError> {
    let (module, _) = parse_module(path, stage)?;
    let entry_points = module.entry_points.iter().map(|ep| ep.name.clone());
    let functions = module
        .functions
        .iter()
        .filter_map(|(_, function)| function.name.clone());
    Ok(entry_points.chain(functions).collect())
}

/// Reflect one stage.
///
/// `cb_alignment` is the backend's constant buffer size alignment.
pub fn reflect_stage(
    path: &str,
    stage: &StageBytecode,
    cb_alignment: u32,
) -> Result<StageReflection, LoadError> {
    let (module, info) = parse_module(path, stage)?;
    let entry = find_entry_point(path, &module, stage)?;
    let flag = stage.stage.flag();

    let mut reflection = StageReflection::default();

    if let (ShaderStage::Vertex, Some(index)) = (stage.stage, entry) {
        reflection.input_layout = reflect_vertex_inputs(&module, &module.entry_points[index])?;
    }

    for (handle, global) in module.global_variables.iter() {
        if let Some(index) = entry {
            if info.get_entry_point(index)[handle].is_empty() {
                continue;
            }
        }
        let Some(binding) = &global.binding else {
            continue;
        };
        let register = binding.binding;
        let space = binding.group;
        let name = global
            .name
            .clone()
            .unwrap_or_else(|| format!("binding_{space}_{register}"));

        let unknown = |description: String| UnknownBinding {
            name: name.clone(),
            stage: stage.stage,
            register,
            space,
            description,
        };

        let inner = &module.types[global.ty].inner;
        let classified = match global.space {
            AddressSpace::Uniform => {
                reflection.constant_buffers.push(reflect_constant_buffer(
                    &module,
                    &name,
                    global.ty,
                    cb_alignment,
                    register,
                    space,
                    flag,
                )?);
                continue;
            }
            AddressSpace::Storage { access } => {
                let kind = if access.contains(naga::StorageAccess::STORE) {
                    ResourceKind::Uav
                } else {
                    ResourceKind::Texture
                };
                Some((kind, ResourceDimension::Buffer))
            }
            AddressSpace::Handle => classify_handle(inner),
            other => {
                reflection
                    .unknown
                    .push(unknown(format!("{other:?} address space")));
                continue;
            }
        };

        match classified {
            Some((kind, dimension)) => reflection.bindings.push(ResourceBinding {
                name,
                kind,
                dimension,
                stages: flag,
                register,
                space,
            }),
            None => {
                log::warn!(
                    "{path}: unknown resource type for '{name}' in {} stage ({register}, space{space})",
                    stage.stage
                );
                reflection.unknown.push(unknown(format!("{inner:?}")));
            }
        }
    }

    Ok(reflection)
}

fn classify_handle(inner: &TypeInner) -> Option<(ResourceKind, ResourceDimension)> {
    match *inner {
        TypeInner::Image {
            dim,
            arrayed,
            class,
        } => {
            let (kind, multi) = match class {
                ImageClass::Sampled { multi, .. } | ImageClass::Depth { multi } => {
                    (ResourceKind::Texture, multi)
                }
                ImageClass::Storage { .. } => (ResourceKind::Uav, false),
            };
            let dimension = match (dim, arrayed, multi) {
                (ImageDimension::D1, false, _) => ResourceDimension::Texture1D,
                (ImageDimension::D1, true, _) => ResourceDimension::Texture1DArray,
                (ImageDimension::D2, false, false) => ResourceDimension::Texture2D,
                (ImageDimension::D2, true, false) => ResourceDimension::Texture2DArray,
                (ImageDimension::D2, false, true) => ResourceDimension::Texture2DMs,
                (ImageDimension::D2, true, true) => ResourceDimension::Texture2DMsArray,
                (ImageDimension::D3, _, _) => ResourceDimension::Texture3D,
                (ImageDimension::Cube, false, _) => ResourceDimension::TextureCube,
                (ImageDimension::Cube, true, _) => ResourceDimension::TextureCubeArray,
            };
            Some((kind, dimension))
        }
        TypeInner::Sampler { .. } => Some((ResourceKind::Sampler, ResourceDimension::None)),
        TypeInner::AccelerationStructure { .. } => Some((
            ResourceKind::AccelerationStructure,
            ResourceDimension::None,
        )),
        _ => None,
    }
}

fn reflect_constant_buffer(
    module: &naga::Module,
    name: &str,
    ty: naga::Handle<naga::Type>,
    cb_alignment: u32,
    register: u32,
    space: u32,
    stages: crate::types::ShaderStageFlags,
) -> Result<ConstantBufferLayout, LoadError> {
    let gctx = module.to_ctx();
    let block = unwrap_block(module, ty);
    let inner = &module.types[block].inner;

    let (variables, span) = match inner {
        TypeInner::Struct { members, span } => {
            let variables = members
                .iter()
                .enumerate()
                .map(|(index, member)| {
                    let member_inner = &module.types[member.ty].inner;
                    ConstantVariable {
                        name: member
                            .name
                            .clone()
                            .unwrap_or_else(|| format!("member{index}")),
                        offset: member.offset,
                        size: member_inner.size(gctx),
                        ty: ParamType::from_naga(member_inner),
                    }
                })
                .collect();
            (variables, *span)
        }
        other => {
            let size = other.size(gctx);
            let variable = ConstantVariable {
                name: name.to_string(),
                offset: 0,
                size,
                ty: ParamType::from_naga(other),
            };
            (vec![variable], size)
        }
    };

    let size = align_up(u64::from(span.max(1)), u64::from(cb_alignment)) as u32;
    let layout = ConstantBufferLayout {
        name: name.to_string(),
        size,
        variables,
        stages,
        register,
        space,
    };
    layout.validate()?;
    Ok(layout)
}

/// Look through the single-member block wrapper some compilers emit around
/// uniform structs.
fn unwrap_block(module: &naga::Module, ty: naga::Handle<naga::Type>) -> naga::Handle<naga::Type> {
    if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
        if let [member] = members.as_slice() {
            let is_struct = matches!(module.types[member.ty].inner, TypeInner::Struct { .. });
            if member.name.is_none() && member.offset == 0 && is_struct {
                return member.ty;
            }
        }
    }
    ty
}

fn reflect_vertex_inputs(
    module: &naga::Module,
    entry_point: &naga::EntryPoint,
) -> Result<Vec<InputElement>, LoadError> {
    let mut located: Vec<(String, u32, naga::Handle<naga::Type>)> = Vec::new();

    for (index, argument) in entry_point.function.arguments.iter().enumerate() {
        let arg_name = argument
            .name
            .clone()
            .unwrap_or_else(|| format!("input{index}"));
        match &argument.binding {
            Some(naga::Binding::Location { location, .. }) => {
                located.push((arg_name, *location, argument.ty));
            }
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                    for (member_index, member) in members.iter().enumerate() {
                        if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                            let name = member
                                .name
                                .clone()
                                .unwrap_or_else(|| format!("{arg_name}_{member_index}"));
                            located.push((name, *location, member.ty));
                        }
                    }
                }
            }
        }
    }

    located.sort_by_key(|(_, location, _)| *location);

    let mut offset = 0;
    located
        .into_iter()
        .map(|(name, location, ty)| {
            let format = VertexFormat::from_naga(&module.types[ty].inner)
                .ok_or_else(|| LoadError::UnsupportedVertexInput {
                    name: name.clone(),
                    location,
                })?;
            let element = InputElement {
                name,
                location,
                format,
                offset,
            };
            offset += format.size();
            Ok(element)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ShaderStageFlags;

    const FORWARD: &str = r#"
struct PerObject {
    gWorld: mat4x4<f32>,
    gTint: vec4<f32>,
    gObjectId: u32,
}

@group(0) @binding(0) var<uniform> cbPerObject: PerObject;
@group(0) @binding(1) var gAlbedo: texture_2d<f32>;
@group(0) @binding(2) var gShadowMap: texture_depth_2d_array;
@group(0) @binding(3) var gLinearWrap: sampler;
@group(0) @binding(4) var gOutput: texture_storage_2d<rgba8unorm, write>;

struct VsIn {
    @location(1) uv: vec2<f32>,
    @location(0) position: vec3<f32>,
}

@vertex
fn vs_main(input: VsIn) -> @builtin(position) vec4<f32> {
    return cbPerObject.gWorld * vec4<f32>(input.position + vec3<f32>(input.uv, 0.0), 1.0);
}

@fragment
fn ps_main(@builtin(position) coord: vec4<f32>) -> @location(0) vec4<f32> {
    let uv = coord.xy / 1024.0;
    let shadow = textureLoad(gShadowMap, vec2<i32>(coord.xy), 0, 0);
    return textureSample(gAlbedo, gLinearWrap, uv) * cbPerObject.gTint * shadow;
}
"#;

    fn stage(stage: ShaderStage, source: &str, entry: &str) -> StageBytecode {
        StageBytecode::new(stage, ShaderCode::Wgsl(source.to_string())).with_entry_point(entry)
    }

    #[test]
    fn test_vertex_stage_reflection() {
        let reflection =
            reflect_stage("forward", &stage(ShaderStage::Vertex, FORWARD, "vs_main"), 256).unwrap();

        assert_eq!(reflection.constant_buffers.len(), 1);
        let cb = &reflection.constant_buffers[0];
        assert_eq!(cb.name, "cbPerObject");
        assert_eq!(cb.size, 256);
        assert_eq!(cb.stages, ShaderStageFlags::VERTEX);

        let world = cb.variable("gWorld").unwrap();
        assert_eq!((world.offset, world.size), (0, 64));
        assert_eq!(world.ty, ParamType::Matrix { columns: 4, rows: 4 });
        let tint = cb.variable("gTint").unwrap();
        assert_eq!((tint.offset, tint.size), (64, 16));
        let id = cb.variable("gObjectId").unwrap();
        assert_eq!((id.offset, id.size), (80, 4));

        // The vertex stage touches no textures.
        assert!(reflection.bindings.is_empty());

        let layout = &reflection.input_layout;
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].name, "position");
        assert_eq!(layout[0].format, VertexFormat::Float32x3);
        assert_eq!(layout[0].offset, 0);
        assert_eq!(layout[1].name, "uv");
        assert_eq!(layout[1].offset, 12);
    }

    #[test]
    fn test_pixel_stage_resources() {
        let reflection =
            reflect_stage("forward", &stage(ShaderStage::Pixel, FORWARD, "ps_main"), 16).unwrap();

        assert_eq!(reflection.constant_buffers[0].size, 96);
        assert!(reflection.input_layout.is_empty());

        let find = |name: &str| reflection.bindings.iter().find(|b| b.name == name).unwrap();
        let albedo = find("gAlbedo");
        assert_eq!(albedo.kind, ResourceKind::Texture);
        assert_eq!(albedo.dimension, ResourceDimension::Texture2D);
        assert_eq!((albedo.register, albedo.space), (1, 0));

        assert_eq!(find("gShadowMap").dimension, ResourceDimension::Texture2DArray);
        assert_eq!(find("gLinearWrap").kind, ResourceKind::Sampler);

        // Declared but unused by the pixel entry point.
        assert!(reflection.bindings.iter().all(|b| b.name != "gOutput"));
    }

    #[test]
    fn test_library_reports_every_binding() {
        let source = r#"
@group(0) @binding(0) var gScene: acceleration_structure;
@group(0) @binding(1) var gOutput: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var gLights: binding_array<texture_2d<f32>, 4>;
@group(0) @binding(3) var<storage, read> gInstances: array<vec4<f32>>;
"#;
        let reflection = reflect_stage(
            "rt",
            &StageBytecode::new(ShaderStage::RayTracing, ShaderCode::Wgsl(source.to_string())),
            256,
        )
        .unwrap();

        let kinds: Vec<_> = reflection
            .bindings
            .iter()
            .map(|b| (b.name.as_str(), b.kind, b.dimension))
            .collect();
        assert!(kinds.contains(&(
            "gScene",
            ResourceKind::AccelerationStructure,
            ResourceDimension::None
        )));
        assert!(kinds.contains(&("gOutput", ResourceKind::Uav, ResourceDimension::Texture2D)));
        assert!(kinds.contains(&(
            "gInstances",
            ResourceKind::Texture,
            ResourceDimension::Buffer
        )));

        // The binding array is reported but does not abort reflection.
        assert_eq!(reflection.unknown.len(), 1);
        assert_eq!(reflection.unknown[0].name, "gLights");
        assert_eq!(reflection.unknown[0].register, 2);
    }

    #[test]
    fn test_parse_failure_is_fatal() {
        let result = reflect_stage(
            "broken",
            &stage(ShaderStage::Pixel, "fn ps_main( {", "ps_main"),
            256,
        );
        assert!(matches!(result, Err(LoadError::Parse { .. })));

        let garbage = StageBytecode::new(
            ShaderStage::Vertex,
            ShaderCode::SpirV(vec![ShaderCode::SPIRV_MAGIC, 0xdead_beef, 7]),
        );
        assert!(matches!(
            reflect_stage("garbage", &garbage, 256),
            Err(LoadError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_entry_point() {
        let result = reflect_stage("forward", &stage(ShaderStage::Pixel, FORWARD, "main"), 256);
        assert!(matches!(result, Err(LoadError::EntryPointNotFound { .. })));

        let compute = StageBytecode::new(ShaderStage::Compute, ShaderCode::Wgsl(FORWARD.to_string()));
        assert!(matches!(
            reflect_stage("forward", &compute, 256),
            Err(LoadError::EntryPointNotFound { .. })
        ));
    }

    #[test]
    fn test_spirv_round_trip_keeps_names_and_offsets() {
        let source = r#"
struct PerObject {
    gWorld: mat4x4<f32>,
    gTint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> cbPerObject: PerObject;
@group(0) @binding(1) var gAlbedo: texture_2d<f32>;
@group(0) @binding(2) var gLinearWrap: sampler;

@fragment
fn ps_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(gAlbedo, gLinearWrap, uv) * cbPerObject.gTint;
}
"#;
        let wgsl = stage(ShaderStage::Pixel, source, "ps_main");
        let words = crate::shader::to_spirv("forward", &wgsl).unwrap();
        let spirv = StageBytecode::new(ShaderStage::Pixel, ShaderCode::SpirV(words))
            .with_entry_point("ps_main");

        let reflection = reflect_stage("forward", &spirv, 256).unwrap();
        let cb = reflection
            .constant_buffers
            .iter()
            .find(|cb| cb.name == "cbPerObject")
            .unwrap();
        assert_eq!(cb.variable("gTint").map(|v| v.offset), Some(64));
        assert!(reflection.bindings.iter().any(|b| b.name == "gAlbedo"));
    }
}

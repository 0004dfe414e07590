//! Shader binding tables.
//!
//! One buffer holds three tables: the ray generation record, the miss
//! records, and one hit group record per scene instance. A record is a
//! shader identifier followed by local root arguments, padded to
//! [`ShaderBindingTable::RECORD_ALIGNMENT`]. Each table starts at a multiple
//! of [`ShaderBindingTable::TABLE_ALIGNMENT`].

use std::sync::Arc;

use crate::backend::{
    DispatchRaysDesc, GpuBuffer, GpuRange, GpuStridedRange, OwnedBuffer, PipelineHandle,
    ReleaseQueue, ShaderIdentifier,
};
use crate::constants::align_up;
use crate::error::{GraphicsError, PipelineBuildError};
use crate::types::{BufferDescriptor, BufferUsage};

use super::{RayTracingLibraryDesc, RaytracingScene};

/// Shader tables for one ray tracing pipeline and scene revision.
#[derive(Debug)]
pub struct ShaderBindingTable {
    buffer: OwnedBuffer,
    pipeline: PipelineHandle,
    scene_revision: u64,
    ray_generation: GpuRange,
    miss: GpuStridedRange,
    hit_groups: GpuStridedRange,
}

impl ShaderBindingTable {
    pub const RECORD_ALIGNMENT: u64 = 32;
    pub const TABLE_ALIGNMENT: u64 = 64;

    /// Write the tables for `scene` using identifiers from `pipeline`.
    pub fn build(
        queue: &Arc<ReleaseQueue>,
        path: &str,
        pipeline: PipelineHandle,
        library: &RayTracingLibraryDesc,
        scene: &RaytracingScene,
    ) -> Result<Self, GraphicsError> {
        let gpu = queue.gpu();
        let identifier = |export: &str| {
            gpu.shader_identifier(pipeline, export)
                .ok_or_else(|| PipelineBuildError::MissingExport {
                    path: path.to_string(),
                    export: export.to_string(),
                })
        };

        let id_size = ShaderIdentifier::SIZE as u64;
        let record = |arguments: u64| align_up(id_size + arguments, Self::RECORD_ALIGNMENT);

        let ray_generation_size = record(0);
        let miss_stride = record(0);
        let miss_offset = align_up(ray_generation_size, Self::TABLE_ALIGNMENT);
        let miss_size = miss_stride * library.miss.len() as u64;

        let max_arguments = scene
            .instances()
            .iter()
            .map(|instance| instance.root_arguments.len() as u64)
            .max()
            .unwrap_or(0);
        let hit_stride = record(max_arguments);
        let hit_offset = align_up(miss_offset + miss_size, Self::TABLE_ALIGNMENT);
        let hit_size = hit_stride * scene.instances().len() as u64;

        let total = (hit_offset + hit_size).max(Self::TABLE_ALIGNMENT);
        let mut bytes = vec![0u8; total as usize];

        let mut put = |offset: u64, identifier: ShaderIdentifier, arguments: &[u8]| {
            let start = offset as usize;
            bytes[start..start + ShaderIdentifier::SIZE].copy_from_slice(&identifier.0);
            let arguments_start = start + ShaderIdentifier::SIZE;
            bytes[arguments_start..arguments_start + arguments.len()].copy_from_slice(arguments);
        };

        put(0, identifier(&library.ray_generation)?, &[]);
        for (index, miss) in library.miss.iter().enumerate() {
            put(miss_offset + miss_stride * index as u64, identifier(miss)?, &[]);
        }
        for (index, instance) in scene.instances().iter().enumerate() {
            put(
                hit_offset + hit_stride * index as u64,
                identifier(&instance.hit_group)?,
                &instance.root_arguments,
            );
        }

        let buffer = queue.create_buffer(
            &BufferDescriptor::new(total, BufferUsage::SHADER_TABLE | BufferUsage::UPLOAD)
                .with_label(format!("{path}_shader_table")),
        )?;
        gpu.write_buffer(&buffer, 0, &bytes)?;

        log::debug!(
            "{path}: built shader tables ({} miss, {} hit records, revision {})",
            library.miss.len(),
            scene.instances().len(),
            scene.revision()
        );

        let base = buffer.address();
        Ok(Self {
            buffer,
            pipeline,
            scene_revision: scene.revision(),
            ray_generation: GpuRange {
                address: base,
                size: ray_generation_size,
            },
            miss: GpuStridedRange {
                address: base + miss_offset,
                size: miss_size,
                stride: miss_stride,
            },
            hit_groups: GpuStridedRange {
                address: base + hit_offset,
                size: hit_size,
                stride: hit_stride,
            },
        })
    }

    /// Whether these tables were built for this pipeline and scene revision.
    pub fn is_current(&self, pipeline: PipelineHandle, scene_revision: u64) -> bool {
        self.pipeline == pipeline && self.scene_revision == scene_revision
    }

    pub fn buffer(&self) -> &GpuBuffer {
        self.buffer.buffer()
    }

    pub fn ray_generation(&self) -> GpuRange {
        self.ray_generation
    }

    pub fn miss(&self) -> GpuStridedRange {
        self.miss
    }

    pub fn hit_groups(&self) -> GpuStridedRange {
        self.hit_groups
    }

    pub fn dispatch_desc(&self, width: u32, height: u32, depth: u32) -> DispatchRaysDesc {
        DispatchRaysDesc {
            ray_generation: self.ray_generation,
            miss: self.miss,
            hit_groups: self.hit_groups,
            width,
            height,
            depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        GpuDevice, HeadlessDevice, PipelineStage, RayTracingPipelineDescriptor, RootSignatureHandle,
    };
    use crate::raytracing::{GeometryInstance, HitGroupDesc};
    use crate::shader::ShaderCode;
    use crate::types::ShaderStage;

    fn library() -> RayTracingLibraryDesc {
        RayTracingLibraryDesc::new("raygen")
            .with_miss("miss")
            .with_miss("shadow_miss")
            .with_hit_group(HitGroupDesc::triangles("opaque", "closest"))
    }

    fn release_queue() -> (Arc<HeadlessDevice>, Arc<ReleaseQueue>) {
        let device = Arc::new(HeadlessDevice::new());
        let queue = Arc::new(ReleaseQueue::new(device.clone(), 2));
        (device, queue)
    }

    fn pipeline(device: &HeadlessDevice, library: &RayTracingLibraryDesc) -> PipelineHandle {
        let mut exports = vec![library.ray_generation.clone()];
        exports.extend(library.miss.iter().cloned());
        device
            .create_raytracing_pipeline(&RayTracingPipelineDescriptor {
                label: "rt".into(),
                library: PipelineStage {
                    stage: ShaderStage::RayTracing,
                    entry_point: None,
                    code: ShaderCode::SpirV(vec![ShaderCode::SPIRV_MAGIC]),
                },
                exports,
                hit_groups: library.hit_groups.clone(),
                max_payload_size: library.max_payload_size,
                max_attribute_size: library.max_attribute_size,
                max_recursion_depth: library.max_recursion_depth,
                root_signature: RootSignatureHandle(0),
            })
            .unwrap()
    }

    #[test]
    fn test_layout_and_alignment() {
        let (device, queue) = release_queue();
        let library = library();
        let handle = pipeline(&device, &library);

        let mut scene = RaytracingScene::new();
        scene.add_instance(GeometryInstance::new("floor", "opaque").with_root_arguments(vec![0xAB; 8]));
        scene.add_instance(GeometryInstance::new("wall", "opaque"));

        let table = ShaderBindingTable::build(&queue, "rt", handle, &library, &scene).unwrap();
        let base = table.buffer().address();

        assert_eq!(table.ray_generation().address, base);
        assert_eq!(table.miss().address - base, 64);
        assert_eq!(table.miss().stride, 32);
        assert_eq!(table.miss().size, 64);
        assert_eq!(table.hit_groups().address - base, 128);
        assert_eq!(table.hit_groups().stride, 64);
        assert_eq!(table.hit_groups().size, 128);
        assert_eq!(table.hit_groups().address % ShaderBindingTable::TABLE_ALIGNMENT, 0);

        let floor = device
            .read_address(table.hit_groups().address, 64)
            .unwrap();
        let expected = device.shader_identifier(handle, "opaque").unwrap();
        assert_eq!(&floor[..32], &expected.0);
        assert_eq!(&floor[32..40], &[0xAB; 8]);

        assert!(table.is_current(handle, scene.revision()));
        scene.remove_instance("wall");
        assert!(!table.is_current(handle, scene.revision()));
    }

    #[test]
    fn test_unknown_hit_group() {
        let (device, queue) = release_queue();
        let library = library();
        let handle = pipeline(&device, &library);

        let mut scene = RaytracingScene::new();
        scene.add_instance(GeometryInstance::new("glass", "transparent"));

        let err = ShaderBindingTable::build(&queue, "rt", handle, &library, &scene).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::PipelineBuild(PipelineBuildError::MissingExport { .. })
        ));
    }
}

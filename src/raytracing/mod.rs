//! Ray tracing: library descriptions, scene membership and shader tables.
//!
//! Building acceleration structures is out of scope here. The binding layer
//! only needs the top-level structure's address, the hit group each
//! geometry instance uses, and a revision that changes with membership.

mod shader_table;

pub use shader_table::ShaderBindingTable;

use std::sync::Arc;

use crate::resources::AccelerationStructure;

/// A hit group: shaders run when a ray hits a geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HitGroupDesc {
    pub name: String,
    pub closest_hit: Option<String>,
    pub any_hit: Option<String>,
    pub intersection: Option<String>,
}

impl HitGroupDesc {
    /// A triangle hit group with a closest hit shader.
    pub fn triangles(name: impl Into<String>, closest_hit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            closest_hit: Some(closest_hit.into()),
            any_hit: None,
            intersection: None,
        }
    }

    pub fn with_any_hit(mut self, any_hit: impl Into<String>) -> Self {
        self.any_hit = Some(any_hit.into());
        self
    }

    pub fn with_intersection(mut self, intersection: impl Into<String>) -> Self {
        self.intersection = Some(intersection.into());
        self
    }

    /// Library functions the group references.
    pub fn shaders(&self) -> impl Iterator<Item = &str> {
        [&self.closest_hit, &self.any_hit, &self.intersection]
            .into_iter()
            .filter_map(|name| name.as_deref())
    }
}

/// Exports and limits of a ray tracing library.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RayTracingLibraryDesc {
    pub ray_generation: String,
    pub miss: Vec<String>,
    pub hit_groups: Vec<HitGroupDesc>,
    pub max_payload_size: u32,
    pub max_attribute_size: u32,
    pub max_recursion_depth: u32,
}

impl RayTracingLibraryDesc {
    pub fn new(ray_generation: impl Into<String>) -> Self {
        Self {
            ray_generation: ray_generation.into(),
            miss: Vec::new(),
            hit_groups: Vec::new(),
            max_payload_size: 16,
            max_attribute_size: 8,
            max_recursion_depth: 1,
        }
    }

    pub fn with_miss(mut self, miss: impl Into<String>) -> Self {
        self.miss.push(miss.into());
        self
    }

    pub fn with_hit_group(mut self, group: HitGroupDesc) -> Self {
        self.hit_groups.push(group);
        self
    }

    pub fn with_payload_size(mut self, bytes: u32) -> Self {
        self.max_payload_size = bytes;
        self
    }

    pub fn with_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Every library function this description references.
    pub fn referenced_shaders(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.ray_generation.as_str())
            .chain(self.miss.iter().map(String::as_str))
            .chain(self.hit_groups.iter().flat_map(HitGroupDesc::shaders))
    }
}

/// One geometry instance in the ray traced scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryInstance {
    pub name: String,
    /// Hit group the instance's record points at.
    pub hit_group: String,
    /// Local root arguments written after the shader identifier.
    pub root_arguments: Vec<u8>,
}

impl GeometryInstance {
    pub fn new(name: impl Into<String>, hit_group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hit_group: hit_group.into(),
            root_arguments: Vec::new(),
        }
    }

    pub fn with_root_arguments(mut self, arguments: impl Into<Vec<u8>>) -> Self {
        self.root_arguments = arguments.into();
        self
    }
}

/// Geometry membership of the ray traced scene.
///
/// Every add or remove bumps the revision; shader binding tables built for an
/// older revision are rebuilt on the next ray dispatch.
#[derive(Debug, Default)]
pub struct RaytracingScene {
    instances: Vec<GeometryInstance>,
    top_level: Option<Arc<AccelerationStructure>>,
    revision: u64,
}

impl RaytracingScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance, replacing any with the same name.
    pub fn add_instance(&mut self, instance: GeometryInstance) {
        match self.instances.iter_mut().find(|i| i.name == instance.name) {
            Some(existing) => *existing = instance,
            None => self.instances.push(instance),
        }
        self.revision += 1;
    }

    /// Remove an instance by name. Returns whether it was present.
    pub fn remove_instance(&mut self, name: &str) -> bool {
        let before = self.instances.len();
        self.instances.retain(|i| i.name != name);
        let removed = self.instances.len() != before;
        if removed {
            self.revision += 1;
        }
        removed
    }

    pub fn instances(&self) -> &[GeometryInstance] {
        &self.instances
    }

    /// Set the top-level structure rays are traced against.
    pub fn set_top_level(&mut self, structure: Arc<AccelerationStructure>) {
        self.top_level = Some(structure);
    }

    pub fn top_level(&self) -> Option<&Arc<AccelerationStructure>> {
        self.top_level.as_ref()
    }

    /// Membership revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_shaders() {
        let library = RayTracingLibraryDesc::new("raygen")
            .with_miss("miss")
            .with_hit_group(HitGroupDesc::triangles("opaque", "closest").with_any_hit("alpha_test"));
        let names: Vec<_> = library.referenced_shaders().collect();
        assert_eq!(names, ["raygen", "miss", "closest", "alpha_test"]);
    }

    #[test]
    fn test_revision_tracks_membership() {
        let mut scene = RaytracingScene::new();
        assert_eq!(scene.revision(), 0);

        scene.add_instance(GeometryInstance::new("floor", "opaque"));
        scene.add_instance(GeometryInstance::new("floor", "opaque").with_root_arguments([1, 2, 3, 4]));
        assert_eq!(scene.instances().len(), 1);
        assert_eq!(scene.revision(), 2);

        assert!(!scene.remove_instance("missing"));
        assert_eq!(scene.revision(), 2);
        assert!(scene.remove_instance("floor"));
        assert_eq!(scene.revision(), 3);
    }
}

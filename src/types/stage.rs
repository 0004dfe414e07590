//! Shader stages.

use std::fmt;

use bitflags::bitflags;

/// A programmable stage a compiled shader can carry bytecode for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Pixel (fragment) shader.
    Pixel,
    /// Geometry shader.
    Geometry,
    /// Compute shader.
    Compute,
    /// Ray tracing library (ray generation, miss and hit group exports).
    RayTracing,
}

impl ShaderStage {
    /// Every stage, in pipeline order.
    pub const ALL: [ShaderStage; 5] = [
        Self::Vertex,
        Self::Pixel,
        Self::Geometry,
        Self::Compute,
        Self::RayTracing,
    ];

    /// The flag bit for this stage.
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::Pixel => ShaderStageFlags::PIXEL,
            Self::Geometry => ShaderStageFlags::GEOMETRY,
            Self::Compute => ShaderStageFlags::COMPUTE,
            Self::RayTracing => ShaderStageFlags::RAY_TRACING,
        }
    }

    /// Whether the stage belongs to a rasterization pipeline.
    pub fn is_graphics(self) -> bool {
        matches!(self, Self::Vertex | Self::Pixel | Self::Geometry)
    }

    /// The matching naga stage, if naga models one.
    ///
    /// Ray tracing libraries have no single stage and geometry shaders are not
    /// modeled by naga; both reflect the whole module.
    pub(crate) fn naga_stage(self) -> Option<naga::ShaderStage> {
        match self {
            Self::Vertex => Some(naga::ShaderStage::Vertex),
            Self::Pixel => Some(naga::ShaderStage::Fragment),
            Self::Compute => Some(naga::ShaderStage::Compute),
            Self::Geometry | Self::RayTracing => None,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::Pixel => "pixel",
            Self::Geometry => "geometry",
            Self::Compute => "compute",
            Self::RayTracing => "ray tracing",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Pixel shader stage.
        const PIXEL = 1 << 1;
        /// Geometry shader stage.
        const GEOMETRY = 1 << 2;
        /// Compute shader stage.
        const COMPUTE = 1 << 3;
        /// Ray tracing library.
        const RAY_TRACING = 1 << 4;
    }
}

impl ShaderStageFlags {
    /// Iterate the individual stages contained in the set.
    pub fn stages(self) -> impl Iterator<Item = ShaderStage> {
        ShaderStage::ALL
            .into_iter()
            .filter(move |stage| self.contains(stage.flag()))
    }

    /// The single stage in the set, if exactly one is present.
    pub fn single(self) -> Option<ShaderStage> {
        let mut stages = self.stages();
        match (stages.next(), stages.next()) {
            (Some(stage), None) => Some(stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_iteration() {
        let flags = ShaderStageFlags::VERTEX | ShaderStageFlags::PIXEL;
        let stages: Vec<_> = flags.stages().collect();
        assert_eq!(stages, vec![ShaderStage::Vertex, ShaderStage::Pixel]);
        assert_eq!(flags.single(), None);
        assert_eq!(
            ShaderStageFlags::COMPUTE.single(),
            Some(ShaderStage::Compute)
        );
    }
}

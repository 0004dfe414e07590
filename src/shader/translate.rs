//! SPIR-V translation for backends that consume SPIR-V only.

use crate::error::PipelineBuildError;

use super::reflect::{find_entry_point, parse_module};
use super::{ShaderCode, StageBytecode};

/// Produce SPIR-V words for a stage.
///
/// SPIR-V input is passed through. WGSL is parsed, validated and written out
/// with debug names so reflection of the result sees the same symbols.
pub(crate) fn to_spirv(path: &str, stage: &StageBytecode) -> Result<Vec<u32>, PipelineBuildError> {
    let source = match &stage.code {
        ShaderCode::SpirV(words) => return Ok(words.clone()),
        ShaderCode::Wgsl(source) => source,
    };
    let translation = |message: String| PipelineBuildError::Translation {
        path: path.to_string(),
        message,
    };

    log::debug!("{path}: translating {} stage to SPIR-V ({} bytes of WGSL)", stage.stage, source.len());

    let (module, info) = parse_module(path, stage).map_err(|e| translation(e.to_string()))?;
    let entry = find_entry_point(path, &module, stage).map_err(|e| translation(e.to_string()))?;

    let mut options = naga::back::spv::Options::default();
    options.flags |= naga::back::spv::WriterFlags::DEBUG;

    let pipeline_options = entry.map(|index| {
        let entry_point = &module.entry_points[index];
        naga::back::spv::PipelineOptions {
            shader_stage: entry_point.stage,
            entry_point: entry_point.name.clone(),
        }
    });

    naga::back::spv::write_vec(&module, &info, &options, pipeline_options.as_ref())
        .map_err(|e| translation(format!("SPIR-V generation error: {e}")))
}

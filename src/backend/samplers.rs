//! Well-known sampler states.
//!
//! Shaders never describe sampler state; the sampler's variable name selects
//! an entry of this dictionary. Matching ignores case and punctuation and
//! accepts prefixes, so `gLinearWrap`, `linear_wrap` and `s_LinearWrap` all
//! select the same entry.

use crate::types::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};

/// Dictionary of sampler states, keyed by normalized name.
///
/// The first entry is the fallback for unknown names.
pub const WELL_KNOWN_SAMPLERS: &[(&str, SamplerDescriptor)] = &[
    (
        "linearwrap",
        SamplerDescriptor::new(FilterMode::Linear, AddressMode::Wrap),
    ),
    (
        "linearclamp",
        SamplerDescriptor::new(FilterMode::Linear, AddressMode::Clamp),
    ),
    (
        "linearmirror",
        SamplerDescriptor::new(FilterMode::Linear, AddressMode::Mirror),
    ),
    (
        "linearborder",
        SamplerDescriptor::new(FilterMode::Linear, AddressMode::Border),
    ),
    (
        "pointwrap",
        SamplerDescriptor::new(FilterMode::Point, AddressMode::Wrap),
    ),
    (
        "pointclamp",
        SamplerDescriptor::new(FilterMode::Point, AddressMode::Clamp),
    ),
    (
        "anisotropicwrap",
        SamplerDescriptor::new(FilterMode::Anisotropic, AddressMode::Wrap).with_anisotropy(16),
    ),
    (
        "anisotropicclamp",
        SamplerDescriptor::new(FilterMode::Anisotropic, AddressMode::Clamp).with_anisotropy(16),
    ),
    (
        "shadowcompare",
        SamplerDescriptor::new(FilterMode::Linear, AddressMode::Border)
            .with_compare(CompareFunction::LessEqual),
    ),
];

/// Lowercase alphanumerics only.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Resolve a sampler variable name to its dictionary key and state.
///
/// Unknown names fall back to the first entry with a warning.
pub fn resolve_sampler(name: &str) -> (&'static str, SamplerDescriptor) {
    let normalized = normalize(name);
    if let Some((key, descriptor)) = WELL_KNOWN_SAMPLERS
        .iter()
        .find(|(key, _)| normalized.ends_with(key))
    {
        return (key, *descriptor);
    }

    let (key, descriptor) = WELL_KNOWN_SAMPLERS[0];
    log::warn!("unknown sampler '{name}', falling back to '{key}'");
    (key, descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_normalization() {
        assert_eq!(resolve_sampler("gLinearWrap").0, "linearwrap");
        assert_eq!(resolve_sampler("linear_clamp").0, "linearclamp");
        assert_eq!(resolve_sampler("s_PointClamp").0, "pointclamp");
        assert_eq!(
            resolve_sampler("gShadowCompare").1.compare,
            Some(CompareFunction::LessEqual)
        );
    }

    #[test]
    fn test_unknown_falls_back_to_first_entry() {
        let (key, descriptor) = resolve_sampler("gMysterySampler");
        assert_eq!(key, WELL_KNOWN_SAMPLERS[0].0);
        assert_eq!(descriptor, WELL_KNOWN_SAMPLERS[0].1);
    }
}

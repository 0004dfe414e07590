//! Materials: a shader's declared texture and UAV slots as a name → resource map.
//!
//! A [`Material`] owns no GPU objects. It is seeded from the binding table of
//! its shader and filled by the pass that owns it.

mod material;

pub use material::{Material, TextureSlot};

//! Pipeline state objects and their cache.
//!
//! - [`PipelineStateKey`] - Shader identity plus, for graphics, fixed-function state
//! - [`PipelineState`] - A built device pipeline
//! - [`PipelineCache`] - Builds each key once and hands out the shared result

mod cache;
mod state;

pub use cache::PipelineCache;
pub use state::{PipelineState, PipelineStateKey};

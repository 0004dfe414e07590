//! Configuration for the binding layer.

use std::collections::HashMap;
use std::fmt;

use crate::error::GraphicsError;

/// Which binding model the device speaks.
///
/// Chosen once at device creation; never mixed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Explicit root-signature binding (root CBVs, descriptor tables, static
    /// samplers). Supports ray tracing.
    #[default]
    Explicit,
    /// Implicit per-stage slot binding. No ray tracing.
    Implicit,
}

impl BackendType {
    /// Human-readable backend name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for a [`GraphicsDevice`](crate::GraphicsDevice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingConfig {
    /// Binding model.
    pub backend: BackendType,
    /// Frames the CPU may record ahead of the GPU. Each gets its own ring partition.
    pub frames_in_flight: u32,
    /// Slots per constant buffer per frame.
    pub ring_capacity: u32,
    /// Per constant-buffer-name capacity overrides.
    pub ring_capacity_overrides: HashMap<String, u32>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Explicit,
            frames_in_flight: Self::DEFAULT_FRAMES_IN_FLIGHT,
            ring_capacity: Self::DEFAULT_RING_CAPACITY,
            ring_capacity_overrides: HashMap::new(),
        }
    }
}

impl BindingConfig {
    /// Default number of frames in flight.
    pub const DEFAULT_FRAMES_IN_FLIGHT: u32 = 2;

    /// Default ring capacity per constant buffer per frame.
    pub const DEFAULT_RING_CAPACITY: u32 = 1024;

    /// Upper bound for frames in flight.
    pub const MAX_FRAMES_IN_FLIGHT: u32 = 8;

    /// Create a configuration for the given backend.
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the default ring capacity.
    pub fn with_ring_capacity(mut self, capacity: u32) -> Self {
        self.ring_capacity = capacity;
        self
    }

    /// Override the ring capacity for one constant buffer by name.
    pub fn with_ring_capacity_for(mut self, buffer: impl Into<String>, capacity: u32) -> Self {
        self.ring_capacity_overrides.insert(buffer.into(), capacity);
        self
    }

    /// Ring capacity for the named constant buffer.
    pub fn ring_capacity_for(&self, buffer: &str) -> u32 {
        self.ring_capacity_overrides
            .get(buffer)
            .copied()
            .unwrap_or(self.ring_capacity)
    }

    /// Check the configuration for values the allocator cannot honor.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > Self::MAX_FRAMES_IN_FLIGHT {
            return Err(GraphicsError::InvalidParameter(format!(
                "frames_in_flight must be in 1..={}, got {}",
                Self::MAX_FRAMES_IN_FLIGHT,
                self.frames_in_flight
            )));
        }
        if self.ring_capacity == 0 {
            return Err(GraphicsError::InvalidParameter(
                "ring capacity cannot be zero".to_string(),
            ));
        }
        if let Some((name, _)) = self
            .ring_capacity_overrides
            .iter()
            .find(|(_, capacity)| **capacity == 0)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "ring capacity override for '{name}' cannot be zero"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BindingConfig::default();
        assert_eq!(config.backend, BackendType::Explicit);
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.ring_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_override() {
        let config = BindingConfig::new(BackendType::Implicit)
            .with_ring_capacity(16)
            .with_ring_capacity_for("cbPerFrame", 2);
        assert_eq!(config.ring_capacity_for("cbPerFrame"), 2);
        assert_eq!(config.ring_capacity_for("cbPerObject"), 16);
    }

    #[test]
    fn test_validation() {
        assert!(BindingConfig::default()
            .with_frames_in_flight(0)
            .validate()
            .is_err());
        assert!(BindingConfig::default()
            .with_ring_capacity(0)
            .validate()
            .is_err());
        assert!(BindingConfig::default()
            .with_ring_capacity_for("cb", 0)
            .validate()
            .is_err());
    }
}

//! Batch configuration.
//!
//! Loaded once at startup, typically from a TOML file:
//!
//! ```toml
//! capacity = 4096
//! cast_shadows = false
//! receive_shadows = true
//! label = "crowd"
//!
//! [bounds]
//! mode = "from_instances"
//! padding = 2.5
//! ```

use std::path::Path;

use horde_core::{BoundsMode, InstanceTransform, DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Storage binding size every wgpu device supports (128 MiB).
pub const MAX_STORAGE_BINDING_BYTES: usize = 128 << 20;

/// Largest capacity whose transform buffer fits one storage binding.
pub const MAX_CAPACITY: usize = MAX_STORAGE_BINDING_BYTES / InstanceTransform::SIZE;

/// Per-batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum instances per draw. Sizes both GPU mirror buffers.
    pub capacity: usize,
    /// Bound handed to the draw call.
    pub bounds: BoundsMode,
    /// Render into shadow maps.
    pub cast_shadows: bool,
    /// Sample shadow maps.
    pub receive_shadows: bool,
    /// Prefix for GPU debug labels.
    pub label: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            bounds: BoundsMode::CONSERVATIVE,
            cast_shadows: false,
            receive_shadows: true,
            label: "skinning_batch".to_owned(),
        }
    }
}

impl BatchConfig {
    /// Default settings with a different capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] on a parse or validation failure.
    pub fn from_toml_str(source: &str) -> RenderResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| RenderError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            RenderError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        tracing::debug!("Loading batch config from {}", path.display());
        Self::from_toml_str(&source)
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> RenderResult<()> {
        if self.capacity == 0 {
            return Err(RenderError::InvalidConfig("capacity must be greater than zero".into()));
        }
        if self.capacity > MAX_CAPACITY {
            return Err(RenderError::InvalidConfig(format!(
                "capacity {} exceeds {MAX_CAPACITY} (transform buffer must fit one storage binding)",
                self.capacity
            )));
        }
        if !self.bounds.is_valid() {
            return Err(RenderError::InvalidConfig(format!(
                "bounds must be finite and non-negative: {:?}",
                self.bounds
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_conservative_draw() {
        let config = BatchConfig::default();
        assert_eq!(config.capacity, 32768);
        assert_eq!(config.bounds, BoundsMode::CONSERVATIVE);
        assert!(!config.cast_shadows);
        assert!(config.receive_shadows);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_document() {
        let config = BatchConfig::from_toml_str(
            r#"
            capacity = 4096
            cast_shadows = true
            label = "crowd"

            [bounds]
            mode = "from_instances"
            padding = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(config.capacity, 4096);
        assert!(config.cast_shadows);
        assert!(config.receive_shadows);
        assert_eq!(config.label, "crowd");
        assert_eq!(config.bounds, BoundsMode::FromInstances { padding: 2.5 });
    }

    #[test]
    fn test_parse_fixed_bounds() {
        let config = BatchConfig::from_toml_str(
            r#"
            [bounds]
            mode = "fixed"
            center = [10.0, 0.0, -5.0]
            half_extents = [100.0, 20.0, 100.0]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.bounds,
            BoundsMode::Fixed {
                center: [10.0, 0.0, -5.0],
                half_extents: [100.0, 20.0, 100.0],
            }
        );
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(BatchConfig::from_toml_str("").unwrap(), BatchConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            BatchConfig::from_toml_str("capacity = 0"),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(matches!(
            BatchConfig::from_toml_str("[bounds]\nmode = \"from_instances\"\npadding = -1.0"),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(matches!(
            BatchConfig::from_toml_str("capacity = \"lots\""),
            Err(RenderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_capacity_limited_to_one_storage_binding() {
        assert_eq!(MAX_CAPACITY, 2_097_152);
        assert!(BatchConfig::with_capacity(MAX_CAPACITY).validate().is_ok());
        assert!(matches!(
            BatchConfig::with_capacity(MAX_CAPACITY + 1).validate(),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(matches!(
            BatchConfig::with_capacity(u32::MAX as usize).validate(),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(matches!(
            BatchConfig::from_toml_str("capacity = 4294967295"),
            Err(RenderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let missing = std::env::temp_dir().join("horde_missing_batch_config.toml");
        assert!(matches!(
            BatchConfig::load(&missing),
            Err(RenderError::InvalidConfig(_))
        ));
    }
}

//! Deployment configuration for the visualizer.
//!
//! Loaded from a camelCase JSON file; any missing field takes its default.
//!
//! ```json
//! {
//!     "useAccelerator": false,
//!     "topicName": "/object_markers",
//!     "slotCount": 2,
//!     "releaseDelay": 0.1
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::Duration;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Recognised configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisualizerConfig {
    /// Remap on the GPU instead of time-slicing on the CPU
    pub use_accelerator: bool,
    /// Parent under which the slot targets are created; `None` uses
    /// `"VisualizedMesh"`
    pub render_target: Option<String>,
    /// Ingress topic, passed to the transport as is
    pub topic_name: String,
    /// Number of render slots, fixed after startup
    pub slot_count: usize,
    pub enable_instrumentation: bool,
    /// Seconds between the last commit of a batch and the gate reopening
    pub release_delay: f64,
    /// CPU coordinate pass yields every this many points
    pub remap_stride: usize,
    /// CPU mesh build yields every this many points
    pub mesh_stride: usize,
    /// WGSL source of the remap kernel
    pub shader_path: PathBuf,
    /// Where the performance report is written
    pub analysis_directory: PathBuf,
    /// Suffix of the performance report file name
    pub analysis_label: Option<String>,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        VisualizerConfig {
            use_accelerator: false,
            render_target: None,
            topic_name: "/object_markers".to_string(),
            slot_count: 1,
            enable_instrumentation: false,
            release_delay: 0.1,
            remap_stride: 100,
            mesh_stride: 300,
            shader_path: PathBuf::from("assets/shaders/marker_transform.wgsl"),
            analysis_directory: PathBuf::from("."),
            analysis_label: None,
        }
    }
}

impl VisualizerConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: VisualizerConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_count == 0 {
            return Err(invalid("slotCount", "must be at least 1"));
        }
        if !self.release_delay.is_finite() || self.release_delay < 0.0 {
            return Err(invalid(
                "releaseDelay",
                format!("must be a non-negative number of seconds, got {}", self.release_delay),
            ));
        }
        if self.remap_stride == 0 {
            return Err(invalid("remapStride", "must be at least 1"));
        }
        if self.mesh_stride == 0 {
            return Err(invalid("meshStride", "must be at least 1"));
        }
        if self.topic_name.trim().is_empty() {
            return Err(invalid("topicName", "must not be empty"));
        }
        Ok(())
    }

    /// The release delay rounded to whole nanoseconds, so `0.1` is exactly
    /// 100 ms.
    pub fn release_delay_duration(&self) -> Duration {
        let nanos = (self.release_delay.max(0.0) * 1e9).round();
        Duration::from_nanos(nanos as u64)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

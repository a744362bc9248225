//! Pipeline configuration (JSON).
//!
//! Every field has a default so an empty object `{}` is a valid config file.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Initial byte capacity of every native arena.
    #[serde(default = "default_arena_initial_capacity")]
    pub arena_initial_capacity: usize,

    /// Hard ceiling for arena growth. Renting past it is a capacity error.
    #[serde(default = "default_arena_max_capacity")]
    pub arena_max_capacity: usize,

    /// Compute thread-group size used when the container metadata does not declare one.
    #[serde(default = "default_thread_group")]
    pub default_thread_group: [u32; 3],

    /// Per-quad depth bias increment applied by the drivers.
    #[serde(default = "default_depth_epsilon_step")]
    pub depth_epsilon_step: f32,

    /// Extra bytes reserved whenever the dynamic vertex buffer grows.
    #[serde(default = "default_dynamic_buffer_slack")]
    pub dynamic_buffer_slack: usize,

    /// Minimum number of constant buffer / texture / sampler slots captured at Begin; the D3D11
    /// driver widens it to cover the bound material.
    #[serde(default = "default_captured_slots")]
    pub captured_slots: u32,

    /// Optional tracing filter (EnvFilter syntax).
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_arena_initial_capacity() -> usize {
    4 * 1024 * 1024
}
fn default_arena_max_capacity() -> usize {
    256 * 1024 * 1024
}
fn default_thread_group() -> [u32; 3] {
    [16, 16, 1]
}
fn default_depth_epsilon_step() -> f32 {
    0.000_001
}
fn default_dynamic_buffer_slack() -> usize {
    1024
}
fn default_captured_slots() -> u32 {
    8
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            arena_initial_capacity: default_arena_initial_capacity(),
            arena_max_capacity: default_arena_max_capacity(),
            default_thread_group: default_thread_group(),
            depth_epsilon_step: default_depth_epsilon_step(),
            dynamic_buffer_slack: default_dynamic_buffer_slack(),
            captured_slots: default_captured_slots(),
            log_filter: None,
        }
    }
}

impl PipelineConfig {
    /// Checks cross-field invariants. `path` is only used for error context.
    pub fn validate(&self, path: &Path) -> Result<(), EngineError> {
        let invalid = |msg: String| EngineError::InvalidConfig {
            path: path.to_path_buf(),
            msg,
        };

        if self.arena_initial_capacity == 0 {
            return Err(invalid("arena_initial_capacity must be > 0".to_string()));
        }
        if self.arena_max_capacity < self.arena_initial_capacity {
            return Err(invalid(format!(
                "arena_max_capacity ({}) is below arena_initial_capacity ({})",
                self.arena_max_capacity, self.arena_initial_capacity
            )));
        }
        if self.default_thread_group.iter().any(|&t| t == 0) {
            return Err(invalid(format!(
                "default_thread_group must be non-zero, got {:?}",
                self.default_thread_group
            )));
        }
        if !(1..=16).contains(&self.captured_slots) {
            return Err(invalid(format!(
                "captured_slots must be in 1..=16, got {}",
                self.captured_slots
            )));
        }
        if !self.depth_epsilon_step.is_finite() || self.depth_epsilon_step < 0.0 {
            return Err(invalid(format!(
                "depth_epsilon_step must be a finite non-negative number, got {}",
                self.depth_epsilon_step
            )));
        }
        Ok(())
    }
}

/// Reads and deserializes any JSON document, mapping failures to path-tagged errors.
pub fn load_typed_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, EngineError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| EngineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads and validates a [`PipelineConfig`].
pub fn load_pipeline_config(path: impl AsRef<Path>) -> Result<PipelineConfig, EngineError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let cfg: PipelineConfig = load_typed_json(&path)?;
    cfg.validate(&path)?;
    tracing::debug!(path = %path.display(), "pipeline config loaded");
    Ok(cfg)
}

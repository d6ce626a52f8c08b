use std::path::PathBuf;

use crate::params::{ParamId, ParamValue};

/// Notifications a [`Session`](crate::session::Session) queues for its host.
///
/// The host drains them once per tick (window title, status output).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Controls file loaded (or built-in defaults when `path` is `None`).
    ConfigLoaded { path: Option<PathBuf>, mappings: usize },

    /// Controls file failed to load or validate; defaults are in use.
    ConfigError { path: PathBuf, error: String },

    ShaderLoaded { name: String, index: usize, count: usize },

    /// Compile or template failure. The previous program stays active.
    ShaderFailed { name: String, error: String },

    ParamChanged { id: ParamId, value: ParamValue },

    CameraActivated { device: String },

    CameraDeactivated,

    CameraFailed { device: String, error: String },
}

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum EngineError {
    /// No `assets/` directory at the given place or above it.
    AssetsNotFound { start_dir: PathBuf },
    Io { path: PathBuf, source: std::io::Error },
    Json { path: PathBuf, source: serde_json::Error },
    /// Parsed, but rejected by validation (strict mode).
    InvalidConfig { path: PathBuf, msg: String },

    /// A parameter name outside the closed vocabulary.
    UnknownParameter { name: String },
    /// A value the parameter cannot hold (wrong kind, integer out of range).
    InvalidValue { param: &'static str, msg: String },

    /// The shading program text does not satisfy the wrapper contract.
    InvalidProgram { program: String, msg: String },
    /// The backend rejected the composed program (compile or link log).
    Compile { program: String, log: String },

    /// Audio capture device or file could not be acquired.
    AudioAcquire { source_label: String, msg: String },
    /// Video capture device could not be acquired.
    VideoAcquire { device: String, msg: String },

    /// Render backend failure outside compilation (texture upload, draw).
    Backend { msg: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::AssetsNotFound { start_dir } => {
                write!(f, "no assets/ directory at or above {}", start_dir.display())
            }
            EngineError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            EngineError::Json { path, source } => write!(f, "{}: bad JSON: {source}", path.display()),
            EngineError::InvalidConfig { path, msg } => write!(f, "{}: {msg}", path.display()),
            EngineError::UnknownParameter { name } => {
                write!(f, "Unknown parameter '{name}'")
            }
            EngineError::InvalidValue { param, msg } => {
                write!(f, "Invalid value for '{param}': {msg}")
            }
            EngineError::InvalidProgram { program, msg } => {
                write!(f, "Shading program '{program}' rejected: {msg}")
            }
            EngineError::Compile { program, log } => {
                write!(f, "Shading program '{program}' failed to compile:\n{log}")
            }
            EngineError::AudioAcquire { source_label, msg } => {
                write!(f, "Audio source '{source_label}' unavailable: {msg}")
            }
            EngineError::VideoAcquire { device, msg } => {
                write!(f, "Video device '{device}' unavailable: {msg}")
            }
            EngineError::Backend { msg } => write!(f, "Render backend error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io { source, .. } => Some(source),
            EngineError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

use std::path::{Path, PathBuf};

use crate::catalog::ShadingProgram;
use crate::error::EngineError;
use crate::logw;

/// Extensions recognized as shading programs.
pub const SHADER_EXTENSIONS: [&str; 4] = ["glsl", "glsln", "gsls", "frag"];

/// Directory holding `controls.json` and `shaders/`.
#[derive(Debug, Clone)]
pub struct AssetsRoot {
    path: PathBuf,
}

pub const ASSETS_ENV: &str = "SHADERMIDI_ASSETS";

impl AssetsRoot {
    /// `SHADERMIDI_ASSETS` when it names a directory, else the nearest
    /// `assets/` at or above `start_dir`.
    pub fn discover(start_dir: &Path) -> Result<Self, EngineError> {
        if let Some(dir) = std::env::var_os(ASSETS_ENV).map(PathBuf::from) {
            if dir.is_dir() {
                return Ok(Self { path: dir });
            }
            logw!("CONFIG", "{ASSETS_ENV}={} is not a directory, ignoring it", dir.display());
        }

        start_dir
            .ancestors()
            .map(|a| a.join("assets"))
            .find(|cand| cand.is_dir())
            .map(|path| Self { path })
            .ok_or_else(|| EngineError::AssetsNotFound {
                start_dir: start_dir.to_path_buf(),
            })
    }

    /// Explicit directory from the command line.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(EngineError::AssetsNotFound { start_dir: path });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }

    pub fn pick_platform_json(&self, stem: &str) -> PathBuf {
        pick_platform_json(&self.path, stem)
    }

    pub fn shaders_dir(&self) -> PathBuf {
        self.path.join("shaders")
    }
}

/// `<stem>.<os>.json` (e.g. `controls.macos.json`) when it exists, else `<stem>.json`.
pub fn pick_platform_json(dir: &Path, stem: &str) -> PathBuf {
    let per_os = dir.join(format!("{stem}.{}.json", std::env::consts::OS));
    if per_os.is_file() {
        per_os
    } else {
        dir.join(format!("{stem}.json"))
    }
}

pub fn read_to_string_result(path: &Path) -> Result<String, EngineError> {
    std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_shader_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SHADER_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Load every shading program in `dir`, sorted by file name.
///
/// Unreadable files are skipped with a warning. A missing directory is an error;
/// an existing but empty one yields an empty list.
pub fn discover_shaders(dir: &Path) -> Result<Vec<ShadingProgram>, EngineError> {
    let rd = std::fs::read_dir(dir).map_err(|source| EngineError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = rd
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_shader_file(p))
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut out = Vec::with_capacity(paths.len());
    for p in paths {
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| p.display().to_string());
        match read_to_string_result(&p) {
            Ok(src) => out.push(ShadingProgram::new(name, src)),
            Err(e) => logw!("SHADER", "skipping {name}: {e}"),
        }
    }
    Ok(out)
}

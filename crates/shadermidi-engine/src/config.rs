use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::assets::{read_to_string_result, AssetsRoot};
use crate::audio::AnalyserSettings;
use crate::automix::{DEFAULT_BAND, DEFAULT_THRESHOLD};
use crate::control::{default_entries, default_transfer, normalize_midi_channel, ControlMappingEntry, ControlTarget, Transfer};
use crate::error::EngineError;
use crate::params::ParamKind;
use crate::validate::{emit_issues, emit_summary, validate_controls, IssueLevel};
use crate::{logi, logw};

/// How strictly to interpret/validate config files.
///
/// - `Lenient` is forward-compatible: unknown fields are ignored, invalid
///   entries are dropped with a warning and the rest of the file is used.
/// - `Strict` is fail-fast: unknown fields and any validation error become errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigMode {
    #[default]
    Lenient,
    Strict,
}

/// Typed view of `assets/controls(.<os>).json`.
///
/// Versioning: `version` defaults to 1 when omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlsJson {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub midi: MidiJson,

    /// Omitted means the built-in reference layout.
    #[serde(default)]
    pub controls: Option<Vec<ControlJson>>,

    #[serde(default)]
    pub automix: AutomixJson,

    #[serde(default)]
    pub audio: AudioJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MidiJson {
    #[serde(default)]
    pub preferred_device_contains: Option<String>,
    /// 1-based; omitted listens on every channel.
    #[serde(default)]
    pub channel: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlJson {
    pub cc: u8,
    pub target: String,
    #[serde(default)]
    pub transfer: Option<TransferJson>,
    /// 1-based per-entry channel.
    #[serde(default)]
    pub channel: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransferJson {
    Scale { lo: f32, hi: f32 },
    Threshold,
    Quantize { lo: i32, hi: i32 },
}

impl From<TransferJson> for Transfer {
    fn from(t: TransferJson) -> Self {
        match t {
            TransferJson::Scale { lo, hi } => Transfer::Scale { lo, hi },
            TransferJson::Threshold => Transfer::Threshold,
            TransferJson::Quantize { lo, hi } => Transfer::Quantize { lo, hi },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomixJson {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_band")]
    pub band: f32,
    #[serde(default)]
    pub camera_preference: Option<String>,
}

impl Default for AutomixJson {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            band: DEFAULT_BAND,
            camera_preference: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioJson {
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
}

impl Default for AudioJson {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
            min_db: default_min_db(),
            max_db: default_max_db(),
        }
    }
}

/// Strict top-level shape: same fields, unknown keys rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct ControlsJsonStrict {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    midi: Option<serde_json::Value>,
    #[serde(default)]
    controls: Option<serde_json::Value>,
    #[serde(default)]
    automix: Option<serde_json::Value>,
    #[serde(default)]
    audio: Option<serde_json::Value>,
}

fn default_version() -> u32 {
    1
}
fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}
fn default_band() -> f32 {
    DEFAULT_BAND
}
fn default_smoothing() -> f32 {
    0.8
}
fn default_min_db() -> f32 {
    -100.0
}
fn default_max_db() -> f32 {
    -30.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomixSettings {
    pub threshold: f32,
    pub band: f32,
    pub camera_preference: Option<String>,
}

impl Default for AutomixSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            band: DEFAULT_BAND,
            camera_preference: None,
        }
    }
}

/// Resolved controls configuration, ready to hand to the engine.
#[derive(Debug, Clone)]
pub struct ControlsConfig {
    /// `None` when built-in defaults are in use.
    pub path: Option<PathBuf>,
    pub preferred_device_contains: Option<String>,
    /// 0-based channel filter.
    pub channel: Option<u8>,
    pub entries: Vec<ControlMappingEntry>,
    pub automix: AutomixSettings,
    pub audio: AnalyserSettings,
    /// Set when a lenient load fell back to defaults: the file and why.
    pub load_error: Option<(PathBuf, String)>,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            path: None,
            preferred_device_contains: None,
            channel: None,
            entries: default_entries(),
            automix: AutomixSettings::default(),
            audio: AnalyserSettings::default(),
            load_error: None,
        }
    }
}

/// Convert one config entry, or explain why it cannot be used.
pub fn resolve_entry(c: &ControlJson) -> Result<ControlMappingEntry, String> {
    if c.cc > 127 {
        return Err(format!("cc {} outside 0..=127", c.cc));
    }
    let target = ControlTarget::from_name(&c.target).map_err(|e| e.to_string())?;
    let transfer = match (target, c.transfer) {
        (_, Some(t)) => Transfer::from(t),
        (ControlTarget::Param(id), None) => default_transfer(id),
        (ControlTarget::PreviousShader | ControlTarget::NextShader, None) => Transfer::Threshold,
    };

    if let ControlTarget::Param(id) = target {
        match (id.kind(), transfer) {
            (ParamKind::Integer { .. }, Transfer::Scale { .. }) => {
                return Err(format!("'{}' is an integer parameter; use a quantize transfer", id.name()));
            }
            (ParamKind::Integer { min, max }, Transfer::Quantize { lo, hi }) if lo < min || hi > max => {
                return Err(format!("quantize {lo}..={hi} exceeds '{}' range {min}..={max}", id.name()));
            }
            _ => {}
        }
    }
    if let Transfer::Quantize { lo, hi } = transfer {
        if lo > hi {
            return Err(format!("quantize lo {lo} > hi {hi}"));
        }
    }

    let channel = match c.channel {
        None => None,
        Some(ch @ 1..=16) => Some(normalize_midi_channel(ch)),
        Some(ch) => return Err(format!("channel {ch} outside 1..=16")),
    };

    Ok(ControlMappingEntry {
        target,
        cc: c.cc,
        channel,
        transfer,
    })
}

/// Turn a parsed file into a resolved config. Invalid parts fall back to
/// defaults; `Strict` refuses instead.
pub fn resolve_controls(path: &Path, json: &ControlsJson, mode: ConfigMode) -> Result<ControlsConfig, EngineError> {
    let issues = validate_controls(json);
    emit_issues("CONFIG", &issues);
    emit_summary("CONFIG", "controls", &issues);

    let errors = issues.iter().filter(|i| i.level == IssueLevel::Error).count();
    if mode == ConfigMode::Strict && errors > 0 {
        return Err(EngineError::InvalidConfig {
            path: path.to_path_buf(),
            msg: format!("{errors} validation error(s); see log"),
        });
    }

    let entries = match &json.controls {
        None => default_entries(),
        Some(list) => list
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match resolve_entry(c) {
                Ok(e) => Some(e),
                Err(msg) => {
                    logw!("CONFIG", "controls[{i}] dropped: {msg}");
                    None
                }
            })
            .collect(),
    };

    let midi_channel = match json.midi.channel {
        None => None,
        Some(ch @ 1..=16) => Some(normalize_midi_channel(ch)),
        Some(ch) => {
            logw!("CONFIG", "midi.channel {ch} ignored (expected 1..=16)");
            None
        }
    };

    let automix = if json.automix.band > 0.0 && json.automix.band.is_finite() {
        AutomixSettings {
            threshold: json.automix.threshold,
            band: json.automix.band,
            camera_preference: json.automix.camera_preference.clone(),
        }
    } else {
        AutomixSettings {
            camera_preference: json.automix.camera_preference.clone(),
            ..AutomixSettings::default()
        }
    };

    let audio = if json.audio.min_db < json.audio.max_db {
        AnalyserSettings {
            smoothing: json.audio.smoothing.clamp(0.0, 1.0),
            min_db: json.audio.min_db,
            max_db: json.audio.max_db,
        }
    } else {
        AnalyserSettings {
            smoothing: json.audio.smoothing.clamp(0.0, 1.0),
            ..AnalyserSettings::default()
        }
    };

    Ok(ControlsConfig {
        path: Some(path.to_path_buf()),
        preferred_device_contains: json.midi.preferred_device_contains.clone(),
        channel: midi_channel,
        entries,
        automix,
        audio,
        load_error: None,
    })
}

pub fn parse_controls(path: &Path, src: &str, mode: ConfigMode) -> Result<ControlsJson, EngineError> {
    let json_err = |e: serde_json::Error| EngineError::Json {
        path: path.to_path_buf(),
        source: e,
    };
    if mode == ConfigMode::Strict {
        serde_json::from_str::<ControlsJsonStrict>(src).map_err(json_err)?;
    }
    serde_json::from_str(src).map_err(json_err)
}

/// Load `controls(.<os>).json` from the assets root.
///
/// Missing file: built-in defaults. Parse error: logged, defaults (lenient) or
/// returned (strict).
pub fn load_controls(assets: &AssetsRoot, mode: ConfigMode) -> Result<ControlsConfig, EngineError> {
    let path = assets.pick_platform_json("controls");
    if !path.exists() {
        logi!("CONFIG", "{} not found; using built-in control layout", path.display());
        return Ok(ControlsConfig::default());
    }

    let parsed = read_to_string_result(&path).and_then(|src| parse_controls(&path, &src, mode));
    match parsed {
        Ok(json) => {
            let cfg = resolve_controls(&path, &json, mode)?;
            logi!("CONFIG", "loaded {} (version {}, {} mappings)", path.display(), json.version, cfg.entries.len());
            Ok(cfg)
        }
        Err(e) if mode == ConfigMode::Lenient => {
            logw!("CONFIG", "{e}; using built-in control layout");
            Ok(ControlsConfig {
                load_error: Some((path, e.to_string())),
                ..ControlsConfig::default()
            })
        }
        Err(e) => Err(e),
    }
}

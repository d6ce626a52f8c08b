//! controls.json checks.
//!
//! Each issue carries a pointer-like location, what is wrong and, where it
//! helps, what to do about it. Lenient loading logs them and drops only the
//! entries that cannot be used.

use std::collections::HashMap;
use std::fmt;

use crate::config::{resolve_entry, ControlsJson, TransferJson};
use crate::control::{ControlTarget, ANY_CHANNEL};
use crate::params::ParamKind;
use crate::{loge, logi, logw};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub path: String,
    pub message: String,
    pub hint: Option<String>,
}

impl ValidationIssue {
    fn new(level: IssueLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
            hint: None,
        }
    }

    pub fn warn(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueLevel::Warn, path, message)
    }

    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueLevel::Error, path, message)
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(h) = &self.hint {
            write!(f, " (hint: {h})")?;
        }
        Ok(())
    }
}

pub fn emit_issues(tag: &str, issues: &[ValidationIssue]) {
    for issue in issues {
        match issue.level {
            IssueLevel::Warn => logw!(tag, "{issue}"),
            IssueLevel::Error => loge!(tag, "{issue}"),
        }
    }
}

/// One line, also when everything is fine.
pub fn emit_summary(tag: &str, label: &str, issues: &[ValidationIssue]) {
    let errors = issues.iter().filter(|i| i.level == IssueLevel::Error).count();
    let warnings = issues.len() - errors;
    if issues.is_empty() {
        logi!(tag, "{label}: no issues");
    } else {
        logw!(tag, "{label}: {errors} error(s), {warnings} warning(s)");
    }
}

/// Everything that parses but is likely wrong: unresolvable entries,
/// duplicate bindings, transfers that fight the parameter kind, and out of
/// range automix / audio settings.
pub fn validate_controls(cfg: &ControlsJson) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if cfg.version != 1 {
        issues.push(ValidationIssue::warn(
            "controls.json:/version",
            format!("unknown version {} (expected 1)", cfg.version),
        ));
    }

    if let Some(ch) = cfg.midi.channel.filter(|ch| !(1..=16).contains(ch)) {
        issues.push(
            ValidationIssue::warn("controls.json:/midi/channel", format!("channel {ch} outside 1..=16, listening on all"))
                .hint("MIDI channels are 1-based here, like on the hardware"),
        );
    }

    let mut bound: HashMap<(u8, u8), usize> = HashMap::new();
    for (i, c) in cfg.controls.iter().flatten().enumerate() {
        let at = format!("controls.json:/controls/{i}");

        let entry = match resolve_entry(c) {
            Ok(e) => e,
            Err(msg) => {
                issues.push(ValidationIssue::error(at, msg).hint("fix or remove this entry; it is skipped at runtime"));
                continue;
            }
        };

        if let Some(first) = bound.insert((entry.channel.unwrap_or(ANY_CHANNEL), entry.cc), i) {
            issues.push(
                ValidationIssue::warn(format!("{at}/cc"), format!("cc {} already bound by controls/{first}", entry.cc))
                    .hint("the later entry wins; remove one of them"),
            );
        }

        let transfer_at = format!("{at}/transfer");
        match (c.transfer, entry.target) {
            (Some(TransferJson::Scale { lo, hi }), _) if lo > hi => {
                issues.push(ValidationIssue::warn(transfer_at, format!("scale {lo}..{hi} is inverted")));
            }
            (Some(TransferJson::Threshold), ControlTarget::Param(id))
                if matches!(id.kind(), ParamKind::Continuous { .. }) =>
            {
                issues.push(ValidationIssue::warn(
                    transfer_at,
                    format!("threshold on continuous '{}' only reaches its min and max", id.name()),
                ));
            }
            (Some(TransferJson::Quantize { .. }), ControlTarget::Param(id))
                if !matches!(id.kind(), ParamKind::Integer { .. }) =>
            {
                issues.push(
                    ValidationIssue::warn(transfer_at, format!("quantize on non-integer '{}'", id.name()))
                        .hint("use scale for continuous parameters and threshold for toggles"),
                );
            }
            _ => {}
        }
    }

    let mix = &cfg.automix;
    if !(mix.band.is_finite() && mix.band > 0.0) {
        issues.push(
            ValidationIssue::error("controls.json:/automix/band", format!("band must be > 0 (got {})", mix.band))
                .hint("the default 0.05 is used instead"),
        );
    }
    if !(0.0..=1.0).contains(&mix.threshold) {
        issues.push(ValidationIssue::warn(
            "controls.json:/automix/threshold",
            format!("threshold {} is outside audioToHue's 0..1 range, auto-mix never triggers", mix.threshold),
        ));
    }

    let audio = &cfg.audio;
    if audio.min_db >= audio.max_db {
        issues.push(
            ValidationIssue::error(
                "controls.json:/audio",
                format!("min_db {} must be below max_db {}", audio.min_db, audio.max_db),
            )
            .hint("defaults -100 / -30 are used instead"),
        );
    }
    if !(0.0..=1.0).contains(&audio.smoothing) {
        issues.push(ValidationIssue::warn(
            "controls.json:/audio/smoothing",
            format!("smoothing {} clamped into 0..1", audio.smoothing),
        ));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues_for(src: &str) -> Vec<ValidationIssue> {
        let cfg: ControlsJson = serde_json::from_str(src).unwrap();
        validate_controls(&cfg)
    }

    #[test]
    fn clean_file_has_no_issues() {
        assert!(issues_for(r#"{ "controls": [ { "cc": 1, "target": "hue" } ] }"#).is_empty());
    }

    #[test]
    fn duplicate_binding_warns() {
        let issues = issues_for(
            r#"{ "controls": [ { "cc": 1, "target": "hue" }, { "cc": 1, "target": "zoom" } ] }"#,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].level, IssueLevel::Warn);
        assert_eq!(issues[0].path, "controls.json:/controls/1/cc");
    }

    #[test]
    fn same_cc_on_different_channels_is_fine() {
        let issues = issues_for(
            r#"{ "controls": [ { "cc": 1, "target": "hue", "channel": 1 }, { "cc": 1, "target": "zoom", "channel": 2 } ] }"#,
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn unknown_target_is_an_error() {
        let issues = issues_for(r#"{ "controls": [ { "cc": 1, "target": "sparkle" } ] }"#);
        assert_eq!(issues[0].level, IssueLevel::Error);
    }

    #[test]
    fn threshold_on_continuous_warns() {
        let issues = issues_for(r#"{ "controls": [ { "cc": 1, "target": "zoom", "transfer": { "kind": "threshold" } } ] }"#);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].level, IssueLevel::Warn);
    }

    #[test]
    fn inverted_scale_warns() {
        let issues = issues_for(
            r#"{ "controls": [ { "cc": 5, "target": "brightness", "transfer": { "kind": "scale", "lo": 2, "hi": 0 } } ] }"#,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "controls.json:/controls/0/transfer");
    }

    #[test]
    fn quantize_on_toggle_warns_with_hint() {
        let issues = issues_for(
            r#"{ "controls": [ { "cc": 48, "target": "mirror", "transfer": { "kind": "quantize", "lo": 0, "hi": 1 } } ] }"#,
        );
        assert_eq!(issues.len(), 1);
        assert!(issues[0].to_string().contains("(hint: "));
    }

    #[test]
    fn automix_and_audio_ranges_checked() {
        let issues = issues_for(r#"{ "automix": { "band": -1 }, "audio": { "min_db": 0, "max_db": -10 } }"#);
        assert_eq!(issues.iter().filter(|i| i.level == IssueLevel::Error).count(), 2);
    }
}

//! Configuration validation engine.
//!
//! Detects unknown/misspelled fields in a config file and checks the parsed
//! values for settings the dispatcher cannot run with.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    loader::load_config_value,
    schema::{ALL_GROUP, ParleyConfig},
};

/// Tick intervals above this make dispatch latency noticeable.
const MAX_REASONABLE_TICK_MS: u64 = 5_000;
const MAX_REASONABLE_SEND_RETRIES: u32 = 10;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value"
    pub category: &'static str,
    /// Dotted path, e.g. "dispatch.pool_workers"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn value(severity: Severity, path: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: "value",
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Semantic checks ─────────────────────────────────────────────────────────

/// Check parsed values the dispatcher depends on.
#[must_use]
pub fn validate(config: &ParleyConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let dispatch = &config.dispatch;

    if dispatch.concurrency_in_session == 0 {
        diagnostics.push(Diagnostic::value(
            Severity::Error,
            "dispatch.concurrency_in_session",
            "must be at least 1, otherwise no event is ever handled",
        ));
    }
    if dispatch.pool_workers == 0 {
        diagnostics.push(Diagnostic::value(
            Severity::Error,
            "dispatch.pool_workers",
            "must be at least 1",
        ));
    }
    if dispatch.tick_interval_ms == 0 {
        diagnostics.push(Diagnostic::value(
            Severity::Error,
            "dispatch.tick_interval_ms",
            "must be greater than 0",
        ));
    } else if dispatch.tick_interval_ms > MAX_REASONABLE_TICK_MS {
        diagnostics.push(Diagnostic::value(
            Severity::Warning,
            "dispatch.tick_interval_ms",
            format!(
                "{} ms delays every event by up to that long",
                dispatch.tick_interval_ms
            ),
        ));
    }
    if dispatch.send_max_retries > MAX_REASONABLE_SEND_RETRIES {
        diagnostics.push(Diagnostic::value(
            Severity::Warning,
            "dispatch.send_max_retries",
            format!(
                "{} retries with doubling backoff can hold a worker for a very long time",
                dispatch.send_max_retries
            ),
        ));
    }

    if config.session.command_prefix.is_empty() {
        diagnostics.push(Diagnostic::value(
            Severity::Warning,
            "session.command_prefix",
            "empty prefix disables administrative (priority) commands",
        ));
    }
    if config.session.group_name_white_list.is_empty()
        && config.session.group_name_keyword_white_list.is_empty()
    {
        diagnostics.push(Diagnostic::value(
            Severity::Info,
            "session.group_name_white_list",
            format!("no groups admitted; add \"{ALL_GROUP}\" to answer in every group"),
        ));
    }

    for (i, kind) in config.reply.unsupported_kinds.iter().enumerate() {
        if kind.parse::<parley_common::types::ReplyKind>().is_err() {
            diagnostics.push(Diagnostic::value(
                Severity::Error,
                &format!("reply.unsupported_kinds[{i}]"),
                format!("unknown reply kind \"{kind}\""),
            ));
        }
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Validate a config file: syntax, unknown fields, types, then values.
#[must_use]
pub fn validate_file(path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    match load_config_value(path) {
        Ok(value) => check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics),
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: e.to_string(),
            });
            return ValidationResult {
                diagnostics,
                config_path: Some(path.to_path_buf()),
            };
        },
    }

    match crate::loader::load_config(path) {
        Ok(config) => diagnostics.extend(validate(&config).diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: Some(path.to_path_buf()),
    }
}

// ── Unknown-field detection ─────────────────────────────────────────────────

/// Expected shape of the configuration schema.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

/// Mirror of every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    let fields = |names: &[&'static str]| Struct(names.iter().map(|n| (*n, Leaf)).collect());

    Struct(HashMap::from([
        (
            "dispatch",
            fields(&[
                "concurrency_in_session",
                "tick_interval_ms",
                "pool_workers",
                "send_max_retries",
                "send_backoff_ms",
            ]),
        ),
        (
            "session",
            fields(&[
                "single_chat_prefix",
                "group_chat_prefix",
                "group_chat_keyword",
                "group_name_white_list",
                "group_name_keyword_white_list",
                "group_chat_in_one_session",
                "nick_name_black_list",
                "group_at_off",
                "command_prefix",
                "trigger_by_self",
                "image_create_prefix",
                "always_reply_voice",
                "voice_reply_voice",
                "accept_friend_commands",
            ]),
        ),
        (
            "reply",
            fields(&[
                "single_chat_reply_prefix",
                "single_chat_reply_suffix",
                "group_chat_reply_prefix",
                "group_chat_reply_suffix",
                "no_need_at",
                "unsupported_kinds",
            ]),
        ),
        ("metrics", fields(&["enabled"])),
    ]))
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();

    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let message = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
            None => "unknown field".to_string(),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-field",
            path,
            message,
        });
    }
}

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_errors() {
        let result = validate(&ParleyConfig::default());
        assert!(!result.has_errors());
        // The empty group whitelist is reported as info only.
        assert_eq!(result.count(Severity::Info), 1);
    }

    #[test]
    fn zero_capacity_and_workers_are_errors() {
        let mut cfg = ParleyConfig::default();
        cfg.dispatch.concurrency_in_session = 0;
        cfg.dispatch.pool_workers = 0;
        cfg.dispatch.tick_interval_ms = 0;
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 3);
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "dispatch.concurrency_in_session")
        );
    }

    #[test]
    fn slow_tick_is_warning() {
        let mut cfg = ParleyConfig::default();
        cfg.dispatch.tick_interval_ms = 10_000;
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn unknown_reply_kind_is_error() {
        let mut cfg = ParleyConfig::default();
        cfg.reply.unsupported_kinds = vec!["voice".into(), "hologram".into()];
        let result = validate(&cfg);
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.severity == Severity::Error)
            .unwrap();
        assert_eq!(d.path, "reply.unsupported_kinds[1]");
    }

    #[test]
    fn misspelled_field_gets_suggestion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(&path, "[dispatch]\npool_worker = 3\n").unwrap();

        let result = validate_file(&path);
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(d.path, "dispatch.pool_worker");
        assert!(d.message.contains("pool_workers"), "{}", d.message);
    }

    #[test]
    fn syntax_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(&path, "[dispatch\n").unwrap();

        let result = validate_file(&path);
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("reply", "reply"), 0);
        assert_eq!(levenshtein("sesion", "session"), 1);
    }
}

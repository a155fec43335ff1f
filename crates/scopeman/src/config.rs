//
// config.rs
//
// Coordinator configuration and LSP settings parsing
//

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::correlator::OrphanPolicy;
use crate::environment::DEFAULT_DEFINITION_FILES;

/// Directory listings are cut to this many entries before filtering.
pub const MAX_FILES_IN_DIR: usize = 100;

/// Documents longer than this many characters are never sent for hints.
pub const MAX_TEXT_LENGTH: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeConfig {
    pub max_files_in_dir: usize,
    pub max_text_length: usize,
    /// Directory holding the definition JSON files
    pub defs_dir: PathBuf,
    pub definition_files: Vec<String>,
    pub orphan_policy: OrphanPolicy,
    /// Upper bound on waiting for completions; `None` waits forever
    pub request_timeout: Option<Duration>,
    /// Engine program followed by its arguments; `None` runs without an engine
    pub engine_command: Option<Vec<String>>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_files_in_dir: MAX_FILES_IN_DIR,
            max_text_length: MAX_TEXT_LENGTH,
            defs_dir: PathBuf::from("defs"),
            definition_files: DEFAULT_DEFINITION_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            orphan_policy: OrphanPolicy::Silent,
            request_timeout: None,
            engine_command: None,
        }
    }
}

impl ScopeConfig {
    pub fn log_summary(&self) {
        log::info!("Scope coordinator configuration:");
        log::info!("  max_files_in_dir: {}", self.max_files_in_dir);
        log::info!("  max_text_length: {}", self.max_text_length);
        log::info!("  defs_dir: {}", self.defs_dir.display());
        log::info!("  definition_files: {:?}", self.definition_files);
        log::info!("  orphan_policy: {:?}", self.orphan_policy);
        match self.request_timeout {
            Some(timeout) => log::info!("  request_timeout: {:?}", timeout),
            None => log::info!("  request_timeout: none"),
        }
        match &self.engine_command {
            Some(command) => log::info!("  engine: {}", command.join(" ")),
            None => log::info!("  engine: none (requests will not be answered)"),
        }
    }

    /// Whether a change from `self` to `other` needs a new engine process.
    pub fn engine_changed(&self, other: &Self) -> bool {
        self.engine_command != other.engine_command
    }
}

fn parse_orphan_policy(value: &str) -> OrphanPolicy {
    match value {
        "notify" => OrphanPolicy::Notify,
        _ => OrphanPolicy::Silent,
    }
}

/// Overlay the `scopeman` section of LSP settings onto `base`.
///
/// Returns `None` when the section is absent. Keys that are missing or of the
/// wrong type keep their value from `base`.
pub fn parse_scope_config(settings: &Value, base: &ScopeConfig) -> Option<ScopeConfig> {
    let section = settings.get("scopeman")?;
    let mut config = base.clone();

    if let Some(v) = section.get("maxFilesInDir").and_then(|v| v.as_u64()) {
        config.max_files_in_dir = v as usize;
    }
    if let Some(v) = section.get("maxTextLength").and_then(|v| v.as_u64()) {
        config.max_text_length = v as usize;
    }
    if let Some(v) = section.get("defsDir").and_then(|v| v.as_str()) {
        config.defs_dir = PathBuf::from(v);
    }
    if let Some(files) = section.get("definitionFiles").and_then(|v| v.as_array()) {
        config.definition_files = files
            .iter()
            .filter_map(|f| f.as_str().map(str::to_string))
            .collect();
    }
    if let Some(v) = section.get("orphanPolicy").and_then(|v| v.as_str()) {
        config.orphan_policy = parse_orphan_policy(v);
    }
    if let Some(ms) = section.get("requestTimeoutMs").and_then(|v| v.as_u64()) {
        config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }
    if let Some(engine) = section.get("engine") {
        if let Some(program) = engine.get("command").and_then(|v| v.as_str()) {
            let mut command = vec![program.to_string()];
            if let Some(args) = engine.get("args").and_then(|v| v.as_array()) {
                command.extend(args.iter().filter_map(|a| a.as_str().map(str::to_string)));
            }
            config.engine_command = Some(command);
        }
    }

    Some(config)
}

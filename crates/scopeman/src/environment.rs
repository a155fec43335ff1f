//
// environment.rs
//
// Static type definitions merged into every engine initialization
//

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use serde_json::Value;
use tokio::task::JoinHandle;

/// Definition files loaded by default, in declaration order.
pub const DEFAULT_DEFINITION_FILES: &[&str] = &["ecma5.json", "browser.json"];

/// Parsed definition documents, shared between the loader and every init.
///
/// Entries are appended as loads finish; nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    defs: Arc<RwLock<Vec<Arc<Value>>>>,
    load_started: Arc<AtomicBool>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, definition: Value) {
        self.defs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(definition));
    }

    /// The definitions loaded so far.
    pub fn snapshot(&self) -> Vec<Arc<Value>> {
        self.defs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.defs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads definition JSON files from a directory into an [`Environment`].
#[derive(Debug, Clone)]
pub struct EnvironmentLoader {
    defs_dir: PathBuf,
    files: Vec<String>,
}

impl EnvironmentLoader {
    pub fn new(defs_dir: impl Into<PathBuf>, files: Vec<String>) -> Self {
        Self {
            defs_dir: defs_dir.into(),
            files,
        }
    }

    pub fn with_default_files(defs_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            defs_dir,
            DEFAULT_DEFINITION_FILES.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Start loading every definition file into `env`.
    ///
    /// Each file is read and parsed on its own task, so they land in `env` in
    /// completion order. A file that fails to read or parse is logged and
    /// left out. Returns `None` if a load into `env` was already started.
    pub fn load(&self, env: &Environment) -> Option<JoinHandle<()>> {
        if env.load_started.swap(true, Ordering::AcqRel) {
            log::trace!("Environment load already started; ignoring");
            return None;
        }

        let tasks: Vec<JoinHandle<()>> = self
            .files
            .iter()
            .map(|name| {
                let path = self.defs_dir.join(name);
                let env = env.clone();
                tokio::spawn(async move {
                    match read_definition(&path).await {
                        Ok(definition) => {
                            log::info!("Loaded definitions from {}", path.display());
                            env.push(definition);
                        }
                        Err(e) => log::warn!("Failed to read definition file: {:#}", e),
                    }
                })
            })
            .collect();

        let env = env.clone();
        let expected = self.files.len();
        Some(tokio::spawn(async move {
            for task in tasks {
                if let Err(e) = task.await {
                    log::warn!("Definition load task failed: {}", e);
                }
            }
            log::info!(
                "Environment ready: {} of {} definition files loaded",
                env.len(),
                expected
            );
        }))
    }
}

async fn read_definition(path: &Path) -> anyhow::Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

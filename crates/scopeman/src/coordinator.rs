//
// coordinator.rs
//
// Turns editor events into sequenced analysis engine requests
//

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use indexmap::IndexSet;

use crate::channel::AnalysisChannel;
use crate::collaborators::{
    DirEntry, DirectoryLister, EditorDocument, LanguageClassifier, JAVASCRIPT_LANGUAGE_ID,
};
use crate::config::ScopeConfig;
use crate::environment::Environment;
use crate::error::HintError;
use crate::file_state::{FileState, FileStateStore};
use crate::path_key::PathKey;
use crate::perf::TimingGuard;
use crate::protocol::Completions;

/// Holds the completions of the most recent successful hint request.
#[derive(Debug, Default, Clone)]
pub struct HintSession {
    completions: Option<Completions>,
}

impl HintSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_completions(&mut self, completions: Completions) {
        self.completions = Some(completions);
    }

    /// The shared list. Other sessions may hold the same allocation.
    pub fn completions(&self) -> Option<&Completions> {
        self.completions.as_ref()
    }

    /// An owned copy the caller is free to sort or filter.
    pub fn copy_completions(&self) -> Vec<String> {
        self.completions
            .as_deref()
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }
}

/// A file name the engine is given at init: has an extension and is not
/// hidden. One-letter stems such as `a.js` are kept.
fn is_indexable_name(name: &str) -> bool {
    matches!(name.find('.'), Some(idx) if idx > 0)
}

pub struct ScopeCoordinator {
    file_states: Mutex<FileStateStore>,
    channel: Arc<AnalysisChannel>,
    environment: Environment,
    lister: Arc<dyn DirectoryLister>,
    classifier: Arc<dyn LanguageClassifier>,
    config: RwLock<ScopeConfig>,
}

impl ScopeCoordinator {
    pub fn new(
        config: ScopeConfig,
        channel: Arc<AnalysisChannel>,
        environment: Environment,
        lister: Arc<dyn DirectoryLister>,
        classifier: Arc<dyn LanguageClassifier>,
    ) -> Self {
        channel.set_orphan_policy(config.orphan_policy);
        channel.set_max_files_in_dir(config.max_files_in_dir);
        Self {
            file_states: Mutex::new(FileStateStore::new()),
            channel,
            environment,
            lister,
            classifier,
            config: RwLock::new(config),
        }
    }

    fn store(&self) -> MutexGuard<'_, FileStateStore> {
        self.file_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> ScopeConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_config(&self, config: ScopeConfig) {
        self.channel.set_orphan_policy(config.orphan_policy);
        self.channel.set_max_files_in_dir(config.max_files_in_dir);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn channel(&self) -> &Arc<AnalysisChannel> {
        &self.channel
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Whether `path` is a JavaScript file.
    pub fn supports(&self, path: &str) -> bool {
        self.classifier.language_of(path) == Some(JAVASCRIPT_LANGUAGE_ID)
    }

    /// A document became the active editor.
    ///
    /// Marks it dirty and re-initializes the engine with the JavaScript files
    /// of its directory. Returns `false` if the directory could not be listed,
    /// in which case no init is sent.
    pub async fn on_editor_activated(&self, document: &dyn EditorDocument) -> bool {
        let key = PathKey::split(document.path());
        self.store().mark_dirty(&key.dir, &key.file);

        let entries = match self.lister.list(&key.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Failed to list {}: {}", key.dir, e);
                return false;
            }
        };

        let max_files = self.config().max_files_in_dir;
        let files = self.eligible_files(entries, max_files);
        log::trace!(
            "Activated {}; {} eligible files in {}",
            key.file,
            files.len(),
            key.dir
        );

        self.channel.init(
            &key.dir,
            files.into_iter().collect(),
            self.environment.snapshot(),
        );
        true
    }

    /// The listing is cut to `max_files` entries before anything is filtered
    /// out.
    fn eligible_files(&self, entries: Vec<DirEntry>, max_files: usize) -> IndexSet<String> {
        entries
            .into_iter()
            .take(max_files)
            .filter(|entry| entry.is_file)
            .filter(|entry| self.supports(&entry.path))
            .map(|entry| PathKey::split(&entry.path).file)
            .filter(|name| is_indexable_name(name))
            .collect()
    }

    /// The document's text changed.
    pub fn on_document_edited(&self, document: &dyn EditorDocument) {
        let key = PathKey::split(document.path());
        self.store().mark_dirty(&key.dir, &key.file);
    }

    /// Ask the engine for completions at `offset` and store them on `session`.
    ///
    /// Waits until the engine answers, or for `request_timeout` when one is
    /// configured. A request overwritten by a newer one for the same file
    /// never completes under `OrphanPolicy::Silent`.
    pub async fn request_hints(
        &self,
        session: &mut HintSession,
        document: &dyn EditorDocument,
        offset: usize,
    ) -> Result<(), HintError> {
        let _timing = TimingGuard::with_threshold("request_hints", 500);
        let (max_text_length, timeout) = {
            let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
            (config.max_text_length, config.request_timeout)
        };

        let text = document.text();
        let len = text.chars().count();
        if len > max_text_length {
            log::debug!(
                "Not requesting hints for {}: {} characters",
                document.path(),
                len
            );
            return Err(HintError::DocumentTooLarge {
                len,
                max: max_text_length,
            });
        }

        let key = PathKey::split(document.path());
        self.store().set_active(&key.dir, &key.file, true);

        let handle = self
            .channel
            .request_completions(&key.dir, &key.file, offset, text);
        let id = handle.id();

        let result = match timeout {
            Some(after) => match tokio::time::timeout(after, handle).await {
                Ok(resolution) => resolution,
                Err(_) => {
                    self.channel.abandon(&key.file, id);
                    Err(HintError::TimedOut {
                        file: key.file.clone(),
                        after,
                    })
                }
            },
            None => handle.await,
        };

        // A newer request for the same file may still be outstanding.
        let still_pending = self.channel.is_pending(&key.file);
        if let Some(state) = self.store().existing_mut(&key.dir, &key.file) {
            state.active = still_pending;
        }

        session.set_completions(result?);
        Ok(())
    }

    pub fn is_scope_dirty(&self, document: &dyn EditorDocument) -> bool {
        let key = PathKey::split(document.path());
        self.store().is_scope_dirty(&key.dir, &key.file)
    }

    /// Forget all file state. Callers parked behind overwritten requests are
    /// released with `HintError::EngineGone`.
    pub fn on_project_closing(&self) {
        let tracked = {
            let mut store = self.store();
            let tracked = store.len();
            store.reset();
            tracked
        };
        let released = self.channel.release_orphans();
        log::info!(
            "Project closing: dropped state for {} files, released {} orphaned requests",
            tracked,
            released
        );
    }

    /// Carry the state of `old_path` over to `new_path`. Returns `false` when
    /// `old_path` was never seen.
    pub fn on_file_renamed(&self, old_path: &str, new_path: &str) -> bool {
        let old = PathKey::split(old_path);
        let new = PathKey::split(new_path);
        let moved = self
            .store()
            .relocate(&old.dir, &old.file, &new.dir, &new.file);
        if moved {
            log::trace!("Moved file state {} -> {}", old_path, new_path);
        }
        moved
    }

    /// Copy of the state for `(dir, file)`, created with defaults if unseen.
    pub fn file_state(&self, dir: &str, file: &str) -> FileState {
        *self.store().get(dir, file)
    }

    pub fn tracked_files(&self) -> usize {
        self.store().len()
    }
}

//
// file_state.rs
//
// Per-file freshness tracking, keyed by directory then file name
//

use std::collections::HashMap;

/// Freshness flags for one file as seen by the analysis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    /// The file text changed since the engine last indexed it
    pub dirty_file: bool,
    /// The engine's outer scope is stale relative to the last completion request
    pub dirty_scope: bool,
    /// A completion request for this file is outstanding
    pub active: bool,
}

impl Default for FileState {
    /// Unknown files are treated as stale on both counts.
    fn default() -> Self {
        Self {
            dirty_file: true,
            dirty_scope: true,
            active: false,
        }
    }
}

/// Directory -> file name -> [`FileState`].
///
/// Every accessor that takes a key creates the entry on first use, so a key
/// that was never seen reads back as `FileState::default()`. Only
/// [`contains`](Self::contains), [`existing_mut`](Self::existing_mut) and the
/// counters look without creating.
#[derive(Debug, Default)]
pub struct FileStateStore {
    dirs: HashMap<String, HashMap<String, FileState>>,
}

impl FileStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `(dir, file)`, created with defaults if absent.
    pub fn get(&mut self, dir: &str, file: &str) -> &mut FileState {
        self.get_dir(dir).entry(file.to_string()).or_default()
    }

    /// Live view of every known file in `dir`. Mutations through the
    /// returned map are mutations of the store.
    pub fn get_dir(&mut self, dir: &str) -> &mut HashMap<String, FileState> {
        self.dirs.entry(dir.to_string()).or_default()
    }

    pub fn existing_mut(&mut self, dir: &str, file: &str) -> Option<&mut FileState> {
        self.dirs.get_mut(dir)?.get_mut(file)
    }

    pub fn contains(&self, dir: &str, file: &str) -> bool {
        self.dirs
            .get(dir)
            .map(|files| files.contains_key(file))
            .unwrap_or(false)
    }

    pub fn mark_dirty(&mut self, dir: &str, file: &str) {
        self.get(dir, file).dirty_file = true;
    }

    /// Reads `dirty_scope`. Creates the entry as a side effect.
    pub fn is_scope_dirty(&mut self, dir: &str, file: &str) -> bool {
        self.get(dir, file).dirty_scope
    }

    pub fn set_active(&mut self, dir: &str, file: &str, active: bool) {
        self.get(dir, file).active = active;
    }

    /// Drop every directory and file.
    pub fn reset(&mut self) {
        self.dirs.clear();
    }

    /// Move the state at `(old_dir, old_file)` to `(new_dir, new_file)`.
    ///
    /// Returns `false` and changes nothing when the source was never observed.
    pub fn relocate(
        &mut self,
        old_dir: &str,
        old_file: &str,
        new_dir: &str,
        new_file: &str,
    ) -> bool {
        let Some(state) = self
            .dirs
            .get_mut(old_dir)
            .and_then(|files| files.remove(old_file))
        else {
            return false;
        };
        self.get_dir(new_dir).insert(new_file.to_string(), state);
        true
    }

    /// Number of tracked files across all directories
    pub fn len(&self) -> usize {
        self.dirs.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }
}

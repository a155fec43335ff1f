//
// file_cache.rs
//
// Bounded cache of closed-file contents served to the analysis engine
//

use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::RwLock;
use std::time::SystemTime;

use lru::LruCache;

const FILE_CACHE_MAX_ENTRIES: usize = 256;

/// Modification time and size of a file on disk, used to decide whether a
/// cached copy is still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileSnapshot {
    pub mtime: SystemTime,
    pub size: u64,
}

impl FileSnapshot {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: metadata.len(),
        }
    }

    pub fn matches_disk(&self, current: &FileSnapshot) -> bool {
        self.mtime == current.mtime && self.size == current.size
    }
}

#[derive(Debug, Clone)]
struct CachedFile {
    snapshot: FileSnapshot,
    content: String,
}

/// Disk contents keyed by path.
///
/// Reads use `peek()` so they work under the read lock without LRU
/// promotion; inserts promote and evict under the write lock.
pub struct FileCache {
    inner: RwLock<LruCache<String, CachedFile>>,
}

impl fmt::Debug for FileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCache").finish_non_exhaustive()
    }
}

impl FileCache {
    pub fn new() -> Self {
        Self::with_max_entries(FILE_CACHE_MAX_ENTRIES)
    }

    pub fn with_max_entries(cap: usize) -> Self {
        let cap = NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(LruCache::new(cap)),
        }
    }

    /// Cached content for `path` if it was taken from the same `current`
    /// disk state.
    pub fn get_if_fresh(&self, path: &str, current: &FileSnapshot) -> Option<String> {
        let guard = self.inner.read().ok()?;
        guard
            .peek(path)
            .filter(|cached| cached.snapshot.matches_disk(current))
            .map(|cached| cached.content.clone())
    }

    pub fn insert(&self, path: String, snapshot: FileSnapshot, content: String) {
        if let Ok(mut guard) = self.inner.write() {
            guard.push(path, CachedFile { snapshot, content });
        }
    }

    pub fn invalidate(&self, path: &str) {
        if let Ok(mut guard) = self.inner.write() {
            guard.pop(path);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content of `path`, from the cache when the file is unchanged on disk,
    /// otherwise read and cached. `None` if the file cannot be read as UTF-8.
    pub async fn read(&self, path: &str) -> Option<String> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                log::trace!("Cannot stat {}: {}", path, e);
                return None;
            }
        };
        let snapshot = FileSnapshot::from_metadata(&metadata);
        if let Some(content) = self.get_if_fresh(path, &snapshot) {
            return Some(content);
        }

        let content = match tokio::fs::read_to_string(Path::new(path)).await {
            Ok(content) => content,
            Err(e) => {
                log::trace!("Cannot read {}: {}", path, e);
                return None;
            }
        };
        self.insert(path.to_string(), snapshot, content.clone());
        Some(content)
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

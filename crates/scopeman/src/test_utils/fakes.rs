//! In-memory stand-ins for the coordinator's collaborators.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::collaborators::{DirEntry, DirectoryLister, DocumentProvider};

/// Document texts keyed by absolute path. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocuments {
    texts: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(path.to_string(), text.to_string());
    }
}

#[async_trait]
impl DocumentProvider for MemoryDocuments {
    async fn get_text(&self, path: &str) -> Option<String> {
        self.texts.lock().unwrap().get(path).cloned()
    }
}

/// Canned directory listings. Directories without a listing fail with
/// `NotFound`. Every call is recorded. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct StaticLister {
    listings: Arc<Mutex<HashMap<String, Result<Vec<DirEntry>, io::ErrorKind>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StaticLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listing(&self, dir: &str, entries: Vec<DirEntry>) {
        self.listings
            .lock()
            .unwrap()
            .insert(dir.to_string(), Ok(entries));
    }

    pub fn set_error(&self, dir: &str, kind: io::ErrorKind) {
        self.listings
            .lock()
            .unwrap()
            .insert(dir.to_string(), Err(kind));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryLister for StaticLister {
    async fn list(&self, dir: &str) -> io::Result<Vec<DirEntry>> {
        self.calls.lock().unwrap().push(dir.to_string());
        match self.listings.lock().unwrap().get(dir) {
            Some(Ok(entries)) => Ok(entries.clone()),
            Some(Err(kind)) => Err(io::Error::new(*kind, format!("cannot list {dir}"))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, dir.to_string())),
        }
    }
}

/// `count` JavaScript files named `f000.js`, `f001.js`, ... under `dir`.
pub fn js_listing(dir: &str, count: usize) -> Vec<DirEntry> {
    (0..count)
        .map(|i| DirEntry::file(format!("{dir}f{i:03}.js")))
        .collect()
}

//
// documents.rs
//
// Copyright (C) 2024-2026 Posit Software, PBC. All rights reserved.
// Modifications copyright (C) 2026 Jonathan Marc Bearak
//

use async_trait::async_trait;
use dashmap::DashMap;
use ropey::Rope;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

use crate::collaborators::{DocumentProvider, DocumentSnapshot};
use crate::file_cache::FileCache;

/// Forward-slash filesystem path of a `file://` URI.
pub fn path_from_uri(uri: &Url) -> Option<String> {
    let path = uri.to_file_path().ok()?;
    Some(path.to_string_lossy().replace('\\', "/"))
}

/// A document open in the editor
pub struct OpenDocument {
    pub contents: Rope,
    pub version: Option<i32>,
}

impl OpenDocument {
    pub fn new(text: &str, version: Option<i32>) -> Self {
        Self {
            contents: Rope::from_str(text),
            version,
        }
    }

    /// Apply one full or ranged edit. Ranged edits whose position falls
    /// outside the document are ignored and reported as `false`.
    pub fn apply_change(&mut self, change: TextDocumentContentChangeEvent) -> bool {
        if let Some(range) = change.range {
            let (Some(start_idx), Some(end_idx)) = (
                position_to_char(&self.contents, range.start),
                position_to_char(&self.contents, range.end),
            ) else {
                log::warn!("Ignoring edit outside the document: {:?}", range);
                return false;
            };
            let (start_idx, end_idx) = (start_idx.min(end_idx), start_idx.max(end_idx));
            self.contents.remove(start_idx..end_idx);
            self.contents.insert(start_idx, &change.text);
        } else {
            self.contents = Rope::from_str(&change.text);
        }
        true
    }

    pub fn text(&self) -> String {
        self.contents.to_string()
    }

    /// Offset of `position` in UTF-16 code units from the start of the
    /// document, the unit the engine counts in.
    pub fn offset_at(&self, position: Position) -> Option<usize> {
        let char_idx = position_to_char(&self.contents, position)?;
        Some(self.contents.char_to_utf16_cu(char_idx))
    }
}

fn position_to_char(contents: &Rope, position: Position) -> Option<usize> {
    let line = position.line as usize;
    if line >= contents.len_lines() {
        return None;
    }
    let line_text = contents.line(line).to_string();
    // Columns past the end of a line stop before its terminator.
    let line_text = line_text.trim_end_matches(['\n', '\r']);
    let char_in_line = utf16_offset_to_char_offset(line_text, position.character as usize);
    Some(contents.line_to_char(line) + char_in_line)
}

fn utf16_offset_to_char_offset(line_text: &str, utf16_offset: usize) -> usize {
    let mut utf16_count = 0;
    let mut char_count = 0;

    for ch in line_text.chars() {
        if utf16_count >= utf16_offset {
            return char_count;
        }
        utf16_count += ch.len_utf16();
        char_count += 1;
    }
    char_count
}

/// Every document the editor has open, keyed by path.
///
/// As a [`DocumentProvider`] it answers from open documents first and falls
/// back to disk through a [`FileCache`].
#[derive(Default)]
pub struct OpenDocuments {
    docs: DashMap<String, OpenDocument>,
    file_cache: FileCache,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, path: &str, text: &str, version: Option<i32>) {
        self.docs
            .insert(path.to_string(), OpenDocument::new(text, version));
    }

    /// Stop tracking `path`. Its disk copy may have changed while it was
    /// open, so any cached copy is dropped too.
    pub fn close(&self, path: &str) -> bool {
        self.file_cache.invalidate(path);
        self.docs.remove(path).is_some()
    }

    pub fn apply_changes(
        &self,
        path: &str,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: Option<i32>,
    ) -> bool {
        let Some(mut doc) = self.docs.get_mut(path) else {
            log::trace!("Change for unopened document {}", path);
            return false;
        };
        for change in changes {
            doc.apply_change(change);
        }
        doc.version = version;
        true
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> bool {
        self.file_cache.invalidate(old_path);
        self.file_cache.invalidate(new_path);
        match self.docs.remove(old_path) {
            Some((_, doc)) => {
                self.docs.insert(new_path.to_string(), doc);
                true
            }
            None => false,
        }
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.docs.get(path).map(|doc| doc.text())
    }

    pub fn snapshot(&self, path: &str) -> Option<DocumentSnapshot> {
        self.text(path).map(|text| DocumentSnapshot::new(path, text))
    }

    pub fn offset_at(&self, path: &str, position: Position) -> Option<usize> {
        self.docs.get(path)?.offset_at(position)
    }

    pub fn version(&self, path: &str) -> Option<i32> {
        self.docs.get(path)?.version
    }

    pub fn contains(&self, path: &str) -> bool {
        self.docs.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn file_cache(&self) -> &FileCache {
        &self.file_cache
    }
}

#[async_trait]
impl DocumentProvider for OpenDocuments {
    async fn get_text(&self, path: &str) -> Option<String> {
        if let Some(text) = self.text(path) {
            return Some(text);
        }
        self.file_cache.read(path).await
    }
}

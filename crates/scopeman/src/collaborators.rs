//
// collaborators.rs
//
// Interfaces the coordinator consumes from its host: document text,
// language classification and directory listing
//

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

pub const JAVASCRIPT_LANGUAGE_ID: &str = "javascript";

/// A document as the editor presents it.
pub trait EditorDocument: Send + Sync {
    /// Absolute, forward-slash path of the document
    fn path(&self) -> &str;
    /// Current full text
    fn text(&self) -> String;
}

/// Owned copy of a document's path and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub path: String,
    pub text: String,
}

impl DocumentSnapshot {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

impl EditorDocument for DocumentSnapshot {
    fn path(&self) -> &str {
        &self.path
    }

    fn text(&self) -> String {
        self.text.clone()
    }
}

/// Live text of any file, open in the editor or not.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn get_text(&self, path: &str) -> Option<String>;
}

pub trait LanguageClassifier: Send + Sync {
    /// Language id for `path`, if it is a language the host knows
    fn language_of(&self, path: &str) -> Option<&'static str>;
}

/// Classifies by file extension, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ExtensionClassifier;

impl LanguageClassifier for ExtensionClassifier {
    fn language_of(&self, path: &str) -> Option<&'static str> {
        let ext = Path::new(path).extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" | "jsx" => Some(JAVASCRIPT_LANGUAGE_ID),
            "json" => Some("json"),
            "ts" | "tsx" => Some("typescript"),
            "html" | "htm" => Some("html"),
            "css" => Some("css"),
            _ => None,
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Absolute, forward-slash path
    pub path: String,
    pub is_file: bool,
}

impl DirEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_file: true,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_file: false,
        }
    }
}

#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// Immediate children of `dir`.
    async fn list(&self, dir: &str) -> io::Result<Vec<DirEntry>>;
}

/// Lists directories on the local filesystem, sorted by file name.
#[derive(Debug, Clone, Default)]
pub struct FsDirectoryLister;

#[async_trait]
impl DirectoryLister for FsDirectoryLister {
    async fn list(&self, dir: &str) -> io::Result<Vec<DirEntry>> {
        let root = PathBuf::from(dir);
        tokio::task::spawn_blocking(move || list_directory(&root))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

fn list_directory(root: &Path) -> io::Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        entries.push(DirEntry {
            path: entry.path().to_string_lossy().replace('\\', "/"),
            is_file: entry.file_type().is_file(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_classifier() {
        let classifier = ExtensionClassifier;
        assert_eq!(classifier.language_of("/p/a.js"), Some(JAVASCRIPT_LANGUAGE_ID));
        assert_eq!(classifier.language_of("/p/A.MJS"), Some(JAVASCRIPT_LANGUAGE_ID));
        assert_eq!(classifier.language_of("/p/data.json"), Some("json"));
        assert_eq!(classifier.language_of("/p/Makefile"), None);
        assert_eq!(classifier.language_of("/p/.js"), None);
    }

    #[test]
    fn test_snapshot_is_editor_document() {
        let doc = DocumentSnapshot::new("/p/a.js", "var a;");
        let doc: &dyn EditorDocument = &doc;
        assert_eq!(doc.path(), "/p/a.js");
        assert_eq!(doc.text(), "var a;");
    }

    #[tokio::test]
    async fn test_fs_lister_lists_immediate_children_sorted() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.js"), "var b;").unwrap();
        std::fs::write(tmp.path().join("a.js"), "var a;").unwrap();
        std::fs::create_dir(tmp.path().join("lib")).unwrap();
        std::fs::write(tmp.path().join("lib").join("nested.js"), "").unwrap();

        let dir = tmp.path().to_string_lossy().to_string();
        let entries = FsDirectoryLister.list(&dir).await.unwrap();

        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.rsplit('/').next().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.js", "b.js", "lib"]);
        assert!(entries[0].is_file);
        assert!(!entries[2].is_file);
    }

    #[tokio::test]
    async fn test_fs_lister_missing_directory_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing").to_string_lossy().to_string();
        assert!(FsDirectoryLister.list(&missing).await.is_err());
    }
}

//! Temporary on-disk JavaScript projects.
//!
//! Paths handed out are forward-slash strings, directories with a trailing
//! `/`, matching what the coordinator keys its state by.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub struct FixtureProject {
    dir: TempDir,
}

impl FixtureProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
        }
    }

    /// Project with `count` files named `f000.js`, `f001.js`, ...
    pub fn with_js_files(count: usize) -> Self {
        let project = Self::new();
        for i in 0..count {
            project.write(&format!("f{i:03}.js"), &format!("var f{i} = {i};\n"));
        }
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name`, creating parent directories.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    pub fn root_dir(&self) -> String {
        let mut dir = self.dir.path().to_string_lossy().replace('\\', "/");
        if !dir.ends_with('/') {
            dir.push('/');
        }
        dir
    }

    /// Key-form path of `name` inside the project.
    pub fn file_path(&self, name: &str) -> String {
        format!("{}{}", self.root_dir(), name)
    }
}

impl Default for FixtureProject {
    fn default() -> Self {
        Self::new()
    }
}

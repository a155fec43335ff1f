//
// path_key.rs
//
// Split absolute file paths into (directory, filename) map keys
//

/// An absolute path split at its last `/`.
///
/// `dir` keeps the trailing separator so that `dir + file` reproduces the
/// original path. Paths are expected in forward-slash form; see
/// [`crate::documents::path_from_uri`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub dir: String,
    pub file: String,
}

impl PathKey {
    pub fn split(path: &str) -> Self {
        match path.rfind('/') {
            Some(idx) => Self {
                dir: path[..=idx].to_string(),
                file: path[idx + 1..].to_string(),
            },
            None => Self {
                dir: String::new(),
                file: path.to_string(),
            },
        }
    }

    pub fn full_path(&self) -> String {
        format!("{}{}", self.dir, self.file)
    }
}

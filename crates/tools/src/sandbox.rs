//! Output root: file commands are scoped to one directory.
//!
//! Paths from the model are resolved lexically against the root. Leading
//! `/` and drive prefixes are dropped, `.` is ignored, and a `..` that would
//! climb above the root is rejected.

use std::path::{Component, Path, PathBuf};

/// Error returned when a model-supplied path cannot be placed under the root.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },
}

/// The directory every file and shell command operates in.
#[derive(Debug, Clone)]
pub struct OutputRoot {
    root: PathBuf,
}

impl OutputRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Join `path` onto the root without letting it escape.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathError> {
        let normalized = path.replace('\\', "/");
        let mut parts: Vec<&str> = Vec::new();
        for component in Path::new(&normalized).components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(PathError::PathTraversal { path: path.into() });
                    }
                }
                Component::Normal(part) => match part.to_str() {
                    Some(part) => parts.push(part),
                    None => return Err(PathError::PathTraversal { path: path.into() }),
                },
            }
        }

        let mut resolved = self.root.clone();
        resolved.extend(parts);
        Ok(resolved)
    }
}

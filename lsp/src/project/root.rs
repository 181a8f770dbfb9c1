use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::protocol::file_uri_to_path;

/// Finds the project a document belongs to by walking up from its
/// directory to the nearest marker file. Results are cached per directory.
#[derive(Debug)]
pub struct ProjectRootDetector {
    markers: Vec<String>,
    workspace_root: Option<PathBuf>,
    cache: HashMap<PathBuf, Option<PathBuf>>,
}

impl ProjectRootDetector {
    #[must_use]
    pub fn new(markers: Vec<String>, workspace_root: Option<PathBuf>) -> Self {
        Self {
            markers,
            workspace_root,
            cache: HashMap::new(),
        }
    }

    /// Project root for a document URI. Without a marker, a document inside
    /// the workspace belongs to the workspace root.
    pub fn detect(&mut self, uri: &str) -> Option<PathBuf> {
        let path = file_uri_to_path(uri)?;
        self.detect_for_path(&path)
    }

    pub fn detect_for_path(&mut self, path: &Path) -> Option<PathBuf> {
        let dir = path.parent()?;
        if let Some(cached) = self.cache.get(dir) {
            return cached.clone();
        }

        let found = dir
            .ancestors()
            .find(|ancestor| self.markers.iter().any(|m| ancestor.join(m).exists()))
            .map(Path::to_path_buf)
            .or_else(|| {
                self.workspace_root
                    .as_ref()
                    .filter(|workspace| dir.starts_with(workspace))
                    .cloned()
            });
        tracing::trace!(dir = %dir.display(), root = ?found, "Detected project root");
        self.cache.insert(dir.to_path_buf(), found.clone());
        found
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
}

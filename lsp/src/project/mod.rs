//! Per-project entity state.
//!
//! A project is a directory holding a root marker. Its entities are loaded
//! the first time one of its documents is seen and kept in sync with the
//! definition files afterwards.

mod loader;
mod root;
mod watch;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use saga_types::{DetectableEntity, EntityInfo, EntityKey};

use crate::detection::{DetectorRegistry, EntityDetector, SharedDetector};

pub use loader::{EntityLoader, LoadedEntity, LoaderError, ProjectEntities, TomlEntityLoader};
pub use root::ProjectRootDetector;
pub use watch::{FileChange, ReloadPlan, WatchBatcher, WatchFlush};

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("project {} is not loaded", root.display())]
    NotLoaded { root: PathBuf },
    #[error("entity file {} no longer exists", path.display())]
    Missing { path: PathBuf },
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// Loaded entities of one project and the detector built from them.
pub struct ProjectContext {
    pub root: PathBuf,
    pub entities: Vec<DetectableEntity>,
    pub info: HashMap<EntityKey, EntityInfo>,
    pub detector: SharedDetector,
}

impl ProjectContext {
    fn new(root: PathBuf, loaded: ProjectEntities) -> Self {
        let detector = SharedDetector::new(EntityDetector::new(loaded.entities.clone()));
        Self {
            root,
            entities: loaded.entities,
            info: loaded.info,
            detector,
        }
    }

    fn replace(&mut self, loaded: ProjectEntities) {
        self.detector
            .with(|d| d.update_entities(loaded.entities.clone()));
        self.entities = loaded.entities;
        self.info = loaded.info;
    }

    fn changes_id(&self, loaded: &LoadedEntity) -> bool {
        let key = loaded.entity.key();
        self.entities
            .iter()
            .any(|e| e.file_path == loaded.entity.file_path && e.key() != key)
    }

    fn apply(&mut self, loaded: LoadedEntity) {
        let key = loaded.entity.key();
        let file_path = loaded.entity.file_path.clone();

        let stale: Vec<EntityKey> = self
            .entities
            .iter()
            .filter(|e| e.file_path == file_path && e.key() != key)
            .map(DetectableEntity::key)
            .collect();
        self.entities
            .retain(|e| !(e.file_path == file_path && e.key() != key));
        for old in &stale {
            self.info.remove(old);
        }

        // Duplicate ids resolve as in a full load: the file that sorts
        // first defines the entity.
        let shadowed = self
            .entities
            .iter()
            .any(|e| e.key() == key && e.file_path < file_path);
        if shadowed {
            tracing::warn!(
                "Duplicate entity {key} in {file_path}, keeping the first definition"
            );
        } else {
            match self.entities.iter_mut().find(|e| e.key() == key) {
                Some(existing) => *existing = loaded.entity.clone(),
                None => self.entities.push(loaded.entity.clone()),
            }
            self.info.insert(key, loaded.info);
        }

        self.detector.with(|d| {
            for old in &stale {
                d.remove_entity(old);
            }
            if !shadowed {
                d.update_single_entity(loaded.entity);
            }
        });
    }
}

pub struct ProjectContextManager {
    loader: Arc<dyn EntityLoader>,
    roots: ProjectRootDetector,
    contexts: HashMap<PathBuf, ProjectContext>,
    registry: DetectorRegistry,
}

impl ProjectContextManager {
    #[must_use]
    pub fn new(
        loader: Arc<dyn EntityLoader>,
        roots: ProjectRootDetector,
        registry: DetectorRegistry,
    ) -> Self {
        Self {
            loader,
            roots,
            contexts: HashMap::new(),
            registry,
        }
    }

    pub fn project_root(&mut self, uri: &str) -> Option<PathBuf> {
        self.roots.detect(uri)
    }

    /// The context for `root`, loading it on first use. A failed load
    /// yields an empty project.
    pub fn context(&mut self, root: &Path) -> &ProjectContext {
        let loader = &self.loader;
        let registry = &self.registry;
        self.contexts.entry(root.to_path_buf()).or_insert_with(|| {
            let loaded = loader.load(root).unwrap_or_else(|err| {
                tracing::warn!("Failed to load entities for {}: {err}", root.display());
                ProjectEntities::default()
            });
            tracing::info!(
                count = loaded.entities.len(),
                "Loaded project {}",
                root.display()
            );
            let context = ProjectContext::new(root.to_path_buf(), loaded);
            registry.insert(root.to_path_buf(), context.detector.clone());
            context
        })
    }

    pub fn context_for_uri(&mut self, uri: &str) -> Option<&ProjectContext> {
        let root = self.roots.detect(uri)?;
        Some(self.context(&root))
    }

    /// Roots loaded so far, sorted.
    #[must_use]
    pub fn loaded_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.contexts.keys().cloned().collect();
        roots.sort();
        roots
    }

    /// Forget `root`. The next document from it loads afresh.
    pub fn invalidate(&mut self, root: &Path) {
        self.contexts.remove(root);
        self.registry.remove(root);
    }

    /// Re-read every definition of `root`. The previous entities stay in
    /// place if the load fails.
    pub fn full_reload(&mut self, root: &Path) -> Result<usize, ReloadError> {
        let loaded = self.loader.load(root)?;
        self.roots.invalidate();
        let count = loaded.entities.len();
        match self.contexts.get_mut(root) {
            Some(context) => context.replace(loaded),
            None => {
                let context = ProjectContext::new(root.to_path_buf(), loaded);
                self.registry
                    .insert(root.to_path_buf(), context.detector.clone());
                self.contexts.insert(root.to_path_buf(), context);
            }
        }
        tracing::info!(count, "Reloaded project {}", root.display());
        Ok(count)
    }

    /// Re-read only `paths`. Nothing is applied unless every file loads.
    pub fn incremental_reload(
        &mut self,
        root: &Path,
        paths: &[PathBuf],
    ) -> Result<usize, ReloadError> {
        if !self.contexts.contains_key(root) {
            return Err(ReloadError::NotLoaded {
                root: root.to_path_buf(),
            });
        }
        let mut staged = Vec::with_capacity(paths.len());
        for path in paths {
            if !path.is_file() {
                return Err(ReloadError::Missing { path: path.clone() });
            }
            staged.push(self.loader.load_entity_file(root, path)?);
        }

        let count = staged.len();
        let Some(context) = self.contexts.get_mut(root) else {
            return Err(ReloadError::NotLoaded {
                root: root.to_path_buf(),
            });
        };
        // A file that drops an id may uncover a duplicate in a file that
        // was not re-read.
        if staged.iter().any(|loaded| context.changes_id(loaded)) {
            tracing::debug!("Entity id changed, reloading {} in full", root.display());
            return self.full_reload(root);
        }
        for loaded in staged {
            context.apply(loaded);
        }
        tracing::debug!(count, "Incrementally reloaded {}", root.display());
        Ok(count)
    }

    /// Reload every loaded project from disk.
    pub fn reload_all(&mut self) -> Vec<PathBuf> {
        let roots = self.loaded_roots();
        for root in &roots {
            if let Err(err) = self.full_reload(root) {
                tracing::warn!("Reload of {} failed: {err}", root.display());
            }
        }
        roots
    }

    /// Bring loaded projects up to date with a batch of file changes.
    /// Returns the roots that were touched.
    pub fn apply_file_changes(&mut self, changes: &[FileChange], limit: usize) -> Vec<PathBuf> {
        let mut by_root: BTreeMap<PathBuf, Vec<&FileChange>> = BTreeMap::new();
        let mut unowned = false;
        for change in changes {
            let owner = self
                .contexts
                .keys()
                .filter(|root| change.path.starts_with(root))
                .max_by_key(|root| root.components().count())
                .cloned();
            match owner {
                Some(root) => by_root.entry(root).or_default().push(change),
                None => unowned = true,
            }
        }
        if unowned {
            // A new marker may have appeared outside the known projects.
            self.roots.invalidate();
        }

        let mut touched = Vec::with_capacity(by_root.len());
        for (root, changes) in by_root {
            let plan = ReloadPlan::for_changes(changes.iter().copied(), limit, |path| {
                self.loader.is_entity_file(&root, path)
            });
            if let ReloadPlan::Incremental(paths) = &plan {
                match self.incremental_reload(&root, paths) {
                    Ok(_) => {
                        touched.push(root);
                        continue;
                    }
                    Err(err) => {
                        tracing::debug!("Incremental reload failed, falling back to full: {err}");
                    }
                }
            }
            if let Err(err) = self.full_reload(&root) {
                tracing::warn!(
                    "Reload of {} failed, keeping previous entities: {err}",
                    root.display()
                );
            }
            touched.push(root);
        }
        touched
    }
}

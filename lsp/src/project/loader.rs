//! Entity definitions on disk.
//!
//! ```text
//! <root>/<entities_dir>/characters/hero.toml
//! <root>/<entities_dir>/items/sword.toml
//! ```
//!
//! ```toml
//! id = "hero"
//! name = "勇者"
//! display_names = ["アレン"]
//! aliases = ["あいつ"]
//! summary = "辺境の村から来た若者。"
//!
//! [details]
//! age = 17
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use saga_types::{DetectableEntity, EntityInfo, EntityKey, EntityKind, LifecycleStatus};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid entity file {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// One entity and its hover information.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEntity {
    pub entity: DetectableEntity,
    pub info: EntityInfo,
}

/// Everything loaded for one project.
#[derive(Debug, Clone, Default)]
pub struct ProjectEntities {
    pub entities: Vec<DetectableEntity>,
    pub info: HashMap<EntityKey, EntityInfo>,
}

impl ProjectEntities {
    fn push(&mut self, loaded: LoadedEntity) {
        self.info.insert(loaded.entity.key(), loaded.info);
        self.entities.push(loaded.entity);
    }
}

pub trait EntityLoader: Send + Sync {
    /// Load every entity of the project at `root`.
    fn load(&self, root: &Path) -> Result<ProjectEntities, LoaderError>;

    /// Load the single entity defined in `path`.
    fn load_entity_file(&self, root: &Path, path: &Path) -> Result<LoadedEntity, LoaderError>;

    /// Whether `path` is an entity definition of the project at `root`.
    fn is_entity_file(&self, root: &Path, path: &Path) -> bool;
}

#[derive(Debug, Deserialize)]
struct EntityFile {
    id: String,
    name: String,
    #[serde(default)]
    display_names: Vec<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    status: Option<LifecycleStatus>,
    #[serde(default)]
    details: BTreeMap<String, toml::Value>,
}

/// Reads `*.toml` definitions from one directory per entity kind.
#[derive(Debug, Clone)]
pub struct TomlEntityLoader {
    entities_dir: PathBuf,
}

impl TomlEntityLoader {
    pub fn new(entities_dir: impl Into<PathBuf>) -> Self {
        Self {
            entities_dir: entities_dir.into(),
        }
    }

    fn kind_of(&self, root: &Path, path: &Path) -> Option<EntityKind> {
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            return None;
        }
        let relative = path.strip_prefix(root.join(&self.entities_dir)).ok()?;
        let mut components = relative.components();
        let Some(Component::Normal(dir)) = components.next() else {
            return None;
        };
        let Some(Component::Normal(_file)) = components.next() else {
            return None;
        };
        if components.next().is_some() {
            return None;
        }
        EntityKind::from_dir_name(dir.to_str()?)
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn render_detail(value: toml::Value) -> String {
    match value {
        toml::Value::String(s) => s,
        other => other.to_string(),
    }
}

impl EntityLoader for TomlEntityLoader {
    fn load(&self, root: &Path) -> Result<ProjectEntities, LoaderError> {
        let base = root.join(&self.entities_dir);
        let mut project = ProjectEntities::default();
        if !base.is_dir() {
            tracing::debug!("No entities directory at {}", base.display());
            return Ok(project);
        }

        for kind in EntityKind::ALL {
            let dir = base.join(kind.dir_name());
            if !dir.is_dir() {
                continue;
            }
            let entries = std::fs::read_dir(&dir).map_err(|source| LoaderError::Read {
                path: dir.clone(),
                source,
            })?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && self.kind_of(root, path).is_some())
                .collect();
            files.sort();

            for file in files {
                let loaded = self.load_entity_file(root, &file)?;
                let key = loaded.entity.key();
                if project.info.contains_key(&key) {
                    tracing::warn!(
                        "Duplicate entity {key} in {}, keeping the first definition",
                        file.display()
                    );
                    continue;
                }
                project.push(loaded);
            }
        }

        tracing::debug!(
            count = project.entities.len(),
            "Loaded entities from {}",
            base.display()
        );
        Ok(project)
    }

    fn load_entity_file(&self, root: &Path, path: &Path) -> Result<LoadedEntity, LoaderError> {
        let kind = self.kind_of(root, path).ok_or_else(|| LoaderError::Invalid {
            path: path.to_path_buf(),
            message: "not inside an entity kind directory".to_string(),
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| LoaderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: EntityFile = toml::from_str(&text).map_err(|source| LoaderError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if file.id.trim().is_empty() || file.name.trim().is_empty() {
            return Err(LoaderError::Invalid {
                path: path.to_path_buf(),
                message: "`id` and `name` must not be empty".to_string(),
            });
        }
        let status = match (kind, file.status) {
            (EntityKind::Foreshadowing, status) => status,
            (_, Some(_)) => {
                tracing::debug!("Ignoring status on {kind} {}", file.id);
                None
            }
            (_, None) => None,
        };

        let mut entity =
            DetectableEntity::new(kind, file.id, file.name, relative_display(root, path))
                .with_display_names(file.display_names)
                .with_aliases(file.aliases);
        entity.status = status;

        let info = EntityInfo {
            summary: file.summary.filter(|s| !s.trim().is_empty()),
            details: file
                .details
                .into_iter()
                .map(|(key, value)| (key, render_detail(value)))
                .collect(),
        };
        Ok(LoadedEntity { entity, info })
    }

    fn is_entity_file(&self, root: &Path, path: &Path) -> bool {
        self.kind_of(root, path).is_some()
    }
}

//! Persistent, host-scoped cache of learned hint → selector mappings.
//!
//! File layout (YAML):
//!
//! ```yaml
//! global:
//!   login: "#login-button"
//! www.saucedemo.com:
//!   cart icon:
//!     - .shopping_cart_link
//!     - "[data-test=\"shopping-cart-link\"]"
//! ```
//!
//! `global` (or `default`) entries apply to every host; host entries win on
//! key collisions. The file is re-read whenever its modification time changes
//! and rewritten on every newly learned mapping.

use crate::config::AliasConfig;
use crate::hint;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

pub const GLOBAL_SCOPE: &str = "global";
const DEFAULT_SCOPE: &str = "default";

#[derive(Debug, Error)]
pub enum AliasStoreError {
    #[error("Failed to access alias file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode alias file: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// Selectors recorded for one hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasEntry {
    Single(String),
    Multiple(Vec<String>),
}

impl AliasEntry {
    pub fn selectors(&self) -> Vec<&str> {
        match self {
            AliasEntry::Single(s) => vec![s.as_str()],
            AliasEntry::Multiple(list) => list.iter().map(String::as_str).collect(),
        }
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.selectors().contains(&selector)
    }

    /// Append a selector, upgrading a single entry to a list. Returns `false`
    /// when the selector was already present.
    pub fn push(&mut self, selector: &str) -> bool {
        if self.contains(selector) {
            return false;
        }
        match self {
            AliasEntry::Single(existing) => {
                *self = AliasEntry::Multiple(vec![existing.clone(), selector.to_string()]);
            }
            AliasEntry::Multiple(list) => list.push(selector.to_string()),
        }
        true
    }

    fn from_yaml(value: &serde_yaml::Value) -> Option<Self> {
        match value {
            serde_yaml::Value::String(s) if !s.trim().is_empty() => {
                Some(AliasEntry::Single(s.clone()))
            }
            serde_yaml::Value::Sequence(items) => {
                let list: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .filter(|s| !s.trim().is_empty())
                    .collect();
                match list.len() {
                    0 => None,
                    1 => list.into_iter().next().map(AliasEntry::Single),
                    _ => Some(AliasEntry::Multiple(list)),
                }
            }
            _ => None,
        }
    }
}

pub type HostAliases = BTreeMap<String, AliasEntry>;
type AliasData = BTreeMap<String, HostAliases>;

#[derive(Debug, Clone)]
enum Location {
    /// Never touches storage.
    Memory,
    Fixed(PathBuf),
    /// First existing candidate; writes go to `default` when none exists.
    Search {
        candidates: Vec<PathBuf>,
        default: PathBuf,
    },
}

#[derive(Debug, Default)]
struct Cache {
    source: Option<PathBuf>,
    mtime: Option<SystemTime>,
    data: AliasData,
    loaded: bool,
    /// Set after a failed write; the session keeps learning in memory only.
    memory_only: bool,
}

/// Process-wide alias store. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct AliasStore {
    location: Location,
    cache: Mutex<Cache>,
}

impl AliasStore {
    /// Store backed by exactly one file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::Fixed(path.into()))
    }

    /// Store backed by the first existing candidate path.
    pub fn discover(candidates: Vec<PathBuf>, default: PathBuf) -> Self {
        Self::with_location(Location::Search {
            candidates,
            default,
        })
    }

    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    pub fn from_config(config: &AliasConfig) -> Self {
        match &config.path {
            Some(path) => Self::new(path.clone()),
            None => Self::discover(config.search_paths.clone(), config.default_path.clone()),
        }
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Backing file currently in use, if any.
    pub fn path(&self) -> Option<PathBuf> {
        let cache = self.cache.lock();
        cache.source.clone().or_else(|| self.write_target())
    }

    /// Merged view for `host`: global entries overlaid with host entries.
    pub fn load(&self, host: &str) -> HostAliases {
        let mut cache = self.cache.lock();
        self.refresh(&mut cache);

        let mut merged = cache
            .data
            .get(GLOBAL_SCOPE)
            .or_else(|| cache.data.get(DEFAULT_SCOPE))
            .cloned()
            .unwrap_or_default();
        if let Some(host_map) = cache.data.get(host) {
            for (k, v) in host_map {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Selectors recorded for `hint` on `host`, in recording order.
    pub fn lookup(&self, host: &str, hint: &str) -> Vec<String> {
        let key = hint::normalize(hint);
        if key.is_empty() {
            return Vec::new();
        }
        self.load(host)
            .get(&key)
            .map(|entry| entry.selectors().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Record a learned mapping. Returns `true` when the mapping is new.
    ///
    /// Persistence failures are logged and the store continues in memory.
    pub fn record(&self, host: &str, hint: &str, selector: &str) -> bool {
        let key = hint::normalize(hint);
        let selector = selector.trim();
        if key.is_empty() || selector.is_empty() {
            return false;
        }

        let mut cache = self.cache.lock();
        self.refresh(&mut cache);

        let host_map = cache.data.entry(host.to_string()).or_default();
        let learned = match host_map.get_mut(&key) {
            Some(entry) => entry.push(selector),
            None => {
                host_map.insert(key.clone(), AliasEntry::Single(selector.to_string()));
                true
            }
        };
        if !learned {
            return false;
        }
        debug!(host, hint = %key, selector, "Learned alias");

        if cache.memory_only {
            return true;
        }
        let Some(target) = cache.source.clone().or_else(|| self.write_target()) else {
            return true;
        };
        match persist(&target, &cache.data) {
            Ok(mtime) => {
                cache.source = Some(target);
                cache.mtime = mtime;
            }
            Err(e) => {
                warn!("Alias store is read-only for this session: {}", e);
                cache.memory_only = true;
            }
        }
        true
    }

    fn write_target(&self) -> Option<PathBuf> {
        match &self.location {
            Location::Memory => None,
            Location::Fixed(path) => Some(path.clone()),
            Location::Search { default, .. } => Some(default.clone()),
        }
    }

    fn current_source(&self) -> Option<PathBuf> {
        match &self.location {
            Location::Memory => None,
            Location::Fixed(path) => path.exists().then(|| path.clone()),
            Location::Search {
                candidates,
                default,
            } => candidates
                .iter()
                .chain(std::iter::once(default))
                .find(|p| p.exists())
                .cloned(),
        }
    }

    /// Re-read the backing file when its path or modification time changed.
    fn refresh(&self, cache: &mut Cache) {
        if cache.memory_only {
            return;
        }
        let source = self.current_source();
        let mtime = source.as_deref().and_then(modified);
        let changed = source != cache.source || (mtime.is_some() && mtime != cache.mtime);
        if cache.loaded && !changed {
            return;
        }

        cache.data = match source.as_deref() {
            Some(path) => read_aliases(path),
            None => AliasData::new(),
        };
        cache.source = source;
        cache.mtime = mtime;
        cache.loaded = true;
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Read and normalize an alias file. Unreadable or malformed files read as empty.
fn read_aliases(path: &Path) -> AliasData {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read alias file {}: {}", path.display(), e);
            return AliasData::new();
        }
    };
    let root: serde_yaml::Value = match serde_yaml::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring malformed alias file {}: {}", path.display(), e);
            return AliasData::new();
        }
    };

    let mut data = AliasData::new();
    let Some(scopes) = root.as_mapping() else {
        return data;
    };
    for (scope, hints) in scopes {
        let Some(scope) = yaml_key(scope) else {
            continue;
        };
        let Some(hints) = hints.as_mapping() else {
            continue;
        };
        let host_map = data.entry(scope).or_default();
        for (hint_key, selectors) in hints {
            if let (Some(hint_key), Some(entry)) = (yaml_key(hint_key), AliasEntry::from_yaml(selectors)) {
                host_map.insert(hint::normalize(&hint_key), entry);
            }
        }
    }
    data
}

fn yaml_key(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

fn persist(path: &Path, data: &AliasData) -> Result<Option<SystemTime>, AliasStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| AliasStoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let yaml = serde_yaml::to_string(data)?;
    std::fs::write(path, yaml).map_err(|source| AliasStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(modified(path))
}

use std::path::PathBuf;

fn usize_env(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn i64_env(name: &str, default: i64) -> i64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Limits applied by the content service, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_tree_depth: usize,
    pub max_delete_depth: usize,
    pub default_page_size: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: crate::comment_tree::DEFAULT_MAX_DEPTH,
            max_delete_depth: crate::cascade::DEFAULT_MAX_DEPTH,
            default_page_size: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_tree_depth: usize_env("QUIRE_MAX_TREE_DEPTH", d.max_tree_depth).max(1),
            max_delete_depth: usize_env("QUIRE_MAX_DELETE_DEPTH", d.max_delete_depth).max(1),
            default_page_size: i64_env("QUIRE_DEFAULT_PAGE_SIZE", d.default_page_size).max(1),
        }
    }
}

/// Where documents live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreConfig {
    /// In-memory maps, snapshotted under the directory when one is given.
    Memory { data_dir: Option<PathBuf> },
    Postgres { url: String },
}

impl StoreConfig {
    /// `DATABASE_URL` selects Postgres, otherwise `QUIRE_DATA_DIR` (if set)
    /// holds the in-memory snapshot.
    pub fn from_env() -> Self {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => StoreConfig::Postgres { url },
            _ => StoreConfig::Memory { data_dir: std::env::var("QUIRE_DATA_DIR").ok().map(PathBuf::from) },
        }
    }
}

//! Cache configuration

use std::env;
use std::path::PathBuf;

use crate::error::{CacheError, Result};

pub const DEFAULT_NAMESPACE_DIR: &str = "image-file-cache";
pub const DEFAULT_PRUNE_TRIGGER_LIMIT: u64 = 15 * 1024 * 1024; // 15 MiB

/// Options recognized by the cache and its upstream URL validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory under which the namespace directory is created
    pub root_dir: PathBuf,
    pub namespace_dir: String,
    /// Byte budget for ephemeral entries before pruning kicks in
    pub prune_trigger_limit: u64,
    pub valid_protocols: Vec<String>,
    /// Allowed hosts; empty allows any host
    pub file_host_whitelist: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./cache"),
            namespace_dir: DEFAULT_NAMESPACE_DIR.to_string(),
            prune_trigger_limit: DEFAULT_PRUNE_TRIGGER_LIMIT,
            valid_protocols: vec!["https".to_string()],
            file_host_whitelist: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Parse configuration from environment variables, defaulting anything
    /// absent or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let root_dir = env::var("IMAGE_CACHE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.root_dir);

        let namespace_dir = env::var("IMAGE_CACHE_NAMESPACE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.namespace_dir);

        let prune_trigger_limit = env::var("IMAGE_CACHE_PRUNE_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.prune_trigger_limit);

        let valid_protocols = env::var("IMAGE_CACHE_PROTOCOLS")
            .ok()
            .map(|s| split_list(&s))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.valid_protocols);

        let file_host_whitelist = env::var("IMAGE_CACHE_HOSTS")
            .map(|s| split_list(&s))
            .unwrap_or(defaults.file_host_whitelist);

        Self {
            root_dir,
            namespace_dir,
            prune_trigger_limit,
            valid_protocols,
            file_host_whitelist,
        }
    }

    /// Directory holding every entry file
    pub fn namespace_path(&self) -> PathBuf {
        self.root_dir.join(&self.namespace_dir)
    }

    pub fn validate(&self) -> Result<()> {
        let ns = self.namespace_dir.as_str();
        if ns.trim().is_empty() {
            return Err(CacheError::Config("namespace directory is empty".to_string()));
        }
        if ns.contains(['/', '\\']) || ns.starts_with('.') {
            return Err(CacheError::Config(format!(
                "namespace directory must be a plain directory name, got {:?}",
                ns
            )));
        }
        if self.valid_protocols.is_empty() {
            return Err(CacheError::Config(
                "at least one valid protocol is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

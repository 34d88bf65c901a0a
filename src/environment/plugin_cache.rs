//! Plugin Cache
//!
//! Keeps the CLI's plugins directory between runs so providers are not
//! downloaded again on every job. Entries live in a local cache
//! directory, one subdirectory per key.
//!
//! Cache failures never fail the run; they are logged as warnings.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::action::inputs::PluginCacheSettings;

const KEY_PREFIX: &str = "pulumi-plugins-";

/// Platform label used in cache keys.
pub fn platform_label() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Expands a leading `~/` to the home directory.
pub fn resolve_plugins_path(plugins_path: &str) -> PathBuf {
    match plugins_path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(plugins_path),
    }
}

/// Cache key for a stack, work dir and CLI version.
pub fn cache_key(stack: &str, work_dir: &str, pulumi_version: &str) -> String {
    let content = format!("{}-{}-{}", stack, work_dir, pulumi_version);
    let digest = hex::encode(Sha256::digest(content.as_bytes()));
    format!("{}{}-{}", KEY_PREFIX, platform_label(), &digest[..8])
}

/// Fallback key prefixes, most specific first.
pub fn restore_keys() -> Vec<String> {
    vec![
        format!("{}{}-", KEY_PREFIX, platform_label()),
        KEY_PREFIX.to_string(),
    ]
}

/// Directory-backed cache store.
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache under the given directory, or the user cache directory.
    pub fn from_settings(settings: &PluginCacheSettings) -> Self {
        let root = match &settings.cache_dir {
            Some(dir) => resolve_plugins_path(dir),
            None => std::env::var_os("RUNNER_TOOL_CACHE")
                .map(PathBuf::from)
                .or_else(dirs::cache_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("stackrun-plugin-cache"),
        };
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Restores `target` from the best matching entry.
    ///
    /// Returns the key that was restored.
    pub fn restore(&self, target: &Path, key: &str, restore_keys: &[String]) -> io::Result<Option<String>> {
        let Some(found) = self.find(key, restore_keys)? else {
            return Ok(None);
        };
        copy_dir(&self.entry(&found), target)?;
        Ok(Some(found))
    }

    fn find(&self, key: &str, restore_keys: &[String]) -> io::Result<Option<String>> {
        if self.entry(key).is_dir() {
            return Ok(Some(key.to_string()));
        }
        if !self.root.is_dir() {
            return Ok(None);
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            entries.push((entry.file_name().to_string_lossy().to_string(), modified));
        }

        for prefix in restore_keys {
            let newest = entries
                .iter()
                .filter(|(name, _)| name.starts_with(prefix.as_str()))
                .max_by_key(|(_, modified)| *modified);
            if let Some((name, _)) = newest {
                return Ok(Some(name.clone()));
            }
        }
        Ok(None)
    }

    /// Stores `source` under `key`, replacing any previous entry.
    pub fn save(&self, source: &Path, key: &str) -> io::Result<()> {
        let entry = self.entry(key);
        if entry.exists() {
            fs::remove_dir_all(&entry)?;
        }
        copy_dir(source, &entry)
    }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Restores the plugins directory. Returns the restored key, if any.
pub fn restore_plugins_cache(
    settings: &PluginCacheSettings,
    cache: &LocalCache,
    key: &str,
) -> Option<String> {
    if !settings.enabled {
        debug!("Plugin caching is disabled");
        return None;
    }

    let target = resolve_plugins_path(&settings.plugins_path);
    let fallbacks = restore_keys();
    info!("Attempting to restore plugins cache into: {}", target.display());
    debug!("Cache key: {}", key);
    debug!("Restore keys: {}", fallbacks.join(", "));

    match cache.restore(&target, key, &fallbacks) {
        Ok(Some(hit)) => {
            info!("Plugins cache restored successfully. Cache hit: {}", hit);
            Some(hit)
        }
        Ok(None) => {
            info!("No plugins cache found. Plugins will be downloaded as needed.");
            None
        }
        Err(e) => {
            warn!("Failed to restore plugins cache: {}", e);
            None
        }
    }
}

/// Saves the plugins directory unless the restore was an exact hit.
pub fn save_plugins_cache(
    settings: &PluginCacheSettings,
    cache: &LocalCache,
    key: &str,
    restored_key: Option<&str>,
) {
    if !settings.enabled {
        debug!("Plugin caching is disabled");
        return;
    }
    if restored_key == Some(key) {
        info!("Cache hit was exact, skipping cache save");
        return;
    }

    let source = resolve_plugins_path(&settings.plugins_path);
    if !source.is_dir() {
        warn!("Plugins directory {} does not exist, nothing to cache", source.display());
        return;
    }

    info!("Attempting to save plugins cache from: {}", source.display());
    match cache.save(&source, key) {
        Ok(()) => info!("Plugins cache saved successfully. Cache key: {}", key),
        Err(e) => warn!("Failed to save plugins cache: {}", e),
    }
}

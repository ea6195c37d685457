//! Configuration management.
//!
//! Settings are read from `~/.config/tablecache/config.json` (or the
//! platform equivalent), then overridden by `TABLECACHE_*` environment
//! variables. Every field has a default, so a missing file is fine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::{CacheNames, DEFAULT_CACHE_PREFIX};
use crate::store::{DEFAULT_DB_NAME, DEFAULT_DB_VERSION};
use crate::worker::DEFAULT_PRECACHE;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tablecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Prefix of environment variables that override the file.
const ENV_PREFIX: &str = "TABLECACHE_";

const DEFAULT_API_BASE_URL: &str = "http://localhost:1337/";
const DEFAULT_ORIGIN: &str = "http://localhost:8000/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the restaurant API.
    pub api_base_url: String,
    /// Origin serving the app shell.
    pub origin: String,
    pub cache_prefix: String,
    pub cache_version: u32,
    pub db_name: String,
    pub db_version: u32,
    /// Set to false to run without the local store.
    pub store_enabled: bool,
    /// App-shell paths seeded at install.
    pub precache: Vec<String>,
    /// Origin path prefixes holding restaurant images.
    pub image_path_prefixes: Vec<String>,
    /// Store cache misses fetched from the network.
    pub cache_on_fetch: bool,
    /// Overrides the platform cache directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            cache_version: 1,
            db_name: DEFAULT_DB_NAME.to_string(),
            db_version: DEFAULT_DB_VERSION,
            store_enabled: true,
            precache: DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect(),
            image_path_prefixes: vec!["/img/".to_string(), "/dist/img/".to_string()],
            cache_on_fetch: true,
            data_dir: None,
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `TABLECACHE_<FIELD>` overrides. `lookup` returns the value of
    /// an environment variable, if set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |field: &str| lookup(&format!("{}{}", ENV_PREFIX, field));

        if let Some(v) = var("API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = var("ORIGIN") {
            self.origin = v;
        }
        if let Some(v) = var("CACHE_PREFIX") {
            self.cache_prefix = v;
        }
        if let Some(v) = var("CACHE_VERSION") {
            self.cache_version = v
                .parse()
                .with_context(|| format!("Invalid {}CACHE_VERSION: {}", ENV_PREFIX, v))?;
        }
        if let Some(v) = var("DB_NAME") {
            self.db_name = v;
        }
        if let Some(v) = var("DB_VERSION") {
            self.db_version = v
                .parse()
                .with_context(|| format!("Invalid {}DB_VERSION: {}", ENV_PREFIX, v))?;
        }
        if let Some(v) = var("STORE_ENABLED") {
            self.store_enabled = parse_flag(&v)
                .with_context(|| format!("Invalid {}STORE_ENABLED: {}", ENV_PREFIX, v))?;
        }
        if let Some(v) = var("CACHE_ON_FETCH") {
            self.cache_on_fetch = parse_flag(&v)
                .with_context(|| format!("Invalid {}CACHE_ON_FETCH: {}", ENV_PREFIX, v))?;
        }
        if let Some(v) = var("DATA_DIR") {
            self.data_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn api_base(&self) -> Result<Url> {
        parse_base(&self.api_base_url).context("Invalid api_base_url")
    }

    pub fn origin_url(&self) -> Result<Url> {
        parse_base(&self.origin).context("Invalid origin")
    }

    pub fn cache_names(&self) -> CacheNames {
        CacheNames::new(&self.cache_prefix, self.cache_version)
    }

    /// Root for everything this app writes.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn store_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("store"))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("caches"))
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("expected a boolean, got '{}'", other)),
    }
}

/// Parse a base URL, adding the trailing slash relative joins rely on.
fn parse_base(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_names().static_cache(), "mws-restaurant-static-v1");
        assert_eq!(config.db_version, 2);
        assert!(config.precache.contains(&"/".to_string()));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cache_version": 3, "store_enabled": false}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cache_version, 3);
        assert!(!config.store_enabled);
        assert_eq!(config.api_base_url, "http://localhost:1337/");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            origin: "https://restaurants.example/".to_string(),
            data_dir: Some(dir.path().join("data")),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TABLECACHE_API_BASE_URL", "http://api.local:9000"),
            ("TABLECACHE_DB_VERSION", "4"),
            ("TABLECACHE_STORE_ENABLED", "off"),
            ("TABLECACHE_DATA_DIR", "/tmp/tablecache-test"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.db_version, 4);
        assert!(!config.store_enabled);
        assert_eq!(config.api_base().unwrap().as_str(), "http://api.local:9000/");
        assert_eq!(
            config.store_dir().unwrap(),
            PathBuf::from("/tmp/tablecache-test/store")
        );
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "TABLECACHE_CACHE_VERSION").then(|| "two".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_base_urls_get_trailing_slash() {
        let config = Config {
            api_base_url: "http://api.local/v1".to_string(),
            ..Config::default()
        };
        assert_eq!(config.api_base().unwrap().as_str(), "http://api.local/v1/");
        assert_eq!(config.origin_url().unwrap().as_str(), "http://localhost:8000/");
    }
}

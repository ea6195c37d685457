use serde::{Deserialize, Serialize};

/// Prefix shared by every cache this layer owns. Caches outside it are
/// never touched by activation.
pub const DEFAULT_CACHE_PREFIX: &str = "mws-restaurant-";

/// Versioned cache names, one per purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNames {
    pub prefix: String,
    pub version: u32,
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
            version: 1,
        }
    }
}

impl CacheNames {
    pub fn new(prefix: &str, version: u32) -> Self {
        Self {
            prefix: prefix.to_string(),
            version,
        }
    }

    /// App shell: HTML, styles, scripts, icons, manifest.
    pub fn static_cache(&self) -> String {
        format!("{}static-v{}", self.prefix, self.version)
    }

    /// Restaurant photographs picked up at runtime.
    pub fn image_cache(&self) -> String {
        format!("{}content-imgs-v{}", self.prefix, self.version)
    }

    /// Caches that survive activation.
    pub fn whitelist(&self) -> Vec<String> {
        vec![self.static_cache(), self.image_cache()]
    }

    pub fn is_ours(&self, cache_name: &str) -> bool {
        cache_name.starts_with(&self.prefix)
    }
}

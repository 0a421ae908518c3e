use crate::error::{Result, VidscribeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Application configuration: engine credentials, storage root, bind address.
///
/// Loaded from an optional config file and overridden by environment
/// variables, so deployments can ship a file and still inject secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub openai_api_key: Option<String>,
    /// Base URL of the speech/chat engine. Overridable for tests.
    pub engine_base_url: String,
    pub storage_dir: PathBuf,
    /// Root directory of the filesystem-backed object store.
    pub bucket_root: PathBuf,
    pub bind_addr: String,
    /// Seconds a signed storage token stays valid.
    pub token_max_age_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            engine_base_url: "https://api.openai.com".to_string(),
            storage_dir: PathBuf::from("storage"),
            bucket_root: PathBuf::from("buckets"),
            bind_addr: "0.0.0.0:8080".to_string(),
            token_max_age_secs: 300,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Environment overrides win over the file
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("VIDSCRIBE_ENGINE_URL") {
            config.engine_base_url = url;
        }
        if let Ok(dir) = std::env::var("VIDSCRIBE_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("VIDSCRIBE_BUCKET_ROOT") {
            config.bucket_root = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("VIDSCRIBE_BIND_ADDR") {
            config.bind_addr = addr;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.is_none() {
            return Err(VidscribeError::Config(
                "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-...".to_string(),
            ));
        }
        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vidscribe").join("config.toml"))
    }
}

/// Per-tenant settings resolved by client id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub cloudfront_base_url: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            cloudfront_base_url: "media.example.com".to_string(),
        }
    }
}

/// Resolves tenant configuration by client id, falling back to the
/// `default` tenant when the id is unknown. Constructed once and passed
/// explicitly to the pipeline and server.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    tenants: HashMap<String, TenantConfig>,
}

impl TenantResolver {
    pub fn new(mut tenants: HashMap<String, TenantConfig>) -> Self {
        tenants
            .entry("default".to_string())
            .or_insert_with(TenantConfig::default);
        Self { tenants }
    }

    /// Load the tenant table from a TOML file mapping client id to settings.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let tenants: HashMap<String, TenantConfig> = toml::from_str(&contents)
            .map_err(|e| VidscribeError::Config(format!("Invalid tenant config: {e}")))?;
        Ok(Self::new(tenants))
    }

    pub fn resolve(&self, client_id: &str) -> &TenantConfig {
        self.tenants
            .get(client_id)
            .unwrap_or_else(|| &self.tenants["default"])
    }
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.token_max_age_secs, 300);
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_validate_missing_api_key() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.openai_api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tenant_fallback() {
        let mut tenants = HashMap::new();
        tenants.insert(
            "acme".to_string(),
            TenantConfig {
                cloudfront_base_url: "cdn.acme.test".to_string(),
            },
        );
        let resolver = TenantResolver::new(tenants);

        assert_eq!(resolver.resolve("acme").cloudfront_base_url, "cdn.acme.test");
        assert_eq!(
            resolver.resolve("nobody").cloudfront_base_url,
            TenantConfig::default().cloudfront_base_url
        );
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One configured upstream platform entry, as read from the providers file/env.
///
/// Expands at load time into zero or one `Credential`, zero or more `VendorModel`s, and one
/// base-URL map entry (see [`RouterConfig::expand`]). Exactly one of `api_key`/`api_key_env` must
/// resolve to a value (see [`ProviderConfig::resolved_api_key`]) — the latter lets a provider
/// entry name an environment variable to read the secret from instead of inlining it, so a
/// checked-in YAML/JSON provider file never needs to carry a literal key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub vendor: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub models: Vec<String>,
}

impl ProviderConfig {
    /// Resolves the actual credential value: an inline `api_key` wins if present, else
    /// `api_key_env` is read from the process environment, else neither was configured.
    pub fn resolved_api_key(&self) -> Result<String, ProviderKeyError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        if let Some(var) = &self.api_key_env {
            return std::env::var(var).map_err(|_| ProviderKeyError::EnvVarMissing {
                provider: self.name.clone(),
                var: var.clone(),
            });
        }
        Err(ProviderKeyError::NoKeyConfigured {
            provider: self.name.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderKeyError {
    #[error("provider '{provider}' names api_key_env '{var}' but that variable is not set")]
    EnvVarMissing { provider: String, var: String },
    #[error("provider '{provider}' has neither api_key nor api_key_env configured")]
    NoKeyConfigured { provider: String },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// An opaque bearer secret scoped to one vendor platform. Immutable once built at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub platform: String,
    pub kind: String,
    pub value: String,
}

/// An actual upstream model the router is permitted to route to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorModel {
    pub vendor: String,
    pub model: String,
}

/// The expanded, process-lifetime view `RouterConfig` reduces to: everything C5/C6 need,
/// with no further parsing required on the request path.
#[derive(Debug, Clone, Default)]
pub struct VendorRegistry {
    pub credentials: Vec<Credential>,
    pub models: Vec<VendorModel>,
    pub base_urls: HashMap<String, String>,
}

impl RouterConfig {
    /// Expands the raw provider list into the flat structures the request path consumes.
    ///
    /// A disabled provider contributes nothing. If two enabled providers name the same vendor,
    /// the last one's base URL wins and a warning is logged — providers are otherwise additive
    /// (their credentials and models both contribute). Fails fast if an enabled provider's
    /// `api_key`/`api_key_env` doesn't resolve to a value.
    pub fn expand(&self) -> Result<VendorRegistry, ProviderKeyError> {
        let mut registry = VendorRegistry::default();
        for provider in &self.providers {
            if !provider.enabled {
                continue;
            }
            if registry.base_urls.contains_key(&provider.vendor) {
                tracing::warn!(
                    vendor = %provider.vendor,
                    provider = %provider.name,
                    "overriding base URL for vendor from a later provider entry"
                );
            }
            registry
                .base_urls
                .insert(provider.vendor.clone(), provider.base_url.clone());
            registry.credentials.push(Credential {
                platform: provider.vendor.clone(),
                kind: "bearer".to_string(),
                value: provider.resolved_api_key()?,
            });
            for model in &provider.models {
                registry.models.push(VendorModel {
                    vendor: provider.vendor.clone(),
                    model: model.clone(),
                });
            }
        }
        Ok(registry)
    }
}

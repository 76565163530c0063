// Configuration Management
//
// This crate handles all configuration loading for the router. It provides:
// - Configuration structs
// - Environment variable loading
// - Default configuration values
//
// This keeps configuration concerns separate from the routing logic.

use std::env;

use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration from environment: {0}")]
    EnvError(String),
    #[error("failed to read providers file {path}: {source}")]
    ProvidersFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse providers file {path}: {source}")]
    ProvidersFileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse ROUTER_PROVIDERS_JSON: {0}")]
    ProvidersJsonParse(#[source] serde_json::Error),
    #[error("no provider configuration found: set PROVIDERS_CONFIG_PATH or ROUTER_PROVIDERS_JSON")]
    NoProviders,
}

/// Main configuration loading interface.
impl RouterConfig {
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file from the current directory first (a missing file is not an
    /// error), then reads all configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let providers = load_providers()?;
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env_or("PORT", 8080)?,
            request_timeout_secs: parse_env_or("REQUEST_TIMEOUT_SECS", 300)?,
        };
        let logging = load_logging_config();
        Ok(Self {
            providers,
            server,
            logging,
        })
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("{key}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}

fn load_providers() -> Result<Vec<ProviderConfig>, ConfigError> {
    if let Ok(path) = env::var("PROVIDERS_CONFIG_PATH") {
        let raw =
            std::fs::read_to_string(&path).map_err(|source| ConfigError::ProvidersFileRead {
                path: path.clone(),
                source,
            })?;
        let providers: Vec<ProviderConfig> =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::ProvidersFileParse {
                path,
                source,
            })?;
        return Ok(providers);
    }
    if let Ok(raw) = env::var("ROUTER_PROVIDERS_JSON") {
        let providers: Vec<ProviderConfig> =
            serde_json::from_str(&raw).map_err(ConfigError::ProvidersJsonParse)?;
        return Ok(providers);
    }
    Err(ConfigError::NoProviders)
}

fn load_logging_config() -> LoggingConfig {
    let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let mut modules = std::collections::HashMap::new();
    const PREFIX: &str = "LOG_MODULE_";
    for (key, value) in env::vars() {
        if let Some(module) = key.strip_prefix(PREFIX) {
            modules.insert(module.to_lowercase(), value);
        }
    }
    LoggingConfig {
        level,
        format,
        modules,
    }
}

/// Build the `tracing_subscriber::EnvFilter` string for this logging configuration:
/// start from the base level, append a per-module override for each configured module, in
/// insertion order is not guaranteed (HashMap), which is fine since filter directives commute.
pub fn build_filter_string(logging: &LoggingConfig) -> String {
    let mut filter = logging.level.clone();
    for (module, level) in &logging.modules {
        filter.push_str(&format!(",{module}={level}"));
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_filter_string_appends_module_overrides() {
        let mut modules = std::collections::HashMap::new();
        modules.insert("gateway".to_string(), "debug".to_string());
        let logging = LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        };
        let filter = build_filter_string(&logging);
        assert!(filter.starts_with("info"));
        assert!(filter.contains("gateway=debug"));
    }

    #[test]
    fn load_providers_from_json_env_var() {
        // SAFETY: test runs single-threaded w.r.t. this env var via serial execution within the
        // process; no other test in this crate reads ROUTER_PROVIDERS_JSON or PROVIDERS_CONFIG_PATH.
        unsafe {
            env::remove_var("PROVIDERS_CONFIG_PATH");
            env::set_var(
                "ROUTER_PROVIDERS_JSON",
                r#"[{"name":"openai-default","vendor":"openai","base_url":"https://api.openai.com/v1","api_key":"sk-test","enabled":true,"models":["gpt-4"]}]"#,
            );
        }
        let providers = load_providers().expect("providers should parse");
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].vendor, "openai");
        unsafe {
            env::remove_var("ROUTER_PROVIDERS_JSON");
        }
    }

    #[test]
    fn load_providers_errors_with_no_source_configured() {
        unsafe {
            env::remove_var("PROVIDERS_CONFIG_PATH");
            env::remove_var("ROUTER_PROVIDERS_JSON");
        }
        assert!(matches!(load_providers(), Err(ConfigError::NoProviders)));
    }
}

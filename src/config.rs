use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Instances per page served by `instances/` and related arrays
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Absolute URL of the remote model directory
    pub directory: String,
    pub request_timeout_ms: u64,
    /// Refuse uncached reads made outside a request scope
    pub strict_request_scope: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            page_size: 10,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            directory: "http://localhost:8000/slumber/".to_string(),
            request_timeout_ms: 10_000,
            strict_request_scope: false,
        }
    }
}

impl ClientConfig {
    pub fn with_directory(directory: &str) -> Self {
        Self {
            directory: directory.to_string(),
            ..Self::default()
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // e.g. SLUMBER_SERVER__PAGE_SIZE=50, SLUMBER_CLIENT__DIRECTORY=...
        config = config.add_source(
            config::Environment::with_prefix("SLUMBER")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server_address(), "127.0.0.1:8000");
        assert_eq!(config.server.page_size, 10);
        assert_eq!(config.client.directory, "http://localhost:8000/slumber/");
        assert!(!config.client.strict_request_scope);
    }

    #[test]
    fn test_with_directory_keeps_other_defaults() {
        let config = ClientConfig::with_directory("http://example.com/slumber/");
        assert_eq!(config.directory, "http://example.com/slumber/");
        assert_eq!(config.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_load_without_sources_yields_defaults() {
        let config = AppConfig::load().unwrap();
        assert!(config.server.page_size > 0);
    }
}

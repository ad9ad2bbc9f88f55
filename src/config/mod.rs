use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    /// Site origin, without a trailing slash.
    pub base_url: String,
    pub user_agent: String,
    /// Transport timeout in seconds.
    pub timeout: u64,
    /// Total attempts per public operation; 1 means no retry.
    pub retries: usize,
    /// Pause before returning an incomplete page, in milliseconds.
    pub delay_ms: u64,
    /// Server-side cap on edges per paginated request.
    pub page_limit: usize,
    /// When true, a malformed top-level page raises instead of logging and
    /// returning no data.
    pub strict_update: bool,
    /// Raw Cookie header applied to every request.
    pub cookies: Option<String>,
    pub proxy: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.instagram.com".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0"
                .to_string(),
            timeout: 30,
            retries: 1,
            delay_ms: 0,
            page_limit: 50,
            strict_update: false,
            cookies: None,
            proxy: None,
        }
    }
}

impl ClientConfig {
    /// Layers an optional `Client.toml` under `IGWEB_*` environment
    /// variables on top of the defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(File::with_name("Client").required(false))
            .add_source(Environment::with_prefix("IGWEB"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "https://www.instagram.com");
        assert_eq!(config.retries, 1);
        assert_eq!(config.page_limit, 50);
        assert!(!config.strict_update);
        assert!(config.cookies.is_none());
    }
}

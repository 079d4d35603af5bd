use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the stories service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Authorization provider configuration
    pub auth: AuthConfig,
    /// Moderator relay configuration
    pub relay: RelayConfig,
    /// Story lifecycle configuration
    #[serde(default)]
    pub stories: StoryConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Authorization provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the authorization provider API
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,
    /// Bot token embedded in the provider URL path
    pub bot_token: String,
    /// Group/channel whose administrators may upload
    pub chat_id: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Moderator relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Endpoint comments are forwarded to
    pub endpoint: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Story lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoryConfig {
    /// Retention window in hours; stories older than this are evicted
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Interval between eviction passes in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Playback cap for video stories in seconds
    #[serde(default = "default_max_video_duration_secs")]
    pub max_video_duration_secs: u64,
    /// Duration probe timeout in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

/// API configuration for the service surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "glimpse-stories".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_provider_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_retention_hours() -> u64 {
    24
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_video_duration_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "glimpse-stories")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/stories").required(false))
            .add_source(config::File::with_name("/etc/glimpse/stories").required(false))
            // Override with environment variables
            // STORIES__AUTH__BOT_TOKEN -> auth.bot_token
            .add_source(
                config::Environment::with_prefix("STORIES")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get the retention window as Duration
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stories.retention_hours as i64)
    }

    /// Get the sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stories.sweep_interval_secs)
    }

    /// Get the video playback cap in seconds
    pub fn max_video_duration_secs(&self) -> f64 {
        self.stories.max_video_duration_secs as f64
    }

    /// Get the duration probe timeout as Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.stories.probe_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_video_duration_secs: default_max_video_duration_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_retention_hours(), 24);
        assert_eq!(default_sweep_interval_secs(), 60);
        assert_eq!(default_max_video_duration_secs(), 60);
    }

    #[test]
    fn test_duration_accessors() {
        let config = Config {
            service: ServiceConfig::default(),
            auth: AuthConfig {
                provider_base_url: default_provider_base_url(),
                bot_token: "token".to_string(),
                chat_id: "-100123".to_string(),
                request_timeout_secs: 10,
            },
            relay: RelayConfig {
                endpoint: "http://localhost:9000/relay".to_string(),
                request_timeout_secs: 10,
            },
            stories: StoryConfig::default(),
            api: ApiConfig::default(),
        };

        assert_eq!(config.retention(), chrono::Duration::hours(24));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.max_video_duration_secs(), 60.0);
    }
}

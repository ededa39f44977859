use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendSettings,
    pub storage: StorageSettings,
    pub content: ContentSettings,
    pub analytics: AnalyticsSettings,
    pub flow: FlowSettings,
}

/// Where the tRPC endpoints live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/trpc".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Client storage location. No path means in-memory storage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub path: Option<PathBuf>,
}

/// Content registry source. No path means the built-in registry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    pub path: Option<PathBuf>,
}

/// Tracking sink credentials. A sink without its id runs in mock mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    pub meta_pixel_id: Option<String>,
    pub meta_access_token: Option<String>,
    pub meta_endpoint: String,
    pub ga4_measurement_id: Option<String>,
    pub ga4_api_secret: Option<String>,
    pub ga4_endpoint: String,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            meta_pixel_id: None,
            meta_access_token: None,
            meta_endpoint: "https://graph.facebook.com/v18.0".to_string(),
            ga4_measurement_id: None,
            ga4_api_secret: None,
            ga4_endpoint: "https://www.google-analytics.com/mp/collect".to_string(),
        }
    }
}

/// Timing and navigation of the quiz flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    pub auto_advance_ms: u64,
    pub redirect_delay_ms: u64,
    pub thank_you_path: String,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            auto_advance_ms: 300,
            redirect_delay_ms: 500,
            thank_you_path: "/thank-you".to_string(),
        }
    }
}

impl FlowSettings {
    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_millis(self.auto_advance_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml + APP_* overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply_env_fallbacks();
        Ok(config)
    }

    /// Conventional plain variables fill in whatever the layered sources left unset.
    fn apply_env_fallbacks(&mut self) {
        if let Ok(url) = env::var("FUNNEL_API_URL") {
            if env::var("APP_BACKEND__BASE_URL").is_err() {
                self.backend.base_url = url;
            }
        }
        if self.storage.path.is_none() {
            self.storage.path = non_empty_var("FUNNEL_STORAGE_PATH").map(PathBuf::from);
        }

        let analytics = &mut self.analytics;
        if analytics.meta_pixel_id.is_none() {
            analytics.meta_pixel_id = non_empty_var("META_PIXEL_ID");
        }
        if analytics.meta_access_token.is_none() {
            analytics.meta_access_token = non_empty_var("META_ACCESS_TOKEN");
        }
        if analytics.ga4_measurement_id.is_none() {
            analytics.ga4_measurement_id = non_empty_var("GA4_MEASUREMENT_ID");
        }
        if analytics.ga4_api_secret.is_none() {
            analytics.ga4_api_secret = non_empty_var("GA4_API_SECRET");
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

use crate::oracle::GeminiConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Service configuration, read once at startup from the environment
/// (`.env` is loaded first in dev).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    /// Base URL of the delayed-task queue service's task-creation endpoint
    pub queue_url: String,
    /// Public base URL of this service; reminder callbacks target it
    pub public_url: String,
    pub fcm_endpoint: String,
    pub fcm_server_key: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            gemini_api_key: require("GEMINI_API_KEY")?,
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| GeminiConfig::default().model),
            queue_url: require("TEMPO_QUEUE_URL")?,
            public_url: require("TEMPO_PUBLIC_URL")?
                .trim_end_matches('/')
                .to_string(),
            fcm_endpoint: std::env::var("FCM_ENDPOINT")
                .unwrap_or_else(|_| "https://fcm.googleapis.com/fcm/send".to_string()),
            fcm_server_key: require("FCM_SERVER_KEY")?,
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        })
    }

    pub fn gemini(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.gemini_api_key.clone(),
            model: self.gemini_model.clone(),
            ..GeminiConfig::default()
        }
    }

    /// Target URL for reminder delivery callbacks.
    pub fn reminder_url(&self) -> String {
        format!("{}/internal/reminders/deliver", self.public_url)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

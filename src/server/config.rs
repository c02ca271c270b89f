use std::env;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/laceup.db";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: String,
    pub max_message_length: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: 5,
            log_level: "info".to_string(),
            max_message_length: 2000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: env::var("DB_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.db_max_connections),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            max_message_length: env::var("MAX_MESSAGE_LENGTH").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.max_message_length),
        }
    }
}

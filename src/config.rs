use std::{env, fs, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

const WEATHER_KEY_PLACEHOLDER: &str = "your_openweathermap_api_key_here";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub db_source: PathBuf,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_secret_is_fallback: bool,
    pub token_ttl_seconds: u64,
    pub max_upload_bytes: usize,
    pub weather_api_key: Option<String>,
    pub weather_api_base: String,
    pub login_rate_limit_per_minute: u32,
    pub login_rate_limit_burst: u32,
    pub upload_sweep_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from `lookup`, which returns a variable's raw value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(3001);
        let bind_addr = lookup("NOTES_BIND_ADDR")
            .map(|raw| {
                raw.trim()
                    .trim_matches('"')
                    .trim_matches('\'')
                    .to_string()
            })
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], port)));

        let db_source =
            PathBuf::from(lookup("DB_SOURCE").unwrap_or_else(|| "data/notes.db".to_string()));
        let upload_dir =
            PathBuf::from(lookup("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()));

        let (jwt_secret, jwt_secret_is_fallback) = resolve_jwt_secret(&lookup);

        let token_ttl_seconds = lookup("TOKEN_TTL_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(24 * 60 * 60);

        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(25 * 1024 * 1024);

        let weather_api_key = lookup("WEATHER_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && v != WEATHER_KEY_PLACEHOLDER);

        let weather_api_base = lookup("WEATHER_API_BASE")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "https://api.openweathermap.org/data/2.5".to_string());

        let login_rate_limit_per_minute = lookup("LOGIN_RATE_LIMIT_PER_MINUTE")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let login_rate_limit_burst = lookup("LOGIN_RATE_LIMIT_BURST")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(5);

        let upload_sweep_interval = lookup("UPLOAD_SWEEP_INTERVAL_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(Some(Duration::from_secs(60 * 60)), |secs| {
                (secs > 0).then(|| Duration::from_secs(secs))
            });

        Ok(Self {
            bind_addr,
            db_source,
            upload_dir,
            jwt_secret,
            jwt_secret_is_fallback,
            token_ttl_seconds,
            max_upload_bytes,
            weather_api_key,
            weather_api_base,
            login_rate_limit_per_minute,
            login_rate_limit_burst,
            upload_sweep_interval,
        })
    }
}

fn resolve_jwt_secret(lookup: &impl Fn(&str) -> Option<String>) -> (String, bool) {
    if let Some(value) = lookup("JWT_SECRET") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return (trimmed.to_string(), false);
        }
    }

    if let Some(secret_file) = lookup("JWT_SECRET_FILE") {
        match fs::read_to_string(&secret_file) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return (trimmed.to_string(), false);
                }
                warn!(file = %secret_file, "JWT_SECRET_FILE is empty; falling back to generated secret");
            }
            Err(err) => {
                warn!(file = %secret_file, "Failed reading JWT_SECRET_FILE: {err}; falling back to generated secret");
            }
        }
    }

    let generated = format!("fallback-{}-{}", Uuid::new_v4(), Uuid::new_v4());
    (generated, true)
}

#[cfg(test)]
impl Config {
    pub fn for_tests(db_source: PathBuf, upload_dir: PathBuf) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            db_source,
            upload_dir,
            jwt_secret: "test-secret".to_string(),
            jwt_secret_is_fallback: false,
            token_ttl_seconds: 3600,
            max_upload_bytes: 1024 * 1024,
            weather_api_key: None,
            weather_api_base: "http://127.0.0.1:9".to_string(),
            login_rate_limit_per_minute: 60,
            login_rate_limit_burst: 60,
            upload_sweep_interval: None,
        }
    }
}

use crate::http::MAX_HISTORY_LIMIT;
use crate::monitor::{ThresholdPolicy, DEFAULT_ALERT_COOLDOWN_SECS, DEFAULT_ALERT_HISTORY_LIMIT};
use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TOPIC: &str = "coldstorage/live";

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_pool_size: u32,
    pub db_timeout_ms: u64,
    pub http_bind: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic: String,
    pub mqtt_client_id: String,
    pub mqtt_keepalive_secs: u64,
    pub mqtt_connect_timeout_secs: u64,
    pub persist_mqtt_readings: bool,
    pub alert_cooldown_secs: u64,
    pub alert_history_limit: usize,
    pub history_limit: u32,
    pub policy_path: Option<PathBuf>,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let parsed = |key: &str| var(key).and_then(|v| v.parse::<u64>().ok());

        let database_url = var("COLDSTORE_DATABASE_URL")
            .or_else(|| var("DATABASE_URL"))
            .context("COLDSTORE_DATABASE_URL or DATABASE_URL is required")?;

        let db_pool_size = parsed("COLDSTORE_DB_POOL_SIZE")
            .map(|v| v as u32)
            .filter(|v| *v > 0)
            .unwrap_or(5);
        let db_timeout_ms = parsed("COLDSTORE_DB_TIMEOUT_MS")
            .filter(|v| *v > 0)
            .unwrap_or(5000);
        let http_bind = var("COLDSTORE_HTTP_BIND").unwrap_or_else(|| "0.0.0.0:5000".to_string());

        let mqtt_host = var("COLDSTORE_MQTT_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let mqtt_port = var("COLDSTORE_MQTT_PORT")
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(1883);
        let mqtt_username = var("COLDSTORE_MQTT_USERNAME");
        let mqtt_password = var("COLDSTORE_MQTT_PASSWORD");
        let mqtt_topic = var("COLDSTORE_MQTT_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let mqtt_client_id = var("COLDSTORE_MQTT_CLIENT_ID")
            .unwrap_or_else(|| format!("coldstore-monitor-{}", std::process::id()));
        let mqtt_keepalive_secs = parsed("COLDSTORE_MQTT_KEEPALIVE_SECS")
            .filter(|v| *v >= 5)
            .unwrap_or(60);
        let mqtt_connect_timeout_secs = parsed("COLDSTORE_MQTT_CONNECT_TIMEOUT_SECS")
            .filter(|v| *v > 0)
            .unwrap_or(10);
        let persist_mqtt_readings = var("COLDSTORE_PERSIST_MQTT")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let alert_cooldown_secs =
            parsed("COLDSTORE_ALERT_COOLDOWN_SECS").unwrap_or(DEFAULT_ALERT_COOLDOWN_SECS);
        let alert_history_limit = var("COLDSTORE_ALERT_HISTORY_LIMIT")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_ALERT_HISTORY_LIMIT);
        let history_limit = var("COLDSTORE_HISTORY_LIMIT")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .map(|v| v.min(MAX_HISTORY_LIMIT))
            .unwrap_or(MAX_HISTORY_LIMIT);
        let policy_path = var("COLDSTORE_POLICY_PATH").map(PathBuf::from);
        let otlp_endpoint = var("OTEL_EXPORTER_OTLP_ENDPOINT");

        Ok(Self {
            database_url,
            db_pool_size,
            db_timeout_ms,
            http_bind,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic,
            mqtt_client_id,
            mqtt_keepalive_secs,
            mqtt_connect_timeout_secs,
            persist_mqtt_readings,
            alert_cooldown_secs,
            alert_history_limit,
            history_limit,
            policy_path,
            otlp_endpoint,
        })
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }

    pub fn mqtt_keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keepalive_secs)
    }

    pub fn mqtt_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.mqtt_connect_timeout_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    /// The policy file when configured, otherwise the built-in unit rules.
    pub fn threshold_policy(&self) -> Result<ThresholdPolicy> {
        match &self.policy_path {
            Some(path) => ThresholdPolicy::load(path),
            None => Ok(ThresholdPolicy::default()),
        }
    }
}

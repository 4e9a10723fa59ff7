use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::LivetrackError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_duration(profile: &str, key: &str, default: Duration) -> Duration {
    match profiled_env_opt(profile, key) {
        None => default,
        Some(raw) => parse_duration(&raw).unwrap_or_else(|e| {
            tracing::warn!(key, value = %raw, error = %e, "invalid duration, using default");
            default
        }),
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub trackers: TrackerConfig,
    pub scheduler: SchedulerConfig,
    pub telegram: TelegramConfig,
    pub broadcast: BroadcastConfig,
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `LIVETRACK_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("LIVETRACK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            trackers: TrackerConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            telegram: TelegramConfig::from_env_profiled(p),
            broadcast: BroadcastConfig::from_env_profiled(p),
            shutdown_timeout: profiled_env_duration(p, "SHUTDOWN_TIMEOUT", Duration::from_secs(10)),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!("  postgres:    host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!("  trackers:    spot={}, garmin={}", self.trackers.spot_base_url, self.trackers.garmin_base_url);
        tracing::info!(
            "  scheduler:   interval={:?}, reset='{}', org={}",
            self.scheduler.fetch_interval,
            self.scheduler.reset_cron,
            self.scheduler.organization.as_deref().unwrap_or("(all)")
        );
        tracing::info!(
            "  telegram:    channel={}, configured={}",
            self.telegram.channel.as_deref().unwrap_or("(none)"),
            self.telegram.is_configured()
        );
        tracing::info!(
            "  broadcast:   channel={}, mailbox={}, heartbeat={:?}",
            self.broadcast.notify_channel,
            self.broadcast.mailbox_capacity,
            self.broadcast.heartbeat
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    /// Number of days returned by the dates endpoint.
    pub dates_limit: u32,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8080),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
            dates_limit: profiled_env_u32(p, "DATES_LIMIT", 5),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "tracking"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "disable"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Tracker feeds ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub spot_base_url: String,
    pub garmin_base_url: String,
    pub http_timeout: Duration,
}

impl TrackerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            spot_base_url: profiled_env_or(
                p,
                "SPOT_BASE_URL",
                "https://api.findmespot.com/spot-main-web/consumer/rest-api/2.0/public/feed",
            ),
            garmin_base_url: profiled_env_or(p, "GARMIN_BASE_URL", "https://share.garmin.com/Feed/Share"),
            http_timeout: profiled_env_duration(p, "TRACKER_HTTP_TIMEOUT", Duration::from_secs(5)),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub fetch_interval: Duration,
    /// Delay after each pilot within one fetch cycle.
    pub pacing: Duration,
    /// Daily reset schedule, 5- or 6-field cron in local time.
    pub reset_cron: String,
    /// Restrict the roster to pilots of this organization.
    pub organization: Option<String>,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            fetch_interval: profiled_env_duration(p, "FETCH_INTERVAL", Duration::from_secs(240)),
            pacing: profiled_env_duration(p, "FETCH_PACING", Duration::from_secs(5)),
            reset_cron: profiled_env_or(p, "RESET_CRON", "0 0 * * *"),
            organization: profiled_env_opt(p, "ORGANIZATION"),
        }
    }
}

// ── Telegram / notifications ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Channel username, e.g. `@my_channel`.
    pub channel: Option<String>,
    /// Bot token; `${VAR}` resolves from the environment.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub api_url: String,
    /// Dashboard URL used in livetrack links.
    pub livetrack_endpoint: String,
    pub itinerary_api_url: String,
}

impl TelegramConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            channel: profiled_env_opt(p, "TELEGRAM_CHANNEL"),
            token: profiled_env_opt(p, "TELEGRAM_TOKEN"),
            api_url: profiled_env_or(p, "TELEGRAM_API_URL", "https://api.telegram.org"),
            livetrack_endpoint: profiled_env_or(p, "LIVETRACK_ENDPOINT", "https://livetrack.fahy.xyz/"),
            itinerary_api_url: profiled_env_or(
                p,
                "ITINERARY_API_URL",
                "https://timetable.search.ch/api/route.json",
            ),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.channel.is_some() && self.token.is_some()
    }

    /// Channel and token, or a configuration error naming the missing key.
    pub fn credentials(&self) -> Result<(&str, &str), LivetrackError> {
        let channel = self
            .channel
            .as_deref()
            .ok_or_else(|| LivetrackError::Config("TELEGRAM_CHANNEL is not set".into()))?;
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| LivetrackError::Config("TELEGRAM_TOKEN is not set".into()))?;
        Ok((channel, token))
    }
}

// ── Broadcast (SSE fan-out) ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Store notification channel to LISTEN on.
    pub notify_channel: String,
    pub mailbox_capacity: usize,
    pub heartbeat: Duration,
    pub min_reconnect: Duration,
    pub max_reconnect: Duration,
}

impl BroadcastConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            notify_channel: profiled_env_or(p, "NOTIFY_CHANNEL", "new_track_data"),
            mailbox_capacity: profiled_env_usize(p, "SSE_MAILBOX_CAPACITY", 16).max(1),
            heartbeat: profiled_env_duration(p, "SSE_HEARTBEAT", Duration::from_secs(10)),
            min_reconnect: profiled_env_duration(p, "LISTENER_MIN_BACKOFF", Duration::from_secs(10)),
            max_reconnect: profiled_env_duration(p, "LISTENER_MAX_BACKOFF", Duration::from_secs(30)),
        }
    }
}

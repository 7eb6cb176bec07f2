use std::time::Duration;

/// Runtime configuration, sourced from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Presence store location. Unset means a single-process in-memory store.
    pub redis_url: Option<String>,
    /// Secret for keyed room hashing. Unset falls back to plain SHA-256.
    pub room_hash_secret: Option<String>,
    /// Development mode keeps room keys equal to raw tokens for debugging.
    pub dev_passthrough_hashing: bool,
    pub heartbeat: HeartbeatConfig,
    pub reaper: ReaperConfig,
}

/// Transport liveness settings for client connections.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// How often the server pings each connection.
    pub ping_interval: Duration,
    /// Grace period past the interval before a silent connection is dropped.
    pub ping_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(20_000),
            ping_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Settings for the background task that evicts inactive rooms.
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// How often the reaper scans the store.
    pub interval: Duration,
    /// Rooms idle longer than this are evicted.
    pub inactivity_threshold: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1800),
            inactivity_threshold: Duration::from_secs(86_400),
        }
    }
}

impl ServerConfig {
    /// Reads configuration from environment variables, applying defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3001);

        let redis_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty());

        let room_hash_secret = std::env::var("ROOM_HASH_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let dev_passthrough_hashing = std::env::var("APP_ENV")
            .map(|v| v == "development")
            .unwrap_or(false);

        let ping_interval = std::env::var("PING_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(HeartbeatConfig::default().ping_interval);

        let ping_timeout = std::env::var("PING_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(HeartbeatConfig::default().ping_timeout);

        let reap_interval = std::env::var("REAP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(ReaperConfig::default().interval);

        let inactivity_threshold = std::env::var("ROOM_INACTIVITY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(ReaperConfig::default().inactivity_threshold);

        Self {
            port,
            redis_url,
            room_hash_secret,
            dev_passthrough_hashing,
            heartbeat: HeartbeatConfig {
                ping_interval,
                ping_timeout,
            },
            reaper: ReaperConfig {
                interval: reap_interval,
                inactivity_threshold,
            },
        }
    }
}

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub google_places_api_key: String,
    pub notify_url: String,
    /// Radius used when querying the places provider for bars, meters.
    pub bar_search_radius: f64,
    /// Default matching radius stored on newly created groups, meters.
    pub default_search_radius: f64,
    pub max_search_radius: f64,
    /// Fallback center when the client provides no usable location.
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub default_location_name: String,
    pub reaper_interval_secs: u64,
    /// Waiting groups older than this are candidates for dissolution, hours.
    pub stale_group_age_hours: u64,
    /// A group with no participant heartbeat within this window is idle, hours.
    pub participant_idle_hours: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            rate_limit_window_secs: env_or("RATE_LIMIT_WINDOW", 60),
            rate_limit_requests: env_or("RATE_LIMIT_REQUESTS", 100),
            google_places_api_key: env::var("GOOGLE_PLACES_API_KEY")?,
            notify_url: env::var("NOTIFY_URL")?,
            bar_search_radius: env_or("BAR_SEARCH_RADIUS", 8000.0),
            default_search_radius: env_or("DEFAULT_SEARCH_RADIUS", 10000.0),
            max_search_radius: env_or("MAX_SEARCH_RADIUS", 25000.0),
            default_latitude: env_or("DEFAULT_LATITUDE", 48.8566),
            default_longitude: env_or("DEFAULT_LONGITUDE", 2.3522),
            default_location_name: env::var("DEFAULT_LOCATION_NAME")
                .unwrap_or_else(|_| "Paris".to_string()),
            reaper_interval_secs: env_or("REAPER_INTERVAL", 900),
            stale_group_age_hours: env_or("STALE_GROUP_AGE_HOURS", 24),
            participant_idle_hours: env_or("PARTICIPANT_IDLE_HOURS", 3),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn stale_group_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stale_group_age_hours as i64)
    }

    pub fn participant_idle_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.participant_idle_hours as i64)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

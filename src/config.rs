use std::env;
use std::time::Duration;

/// Engine tunables. Everything except the API base URL has a default that
/// matches production behavior.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub api_base_url: String,
    /// Roster cache entries older than this are treated as misses.
    pub roster_ttl: Duration,
    /// Holiday lookups are cached this long.
    pub holiday_ttl: Duration,
    /// Rows revealed immediately after a load.
    pub display_window: usize,
    /// Rows added per pacing tick.
    pub display_increment: usize,
    /// Delay between pacing ticks.
    pub reveal_delay: Duration,
    /// Capacity of the domain event bus.
    pub event_capacity: usize,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let api_base_url = env::var("ATTENDANCE_API_BASE_URL")
            .map_err(|_| "ATTENDANCE_API_BASE_URL must be set".to_string())?;

        Ok(Self {
            api_base_url,
            roster_ttl: Duration::from_secs(env_or("ROSTER_CACHE_TTL_SECS", 300)),
            holiday_ttl: Duration::from_secs(env_or("HOLIDAY_CACHE_TTL_SECS", 3600)),
            display_window: env_or("DISPLAY_WINDOW", 30) as usize,
            display_increment: env_or("DISPLAY_INCREMENT", 30) as usize,
            reveal_delay: Duration::from_millis(env_or("REVEAL_DELAY_MS", 200)),
            event_capacity: env_or("EVENT_BUS_CAPACITY", 64) as usize,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            roster_ttl: Duration::from_secs(300),
            holiday_ttl: Duration::from_secs(3600),
            display_window: 30,
            display_increment: 30,
            reveal_delay: Duration::from_millis(200),
            event_capacity: 64,
        }
    }
}

fn env_or(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

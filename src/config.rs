use std::env;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use crate::gateway::parse_ymd;

pub const DEFAULT_SCOREBOARD_HOST: &str = "https://site.api.espn.com/apis/site/v2/sports";
pub const DEFAULT_STANDINGS_HOST: &str = "https://site.api.espn.com/apis/v2/sports";
pub const DEFAULT_LEAGUE: &str = "eng1";

const LIVE_POLL_MS: u64 = 10_000;
const IDLE_POLL_MS: u64 = 60_000;
const ERROR_POLL_MS: u64 = 5_000;
const MIN_POLL_MS: u64 = 1_000;

/// Poll delays picked by the live poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub live: Duration,
    pub idle: Duration,
    pub error: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            live: Duration::from_millis(LIVE_POLL_MS),
            idle: Duration::from_millis(IDLE_POLL_MS),
            error: Duration::from_millis(ERROR_POLL_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub scoreboard_host: String,
    pub standings_host: String,
    pub http_timeout: Duration,
    pub cadence: Cadence,
    pub league: String,
    pub date: NaiveDate,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            scoreboard_host: DEFAULT_SCOREBOARD_HOST.to_string(),
            standings_host: DEFAULT_STANDINGS_HOST.to_string(),
            http_timeout: Duration::from_secs(10),
            cadence: Cadence::default(),
            league: DEFAULT_LEAGUE.to_string(),
            date: Utc::now().date_naive(),
        }
    }
}

impl FeedConfig {
    /// Reads `FEED_*` variables. Callers load `.env` files beforehand.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let http_timeout = Duration::from_secs(
            env::var("FEED_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(10)
                .clamp(1, 60),
        );
        let cadence = Cadence {
            live: poll_ms_env("FEED_LIVE_POLL_MS", LIVE_POLL_MS),
            idle: poll_ms_env("FEED_IDLE_POLL_MS", IDLE_POLL_MS),
            error: poll_ms_env("FEED_ERROR_POLL_MS", ERROR_POLL_MS),
        };
        let date = env::var("FEED_DATE")
            .ok()
            .and_then(|val| parse_ymd(&val))
            .unwrap_or(defaults.date);

        Self {
            scoreboard_host: host_env("FEED_SCOREBOARD_HOST").unwrap_or(defaults.scoreboard_host),
            standings_host: host_env("FEED_STANDINGS_HOST").unwrap_or(defaults.standings_host),
            http_timeout,
            cadence,
            league: env::var("FEED_LEAGUE")
                .ok()
                .map(|val| val.trim().to_lowercase())
                .filter(|val| !val.is_empty())
                .unwrap_or(defaults.league),
            date,
        }
    }
}

fn poll_ms_env(key: &str, default: u64) -> Duration {
    Duration::from_millis(
        env::var(key)
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(default)
            .max(MIN_POLL_MS),
    )
}

fn host_env(key: &str) -> Option<String> {
    let val = env::var(key).ok()?;
    let trimmed = val.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

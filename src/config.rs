//! Server configuration loaded from the environment.
//!
//! Every setting has a default; missing or malformed variables are logged
//! and fall back to it.

use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::db::default_db_path;

/// Start of the first strike report week: Sunday 2016-01-10 00:00 PST
pub const DEFAULT_STRIKE_EPOCH: &str = "2016-01-10T00:00:00-08:00";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    /// Base URL of the member service and its sign-in portal
    pub members_url: String,
    /// Address prefixes allowed to use the sign-in form; empty allows all
    pub signin_ip_whitelist: Vec<String>,
    pub strike_epoch: DateTime<FixedOffset>,
    pub strike_min_hours: f64,
    /// Inactivity timeout of browser sessions
    pub session_expiry_secs: i64,
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();
        let db_path = var("HOURS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let strike_epoch = var("HOURS_STRIKE_EPOCH")
            .ok()
            .and_then(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| warn!("Invalid HOURS_STRIKE_EPOCH value: {e}"))
                    .ok()
            })
            .unwrap_or(defaults.strike_epoch);

        Self {
            port: try_load("HOURS_PORT", defaults.port),
            db_path,
            members_url: try_load("HOURS_MEMBERS_URL", defaults.members_url),
            signin_ip_whitelist: parse_whitelist(&var("HOURS_SIGNIN_IP_WHITELIST").unwrap_or_default()),
            strike_epoch,
            strike_min_hours: try_load("HOURS_STRIKE_MIN_HOURS", defaults.strike_min_hours),
            session_expiry_secs: try_load("HOURS_SESSION_EXPIRY_SECS", defaults.session_expiry_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 9000,
            db_path: default_db_path(),
            members_url: "http://localhost:9001".to_string(),
            signin_ip_whitelist: Vec::new(),
            strike_epoch: default_strike_epoch(),
            strike_min_hours: 5.0,
            session_expiry_secs: 3600,
        }
    }
}

fn default_strike_epoch() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(DEFAULT_STRIKE_EPOCH).unwrap_or_default()
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not set");
    })
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Ok(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };

    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value: {e}, using default: {default}");
        default
    })
}

/// Split a comma-separated list of address prefixes
pub fn parse_whitelist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .collect()
}

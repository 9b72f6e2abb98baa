//! Process configuration from `SHOPKEEP_*` environment variables.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;
use tracing::warn;

use shopkeep_core::UserId;

/// Longest accepted duration setting.
const MAX_SPAN_DAYS: i64 = 365;

/// Largest accepted buffer or capacity setting.
const MAX_CAPACITY: usize = 1_000_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub admins: BTreeSet<UserId>,
    /// Idle time after which a chat session is discarded.
    pub session_timeout: TimeDelta,
    /// How long `/checkout` holds stock waiting for `/confirm`.
    pub checkout_hold: TimeDelta,
    /// How long a Pending order keeps its stock before it is cancelled.
    pub order_timeout: TimeDelta,
    pub subscriber_buffer: usize,
    pub event_log_capacity: usize,
    pub outbox_capacity: usize,
    pub maintenance_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            admins: BTreeSet::new(),
            session_timeout: TimeDelta::seconds(1800),
            checkout_hold: TimeDelta::seconds(600),
            order_timeout: TimeDelta::hours(24),
            subscriber_buffer: 256,
            event_log_capacity: 200,
            outbox_capacity: 500,
            maintenance_interval: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables take their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind = match get("SHOPKEEP_BIND") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("SHOPKEEP_BIND", &v, e))?,
            None => defaults.bind,
        };

        let admins = match get("SHOPKEEP_ADMIN_IDS") {
            Some(v) => parse_admins(&v)?,
            None => BTreeSet::new(),
        };
        if admins.is_empty() {
            warn!("SHOPKEEP_ADMIN_IDS not set; admin commands are disabled");
        }

        let span = |var: &'static str, default: TimeDelta, unit: fn(i64) -> Option<TimeDelta>| {
            duration(var, get(var), default, unit)
        };
        let capacity = |var: &'static str, default: usize| count(var, get(var), default);

        let config = Self {
            bind,
            admins,
            session_timeout: span(
                "SHOPKEEP_SESSION_TIMEOUT_SECS",
                defaults.session_timeout,
                TimeDelta::try_seconds,
            )?,
            checkout_hold: span(
                "SHOPKEEP_CHECKOUT_HOLD_SECS",
                defaults.checkout_hold,
                TimeDelta::try_seconds,
            )?,
            order_timeout: span(
                "SHOPKEEP_ORDER_TIMEOUT_HOURS",
                defaults.order_timeout,
                TimeDelta::try_hours,
            )?,
            subscriber_buffer: capacity("SHOPKEEP_SUBSCRIBER_BUFFER", defaults.subscriber_buffer)?,
            event_log_capacity: capacity("SHOPKEEP_EVENT_LOG_CAPACITY", defaults.event_log_capacity)?,
            outbox_capacity: capacity("SHOPKEEP_OUTBOX_CAPACITY", defaults.outbox_capacity)?,
            maintenance_interval: span(
                "SHOPKEEP_MAINTENANCE_INTERVAL_SECS",
                TimeDelta::seconds(defaults.maintenance_interval.as_secs() as i64),
                TimeDelta::try_seconds,
            )?
            .to_std()
            .unwrap_or(defaults.maintenance_interval),
        };

        if config.checkout_hold >= config.session_timeout {
            warn!(
                checkout_hold_secs = config.checkout_hold.num_seconds(),
                session_timeout_secs = config.session_timeout.num_seconds(),
                "checkout hold outlives the session; idle sessions will release holds early"
            );
        }
        Ok(config)
    }
}

fn parse_admins(value: &str) -> Result<BTreeSet<UserId>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<UserId>()
                .map_err(|e| ConfigError::invalid("SHOPKEEP_ADMIN_IDS", value, e))
        })
        .collect()
}

fn positive(var: &'static str, value: &str) -> Result<i64, ConfigError> {
    match value.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::invalid(var, value, "must be positive")),
        Err(e) => Err(ConfigError::invalid(var, value, e)),
    }
}

/// A positive duration of at most [`MAX_SPAN_DAYS`], in the unit `unit` builds.
fn duration(
    var: &'static str,
    value: Option<String>,
    default: TimeDelta,
    unit: fn(i64) -> Option<TimeDelta>,
) -> Result<TimeDelta, ConfigError> {
    let Some(v) = value else { return Ok(default) };
    let n = positive(var, &v)?;
    match unit(n) {
        Some(span) if span.num_days() <= MAX_SPAN_DAYS => Ok(span),
        _ => Err(ConfigError::invalid(
            var,
            &v,
            format!("must be at most {MAX_SPAN_DAYS} days"),
        )),
    }
}

fn count(var: &'static str, value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    let Some(v) = value else { return Ok(default) };
    let n = positive(var, &v)?;
    match usize::try_from(n) {
        Ok(n) if n <= MAX_CAPACITY => Ok(n),
        _ => Err(ConfigError::invalid(var, &v, format!("must be at most {MAX_CAPACITY}"))),
    }
}

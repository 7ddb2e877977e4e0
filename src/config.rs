use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::geo::DEFAULT_PROXIMITY_THRESHOLD_METERS;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// Distance at or under which a driver counts as being at the destination.
    pub proximity_threshold_meters: f64,
    pub location_notification_window: Duration,
    pub notification_queue_size: usize,
    pub event_buffer_size: usize,
    pub transition_max_retries: u32,
    pub resolver_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            proximity_threshold_meters: DEFAULT_PROXIMITY_THRESHOLD_METERS,
            location_notification_window: Duration::from_secs(30 * 60),
            notification_queue_size: 1024,
            event_buffer_size: 1024,
            transition_max_retries: 3,
            resolver_timeout: Duration::from_millis(2000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            proximity_threshold_meters: parse_or_default(
                "PROXIMITY_THRESHOLD_METERS",
                defaults.proximity_threshold_meters,
            )?,
            location_notification_window: Duration::from_secs(parse_or_default(
                "LOCATION_NOTIFICATION_WINDOW_SECS",
                defaults.location_notification_window.as_secs(),
            )?),
            notification_queue_size: parse_or_default(
                "NOTIFICATION_QUEUE_SIZE",
                defaults.notification_queue_size,
            )?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            transition_max_retries: parse_or_default(
                "TRANSITION_MAX_RETRIES",
                defaults.transition_max_retries,
            )?,
            resolver_timeout: Duration::from_millis(parse_or_default(
                "RESOLVER_TIMEOUT_MS",
                defaults.resolver_timeout.as_millis() as u64,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.proximity_threshold_meters.is_finite() || self.proximity_threshold_meters <= 0.0 {
            return Err(AppError::Internal(format!(
                "invalid PROXIMITY_THRESHOLD_METERS: {} (must be > 0)",
                self.proximity_threshold_meters
            )));
        }
        if self.notification_queue_size == 0 {
            return Err(AppError::Internal(
                "invalid NOTIFICATION_QUEUE_SIZE: must be > 0".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

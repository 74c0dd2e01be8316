// src/config.rs
use anyhow::{anyhow, Result};
use chrono::{Datelike, Utc};
use chrono_tz::US::Eastern;
use log::{info, warn};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;
use crate::models::QuarterMode;
use crate::services::fetch::{FileMarkupSource, HttpMarkupSource, MarkupSource, RetryPolicy};
use crate::services::table::TableSettings;

/// Process-wide settings, resolved once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub quarter_mode: QuarterMode,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub proximity_px: f64,
    pub snapshot_base_url: Option<String>,
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: 3030,
            quarter_mode: QuarterMode::Forecast,
            concurrency: 3,
            retry: RetryPolicy::default(),
            proximity_px: 50.0,
            snapshot_base_url: None,
            snapshot_dir: None,
        }
    }
}

fn parse_or_default<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("invalid {} '{}': {}", name, raw, e)),
        None => {
            warn!("${} not set, defaulting to {}", name, default);
            Ok(default)
        }
    }
}

impl AppConfig {
    /// Reads settings from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self> {
        if dotenv::dotenv().is_ok() {
            info!("Loaded .env file");
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let mode_name = parse_or_default(&lookup, "QUARTER_MODE", "forecast".to_string())?;
        let quarter_mode = mode_name.parse::<QuarterMode>().map_err(|e| anyhow!(e))?;
        let concurrency = parse_or_default(&lookup, "CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(anyhow!("invalid CONCURRENCY '0': must be at least 1"));
        }
        let attempts = parse_or_default(&lookup, "FETCH_RETRIES", defaults.retry.attempts)?;
        let delay_secs = parse_or_default(
            &lookup,
            "FETCH_RETRY_DELAY_SECS",
            defaults.retry.delay.as_secs(),
        )?;
        let proximity_px = parse_or_default(&lookup, "PROXIMITY_PX", defaults.proximity_px)?;
        if !proximity_px.is_finite() || proximity_px <= 0.0 {
            return Err(anyhow!("invalid PROXIMITY_PX '{}': must be positive", proximity_px));
        }

        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let config = AppConfig {
            port: parse_or_default(&lookup, "PORT", defaults.port)?,
            quarter_mode,
            concurrency,
            retry: RetryPolicy {
                attempts: attempts.max(1),
                delay: Duration::from_secs(delay_secs),
            },
            proximity_px,
            snapshot_base_url: non_empty("SNAPSHOT_BASE_URL"),
            snapshot_dir: non_empty("SNAPSHOT_DIR").map(PathBuf::from),
        };
        info!("Using configuration: {:?}", config);
        Ok(config)
    }

    pub fn table_settings(&self, current_year: i32) -> TableSettings {
        TableSettings::new(self.proximity_px, current_year)
    }

    /// The snapshot service when configured, else the snapshot directory.
    pub fn markup_source(&self) -> Result<Arc<dyn MarkupSource>, FetchError> {
        if let Some(url) = &self.snapshot_base_url {
            info!("Reading markup from snapshot service {}", url);
            return Ok(Arc::new(HttpMarkupSource::new(url)?));
        }
        if let Some(dir) = &self.snapshot_dir {
            info!("Reading markup from {}", dir.display());
            return Ok(Arc::new(FileMarkupSource::new(dir.clone())));
        }
        Err(FetchError::Unconfigured)
    }
}

/// Calendar year on the US/Eastern market clock.
pub fn current_market_year() -> i32 {
    Utc::now().with_timezone(&Eastern).year()
}

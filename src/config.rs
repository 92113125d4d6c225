/// config.rs – Load settings from config.yaml + environment variables.
///
/// Environment variables always override YAML values.
/// Backing-store credentials are read exclusively from the environment / .env file.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::HALT_THRESHOLD;
use crate::refresh::FetchLimits;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub log_level: String,
    /// Seconds between automatic refresh cycles.
    pub refresh_interval_seconds: f64,
    /// Most recent trade events to hold.
    pub trade_limit: usize,
    /// Most recent system-log events to hold.
    pub log_limit: usize,
    /// Risk scores strictly above this show the halt banner.
    pub halt_threshold: i32,
    /// Where logs go while the terminal UI owns the screen. Unset = dropped.
    pub log_file: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
            refresh_interval_seconds: 15.0,
            trade_limit: 50,
            log_limit: 200,
            halt_threshold: HALT_THRESHOLD,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Read the schema from a local SQLite file instead of the network.
    pub sqlite_path: Option<String>,
    /// Per-request timeout for the HTTP store. 0 disables the timeout.
    pub request_timeout_seconds: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Dashboard redraw rate in seconds.
    pub refresh_rate: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { refresh_rate: 1.0 }
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorConfig,
    pub store: StoreConfig,
    pub dashboard: DashboardConfig,

    // Backing-store endpoint – populated from env, not from YAML.
    #[serde(skip)]
    pub supabase_url: Option<String>,
    #[serde(skip)]
    pub supabase_key: Option<String>,
}

/// Which backing store the dashboard reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Sqlite(String),
    Supabase { url: String, key: String },
    /// Nothing configured: no network, placeholder data only.
    Offline,
}

impl Settings {
    /// Load settings from *config_path* YAML file, then overlay env vars.
    pub fn load(config_path: &str) -> Result<Self> {
        // Try to load .env file (ignore error if absent)
        let _ = dotenvy::dotenv();

        let mut settings = if std::path::Path::new(config_path).exists() {
            let yaml = std::fs::read_to_string(config_path).context("reading config file")?;
            serde_yaml::from_str::<Settings>(&yaml).context("parsing config YAML")?
        } else {
            Settings::default()
        };

        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.supabase_url = var("SUPABASE_URL").filter(|v| !v.trim().is_empty());
        self.supabase_key = var("SUPABASE_KEY").filter(|v| !v.trim().is_empty());

        if let Some(level) = var("LOG_LEVEL") {
            self.monitor.log_level = level;
        }
        if let Some(val) = var("REFRESH_INTERVAL_SECONDS") {
            self.monitor.refresh_interval_seconds = val
                .trim()
                .parse()
                .with_context(|| format!("REFRESH_INTERVAL_SECONDS='{val}' is not a number"))?;
        }
        if let Some(path) = var("SQLITE_PATH").filter(|v| !v.trim().is_empty()) {
            self.store.sqlite_path = Some(path);
        }
        Ok(())
    }

    /// Both halves of the endpoint are needed; either one alone is ignored.
    pub fn store_target(&self) -> StoreTarget {
        if let Some(path) = &self.store.sqlite_path {
            return StoreTarget::Sqlite(path.clone());
        }
        match (&self.supabase_url, &self.supabase_key) {
            (Some(url), Some(key)) => StoreTarget::Supabase {
                url: url.clone(),
                key: key.clone(),
            },
            _ => StoreTarget::Offline,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitor.refresh_interval_seconds)
    }

    pub fn redraw_interval(&self) -> Duration {
        Duration::from_secs_f64(self.dashboard.refresh_rate)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.store.request_timeout_seconds > 0.0)
            .then(|| Duration::from_secs_f64(self.store.request_timeout_seconds))
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            trades: self.monitor.trade_limit,
            logs: self.monitor.log_limit,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_positive(
            "monitor.refresh_interval_seconds",
            self.monitor.refresh_interval_seconds,
        )?;
        validate_positive("dashboard.refresh_rate", self.dashboard.refresh_rate)?;

        if self.monitor.trade_limit == 0 {
            bail!("monitor.trade_limit must be > 0");
        }
        if self.monitor.log_limit == 0 {
            bail!("monitor.log_limit must be > 0");
        }
        if !(0..=100).contains(&self.monitor.halt_threshold) {
            bail!("monitor.halt_threshold must be in [0, 100]");
        }
        if !self.store.request_timeout_seconds.is_finite()
            || self.store.request_timeout_seconds < 0.0
        {
            bail!("store.request_timeout_seconds must be a finite number >= 0");
        }
        if let Some(url) = &self.supabase_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                bail!("SUPABASE_URL must start with http:// or https://");
            }
        }

        Ok(())
    }
}

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{name} must be a finite number > 0");
    }
    Ok(())
}

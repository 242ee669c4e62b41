//! Configuration loading and management.
//!
//! Loads configuration from `~/.daybook/config.toml` (or
//! `$DAYBOOK_CONFIG_PATH`). Environment variables override file values; file
//! values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::Account;

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path. Required; an empty value fails fast at startup.
    pub database_path: String,
    /// Tracing log level filter (`debug`, `info`, `warning`, `error`).
    pub log_level: String,
    /// Directory for rotated JSON log files.
    pub logs_dir: String,
    /// Minimum parse confidence for autonomous task extraction, in `[0, 1]`.
    pub confidence_threshold: f64,
    /// Name of the single calendar the agent is allowed to mutate.
    pub managed_calendar: String,
    /// Sender/domain substrings treated as trusted by the parser.
    pub trusted_senders: Vec<String>,
    /// Planner constraints.
    pub planner: PlannerConfig,
    /// Adaptive sync cadence.
    pub sync: SyncConfig,
    /// Configured mail accounts.
    #[serde(rename = "accounts")]
    pub accounts: Vec<AccountConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            log_level: "info".to_owned(),
            logs_dir: String::new(),
            confidence_threshold: 0.80,
            managed_calendar: "Daybook".to_owned(),
            trusted_senders: vec![
                "piazza.com".to_owned(),
                "buffalo.edu".to_owned(),
                "ublearns".to_owned(),
            ],
            planner: PlannerConfig::default(),
            sync: SyncConfig::default(),
            accounts: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$DAYBOOK_CONFIG_PATH` or `~/.daybook/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// resulting configuration fails validation.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.fill_path_defaults()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML does not parse.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Load from the TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path()?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve the config file path.
    fn config_path() -> Result<PathBuf> {
        if let Ok(p) = std::env::var("DAYBOOK_CONFIG_PATH") {
            return Ok(PathBuf::from(p));
        }
        Ok(runtime_root()?.join("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("DAYBOOK_DATABASE_PATH") {
            self.database_path = v;
        }
        if let Some(v) = env("DAYBOOK_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = env("DAYBOOK_MANAGED_CALENDAR") {
            self.managed_calendar = v;
        }
        if let Some(v) = env("DAYBOOK_CONFIDENCE_THRESHOLD") {
            match v.parse() {
                Ok(n) => self.confidence_threshold = n,
                Err(_) => tracing::warn!(
                    var = "DAYBOOK_CONFIDENCE_THRESHOLD",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Fill in defaults that depend on the runtime root directory.
    fn fill_path_defaults(&mut self) -> Result<()> {
        if self.database_path.is_empty() || self.logs_dir.is_empty() {
            let root = runtime_root()?;
            if self.database_path.is_empty() {
                self.database_path = root.join("daybook.db").to_string_lossy().into_owned();
            }
            if self.logs_dir.is_empty() {
                self.logs_dir = root.join("logs").to_string_lossy().into_owned();
            }
        }
        Ok(())
    }

    /// Validate invariants that must fail fast at startup.
    ///
    /// # Errors
    ///
    /// Returns a `configuration` error for out-of-range or missing values.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.trim().is_empty() {
            return Err(anyhow::anyhow!("configuration: database_path is required"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow::anyhow!(
                "configuration: confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.managed_calendar.trim().is_empty() {
            return Err(anyhow::anyhow!("configuration: managed_calendar must be non-empty"));
        }
        self.planner.validate()?;
        self.sync.validate()?;
        for account in &self.accounts {
            if account.provider != "gmail" && account.provider != "outlook" {
                return Err(anyhow::anyhow!(
                    "configuration: unknown provider {:?} for account {}",
                    account.provider,
                    account.account_id
                ));
            }
        }
        Ok(())
    }

    /// Accounts as domain values.
    pub fn account_list(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|a| Account {
                provider: a.provider.clone(),
                account_id: a.account_id.clone(),
                email: a.email.clone(),
                enabled: a.enabled,
            })
            .collect()
    }
}

/// One `[[accounts]]` table entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Provider short name (`gmail` or `outlook`).
    pub provider: String,
    /// Stable account identifier.
    pub account_id: String,
    /// Mailbox address.
    pub email: String,
    /// Whether to sync this account.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

// ── Planner constraints ─────────────────────────────────────────

/// Planner window and pacing constraints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// First hour of the workday (local).
    pub workday_start_hour: u32,
    /// Last hour of the workday (local).
    pub workday_end_hour: u32,
    /// Sleep window start, `HH:MM`.
    pub sleep_start: String,
    /// Sleep window end, `HH:MM`.
    pub sleep_end: String,
    /// Global daily cap on scheduled deep-work minutes.
    pub max_deep_work_minutes_per_day: i64,
    /// Insert a break after at most this many minutes of work.
    pub break_every_minutes: i64,
    /// Break length in minutes.
    pub break_duration_minutes: i64,
    /// Do not schedule work at or after this hour.
    pub avoid_after_hour: u32,
    /// Minutes of free space the planner must leave unallocated.
    pub free_space_buffer_minutes: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            workday_start_hour: 9,
            workday_end_hour: 22,
            sleep_start: "00:30".to_owned(),
            sleep_end: "08:00".to_owned(),
            max_deep_work_minutes_per_day: 240,
            break_every_minutes: 90,
            break_duration_minutes: 10,
            avoid_after_hour: 23,
            free_space_buffer_minutes: 45,
        }
    }
}

impl PlannerConfig {
    fn validate(&self) -> Result<()> {
        if self.workday_start_hour >= 24 || self.workday_end_hour > 24 || self.avoid_after_hour > 24
        {
            return Err(anyhow::anyhow!("configuration: planner hours must be within a day"));
        }
        if self.workday_start_hour >= self.workday_end_hour {
            return Err(anyhow::anyhow!(
                "configuration: workday_start_hour must precede workday_end_hour"
            ));
        }
        parse_hhmm(&self.sleep_start)
            .with_context(|| format!("configuration: bad sleep_start {:?}", self.sleep_start))?;
        parse_hhmm(&self.sleep_end)
            .with_context(|| format!("configuration: bad sleep_end {:?}", self.sleep_end))?;
        Ok(())
    }
}

/// Parse an `HH:MM` wall-clock string into `(hour, minute)`.
///
/// # Errors
///
/// Returns an error when the string is not a valid 24h time.
pub fn parse_hhmm(s: &str) -> Result<(u32, u32)> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("expected HH:MM, got {s:?}"))?;
    let hour: u32 = h.parse().context("bad hour")?;
    let minute: u32 = m.parse().context("bad minute")?;
    if hour >= 24 || minute >= 60 {
        return Err(anyhow::anyhow!("out-of-range time {s:?}"));
    }
    Ok((hour, minute))
}

// ── Sync cadence ────────────────────────────────────────────────

/// Adaptive polling cadence, minutes per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval while new mail keeps arriving.
    pub active_polling_minutes: u64,
    /// Steady-state interval.
    pub normal_polling_minutes: u64,
    /// Interval after quiet syncs.
    pub idle_polling_minutes: u64,
    /// Ceiling for exponential error backoff.
    pub max_backoff_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            active_polling_minutes: 10,
            normal_polling_minutes: 15,
            idle_polling_minutes: 45,
            max_backoff_minutes: 120,
        }
    }
}

impl SyncConfig {
    fn validate(&self) -> Result<()> {
        if self.active_polling_minutes == 0
            || self.normal_polling_minutes == 0
            || self.idle_polling_minutes == 0
            || self.max_backoff_minutes == 0
        {
            return Err(anyhow::anyhow!("configuration: polling intervals must be positive"));
        }
        Ok(())
    }
}

// ── Runtime paths ───────────────────────────────────────────────

/// Root directory for runtime state (`~/.daybook`).
///
/// # Errors
///
/// Returns an error when the home directory cannot be resolved.
pub fn runtime_root() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("DAYBOOK_HOME") {
        return Ok(PathBuf::from(p));
    }
    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("configuration: cannot resolve home directory"))?;
    Ok(dirs.home_dir().join(".daybook"))
}

/// Path to the private credentials env-file under the runtime root.
pub fn credentials_path(root: &Path) -> PathBuf {
    root.join(".env")
}

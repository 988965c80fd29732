//! Configuration for the things service.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use twin_policy::CreationRestrictionConfig;

use crate::actors::{DispatcherSettings, ThingSettings};
use crate::journal::{InMemoryJournal, Journal, SqliteJournal};

/// Where thing events are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalConfig {
    /// Process-local, lost on exit.
    Memory,
    /// SQLite database file.
    Sqlite(PathBuf),
}

/// Things service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Deadline for commands without a timeout header.
    pub ask_timeout: Duration,

    /// Idle time after which a thing context retires.
    pub idle_timeout: Duration,

    /// Revisions between snapshots. 0 disables snapshots.
    pub snapshot_interval: u64,

    pub mailbox_size: usize,

    /// Retries of transient journal reads during recovery.
    pub recovery_attempts: u32,

    pub journal: JournalConfig,

    /// TOML file with `[[grant]]` and `[[revoke]]` creation rules.
    pub creation_rules_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            ask_timeout: Duration::from_millis(10_000),
            idle_timeout: Duration::from_secs(600),
            snapshot_interval: 10,
            mailbox_size: 64,
            recovery_attempts: 3,
            journal: JournalConfig::Memory,
            creation_rules_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_level = lookup("TWIN_LOG_LEVEL").unwrap_or(defaults.log_level);

        let ask_timeout = parse_var::<u64, _>(&lookup, "TWIN_ASK_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.ask_timeout);

        let idle_timeout = parse_var::<u64, _>(&lookup, "TWIN_IDLE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);

        let snapshot_interval =
            parse_var(&lookup, "TWIN_SNAPSHOT_INTERVAL")?.unwrap_or(defaults.snapshot_interval);

        let mailbox_size = parse_var(&lookup, "TWIN_MAILBOX_SIZE")?.unwrap_or(defaults.mailbox_size);
        if mailbox_size == 0 {
            anyhow::bail!("TWIN_MAILBOX_SIZE must be at least 1");
        }

        let recovery_attempts =
            parse_var(&lookup, "TWIN_RECOVERY_ATTEMPTS")?.unwrap_or(defaults.recovery_attempts);

        let journal = match lookup("TWIN_JOURNAL") {
            None => JournalConfig::Memory,
            Some(value) if value.is_empty() || value == "memory" => JournalConfig::Memory,
            Some(path) => JournalConfig::Sqlite(PathBuf::from(path)),
        };

        let creation_rules_path = lookup("TWIN_CREATION_RULES")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            log_level,
            ask_timeout,
            idle_timeout,
            snapshot_interval,
            mailbox_size,
            recovery_attempts,
            journal,
            creation_rules_path,
        })
    }

    /// Reads the creation rules file, or the default single wildcard grant.
    pub fn load_creation_rules(&self) -> Result<CreationRestrictionConfig> {
        let Some(path) = &self.creation_rules_path else {
            return Ok(CreationRestrictionConfig::default());
        };
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read creation rules from {}", path.display()))?;
        CreationRestrictionConfig::from_toml_str(&document)
            .with_context(|| format!("invalid creation rules in {}", path.display()))
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            ask_timeout: self.ask_timeout,
            idle_timeout: Some(self.idle_timeout),
            mailbox_size: self.mailbox_size,
            thing: ThingSettings {
                snapshot_interval: self.snapshot_interval,
                recovery_attempts: self.recovery_attempts,
                ..ThingSettings::default()
            },
            ..DispatcherSettings::default()
        }
    }

    pub fn open_journal(&self) -> Result<Arc<dyn Journal>> {
        match &self.journal {
            JournalConfig::Memory => Ok(Arc::new(InMemoryJournal::new())),
            JournalConfig::Sqlite(path) => {
                let journal = SqliteJournal::open(path)
                    .with_context(|| format!("failed to open journal at {}", path.display()))?;
                Ok(Arc::new(journal))
            }
        }
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("invalid value '{value}' for {var}: {e}"))
}

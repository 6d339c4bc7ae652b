use chrono::Duration;

use crate::error::SettingsError;

/// Environment variable overriding the activity timeout, in seconds.
pub const ACTIVITY_TIMEOUT_ENV: &str = "SYNEVAL_ACTIVITY_TIMEOUT_SECS";

const DEFAULT_ACTIVITY_TIMEOUT_MINUTES: i64 = 10;

/// Tunables for the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    activity_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            activity_timeout: Duration::minutes(DEFAULT_ACTIVITY_TIMEOUT_MINUTES),
        }
    }
}

impl SessionSettings {
    #[must_use]
    pub fn with_activity_timeout(mut self, timeout: Duration) -> Self {
        self.activity_timeout = timeout;
        self
    }

    /// How long a session may sit idle and still be resumed.
    #[must_use]
    pub fn activity_timeout(&self) -> Duration {
        self.activity_timeout
    }

    /// Defaults, overridden by `SYNEVAL_ACTIVITY_TIMEOUT_SECS` when set.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` if the variable is not a
    /// non-negative integer.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        if let Some(raw) = lookup(ACTIVITY_TIMEOUT_ENV) {
            let secs = raw
                .trim()
                .parse::<u32>()
                .map_err(|_| SettingsError::InvalidValue {
                    name: ACTIVITY_TIMEOUT_ENV,
                    raw: raw.clone(),
                })?;
            settings.activity_timeout = Duration::seconds(i64::from(secs));
        }
        Ok(settings)
    }
}

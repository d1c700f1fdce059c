// owm_exporter - Prometheus metrics exporter for the OpenWeatherMap API
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use std::env;
use std::error;
use std::fmt;
use std::time::Duration;

pub const ENV_CITY_ID: &str = "METEO_CITY_ID";
pub const ENV_CITY_NAME: &str = "METEO_CITY_NAME";
pub const ENV_API_TOKEN: &str = "METEO_API_TOKEN";
pub const ENV_INTERVAL_MINUTES: &str = "METEO_INTERVAL_MINUTES";

pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;

/// One year, far below anything that would overflow the timer.
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

const SECONDS_PER_MINUTE: u64 = 60;

/// A single problem with the configuration of a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigViolation {
    Missing(&'static str),
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing environment variable {}", key),
            Self::Invalid { key, value, reason } => write!(f, "invalid value {:?} for {}: {}", value, key, reason),
        }
    }
}

/// Every violation found while loading a `LocationConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    violations: Vec<ConfigViolation>,
}

impl ConfigError {
    pub fn violations(&self) -> &[ConfigViolation] {
        &self.violations
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: ")?;
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", v)?;
        }

        Ok(())
    }
}

impl error::Error for ConfigError {}

/// Location to fetch weather for and how often to fetch it.
///
/// Built once at startup and never modified afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct LocationConfig {
    pub id: u64,
    pub name: String,
    pub api_key: String,
    pub interval: Duration,
}

impl LocationConfig {
    /// Load the location from the `METEO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the location using `lookup` to resolve each variable.
    ///
    /// All variables are checked before returning so that the error lists every problem,
    /// not just the first one encountered.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut violations = Vec::new();
        let mut required = |key: &'static str| match lookup(key) {
            Some(v) if !v.trim().is_empty() => Some(v),
            _ => {
                violations.push(ConfigViolation::Missing(key));
                None
            }
        };

        let id = required(ENV_CITY_ID);
        let name = required(ENV_CITY_NAME);
        let api_key = required(ENV_API_TOKEN);

        let id = id.and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(v) => Some(v),
            Err(e) => {
                violations.push(ConfigViolation::Invalid {
                    key: ENV_CITY_ID,
                    value: raw,
                    reason: e.to_string(),
                });
                None
            }
        });

        let default_interval = Duration::from_secs(DEFAULT_INTERVAL_MINUTES * SECONDS_PER_MINUTE);
        let interval = match lookup(ENV_INTERVAL_MINUTES) {
            None => Some(default_interval),
            Some(raw) if raw.trim().is_empty() => Some(default_interval),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => {
                    violations.push(ConfigViolation::Invalid {
                        key: ENV_INTERVAL_MINUTES,
                        value: raw,
                        reason: "interval must be at least one minute".to_owned(),
                    });
                    None
                }
                Ok(v) if v > MAX_INTERVAL_MINUTES => {
                    violations.push(ConfigViolation::Invalid {
                        key: ENV_INTERVAL_MINUTES,
                        value: raw,
                        reason: format!("interval must be at most {} minutes", MAX_INTERVAL_MINUTES),
                    });
                    None
                }
                Ok(v) => Some(Duration::from_secs(v * SECONDS_PER_MINUTE)),
                Err(e) => {
                    violations.push(ConfigViolation::Invalid {
                        key: ENV_INTERVAL_MINUTES,
                        value: raw,
                        reason: e.to_string(),
                    });
                    None
                }
            },
        };

        match (id, name, api_key, interval) {
            (Some(id), Some(name), Some(api_key), Some(interval)) if violations.is_empty() => Ok(LocationConfig {
                id,
                name,
                api_key,
                interval,
            }),
            _ => Err(ConfigError { violations }),
        }
    }
}

impl fmt::Debug for LocationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("interval", &self.interval)
            .finish()
    }
}

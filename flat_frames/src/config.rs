use std::{
    fmt::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "unable to read config: {}", e),
            ConfigError::Json(e) => write!(f, "unable to parse config: {}", e),
            ConfigError::Invalid(reason) => write!(f, "invalid config: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        ConfigError::Json(value)
    }
}

/// Everything a flat run needs to know.  Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: String,
    /// How long to wait for the server to accept the connection.
    pub server_timeout: f64,
    pub mount: String,
    pub camera: String,
    pub flat_cap: String,

    pub exposure: f64,
    pub count: usize,
    /// Destination directory, expanded with strftime against the start of the run.
    pub output: String,
    pub extension: Option<String>,
    pub light_intensity: Option<f64>,

    pub poll_interval: f64,
    pub resolve_attempts: usize,
    pub connect_attempts: usize,
    pub reconnect_attempts: usize,
    pub park_timeout: f64,
    pub settle: f64,
    pub capture_timeout: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: String::from("localhost:7624"),
            server_timeout: 10.0,
            mount: String::from("EQMod Mount"),
            camera: String::from("Canon DSLR EOS 1500D"),
            flat_cap: String::from("Gastro Flatcap"),
            exposure: 0.01,
            count: 30,
            output: String::from("flats/%Y-%m-%d"),
            extension: None,
            light_intensity: None,
            poll_interval: 0.5,
            resolve_attempts: 120,
            connect_attempts: 20,
            reconnect_attempts: 3,
            park_timeout: 120.0,
            settle: 1.0,
            capture_timeout: 60.0,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::Invalid(String::from("count must be at least 1")));
        }
        if !self.exposure.is_finite() || self.exposure <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "exposure must be a positive number of seconds, got {}",
                self.exposure
            )));
        }
        for (role, name) in [
            ("mount", &self.mount),
            ("camera", &self.camera),
            ("flat_cap", &self.flat_cap),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} name is empty", role)));
            }
        }
        for (key, value) in [
            ("poll_interval", self.poll_interval),
            ("server_timeout", self.server_timeout),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", key)));
            }
        }
        for (key, value) in [
            ("park_timeout", self.park_timeout),
            ("settle", self.settle),
            ("capture_timeout", self.capture_timeout),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must not be negative",
                    key
                )));
            }
        }
        if let Some(intensity) = self.light_intensity {
            if !intensity.is_finite() || intensity < 0.0 {
                return Err(ConfigError::Invalid(String::from(
                    "light_intensity must not be negative",
                )));
            }
        }
        Ok(())
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.server_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    pub fn resolve_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.poll_interval(), self.resolve_attempts)
    }

    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.poll_interval(), self.connect_attempts)
    }

    /// Enough polls to cover `park_timeout`.
    pub fn park_policy(&self) -> RetryPolicy {
        RetryPolicy::covering(self.poll_interval(), Duration::from_secs_f64(self.park_timeout))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs_f64(self.settle)
    }

    pub fn exposure(&self) -> Duration {
        Duration::from_secs_f64(self.exposure)
    }

    /// How long to wait for each image after requesting it.
    pub fn capture_wait(&self) -> Duration {
        self.exposure() + Duration::from_secs_f64(self.capture_timeout)
    }

    /// Expands the output template against `now`.
    pub fn destination<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<PathBuf, ConfigError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut expanded = String::new();
        write!(expanded, "{}", now.format(&self.output)).map_err(|_| {
            ConfigError::Invalid(format!("bad output template: {:?}", self.output))
        })?;
        Ok(PathBuf::from(expanded))
    }
}

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::types::{Credentials, DEFAULT_LANGUAGE_TYPE, DEFAULT_TERMINAL_TYPE, DEFAULT_TIMEZONE};
use crate::{Error, Result};

pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 30;

/// Settings supplied once when a device is added.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub base_url: String,
    pub username: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    pub device_id: String,
    #[serde(default = "default_timezone")]
    pub api_timezone: String,
    #[serde(default = "default_language")]
    pub language_type: String,
    #[serde(default = "default_terminal")]
    pub terminal_type: String,
    /// Poll interval in seconds.
    #[serde(default = "default_interval")]
    pub update_interval: u64,
}

/// Settings that may change while the device is running.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceOptions {
    pub update_interval: Option<u64>,
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".into()));
        }
        if self.username.is_empty() {
            return Err(Error::Config("username must not be empty".into()));
        }
        if self.device_id.is_empty() {
            return Err(Error::Config("device_id must not be empty".into()));
        }
        if self.update_interval == 0 {
            return Err(Error::Config("update_interval must be at least 1 second".into()));
        }
        Ok(())
    }

    /// Options override the values captured at setup.
    pub fn with_options(mut self, options: &DeviceOptions) -> Self {
        if let Some(secs) = options.update_interval {
            self.update_interval = secs;
        }
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            terminal_type: self.terminal_type.clone(),
            language_type: self.language_type.clone(),
            timezone: self.api_timezone.clone(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }
}

impl DeviceOptions {
    pub fn interval(&self) -> Option<Duration> {
        self.update_interval.map(Duration::from_secs)
    }
}

fn deserialize_secret<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<SecretString, D::Error> {
    String::deserialize(d).map(SecretString::from)
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE_TYPE.to_string()
}

fn default_terminal() -> String {
    DEFAULT_TERMINAL_TYPE.to_string()
}

fn default_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

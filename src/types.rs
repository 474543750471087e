use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

pub const DEFAULT_TERMINAL_TYPE: &str = "0";
pub const DEFAULT_LANGUAGE_TYPE: &str = "0001";
pub const DEFAULT_TIMEZONE: &str = "+01:00";

/// Login material for one panel account. Fixed for the lifetime of a device.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
    pub terminal_type: String,
    pub language_type: String,
    pub timezone: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            terminal_type: DEFAULT_TERMINAL_TYPE.to_string(),
            language_type: DEFAULT_LANGUAGE_TYPE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }

    pub fn terminal_type(mut self, terminal: impl Into<String>) -> Self {
        self.terminal_type = terminal.into();
        self
    }

    pub fn language_type(mut self, lang: impl Into<String>) -> Self {
        self.language_type = lang.into();
        self
    }

    pub fn timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }
}

/// Normalized arm level read back from the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Disarmed,
    ArmedAway,
    ArmedHome,
    #[default]
    Unknown,
}

impl AlarmState {
    /// Read-side code table. Unrecognized codes degrade to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => AlarmState::Disarmed,
            1 => AlarmState::ArmedAway,
            2 => AlarmState::ArmedHome,
            _ => AlarmState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Disarmed => "disarmed",
            AlarmState::ArmedAway => "armed_away",
            AlarmState::ArmedHome => "armed_home",
            AlarmState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-side commands. The control endpoint uses its own code table:
/// disarm is 3 there, not the 0 the status endpoint reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Disarm,
    ArmAway,
    ArmHome,
}

impl Command {
    pub fn control_code(&self) -> i64 {
        match self {
            Command::Disarm => 3,
            Command::ArmAway => 1,
            Command::ArmHome => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Disarm => "disarm",
            Command::ArmAway => "arm_away",
            Command::ArmHome => "arm_home",
        }
    }
}

impl TryFrom<i64> for Command {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            3 => Ok(Command::Disarm),
            1 => Ok(Command::ArmAway),
            2 => Ok(Command::ArmHome),
            other => Err(Error::InvalidCommand(other)),
        }
    }
}

/// Status payload exactly as the panel returned it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawStatus(Value);

impl RawStatus {
    pub fn new(body: Value) -> Self {
        Self(body)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The untouched `value` field, for diagnostics.
    pub fn arm_level_raw(&self) -> Option<&Value> {
        self.0.get("value")
    }

    /// Integer arm level, if `value` holds one. Accepts JSON integers,
    /// integral floats and numeric strings; everything else is `None`.
    pub fn arm_level(&self) -> Option<i64> {
        match self.arm_level_raw()? {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn state(&self) -> AlarmState {
        self.arm_level()
            .map(AlarmState::from_code)
            .unwrap_or(AlarmState::Unknown)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Latest published coordinator state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Last status fetched successfully. Kept across failed cycles.
    pub status: Option<RawStatus>,
    /// When `status` was fetched.
    pub last_update: Option<DateTime<Utc>>,
    /// Failure of the most recent cycle, cleared by the next success.
    pub last_error: Option<Error>,
}

impl Snapshot {
    pub fn state(&self) -> AlarmState {
        self.status
            .as_ref()
            .map(RawStatus::state)
            .unwrap_or(AlarmState::Unknown)
    }

    pub fn is_available(&self) -> bool {
        self.status.is_some() && self.last_error.is_none()
    }
}

/// Display/diagnostics projection of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PanelView {
    pub device_id: String,
    pub state: AlarmState,
    pub arm_level_raw: Option<Value>,
    pub raw: Option<Value>,
    pub last_update: Option<DateTime<Utc>>,
    pub available: bool,
    pub last_error: Option<String>,
}

impl PanelView {
    pub fn from_snapshot(device_id: &str, snapshot: &Snapshot) -> Self {
        Self {
            device_id: device_id.to_string(),
            state: snapshot.state(),
            arm_level_raw: snapshot
                .status
                .as_ref()
                .and_then(|s| s.arm_level_raw().cloned()),
            raw: snapshot.status.as_ref().map(|s| s.as_value().clone()),
            last_update: snapshot.last_update,
            available: snapshot.is_available(),
            last_error: snapshot.last_error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Notifications delivered to coordinator observers.
#[derive(Debug, Clone)]
pub enum Event {
    StateChanged { previous: AlarmState, current: AlarmState },
    FieldChanged { path: String, previous: Value, current: Value },
    RefreshFailed { error: Error },
    Recovered,
}

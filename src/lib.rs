mod client;
mod config;
mod coordinator;
mod diff;
mod error;
mod logger;
mod protocol;
mod registry;
mod response;
mod types;

pub use client::{DEFAULT_TIMEOUT, DeviceClient, DeviceClientBuilder};
pub use config::{DEFAULT_UPDATE_INTERVAL_SECS, DeviceConfig, DeviceOptions};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::{CONTROL_PATH, LOGIN_PATH, STATUS_PATH};
pub use registry::DeviceRegistry;
pub use response::{CodeRule, ResponseRules};
pub use types::*;

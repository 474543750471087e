use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    CONTROL_PATH, DEFAULT_ORDER_NO, LOGIN_PATH, STATUS_PATH, control_request, extract_token,
    form_body, login_request, parse_body, redact, status_request,
};
use crate::response::ResponseRules;
use crate::types::{Command, Credentials, RawStatus};
use crate::{Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct DeviceClientBuilder {
    base_url: String,
    timeout: Duration,
    http: Option<reqwest::Client>,
    rules: ResponseRules,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl DeviceClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            http: None,
            rules: ResponseRules::default(),
            log_mode: None,
            log_path: None,
        }
    }

    /// Upper bound for each individual request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reuse an existing connection pool instead of creating one per client.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn rules(mut self, rules: ResponseRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<DeviceClient> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("base URL must not be empty".into()));
        }

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder().build()?,
        };

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => {
                let logger = MessageLogger::new(mode, &path)
                    .map_err(|e| Error::Config(format!("cannot open message log {path}: {e}")))?;
                Some(Arc::new(Mutex::new(logger)))
            }
            _ => None,
        };

        Ok(DeviceClient {
            http,
            base_url,
            timeout: self.timeout,
            rules: Arc::new(self.rules),
            logger,
        })
    }
}

/// HTTP client for the Heyitech cloud.
///
/// Tokens are single-use, so every operation performs its own login and the
/// token never outlives the call that obtained it. Cheap to clone; clones
/// share the connection pool and message log.
#[derive(Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rules: Arc<ResponseRules>,
    logger: Option<Arc<Mutex<MessageLogger>>>,
}

impl DeviceClient {
    pub fn builder(base_url: impl Into<String>) -> DeviceClientBuilder {
        DeviceClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn login(&self, creds: &Credentials) -> Result<String> {
        debug!(user = %creds.username, "logging in");
        let (status, text) = self.post(LOGIN_PATH, &login_request(creds)).await?;
        if status != 200 {
            self.log_response(LOGIN_PATH, status, &Value::String(text.clone()));
            return Err(Error::auth(Some(status), format!("HTTP {status}: {text}")));
        }

        let body = self.decode(LOGIN_PATH, status, &text)?;
        self.validate(status, &body)?;

        match extract_token(&body) {
            Some(token) => Ok(token.to_string()),
            None => Err(Error::auth(Some(status), format!("no token returned: {text}"))),
        }
    }

    pub async fn get_status(&self, creds: &Credentials, device_id: &str) -> Result<RawStatus> {
        let token = self.login(creds).await?;
        debug!(device = %device_id, "fetching arm status");
        let body = self
            .call(STATUS_PATH, &status_request(&token, device_id))
            .await?;
        Ok(RawStatus::new(body))
    }

    pub async fn send_command(&self, creds: &Credentials, device_id: &str, command: Command) -> Result<Value> {
        self.send_command_with_order(creds, device_id, command, DEFAULT_ORDER_NO)
            .await
    }

    pub async fn send_command_with_order(
        &self,
        creds: &Credentials,
        device_id: &str,
        command: Command,
        order_no: &str,
    ) -> Result<Value> {
        let token = self.login(creds).await?;
        let code = command.control_code();
        debug!(device = %device_id, command = command.as_str(), control_type = code, "sending remote control");
        self.call(CONTROL_PATH, &control_request(&token, device_id, code, order_no))
            .await
    }

    // -- Helpers --

    /// POST to a non-login endpoint and return the validated body.
    async fn call(&self, path: &str, payload: &Value) -> Result<Value> {
        let (status, text) = self.post(path, payload).await?;
        if status != 200 {
            self.log_response(path, status, &Value::String(text.clone()));
            return Err(Error::api(Some(status), format!("HTTP {status}: {text}")));
        }
        let body = self.decode(path, status, &text)?;
        self.validate(status, &body)?;
        Ok(body)
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<(u16, String)> {
        let url = format!("{}{}", self.base_url, path);
        trace!(url = %url, body = %redact(payload), "request");
        self.log_request(path, payload);

        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .form(&form_body(payload))
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        trace!(url = %url, status, "response");
        Ok((status, text))
    }

    fn decode(&self, path: &str, status: u16, text: &str) -> Result<Value> {
        match parse_body(text) {
            Ok(body) => {
                self.log_response(path, status, &body);
                Ok(body)
            }
            Err(e) => {
                self.log_response(path, status, &Value::String(text.to_string()));
                Err(Error::Decode {
                    message: e.to_string(),
                    body: text.to_string(),
                })
            }
        }
    }

    fn validate(&self, status: u16, body: &Value) -> Result<()> {
        self.rules
            .check(body)
            .map_err(|message| Error::api(Some(status), message))
    }

    fn log_request(&self, path: &str, body: &Value) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_request(path, body);
        }
    }

    fn log_response(&self, path: &str, status: u16, body: &Value) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            logger.log_response(path, status, body);
        }
    }
}

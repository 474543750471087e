use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::types::Credentials;

pub const LOGIN_PATH: &str = "/puserlogin.shtml";
pub const STATUS_PATH: &str = "/pdevgetArmStatus.shtml";
pub const CONTROL_PATH: &str = "/pdevremoteControl.shtml";

/// Name of the single form field every request carries.
pub const REQUEST_FIELD: &str = "requestJson";

pub const DEFAULT_ORDER_NO: &str = "0";

const REDACTED: &str = "***";
const SECRET_FIELDS: &[&str] = &["loginPwd", "tokenId"];

pub fn login_request(creds: &Credentials) -> Value {
    json!({
        "loginName": creds.username,
        "terminalType": creds.terminal_type,
        "languageType": creds.language_type,
        "loginPwd": creds.password.expose_secret(),
        "timeZone": creds.timezone,
    })
}

pub fn status_request(token: &str, device_id: &str) -> Value {
    json!({
        "tokenId": token,
        "deviceID": device_id,
    })
}

pub fn control_request(token: &str, device_id: &str, control_type: i64, order_no: &str) -> Value {
    json!({
        "tokenId": token,
        "orderNO": order_no,
        "deviceID": device_id,
        "controlType": control_type,
    })
}

/// Wrap a payload as the `requestJson=<json>` form the endpoints expect.
pub fn form_body(payload: &Value) -> [(&'static str, String); 1] {
    [(REQUEST_FIELD, payload.to_string())]
}

/// Parse a response body. The upstream labels JSON with arbitrary content
/// types, so the header is ignored.
pub fn parse_body(text: &str) -> std::result::Result<Value, serde_json::Error> {
    serde_json::from_str(text)
}

/// Token from a login body, if it carries a non-empty one.
pub fn extract_token(body: &Value) -> Option<&str> {
    body.get("tokenId")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

/// Copy of a payload with credentials and tokens masked, for logs.
pub fn redact(payload: &Value) -> Value {
    let mut out = payload.clone();
    if let Value::Object(map) = &mut out {
        for field in SECRET_FIELDS {
            if let Some(v) = map.get_mut(*field) {
                *v = Value::String(REDACTED.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_structure() {
        let creds = Credentials::new("alice", "pw").timezone("+08:00");
        let msg = login_request(&creds);
        assert_eq!(msg["loginName"], "alice");
        assert_eq!(msg["loginPwd"], "pw");
        assert_eq!(msg["terminalType"], "0");
        assert_eq!(msg["languageType"], "0001");
        assert_eq!(msg["timeZone"], "+08:00");
    }

    #[test]
    fn control_request_structure() {
        let msg = control_request("tok", "dev-9", 3, DEFAULT_ORDER_NO);
        assert_eq!(msg["tokenId"], "tok");
        assert_eq!(msg["deviceID"], "dev-9");
        assert_eq!(msg["orderNO"], "0");
        assert_eq!(msg["controlType"], 3);
    }

    #[test]
    fn form_body_wraps_json() {
        let [(name, value)] = form_body(&status_request("tok", "dev-1"));
        assert_eq!(name, "requestJson");
        let parsed: Value = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed["deviceID"], "dev-1");
    }

    #[test]
    fn token_must_be_non_empty_string() {
        assert_eq!(extract_token(&json!({"tokenId": "abc"})), Some("abc"));
        assert_eq!(extract_token(&json!({"tokenId": ""})), None);
        assert_eq!(extract_token(&json!({"tokenId": 12})), None);
        assert_eq!(extract_token(&json!("abc")), None);
    }

    #[test]
    fn redact_masks_secrets_only() {
        let creds = Credentials::new("alice", "pw");
        let masked = redact(&login_request(&creds));
        assert_eq!(masked["loginPwd"], "***");
        assert_eq!(masked["loginName"], "alice");

        let masked = redact(&status_request("tok", "dev-1"));
        assert_eq!(masked["tokenId"], "***");
        assert_eq!(masked["deviceID"], "dev-1");
    }
}

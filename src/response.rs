//! Tolerant success/failure classification of upstream response bodies.
//!
//! The endpoints do not agree on a result envelope: some answer with
//! `success`, others with one of several code fields, others with nothing at
//! all. [`ResponseRules`] is the ordered table deciding which is which.

use serde::Deserialize;
use serde_json::{Value, json};

/// One result-code field and the values that mean success for it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodeRule {
    pub field: String,
    pub success: Vec<Value>,
}

impl CodeRule {
    pub fn new(field: impl Into<String>, success: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            success,
        }
    }

    fn accepts(&self, actual: &Value) -> bool {
        self.success.iter().any(|expected| values_match(expected, actual))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponseRules {
    /// Evaluated in order; the first rule whose field is present decides.
    pub codes: Vec<CodeRule>,
    /// Fields searched, in order, for a human-readable failure message.
    pub message_fields: Vec<String>,
}

impl Default for ResponseRules {
    fn default() -> Self {
        let ok = || vec![json!(0), json!(200), json!("0"), json!("200"), json!(true)];
        Self {
            codes: ["code", "resultCode", "retCode", "returnCode", "status"]
                .into_iter()
                .map(|f| CodeRule::new(f, ok()))
                .collect(),
            message_fields: ["msg", "message", "errMsg"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ResponseRules {
    /// `Err` carries the message to report upstream's failure with.
    ///
    /// Non-object bodies and objects with no recognized field pass.
    pub fn check(&self, body: &Value) -> std::result::Result<(), String> {
        let Value::Object(map) = body else {
            return Ok(());
        };

        if map.get("success") == Some(&Value::Bool(false)) {
            return Err(self.message(body));
        }

        for rule in &self.codes {
            if let Some(actual) = map.get(&rule.field) {
                if rule.accepts(actual) {
                    return Ok(());
                }
                return Err(self.message(body));
            }
        }

        Ok(())
    }

    fn message(&self, body: &Value) -> String {
        self.message_fields
            .iter()
            .filter_map(|f| body.get(f))
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Null | Value::String(_) => None,
                other => Some(other.to_string()),
            })
            .unwrap_or_else(|| body.to_string())
    }
}

fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

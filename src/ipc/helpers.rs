use chrono::Datelike;
use serde_json::Value;

use crate::gallery::name::BucketKey;
use crate::ipc::error::err;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_bool(params: &Value, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Bucket from `params.year`/`params.month`, defaulting to the current local
/// month — the admin screens open on the current honor roll.
pub fn bucket_from_params(params: &Value) -> Result<BucketKey, HandlerErr> {
    let now = chrono::Local::now();
    let year = match params.get("year") {
        None => now.year() as u64,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| HandlerErr::bad_params("year must be a number"))?,
    };
    let month = match params.get("month") {
        None => now.month() as u64,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| HandlerErr::bad_params("month must be a number"))?,
    };
    let year = u16::try_from(year).map_err(|_| HandlerErr::bad_params("year out of range"))?;
    let month = u8::try_from(month).map_err(|_| HandlerErr::bad_params("month out of range"))?;
    BucketKey::new(year, month).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

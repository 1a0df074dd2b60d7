use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::error::AppError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::model::Actor;

/// Failure on its way back to the caller as an error envelope.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// This error as a value nested in another error's details.
    pub fn to_details(&self) -> Value {
        json!({ "code": self.code, "message": self.message, "details": self.details })
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AppError> for HandlerErr {
    fn from(e: AppError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

impl From<anyhow::Error> for HandlerErr {
    fn from(e: anyhow::Error) -> Self {
        AppError::from(e).into()
    }
}

pub type HandlerResult = Result<Value, HandlerErr>;

/// Wraps a handler outcome in the response envelope, logging failures.
pub fn respond(req: &Request, result: HandlerResult) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            if e.code == "io_failed" {
                error!(method = %req.method, message = %e.message, "request failed");
            } else {
                warn!(method = %req.method, code = e.code, message = %e.message, "request rejected");
            }
            e.response(&req.id)
        }
    }
}

pub fn to_json<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value)
        .map_err(|e| HandlerErr::new("io_failed", format!("failed to encode result: {e}")))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Decodes the whole params object into a typed payload.
pub fn params_as<T: DeserializeOwned>(req: &Request) -> Result<T, HandlerErr> {
    let raw = if req.params.is_null() {
        json!({})
    } else {
        req.params.clone()
    };
    serde_json::from_value(raw).map_err(|e| HandlerErr::bad_params(format!("invalid params: {e}")))
}

/// Decodes one member of params, treating a missing member as its default.
pub fn param_as<T: DeserializeOwned + Default>(req: &Request, key: &str) -> Result<T, HandlerErr> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid {key}: {e}"))),
    }
}

pub fn actor(req: &Request) -> Result<&Actor, HandlerErr> {
    match req.actor.as_ref() {
        Some(a) if !a.username.trim().is_empty() => Ok(a),
        _ => Err(HandlerErr::bad_params("missing actor")),
    }
}

pub fn workspace(state: &mut AppState) -> Result<&mut Workspace, HandlerErr> {
    state
        .workspace
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

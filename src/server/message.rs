//! Wire Messages
//!
//! Requests are JSON objects naming an `operation`, with a `request_id` and whatever fields that
//! operation needs.  Responses carry `status`, the echoed `request_id`, and either the payload
//! fields or an `error` code.
use std::str::FromStr;

use serde_derive::Deserialize;
use serde_json::{json, Map, Value};

use crate::metadata::UserRole;

/// Every operation name we understand
const OPERATIONS: &[&str] = &[
    "ping",
    "user_create",
    "user_login",
    "user_list",
    "file_create",
    "file_read",
    "file_delete",
    "dir_create",
    "dir_list",
    "fs_stat",
];

/// The body is not JSON, a field is missing, or a field is the wrong shape
pub(crate) const INVALID_REQUEST: &str = "invalid_request";
/// The `operation` isn't one we know
pub(crate) const UNKNOWN_OPERATION: &str = "unknown_operation";

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub(crate) enum Operation {
    Ping,
    UserCreate {
        #[serde(default)]
        token: Option<String>,
        username: String,
        password: String,
        #[serde(default)]
        role: Option<Value>,
    },
    UserLogin {
        username: String,
        password: String,
    },
    UserList {
        #[serde(default)]
        token: Option<String>,
    },
    FileCreate {
        #[serde(default)]
        token: Option<String>,
        path: String,
        data: String,
    },
    FileRead {
        #[serde(default)]
        token: Option<String>,
        path: String,
    },
    FileDelete {
        #[serde(default)]
        token: Option<String>,
        path: String,
    },
    DirCreate {
        #[serde(default)]
        token: Option<String>,
        path: String,
    },
    DirList {
        #[serde(default)]
        token: Option<String>,
        path: String,
    },
    FsStat,
}

/// A request, as far as we could make sense of it
#[derive(Debug, PartialEq)]
pub(crate) struct Request {
    pub(crate) request_id: String,
    pub(crate) operation: std::result::Result<Operation, &'static str>,
}

impl Request {
    pub(crate) fn parse<B: AsRef<[u8]>>(body: B) -> Self {
        let value: Value = match serde_json::from_slice(body.as_ref()) {
            Ok(v @ Value::Object(_)) => v,
            _ => {
                return Request {
                    request_id: String::new(),
                    operation: Err(INVALID_REQUEST),
                }
            }
        };

        let request_id = match value.get("request_id") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        let operation = match value.get("operation").and_then(Value::as_str) {
            None => Err(INVALID_REQUEST),
            Some(name) if !OPERATIONS.contains(&name) => Err(UNKNOWN_OPERATION),
            Some(_) => serde_json::from_value::<Operation>(value).map_err(|_| INVALID_REQUEST),
        };

        Request {
            request_id,
            operation,
        }
    }
}

/// Read a `role` field: a name or a number, case-insensitive, absent meaning normal
pub(crate) fn parse_role(role: Option<&Value>) -> std::result::Result<UserRole, &'static str> {
    match role {
        None | Some(Value::Null) => Ok(UserRole::Normal),
        Some(Value::String(s)) => UserRole::from_str(s).map_err(|_| INVALID_REQUEST),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Ok(UserRole::Normal),
            Some(1) => Ok(UserRole::Admin),
            _ => Err(INVALID_REQUEST),
        },
        Some(_) => Err(INVALID_REQUEST),
    }
}

/// A successful response, with `payload`'s fields alongside the envelope
pub(crate) fn success(request_id: &str, payload: Value) -> String {
    let mut body = Map::new();
    body.insert("status".to_string(), json!("success"));
    body.insert("request_id".to_string(), json!(request_id));
    if let Value::Object(fields) = payload {
        body.extend(fields);
    }
    Value::Object(body).to_string()
}

pub(crate) fn failure(request_id: &str, code: &str) -> String {
    json!({
        "status": "error",
        "request_id": request_id,
        "error": code,
    })
    .to_string()
}

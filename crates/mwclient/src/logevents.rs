use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::{Decoded, parse_timestamp, string_list};

/// One protection applied by a protect log entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProtectionDetail {
    pub kind: String,
    pub level: String,
    pub expiry: Option<String>,
}

/// Action-specific payload of a log entry, keyed by the log type.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum LogEventKind {
    Block {
        flags: Vec<String>,
        duration: Option<String>,
    },
    Unblock,
    Delete,
    Restore,
    Protect {
        details: Vec<ProtectionDetail>,
        cascade: bool,
    },
    Unprotect,
    Move {
        target: Option<String>,
        suppressed_redirect: bool,
    },
    Rights {
        old_groups: Vec<String>,
        new_groups: Vec<String>,
    },
    Upload,
    Merge {
        destination: Option<String>,
        merge_point: Option<String>,
    },
    Patrol {
        current_revision: Option<i64>,
        previous_revision: Option<i64>,
        automatic: bool,
    },
    NewUser,
    Import,
    Other {
        log_type: String,
    },
}

/// A single `list=logevents` entry. The common fields are shared by every
/// variant; everything action-specific lives in `kind`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogEvent {
    pub id: i64,
    pub title: Option<String>,
    pub user: String,
    pub comment: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub action: String,
    pub kind: LogEventKind,
}

impl LogEvent {
    pub fn from_value(value: &Value) -> Decoded<LogEvent> {
        if !value.is_object() {
            return Decoded::Malformed("log entry is not an object".to_string());
        }
        let Some(id) = value.get("logid").and_then(Value::as_i64) else {
            return Decoded::Malformed("log entry has no logid".to_string());
        };
        let log_type = value.get("type").and_then(Value::as_str).unwrap_or("");
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or(log_type)
            .to_string();
        let timestamp = match value.get("timestamp").and_then(Value::as_str) {
            Some(raw) => match parse_timestamp(raw) {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    return Decoded::Malformed(format!(
                        "log entry has unparseable timestamp {raw:?}"
                    ));
                }
            },
            None => None,
        };

        Decoded::Value(LogEvent {
            id,
            title: value
                .get("title")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            user: value
                .get("user")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            comment: value
                .get("comment")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp,
            action,
            kind: decode_kind(log_type, value),
        })
    }
}

fn decode_kind(log_type: &str, value: &Value) -> LogEventKind {
    // Newer servers nest action data under `params`; older ones key it by
    // the log type. Accept both.
    let params = value.get("params").or_else(|| value.get(log_type));
    match log_type {
        "block" => match value.get("action").and_then(Value::as_str) {
            Some("unblock") => LogEventKind::Unblock,
            _ => LogEventKind::Block {
                flags: decode_flags(params),
                duration: params
                    .and_then(|p| p.get("duration"))
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
            },
        },
        "delete" => match value.get("action").and_then(Value::as_str) {
            Some("restore") => LogEventKind::Restore,
            _ => LogEventKind::Delete,
        },
        "protect" => match value.get("action").and_then(Value::as_str) {
            Some("unprotect") => LogEventKind::Unprotect,
            _ => LogEventKind::Protect {
                details: decode_protection_details(params),
                cascade: params.is_some_and(|p| p.get("cascade").is_some()),
            },
        },
        "move" => LogEventKind::Move {
            target: params
                .and_then(|p| p.get("target_title").or_else(|| p.get("new_title")))
                .and_then(Value::as_str)
                .map(ToString::to_string),
            suppressed_redirect: params
                .is_some_and(|p| p.get("suppressedredirect").is_some()),
        },
        "rights" => LogEventKind::Rights {
            old_groups: decode_groups(params, "oldgroups", "old"),
            new_groups: decode_groups(params, "newgroups", "new"),
        },
        "upload" => LogEventKind::Upload,
        "merge" => LogEventKind::Merge {
            destination: params
                .and_then(|p| p.get("dest_title").or_else(|| p.get("dest")))
                .and_then(Value::as_str)
                .map(ToString::to_string),
            merge_point: params
                .and_then(|p| p.get("mergepoint"))
                .and_then(Value::as_str)
                .map(ToString::to_string),
        },
        "patrol" => LogEventKind::Patrol {
            current_revision: params.and_then(|p| p.get("curid")).and_then(Value::as_i64),
            previous_revision: params.and_then(|p| p.get("previd")).and_then(Value::as_i64),
            automatic: params
                .and_then(|p| p.get("auto"))
                .and_then(Value::as_i64)
                .unwrap_or(0)
                != 0,
        },
        "newusers" => LogEventKind::NewUser,
        "import" => LogEventKind::Import,
        other => LogEventKind::Other {
            log_type: other.to_string(),
        },
    }
}

fn decode_flags(params: Option<&Value>) -> Vec<String> {
    let Some(flags) = params.and_then(|p| p.get("flags")) else {
        return Vec::new();
    };
    match flags {
        Value::Array(_) => string_list(Some(flags)),
        Value::String(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|flag| !flag.is_empty())
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_groups(params: Option<&Value>, modern_key: &str, legacy_key: &str) -> Vec<String> {
    let Some(groups) = params.and_then(|p| p.get(modern_key).or_else(|| p.get(legacy_key)))
    else {
        return Vec::new();
    };
    match groups {
        Value::Array(_) => string_list(Some(groups)),
        Value::String(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|group| !group.is_empty())
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_protection_details(params: Option<&Value>) -> Vec<ProtectionDetail> {
    let Some(details) = params
        .and_then(|p| p.get("details"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    details
        .iter()
        .filter_map(|detail| {
            let kind = detail.get("type").and_then(Value::as_str)?;
            let level = detail.get("level").and_then(Value::as_str)?;
            Some(ProtectionDetail {
                kind: kind.to_string(),
                level: level.to_string(),
                expiry: detail
                    .get("expiry")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
            })
        })
        .collect()
}

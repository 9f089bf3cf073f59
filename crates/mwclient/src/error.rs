use serde_json::Value;
use thiserror::Error;

/// Code substituted when the server returns an error envelope without a code.
pub const UNKNOWN_ERROR_CODE: &str = "Unknown error code";

/// Failures surfaced by the MediaWiki API or by client-side pre-checks.
///
/// Carried through `anyhow::Error` so call sites keep the plain `Result`
/// signatures; callers needing the variant can downcast.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    Authentication(String),
    #[error("edit action failed [{0}]")]
    Edit(String),
    #[error("block action failed [{0}]")]
    Block(String),
    #[error("patrol action failed [{0}]")]
    Patrol(String),
    #[error("{0}")]
    NotLoggedIn(String),
    #[error("{0}")]
    NotBot(String),
    #[error("file extension of {filename} is not allowed on this wiki (allowed: {})", .allowed.join("|"))]
    UploadInvalidFileExt {
        filename: String,
        allowed: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: String,
    pub info: String,
}

/// Extract the top-level `{error: {code, info}}` envelope, if present.
pub fn envelope_error(body: &Value) -> Option<ErrorEnvelope> {
    let error = body.get("error")?;
    Some(ErrorEnvelope {
        code: error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ERROR_CODE)
            .to_string(),
        info: error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{UNKNOWN_ERROR_CODE, envelope_error};

    #[test]
    fn envelope_error_reads_code_and_info() {
        let body = json!({"error": {"code": "badtoken", "info": "Invalid token"}});
        let envelope = envelope_error(&body).expect("envelope");
        assert_eq!(envelope.code, "badtoken");
        assert_eq!(envelope.info, "Invalid token");
    }

    #[test]
    fn envelope_error_defaults_missing_code() {
        let body = json!({"error": {"info": "something went wrong"}});
        let envelope = envelope_error(&body).expect("envelope");
        assert_eq!(envelope.code, UNKNOWN_ERROR_CODE);
    }

    #[test]
    fn envelope_error_ignores_clean_responses() {
        assert!(envelope_error(&json!({"query": {}})).is_none());
    }
}

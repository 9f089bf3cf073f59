use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// MediaWiki's wire timestamp format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|error| anyhow!("invalid MediaWiki timestamp {raw:?}: {error}"))?;
    Ok(naive.and_utc())
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Outcome of decoding one JSON fragment into a domain value.
///
/// `Missing` covers entries the server marks absent (`missing`/`invalid`
/// keys); `Malformed` covers fragments that do not match the documented
/// shape at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Value(T),
    Missing,
    Malformed(String),
}

impl<T> Decoded<T> {
    pub fn require(self, what: &str) -> Result<T> {
        match self {
            Decoded::Value(value) => Ok(value),
            Decoded::Missing => Err(anyhow!("{what}: entry is missing")),
            Decoded::Malformed(detail) => Err(anyhow!("{what}: malformed entry: {detail}")),
        }
    }

    /// Drop `Missing` silently, keeping decode errors.
    pub fn optional(self, what: &str) -> Result<Option<T>> {
        match self {
            Decoded::Value(value) => Ok(Some(value)),
            Decoded::Missing => Ok(None),
            Decoded::Malformed(detail) => Err(anyhow!("{what}: malformed entry: {detail}")),
        }
    }
}

/// One page record as returned by the various list and prop queries.
/// A plain value object; fields the endpoint did not return stay `None`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page {
    pub title: String,
    pub page_id: Option<i64>,
    pub namespace: Option<i64>,
    pub text: Option<String>,
    pub redirect: bool,
    pub size: Option<u64>,
    pub snippet: Option<String>,
    pub word_count: Option<u64>,
    pub timestamp: Option<String>,
}

impl Page {
    pub fn from_value(value: &Value) -> Decoded<Page> {
        if !value.is_object() {
            return Decoded::Malformed("page entry is not an object".to_string());
        }
        if value.get("missing").is_some() || value.get("invalid").is_some() {
            return Decoded::Missing;
        }
        let Some(title) = value.get("title").and_then(Value::as_str) else {
            return Decoded::Malformed("page entry has no title".to_string());
        };

        Decoded::Value(Page {
            title: title.to_string(),
            page_id: value.get("pageid").and_then(Value::as_i64),
            namespace: value.get("ns").and_then(Value::as_i64),
            text: value
                .get("revisions")
                .and_then(Value::as_array)
                .and_then(|revisions| revisions.first())
                .and_then(|revision| revision.get("*"))
                .and_then(Value::as_str)
                .map(ToString::to_string),
            redirect: value.get("redirect").is_some(),
            size: value.get("size").and_then(Value::as_u64),
            snippet: value
                .get("snippet")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            word_count: value.get("wordcount").and_then(Value::as_u64),
            timestamp: value
                .get("timestamp")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        })
    }
}

/// A change tag as listed by `list=tags`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub hitcount: u64,
}

impl Tag {
    pub fn from_value(value: &Value) -> Decoded<Tag> {
        let Some(name) = value.get("name").and_then(Value::as_str) else {
            return Decoded::Malformed("tag entry has no name".to_string());
        };
        Decoded::Value(Tag {
            name: name.to_string(),
            display_name: value
                .get("displayname")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
            description: value
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            hitcount: value.get("hitcount").and_then(Value::as_u64).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileRepo {
    pub name: String,
    pub display_name: Option<String>,
    pub url: Option<String>,
}

impl FileRepo {
    pub fn from_value(value: &Value) -> Decoded<FileRepo> {
        let Some(name) = value.get("name").and_then(Value::as_str) else {
            return Decoded::Malformed("file repo entry has no name".to_string());
        };
        Decoded::Value(FileRepo {
            name: name.to_string(),
            display_name: value
                .get("displayname")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            url: value
                .get("url")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub anonymous: bool,
    pub groups: Vec<String>,
    pub rights: Vec<String>,
}

impl UserInfo {
    pub fn from_value(value: &Value) -> Decoded<UserInfo> {
        let Some(name) = value.get("name").and_then(Value::as_str) else {
            return Decoded::Malformed("userinfo has no name".to_string());
        };
        Decoded::Value(UserInfo {
            id: value.get("id").and_then(Value::as_i64).unwrap_or(0),
            name: name.to_string(),
            anonymous: value.get("anon").is_some(),
            groups: string_list(value.get("groups")),
            rights: string_list(value.get("rights")),
        })
    }
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Shape: `query.<key>` is a flat mapping copied verbatim, scalar values
/// stringified.
pub fn flat_map(fragment: &Value, key: &str) -> BTreeMap<String, String> {
    let mut output = BTreeMap::new();
    if let Some(object) = fragment.get(key).and_then(Value::as_object) {
        for (name, value) in object {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            output.insert(name.clone(), rendered);
        }
    }
    output
}

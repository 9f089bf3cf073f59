use serde_json::Value;

/// Ordered request parameters for one API call.
///
/// Built fresh per call and never shared across calls. Setting an existing
/// key replaces its value in place, so continuation merges override earlier
/// values without reordering the rest of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamList {
    pairs: Vec<(String, String)>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Add the key only when `flag` is set, using MediaWiki's `"1"` encoding.
    pub fn with_flag(self, key: &str, flag: bool) -> Self {
        if flag { self.with(key, "1") } else { self }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(pair) = self.pairs.iter_mut().find(|(existing, _)| existing == key) {
            pair.1 = value;
            return;
        }
        self.pairs.push((key.to_string(), value));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(existing, _)| existing == key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Merge a server-supplied continuation object into a new parameter list.
    ///
    /// Every key of the object is echoed verbatim on the next request; the
    /// receiver is left untouched so continuation state never leaks
    /// between loop iterations.
    pub fn merged(&self, continuation: &Value) -> ParamList {
        let mut next = self.clone();
        if let Some(object) = continuation.as_object() {
            for (key, value) in object {
                match value {
                    Value::String(text) => next.set(key, text.clone()),
                    other => next.set(key, other.to_string()),
                }
            }
        }
        next
    }
}

/// MediaWiki's array encoding: values joined with `|`.
pub fn pipe_join<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|value| value.as_ref())
        .collect::<Vec<_>>()
        .join("|")
}

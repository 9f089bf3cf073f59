use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::Value;

use crate::client::Client;
use crate::error::{ApiError, envelope_error};
use crate::params::{ParamList, pipe_join};
use crate::query::QueryApi;

/// Optional fields for an edit call; everything defaults to off.
#[derive(Debug, Clone, Default)]
pub struct EditOptions {
    pub summary: String,
    pub minor: bool,
    pub bot: bool,
    pub create_only: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PurgeWarning {
    pub title: String,
    pub note: String,
}

/// Outcome of a purge call. Individual invalid or missing targets are
/// reported here as warnings, never raised.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PurgeReport {
    pub purged: Vec<String>,
    pub warnings: Vec<PurgeWarning>,
}

/// Outcome of an upload call; server-side warnings are reported, not raised.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadReport {
    pub result: String,
    pub warnings: Vec<String>,
}

/// Content-changing operations available to any account.
///
/// Every method follows the same pattern: fetch a fresh token for the
/// action, POST, inspect the error envelope first, then extract the
/// success payload.
pub trait EditApi {
    /// Returns the new revision id, or `None` when the edit was a no-op.
    fn edit(&mut self, title: &str, text: &str, options: &EditOptions) -> Result<Option<i64>>;
    /// Returns the title the page now lives at.
    fn move_page(
        &mut self,
        from: &str,
        to: &str,
        reason: &str,
        move_talk: bool,
        no_redirect: bool,
    ) -> Result<String>;
    fn delete(&mut self, title: &str, reason: &str) -> Result<()>;
    /// Returns whether the page's watch state actually changed.
    fn watch(&mut self, title: &str) -> Result<bool>;
    fn unwatch(&mut self, title: &str) -> Result<bool>;
    fn purge(&mut self, titles: &[String]) -> Result<PurgeReport>;
    /// Upload a file the server fetches from `url`. The filename extension
    /// is checked against the wiki's allowed list before any upload request
    /// goes out.
    fn upload_from_url(
        &mut self,
        filename: &str,
        url: &str,
        comment: &str,
    ) -> Result<UploadReport>;
}

/// Operations requiring elevated rights on the wiki.
pub trait AdminApi {
    fn block(&mut self, user: &str, reason: &str, expiry: Option<&str>) -> Result<()>;
    fn unblock(&mut self, user: &str, reason: &str) -> Result<()>;
    fn patrol(&mut self, rcid: i64) -> Result<()>;
}

impl EditApi for Client {
    fn edit(&mut self, title: &str, text: &str, options: &EditOptions) -> Result<Option<i64>> {
        let token = self.get_token("edit", Some(title))?;
        let params = ParamList::new()
            .with("action", "edit")
            .with("title", title)
            .with("text", text)
            .with("summary", options.summary.clone())
            .with_flag("minor", options.minor)
            .with_flag("bot", options.bot)
            .with_flag("createonly", options.create_only)
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Edit(error.code).into());
        }

        let edit = body.get("edit");
        let result = edit
            .and_then(|edit| edit.get("result"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        if result != "Success" {
            return Err(ApiError::Edit(result.to_string()).into());
        }
        Ok(edit
            .and_then(|edit| edit.get("newrevid"))
            .and_then(Value::as_i64))
    }

    fn move_page(
        &mut self,
        from: &str,
        to: &str,
        reason: &str,
        move_talk: bool,
        no_redirect: bool,
    ) -> Result<String> {
        let token = self.get_token("move", Some(from))?;
        let params = ParamList::new()
            .with("action", "move")
            .with("from", from)
            .with("to", to)
            .with("reason", reason)
            .with_flag("movetalk", move_talk)
            .with_flag("noredirect", no_redirect)
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Edit(error.code).into());
        }
        body.get("move")
            .and_then(|moved| moved.get("to"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing move payload in API response"))
    }

    fn delete(&mut self, title: &str, reason: &str) -> Result<()> {
        let token = self.get_token("delete", Some(title))?;
        let params = ParamList::new()
            .with("action", "delete")
            .with("title", title)
            .with("reason", reason)
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Edit(error.code).into());
        }
        Ok(())
    }

    fn watch(&mut self, title: &str) -> Result<bool> {
        let token = self.get_token("watch", Some(title))?;
        let params = ParamList::new()
            .with("action", "watch")
            .with("title", title)
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Edit(error.code).into());
        }
        Ok(body
            .get("watch")
            .is_some_and(|watch| watch.get("watched").is_some()))
    }

    fn unwatch(&mut self, title: &str) -> Result<bool> {
        let token = self.get_token("watch", Some(title))?;
        let params = ParamList::new()
            .with("action", "watch")
            .with("title", title)
            .with("unwatch", "1")
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Edit(error.code).into());
        }
        Ok(body
            .get("watch")
            .is_some_and(|watch| watch.get("unwatched").is_some()))
    }

    fn purge(&mut self, titles: &[String]) -> Result<PurgeReport> {
        let params = ParamList::new()
            .with("action", "purge")
            .with("titles", pipe_join(titles));
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            bail!("purge failed [{}]: {}", error.code, error.info);
        }

        let mut report = PurgeReport {
            purged: Vec::new(),
            warnings: Vec::new(),
        };
        if let Some(entries) = body.get("purge").and_then(Value::as_array) {
            for entry in entries {
                let title = entry
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if entry.get("purged").is_some() {
                    report.purged.push(title);
                } else if entry.get("missing").is_some() {
                    report.warnings.push(PurgeWarning {
                        title,
                        note: "page does not exist".to_string(),
                    });
                } else if entry.get("invalid").is_some() {
                    report.warnings.push(PurgeWarning {
                        title,
                        note: "invalid title".to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    fn upload_from_url(
        &mut self,
        filename: &str,
        url: &str,
        comment: &str,
    ) -> Result<UploadReport> {
        let allowed = self.allowed_file_extensions()?;
        let extension = filename
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase())
            .unwrap_or_default();
        if !allowed
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(&extension))
        {
            return Err(ApiError::UploadInvalidFileExt {
                filename: filename.to_string(),
                allowed,
            }
            .into());
        }

        let token = self.get_token("edit", Some(filename))?;
        let params = ParamList::new()
            .with("action", "upload")
            .with("filename", filename)
            .with("url", url)
            .with("comment", comment)
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Edit(error.code).into());
        }

        let upload = body.get("upload");
        let result = upload
            .and_then(|upload| upload.get("result"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let mut warnings = Vec::new();
        if let Some(raised) = upload
            .and_then(|upload| upload.get("warnings"))
            .and_then(Value::as_object)
        {
            for (key, value) in raised {
                match value {
                    Value::String(text) => warnings.push(format!("{key}: {text}")),
                    other => warnings.push(format!("{key}: {other}")),
                }
            }
        }
        Ok(UploadReport { result, warnings })
    }
}

impl AdminApi for Client {
    fn block(&mut self, user: &str, reason: &str, expiry: Option<&str>) -> Result<()> {
        let token = self.get_token("block", None)?;
        let params = ParamList::new()
            .with("action", "block")
            .with("user", user)
            .with("reason", reason)
            .with_opt("expiry", expiry)
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Block(error.code).into());
        }
        Ok(())
    }

    fn unblock(&mut self, user: &str, reason: &str) -> Result<()> {
        let token = self.get_token("unblock", None)?;
        let params = ParamList::new()
            .with("action", "unblock")
            .with("user", user)
            .with("reason", reason)
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Block(error.code).into());
        }
        Ok(())
    }

    fn patrol(&mut self, rcid: i64) -> Result<()> {
        let token = self.get_token("patrol", None)?;
        let params = ParamList::new()
            .with("action", "patrol")
            .with("rcid", rcid.to_string())
            .with("token", token);
        let body = self.request(&params)?;
        if let Some(error) = envelope_error(&body) {
            return Err(ApiError::Patrol(error.code).into());
        }
        Ok(())
    }
}

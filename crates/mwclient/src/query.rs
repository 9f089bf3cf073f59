use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;

use crate::client::{Client, collect_list_field};
use crate::limits::{Limit, RANDOM_BOT_MAX, RANDOM_USER_MAX, cap_limit_with};
use crate::logevents::LogEvent;
use crate::params::{ParamList, pipe_join};
use crate::types::{FileRepo, Page, Tag, UserInfo, flat_map};

/// Read operations. Paginated lists run through the continuation engine;
/// a `None` limit falls back to the session default before capping.
pub trait QueryApi {
    fn site_info(&mut self) -> Result<BTreeMap<String, String>>;
    fn file_repos(&mut self) -> Result<Vec<FileRepo>>;
    fn user_info(&mut self) -> Result<UserInfo>;
    fn allowed_file_extensions(&mut self) -> Result<Vec<String>>;
    fn category_members(&mut self, category: &str, limit: Option<Limit>) -> Result<Vec<Page>>;
    fn search(&mut self, text: &str, limit: Option<Limit>) -> Result<Vec<Page>>;
    fn all_pages(
        &mut self,
        prefix: Option<&str>,
        namespace: Option<i64>,
        limit: Option<Limit>,
    ) -> Result<Vec<String>>;
    fn page_text(&mut self, title: &str) -> Result<Option<String>>;
    fn page_categories(&mut self, title: &str, limit: Option<Limit>) -> Result<Vec<String>>;
    fn log_events(&mut self, log_type: Option<&str>, limit: Option<Limit>)
    -> Result<Vec<LogEvent>>;
    fn watchlist_raw(&mut self, limit: Option<Limit>) -> Result<Vec<String>>;
    fn random_pages(&mut self, count: u64, namespaces: &[i64]) -> Result<Vec<String>>;
    fn tags(&mut self, limit: Option<Limit>) -> Result<Vec<Tag>>;
}

impl QueryApi for Client {
    fn site_info(&mut self) -> Result<BTreeMap<String, String>> {
        let params = ParamList::new()
            .with("meta", "siteinfo")
            .with("siprop", "general");
        self.run_query(params, BTreeMap::new(), |mut acc, fragment| {
            acc.extend(flat_map(fragment, "general"));
            Ok(acc)
        })
    }

    fn file_repos(&mut self) -> Result<Vec<FileRepo>> {
        let params = ParamList::new()
            .with("meta", "filerepoinfo")
            .with("friprop", pipe_join(&["name", "displayname", "url"]));
        self.run_query(params, Vec::new(), |mut acc, fragment| {
            if let Some(repos) = fragment.get("repos").and_then(Value::as_array) {
                for repo in repos {
                    if let Some(repo) = FileRepo::from_value(repo).optional("file repo")? {
                        acc.push(repo);
                    }
                }
            }
            Ok(acc)
        })
    }

    fn user_info(&mut self) -> Result<UserInfo> {
        let params = ParamList::new()
            .with("meta", "userinfo")
            .with("uiprop", pipe_join(&["groups", "rights"]));
        let info = self.run_query(params, None, |acc: Option<UserInfo>, fragment| {
            if acc.is_some() {
                return Ok(acc);
            }
            match fragment.get("userinfo") {
                Some(value) => Ok(Some(UserInfo::from_value(value).require("userinfo")?)),
                None => Ok(acc),
            }
        })?;
        info.ok_or_else(|| anyhow::anyhow!("no userinfo in API response"))
    }

    fn allowed_file_extensions(&mut self) -> Result<Vec<String>> {
        let params = ParamList::new()
            .with("meta", "siteinfo")
            .with("siprop", "fileextensions");
        self.run_query(params, Vec::new(), |mut acc: Vec<String>, fragment| {
            acc.extend(collect_list_field(fragment, "fileextensions", "ext"));
            Ok(acc)
        })
    }

    fn category_members(&mut self, category: &str, limit: Option<Limit>) -> Result<Vec<Page>> {
        let limit = self.effective_limit(limit)?;
        let title = if category.starts_with("Category:") {
            category.to_string()
        } else {
            format!("Category:{category}")
        };
        let params = ParamList::new()
            .with("list", "categorymembers")
            .with("cmtitle", title)
            .with("cmprop", pipe_join(&["ids", "title", "timestamp"]))
            .with("cmlimit", limit.as_param());
        self.run_query(params, Vec::new(), |mut acc, fragment| {
            if let Some(members) = fragment.get("categorymembers").and_then(Value::as_array) {
                for member in members {
                    if let Some(page) = Page::from_value(member).optional("category member")? {
                        acc.push(page);
                    }
                }
            }
            Ok(acc)
        })
    }

    fn search(&mut self, text: &str, limit: Option<Limit>) -> Result<Vec<Page>> {
        let limit = self.effective_limit(limit)?;
        let params = ParamList::new()
            .with("list", "search")
            .with("srsearch", text)
            .with(
                "srprop",
                pipe_join(&["size", "wordcount", "timestamp", "snippet"]),
            )
            .with("srlimit", limit.as_param());
        self.run_query(params, Vec::new(), |mut acc, fragment| {
            if let Some(hits) = fragment.get("search").and_then(Value::as_array) {
                for hit in hits {
                    if let Some(page) = Page::from_value(hit).optional("search hit")? {
                        acc.push(page);
                    }
                }
            }
            Ok(acc)
        })
    }

    fn all_pages(
        &mut self,
        prefix: Option<&str>,
        namespace: Option<i64>,
        limit: Option<Limit>,
    ) -> Result<Vec<String>> {
        let limit = self.effective_limit(limit)?;
        let params = ParamList::new()
            .with("list", "allpages")
            .with_opt("apprefix", prefix)
            .with_opt("apnamespace", namespace.map(|ns| ns.to_string()))
            .with("aplimit", limit.as_param());
        self.run_query(params, Vec::new(), |mut acc: Vec<String>, fragment| {
            acc.extend(collect_list_field(fragment, "allpages", "title"));
            Ok(acc)
        })
    }

    fn page_text(&mut self, title: &str) -> Result<Option<String>> {
        let params = ParamList::new()
            .with("prop", "revisions")
            .with("rvprop", "content")
            .with("rvlimit", "1")
            .with("titles", title);
        let page = self.run_query(params, None, |acc: Option<Page>, fragment| {
            if acc.is_some() {
                return Ok(acc);
            }
            if let Some(pages) = fragment.get("pages").and_then(Value::as_object) {
                for entry in pages.values() {
                    if let Some(page) = Page::from_value(entry).optional("page")? {
                        return Ok(Some(page));
                    }
                }
            }
            Ok(acc)
        })?;
        Ok(page.and_then(|page| page.text))
    }

    fn page_categories(&mut self, title: &str, limit: Option<Limit>) -> Result<Vec<String>> {
        let limit = self.effective_limit(limit)?;
        let params = ParamList::new()
            .with("prop", "categories")
            .with("titles", title)
            .with("cllimit", limit.as_param());
        // `pages` is keyed by page ids the caller never asked for; only the
        // category titles inside each value matter.
        self.run_query(params, Vec::new(), |mut acc: Vec<String>, fragment| {
            if let Some(pages) = fragment.get("pages").and_then(Value::as_object) {
                for entry in pages.values() {
                    acc.extend(collect_list_field(entry, "categories", "title"));
                }
            }
            Ok(acc)
        })
    }

    fn log_events(
        &mut self,
        log_type: Option<&str>,
        limit: Option<Limit>,
    ) -> Result<Vec<LogEvent>> {
        let limit = self.effective_limit(limit)?;
        let params = ParamList::new()
            .with("list", "logevents")
            .with(
                "leprop",
                pipe_join(&[
                    "ids", "title", "type", "user", "timestamp", "comment", "details",
                ]),
            )
            .with_opt("letype", log_type)
            .with("lelimit", limit.as_param());
        self.run_query(params, Vec::new(), |mut acc, fragment| {
            if let Some(entries) = fragment.get("logevents").and_then(Value::as_array) {
                for entry in entries {
                    if let Some(event) = LogEvent::from_value(entry).optional("log event")? {
                        acc.push(event);
                    }
                }
            }
            Ok(acc)
        })
    }

    fn watchlist_raw(&mut self, limit: Option<Limit>) -> Result<Vec<String>> {
        let limit = self.effective_limit(limit)?;
        let params = ParamList::new()
            .with("list", "watchlistraw")
            .with("wrlimit", limit.as_param());
        self.run_query(params, Vec::new(), |mut acc: Vec<String>, fragment| {
            acc.extend(collect_list_field(fragment, "watchlistraw", "title"));
            Ok(acc)
        })
    }

    fn random_pages(&mut self, count: u64, namespaces: &[i64]) -> Result<Vec<String>> {
        // Random fetches use their own much smaller caps and never paginate;
        // the server would hand out a fresh continuation forever.
        let limit = cap_limit_with(Limit::Value(count), RANDOM_USER_MAX, RANDOM_BOT_MAX, self)?;
        let namespace_filter = namespaces
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        let params = ParamList::new()
            .with("action", "query")
            .with("list", "random")
            .with_opt(
                "rnnamespace",
                (!namespace_filter.is_empty()).then(|| pipe_join(&namespace_filter)),
            )
            .with("rnlimit", limit.as_param());
        let body = self.request(&params)?;
        Ok(body
            .get("query")
            .map(|fragment| collect_list_field(fragment, "random", "title"))
            .unwrap_or_default())
    }

    fn tags(&mut self, limit: Option<Limit>) -> Result<Vec<Tag>> {
        let limit = self.effective_limit(limit)?;
        let params = ParamList::new()
            .with("list", "tags")
            .with(
                "tgprop",
                pipe_join(&["name", "displayname", "description", "hitcount"]),
            )
            .with("tglimit", limit.as_param());
        self.run_query(params, Vec::new(), |mut acc, fragment| {
            if let Some(tags) = fragment.get("tags").and_then(Value::as_array) {
                for tag in tags {
                    if let Some(tag) = Tag::from_value(tag).optional("tag")? {
                        acc.push(tag);
                    }
                }
            }
            Ok(acc)
        })
    }
}

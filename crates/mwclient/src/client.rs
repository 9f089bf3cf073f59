use std::env;

use anyhow::{Result, bail};
use serde_json::Value;

use crate::error::{ApiError, envelope_error};
use crate::limits::{Limit, RoleProvider, USER_MAX_LIMIT, cap_limit};
use crate::params::ParamList;
use crate::session::{AssertMode, Session};
use crate::transport::{HttpTransport, Transport};

/// Placeholder token the API understands as "no token"; what an anonymous
/// session hands out without going to the network.
pub const ANONYMOUS_TOKEN: &str = "+\\";

/// The `prop=info&intoken=` endpoint refuses to answer without a title, so
/// token fetches that have no natural title use this one.
pub const TOKEN_PLACEHOLDER_TITLE: &str = "Main Page";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Constructor-time options. There is no config file; environment variables
/// override the defaults the same way they do for the rest of the stack.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub user_agent: Option<String>,
    pub default_limit: Limit,
    pub use_continuation: bool,
    pub assert_mode: AssertMode,
    pub max_continuation_pages: Option<usize>,
    pub timeout_ms: u64,
}

impl ClientConfig {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            user_agent: None,
            default_limit: Limit::Value(USER_MAX_LIMIT),
            use_continuation: true,
            assert_mode: AssertMode::None,
            max_continuation_pages: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::new(&env_value("WIKI_API_URL", ""));
        if let Ok(agent) = env::var("WIKI_USER_AGENT")
            && !agent.trim().is_empty()
        {
            config.user_agent = Some(agent.trim().to_string());
        }
        config.timeout_ms = env_value_u64("WIKI_HTTP_TIMEOUT_MS", DEFAULT_TIMEOUT_MS);
        config
    }
}

fn env_value(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// One wiki connection: session state plus a transport. Synchronous and
/// single-caller; concurrency means running independent clients.
pub struct Client {
    session: Session,
    transport: Box<dyn Transport>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.api_url, config.timeout_ms)?;
        Ok(Self::with_transport(config, Box::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            session: Session {
                logged_in: false,
                username: None,
                assert_mode: config.assert_mode,
                default_limit: config.default_limit,
                use_continuation: config.use_continuation,
                max_continuation_pages: config.max_continuation_pages,
                custom_user_agent: config.user_agent,
                is_bot: None,
            },
            transport,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn request_count(&self) -> usize {
        self.transport.request_count()
    }

    /// Issue one POST: injects `format=json`, injects `assert=` when an
    /// assertion mode is configured and the call did not set its own, and
    /// maps assertion failures to typed errors. Any other error envelope is
    /// returned in the body for the caller to interpret.
    pub fn request(&mut self, params: &ParamList) -> Result<Value> {
        let mut pairs = params.pairs().to_vec();
        if !params.contains("format") {
            pairs.push(("format".to_string(), "json".to_string()));
        }
        if let Some(mode) = self.session.assert_mode.as_param()
            && !params.contains("assert")
        {
            pairs.push(("assert".to_string(), mode.to_string()));
        }

        let user_agent = self.session.user_agent();
        let body = self.transport.post(&user_agent, &pairs)?;

        if self.session.assert_mode != AssertMode::None
            && let Some(error) = envelope_error(&body)
        {
            match error.code.as_str() {
                "assertuserfailed" => return Err(ApiError::NotLoggedIn(error.info).into()),
                "assertbotfailed" => return Err(ApiError::NotBot(error.info).into()),
                _ => {}
            }
        }
        Ok(body)
    }

    /// Drive a paginated `action=query` request, folding every `query`
    /// fragment into the accumulator.
    ///
    /// Continuation keys from the server are merged immutably into a fresh
    /// parameter list each iteration; the loop ends when the server omits
    /// the `continue` object, when continuation is disabled for the session,
    /// or when the optional page budget runs out.
    pub fn run_query<A, F>(&mut self, params: ParamList, init: A, mut fold: F) -> Result<A>
    where
        F: FnMut(A, &Value) -> Result<A>,
    {
        let mut params = params.with("action", "query").with("continue", "");
        let mut accumulator = init;
        let mut pages = 0usize;

        loop {
            let body = self.request(&params)?;
            if let Some(fragment) = body.get("query") {
                accumulator = fold(accumulator, fragment)?;
            }
            if !self.session.use_continuation {
                break;
            }
            pages += 1;
            if let Some(budget) = self.session.max_continuation_pages
                && pages >= budget
            {
                break;
            }
            let Some(continuation) = body.get("continue") else {
                break;
            };
            params = params.merged(continuation);
        }
        Ok(accumulator)
    }

    /// Log in and transition the session to authenticated.
    ///
    /// Any configured assertion mode is set aside for the duration of the
    /// call so the login itself cannot be rejected by an assertion failure.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let saved = self.session.assert_mode;
        self.session.assert_mode = AssertMode::None;
        let outcome = self.login_inner(username, password);
        self.session.assert_mode = saved;
        outcome
    }

    fn login_inner(&mut self, username: &str, password: &str) -> Result<()> {
        let token_body = self.request(
            &ParamList::new()
                .with("action", "query")
                .with("meta", "tokens")
                .with("type", "login"),
        )?;
        let Some(login_token) = token_body
            .get("query")
            .and_then(|query| query.get("tokens"))
            .and_then(|tokens| tokens.get("logintoken"))
            .and_then(Value::as_str)
        else {
            bail!("failed to get MediaWiki login token");
        };
        let login_token = login_token.to_string();

        let body = self.request(
            &ParamList::new()
                .with("action", "login")
                .with("lgname", username)
                .with("lgpassword", password)
                .with("lgtoken", login_token),
        )?;
        let login = body.get("login");
        let result = login
            .and_then(|login| login.get("result"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        if result != "Success" {
            return Err(ApiError::Authentication(result.to_string()).into());
        }

        self.session.logged_in = true;
        self.session.username = Some(
            login
                .and_then(|login| login.get("lgusername"))
                .and_then(Value::as_str)
                .unwrap_or(username)
                .to_string(),
        );
        Ok(())
    }

    /// Log out if authenticated; returns whether a logout actually happened.
    /// An anonymous session performs no network call.
    pub fn logout(&mut self) -> Result<bool> {
        if !self.session.logged_in {
            return Ok(false);
        }
        self.request(&ParamList::new().with("action", "logout"))?;
        self.session.logged_in = false;
        self.session.username = None;
        self.session.is_bot = None;
        Ok(true)
    }

    /// Fetch a per-action token. Anonymous sessions hand out the fixed
    /// sentinel without touching the network; tokens are refetched per call
    /// and valid only for the action type they were requested for.
    pub fn get_token(&mut self, kind: &str, title: Option<&str>) -> Result<String> {
        if !self.session.logged_in {
            return Ok(ANONYMOUS_TOKEN.to_string());
        }
        let title = title.unwrap_or(TOKEN_PLACEHOLDER_TITLE);
        let body = self.request(
            &ParamList::new()
                .with("action", "query")
                .with("prop", "info")
                .with("intoken", kind)
                .with("titles", title),
        )?;

        // The pages map is keyed by a page id the caller never asked for;
        // only the token field inside the first entry matters.
        let field = format!("{kind}token");
        if let Some(query) = body.get("query")
            && let Some(token) = collect_map_field(query, "pages", &field).into_iter().next()
        {
            return Ok(token);
        }
        bail!("no {kind} token in API response")
    }

    pub(crate) fn effective_limit(&mut self, requested: Option<Limit>) -> Result<Limit> {
        let requested = requested.unwrap_or(self.session.default_limit);
        cap_limit(requested, self)
    }
}

impl RoleProvider for Client {
    /// Lazy bot-status check: one no-op query with `assert=bot` forced,
    /// cached on the session for the rest of its lifetime.
    fn is_bot(&mut self) -> Result<bool> {
        if let Some(cached) = self.session.is_bot {
            return Ok(cached);
        }
        let probe = ParamList::new()
            .with("action", "query")
            .with("meta", "userinfo")
            .with("assert", "bot");
        let is_bot = match self.request(&probe) {
            Ok(body) => match envelope_error(&body) {
                None => true,
                Some(error)
                    if error.code == "assertbotfailed" || error.code == "assertuserfailed" =>
                {
                    false
                }
                Some(error) => bail!("bot status probe failed [{}]: {}", error.code, error.info),
            },
            Err(error) => match error.downcast_ref::<ApiError>() {
                Some(ApiError::NotBot(_)) | Some(ApiError::NotLoggedIn(_)) => false,
                _ => return Err(error),
            },
        };
        self.session.is_bot = Some(is_bot);
        Ok(is_bot)
    }
}

/// Fold helper for the map-shaped endpoints: `fragment.<key>` is a mapping
/// whose keys are irrelevant ids; project `field` from each value.
pub fn collect_map_field(fragment: &Value, key: &str, field: &str) -> Vec<String> {
    let mut output = Vec::new();
    if let Some(entries) = fragment.get(key).and_then(Value::as_object) {
        for entry in entries.values() {
            if let Some(value) = entry.get(field).and_then(Value::as_str) {
                output.push(value.to_string());
            }
        }
    }
    output
}

/// Fold helper for the list-shaped endpoints: `fragment.<key>` is a
/// sequence of objects; project `field` from each.
pub fn collect_list_field(fragment: &Value, key: &str, field: &str) -> Vec<String> {
    let mut output = Vec::new();
    if let Some(entries) = fragment.get(key).and_then(Value::as_array) {
        for entry in entries {
            if let Some(value) = entry.get(field).and_then(Value::as_str) {
                output.push(value.to_string());
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ANONYMOUS_TOKEN, Client, ClientConfig, collect_list_field, collect_map_field};
    use crate::error::ApiError;
    use crate::limits::{Limit, RoleProvider};
    use crate::params::ParamList;
    use crate::session::AssertMode;
    use crate::transport::testing::ScriptedTransport;

    fn scripted(
        config: ClientConfig,
        responses: Vec<serde_json::Value>,
    ) -> (
        Client,
        std::rc::Rc<std::cell::RefCell<crate::transport::testing::TransportLog>>,
    ) {
        let (transport, log) = ScriptedTransport::with_responses(responses);
        (Client::with_transport(config, Box::new(transport)), log)
    }

    fn config() -> ClientConfig {
        ClientConfig::new("https://wiki.example.org/w/api.php")
    }

    #[test]
    fn request_injects_format_and_assert_mode() {
        let mut bot_config = config();
        bot_config.assert_mode = AssertMode::Bot;
        let (mut client, log) = scripted(bot_config, vec![json!({})]);

        client
            .request(&ParamList::new().with("action", "query"))
            .expect("request");

        let log = log.borrow();
        assert_eq!(log.param(0, "format").as_deref(), Some("json"));
        assert_eq!(log.param(0, "assert").as_deref(), Some("bot"));
    }

    #[test]
    fn request_leaves_assert_out_without_an_assertion_mode() {
        let (mut client, log) = scripted(config(), vec![json!({})]);
        client
            .request(&ParamList::new().with("action", "query"))
            .expect("request");
        assert_eq!(log.borrow().param(0, "assert"), None);
    }

    #[test]
    fn assertion_failures_map_to_typed_errors() {
        let mut bot_config = config();
        bot_config.assert_mode = AssertMode::Bot;
        let (mut client, _log) = scripted(
            bot_config,
            vec![json!({"error": {"code": "assertbotfailed", "info": "msg"}})],
        );
        let error = client
            .request(&ParamList::new().with("action", "query"))
            .expect_err("assertion failure");
        assert_eq!(
            error.downcast_ref::<ApiError>(),
            Some(&ApiError::NotBot("msg".to_string()))
        );
        assert_eq!(error.to_string(), "msg");

        let mut user_config = config();
        user_config.assert_mode = AssertMode::User;
        let (mut client, _log) = scripted(
            user_config,
            vec![json!({"error": {"code": "assertuserfailed", "info": "not logged in"}})],
        );
        let error = client
            .request(&ParamList::new().with("action", "query"))
            .expect_err("assertion failure");
        assert_eq!(
            error.downcast_ref::<ApiError>(),
            Some(&ApiError::NotLoggedIn("not logged in".to_string()))
        );
    }

    #[test]
    fn other_error_envelopes_are_returned_in_the_body() {
        let mut user_config = config();
        user_config.assert_mode = AssertMode::User;
        let (mut client, _log) = scripted(
            user_config,
            vec![json!({"error": {"code": "ratelimited", "info": "slow down"}})],
        );
        let body = client
            .request(&ParamList::new().with("action", "query"))
            .expect("body");
        assert_eq!(body["error"]["code"], "ratelimited");
    }

    #[test]
    fn run_query_folds_every_page_and_threads_the_accumulator() {
        let (mut client, log) = scripted(
            config(),
            vec![
                json!({
                    "query": {"allpages": [{"title": "A"}, {"title": "B"}]},
                    "continue": {"apcontinue": "C", "continue": "-||"},
                }),
                json!({
                    "query": {"allpages": [{"title": "C"}]},
                }),
            ],
        );

        let titles = client
            .run_query(
                ParamList::new().with("list", "allpages"),
                Vec::new(),
                |mut acc, fragment| {
                    acc.extend(collect_list_field(fragment, "allpages", "title"));
                    Ok(acc)
                },
            )
            .expect("query");

        assert_eq!(titles, vec!["A", "B", "C"]);
        let log = log.borrow();
        assert_eq!(log.requests.len(), 2);
        assert_eq!(log.param(0, "action").as_deref(), Some("query"));
        assert_eq!(log.param(0, "continue").as_deref(), Some(""));
        assert_eq!(log.param(1, "apcontinue").as_deref(), Some("C"));
        assert_eq!(log.param(1, "continue").as_deref(), Some("-||"));
    }

    #[test]
    fn run_query_stops_after_one_page_when_continuation_is_disabled() {
        let mut single_page = config();
        single_page.use_continuation = false;
        let (mut client, log) = scripted(
            single_page,
            vec![json!({
                "query": {"allpages": [{"title": "A"}]},
                "continue": {"apcontinue": "B"},
            })],
        );

        let mut folds = 0usize;
        let titles = client
            .run_query(
                ParamList::new().with("list", "allpages"),
                Vec::new(),
                |mut acc: Vec<String>, fragment| {
                    folds += 1;
                    acc.extend(collect_list_field(fragment, "allpages", "title"));
                    Ok(acc)
                },
            )
            .expect("query");

        assert_eq!(folds, 1);
        assert_eq!(titles, vec!["A"]);
        assert_eq!(log.borrow().requests.len(), 1);
    }

    #[test]
    fn run_query_honors_the_optional_page_budget() {
        let mut budgeted = config();
        budgeted.max_continuation_pages = Some(2);
        let endless = |marker: &str| {
            json!({
                "query": {"allpages": [{"title": marker}]},
                "continue": {"apcontinue": marker},
            })
        };
        let (mut client, log) = scripted(budgeted, vec![endless("A"), endless("B"), endless("C")]);

        let titles = client
            .run_query(
                ParamList::new().with("list", "allpages"),
                Vec::new(),
                |mut acc, fragment| {
                    acc.extend(collect_list_field(fragment, "allpages", "title"));
                    Ok(acc)
                },
            )
            .expect("query");

        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(log.borrow().requests.len(), 2);
    }

    #[test]
    fn run_query_skips_fold_when_the_fragment_is_absent() {
        let (mut client, _log) = scripted(config(), vec![json!({"batchcomplete": ""})]);
        let mut folds = 0usize;
        client
            .run_query(ParamList::new(), (), |acc, _fragment| {
                folds += 1;
                Ok(acc)
            })
            .expect("query");
        assert_eq!(folds, 0);
    }

    #[test]
    fn anonymous_token_is_the_sentinel_with_zero_network_calls() {
        let (mut client, log) = scripted(config(), vec![]);
        let token = client.get_token("edit", None).expect("token");
        assert_eq!(token, ANONYMOUS_TOKEN);
        assert_eq!(log.borrow().requests.len(), 0);
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn authenticated_token_fetch_uses_the_placeholder_title() {
        let (mut client, log) = scripted(
            config(),
            vec![
                json!({"query": {"tokens": {"logintoken": "abc+\\"}}}),
                json!({"login": {"result": "Success", "lgusername": "ExampleBot"}}),
                json!({"query": {"pages": {"5": {"title": "Main Page", "edittoken": "tok123+\\"}}}}),
            ],
        );
        client.login("ExampleBot", "hunter2").expect("login");
        let token = client.get_token("edit", None).expect("token");
        assert_eq!(token, "tok123+\\");
        let log = log.borrow();
        assert_eq!(log.param(2, "intoken").as_deref(), Some("edit"));
        assert_eq!(log.param(2, "titles").as_deref(), Some("Main Page"));
    }

    #[test]
    fn login_success_transitions_the_session() {
        let (mut client, log) = scripted(
            config(),
            vec![
                json!({"query": {"tokens": {"logintoken": "abc+\\"}}}),
                json!({"login": {"result": "Success", "lgusername": "ExampleBot"}}),
            ],
        );
        client.login("examplebot", "hunter2").expect("login");
        assert!(client.session().logged_in);
        assert_eq!(client.session().username.as_deref(), Some("ExampleBot"));
        assert_eq!(log.borrow().param(1, "lgtoken").as_deref(), Some("abc+\\"));
    }

    #[test]
    fn login_failure_raises_the_server_result_code() {
        let (mut client, _log) = scripted(
            config(),
            vec![
                json!({"query": {"tokens": {"logintoken": "abc+\\"}}}),
                json!({"login": {"result": "WrongPass"}}),
            ],
        );
        let error = client.login("ExampleBot", "wrong").expect_err("failure");
        assert_eq!(
            error.downcast_ref::<ApiError>(),
            Some(&ApiError::Authentication("WrongPass".to_string()))
        );
        assert_eq!(error.to_string(), "WrongPass");
        assert!(!client.session().logged_in);
    }

    #[test]
    fn login_suspends_the_assertion_mode_for_the_duration_of_the_call() {
        let mut user_config = config();
        user_config.assert_mode = AssertMode::User;
        let (mut client, log) = scripted(
            user_config,
            vec![
                json!({"query": {"tokens": {"logintoken": "abc+\\"}}}),
                json!({"login": {"result": "Success", "lgusername": "ExampleBot"}}),
            ],
        );
        client.login("ExampleBot", "hunter2").expect("login");
        let restored = client.session().assert_mode;
        assert_eq!(restored, AssertMode::User);
        let log = log.borrow();
        assert_eq!(log.param(0, "assert"), None);
        assert_eq!(log.param(1, "assert"), None);
    }

    #[test]
    fn logout_is_a_no_op_for_anonymous_sessions() {
        let (mut client, log) = scripted(config(), vec![]);
        assert!(!client.logout().expect("logout"));
        assert_eq!(log.borrow().requests.len(), 0);
    }

    #[test]
    fn logout_resets_the_session_after_the_action() {
        let (mut client, log) = scripted(
            config(),
            vec![
                json!({"query": {"tokens": {"logintoken": "abc+\\"}}}),
                json!({"login": {"result": "Success", "lgusername": "ExampleBot"}}),
                json!({}),
            ],
        );
        client.login("ExampleBot", "hunter2").expect("login");
        assert!(client.logout().expect("logout"));
        assert!(!client.session().logged_in);
        assert!(client.session().username.is_none());
        assert_eq!(log.borrow().param(2, "action").as_deref(), Some("logout"));
    }

    #[test]
    fn bot_probe_caches_its_result() {
        let (mut client, log) = scripted(
            config(),
            vec![json!({"query": {"userinfo": {"id": 9, "name": "ExampleBot"}}})],
        );
        assert!(client.is_bot().expect("probe"));
        assert!(client.is_bot().expect("cached"));
        let log = log.borrow();
        assert_eq!(log.requests.len(), 1);
        assert_eq!(log.param(0, "assert").as_deref(), Some("bot"));
    }

    #[test]
    fn bot_probe_reads_an_assertion_failure_as_not_a_bot() {
        let (mut client, _log) = scripted(
            config(),
            vec![json!({"error": {"code": "assertbotfailed", "info": "nope"}})],
        );
        assert!(!client.is_bot().expect("probe"));
        assert_eq!(client.effective_limit(Some(Limit::Value(2000))).expect("cap"), Limit::Value(500));
    }

    #[test]
    fn user_agent_reflects_the_session_and_custom_override() {
        let (mut client, log) = scripted(
            config(),
            vec![
                json!({"query": {"tokens": {"logintoken": "abc+\\"}}}),
                json!({"login": {"result": "Success", "lgusername": "ExampleBot"}}),
                json!({}),
            ],
        );
        client.login("ExampleBot", "hunter2").expect("login");
        client
            .request(&ParamList::new().with("action", "query"))
            .expect("request");
        let log = log.borrow();
        assert!(log.user_agents[0].starts_with("anonymous "));
        assert!(log.user_agents[2].starts_with("ExampleBot "));
    }

    #[test]
    fn fold_helpers_cover_the_two_standard_shapes() {
        let fragment = json!({
            "pages": {"10": {"title": "A"}, "11": {"title": "B"}},
            "search": [{"title": "C"}, {"title": "D"}],
        });
        assert_eq!(collect_map_field(&fragment, "pages", "title"), vec!["A", "B"]);
        assert_eq!(collect_list_field(&fragment, "search", "title"), vec!["C", "D"]);
        assert!(collect_list_field(&fragment, "absent", "title").is_empty());
    }
}

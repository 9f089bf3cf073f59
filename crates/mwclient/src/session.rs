use crate::limits::Limit;

pub const PRODUCT_SIGNATURE: &str = "mwclient-rs/0.2";
const ANONYMOUS_USER: &str = "anonymous";

/// Client-requested guarantee the server validates on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssertMode {
    #[default]
    None,
    User,
    Bot,
}

impl AssertMode {
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            AssertMode::None => None,
            AssertMode::User => Some("user"),
            AssertMode::Bot => Some("bot"),
        }
    }
}

/// Per-connection state, created once and mutated only by login/logout
/// (plus the cached result of the lazy bot-status probe).
#[derive(Debug, Clone)]
pub struct Session {
    pub logged_in: bool,
    pub username: Option<String>,
    pub assert_mode: AssertMode,
    pub default_limit: Limit,
    pub use_continuation: bool,
    pub max_continuation_pages: Option<usize>,
    pub custom_user_agent: Option<String>,
    pub(crate) is_bot: Option<bool>,
}

impl Session {
    /// The custom agent string if configured, else a derived string carrying
    /// the current username (or an anonymous marker) and the product
    /// signature.
    pub fn user_agent(&self) -> String {
        if let Some(custom) = &self.custom_user_agent {
            return custom.clone();
        }
        let user = self.username.as_deref().unwrap_or(ANONYMOUS_USER);
        format!("{user} {PRODUCT_SIGNATURE}")
    }
}

#[cfg(test)]
mod tests {
    use super::{AssertMode, PRODUCT_SIGNATURE, Session};
    use crate::limits::Limit;

    fn session() -> Session {
        Session {
            logged_in: false,
            username: None,
            assert_mode: AssertMode::None,
            default_limit: Limit::Value(500),
            use_continuation: true,
            max_continuation_pages: None,
            custom_user_agent: None,
            is_bot: None,
        }
    }

    #[test]
    fn user_agent_marks_anonymous_sessions() {
        assert_eq!(session().user_agent(), format!("anonymous {PRODUCT_SIGNATURE}"));
    }

    #[test]
    fn user_agent_embeds_the_logged_in_username() {
        let mut session = session();
        session.username = Some("ExampleBot".to_string());
        assert_eq!(
            session.user_agent(),
            format!("ExampleBot {PRODUCT_SIGNATURE}")
        );
    }

    #[test]
    fn custom_user_agent_wins_over_the_derived_one() {
        let mut session = session();
        session.custom_user_agent = Some("archive-tool/1.0".to_string());
        session.username = Some("ExampleBot".to_string());
        assert_eq!(session.user_agent(), "archive-tool/1.0");
    }

    #[test]
    fn assert_mode_maps_to_wire_values() {
        assert_eq!(AssertMode::None.as_param(), None);
        assert_eq!(AssertMode::User.as_param(), Some("user"));
        assert_eq!(AssertMode::Bot.as_param(), Some("bot"));
    }
}

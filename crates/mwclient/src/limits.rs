use anyhow::Result;

pub const USER_MAX_LIMIT: u64 = 500;
pub const BOT_MAX_LIMIT: u64 = 5000;

/// Random-page fetches use a much smaller cap than list queries.
pub const RANDOM_USER_MAX: u64 = 10;
pub const RANDOM_BOT_MAX: u64 = 20;

/// A per-call result-set limit. `Max` is the sentinel the server interprets
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Max,
    Value(u64),
}

impl Limit {
    /// Parse a user-supplied limit string.
    ///
    /// Only `"max"` is meaningful; every other string, numeric or not,
    /// silently degrades to the standard user cap instead of erroring.
    /// Numeric limits go through `Limit::Value` directly.
    pub fn parse(raw: &str) -> Limit {
        if raw == "max" {
            return Limit::Max;
        }
        Limit::Value(USER_MAX_LIMIT)
    }

    pub fn as_param(self) -> String {
        match self {
            Limit::Max => "max".to_string(),
            Limit::Value(value) => value.to_string(),
        }
    }
}

/// Answers whether the current account holds the bot right.
///
/// Injectable so the role check can be stubbed in tests; the live provider
/// is the client's lazy `assert=bot` probe, which costs one extra request
/// the first time an over-cap limit is seen.
pub trait RoleProvider {
    fn is_bot(&mut self) -> Result<bool>;
}

/// Cap a requested limit against the standard role maxima (500/5000).
pub fn cap_limit(requested: Limit, role: &mut dyn RoleProvider) -> Result<Limit> {
    cap_limit_with(requested, USER_MAX_LIMIT, BOT_MAX_LIMIT, role)
}

/// Cap a requested limit against endpoint-specific maxima.
///
/// `Max` passes through unchanged and values at or below the user cap never
/// trigger the role check.
pub fn cap_limit_with(
    requested: Limit,
    user_max: u64,
    bot_max: u64,
    role: &mut dyn RoleProvider,
) -> Result<Limit> {
    match requested {
        Limit::Max => Ok(Limit::Max),
        // Zero is not a valid request size; bump it to the floor.
        Limit::Value(value) if value <= user_max => Ok(Limit::Value(value.max(1))),
        Limit::Value(value) => {
            if role.is_bot()? {
                Ok(Limit::Value(value.min(bot_max)))
            } else {
                Ok(Limit::Value(user_max))
            }
        }
    }
}

/// String entry point: any string other than `"max"` degrades to the
/// per-endpoint user cap rather than erroring, even when it looks numeric.
/// The role is never consulted for string input.
pub fn cap_limit_str(
    raw: &str,
    user_max: u64,
    _bot_max: u64,
    _role: &mut dyn RoleProvider,
) -> Result<Limit> {
    if raw == "max" {
        return Ok(Limit::Max);
    }
    Ok(Limit::Value(user_max))
}

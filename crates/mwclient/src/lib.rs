//! Synchronous client library for the MediaWiki Action API.
//!
//! One `Client` per wiki connection: requests are form-encoded POSTs with
//! `format=json`, paginated queries run through the continuation engine,
//! and responses map into plain value objects. Blocking and single-caller
//! by design; run independent clients for parallelism.

pub mod actions;
pub mod client;
pub mod error;
pub mod limits;
pub mod logevents;
pub mod params;
pub mod query;
pub mod session;
pub mod transport;
pub mod types;

pub use actions::{AdminApi, EditApi, EditOptions, PurgeReport, PurgeWarning, UploadReport};
pub use client::{ANONYMOUS_TOKEN, Client, ClientConfig, TOKEN_PLACEHOLDER_TITLE};
pub use error::{ApiError, UNKNOWN_ERROR_CODE};
pub use limits::{
    BOT_MAX_LIMIT, Limit, RoleProvider, USER_MAX_LIMIT, cap_limit, cap_limit_str, cap_limit_with,
};
pub use logevents::{LogEvent, LogEventKind, ProtectionDetail};
pub use params::{ParamList, pipe_join};
pub use query::QueryApi;
pub use session::{AssertMode, Session};
pub use transport::{HttpTransport, Transport};
pub use types::{Decoded, FileRepo, Page, Tag, UserInfo, format_timestamp, parse_timestamp};

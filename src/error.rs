use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the scanning protocol.
///
/// The invitation variants are deliberately split so the volunteer can be
/// told whether to ask for a new code or stop retrying the one they have.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invitation code not recognized")]
    InvitationNotFound,

    #[error("invitation code has expired")]
    InvitationExpired,

    #[error("invitation code has been revoked")]
    InvitationRevoked,

    /// The scanned payload declares a schema major version this build
    /// does not understand. Never partially decoded.
    #[error("unsupported token version {0}")]
    UnsupportedVersion(String),

    /// The scanned payload is not a decodable token.
    #[error("unreadable code: {0}")]
    MalformedToken(String),

    /// The scanned token belongs to a different event than the one this
    /// session is bound to. Carries both sides for display.
    #[error("scanned code is for \"{got_event_name}\" (event {got_event_id}) but this session is bound to \"{expected_event_name}\" (event {expected_event_id})")]
    EventMismatch {
        expected_event_id: i64,
        expected_event_name: String,
        got_event_id: i64,
        got_event_name: String,
    },

    /// Any mutating call after the session stopped being active. The client
    /// must validate a fresh invitation; sessions are never renewed.
    #[error("scanning session is no longer active, validate a new invitation code")]
    SessionExpired,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

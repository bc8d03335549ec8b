use std::time::Duration;

use serde::Serialize;
use sqlx::prelude::FromRow;
use sqlx::types::time;

use super::db::ScanDb;
use super::invitation::validate_invitation;
use super::{generate_code, serialize_datetime};
use crate::error::{Error, Result};

/// How long a scanning session lasts at most. A session can never outlive
/// the invitation it was created from.
pub const SESSION_WINDOW: Duration = Duration::from_secs(4 * 60 * 60);

const SESSION_ID_LEN: usize = 24;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
}

/// The capability a volunteer holds after validating an invitation. Bound
/// to one event; threaded explicitly through every scan operation.
#[derive(PartialEq, Debug, Clone, FromRow, Serialize)]
pub struct ScannerSession {
    pub id: String,

    /// Back-reference to the invitation this session was created from
    pub invitation: String,

    /// The one event tokens may be resolved and marked against
    pub event: i64,

    pub volunteer_name: String,
    pub volunteer_contact: String,

    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: time::OffsetDateTime,

    #[serde(serialize_with = "serialize_datetime")]
    pub expires_at: time::OffsetDateTime,

    pub status: SessionStatus,
}

/// Creates a session for a volunteer. The invitation is re-validated here
/// rather than trusted from an earlier check, closing the race where the
/// code expires between validation and session creation.
pub async fn create_session(
    db: &ScanDb,
    code: &str,
    volunteer_name: &str,
    volunteer_contact: &str,
    now: time::OffsetDateTime,
) -> Result<ScannerSession> {
    let descriptor = validate_invitation(db, code, now).await?;

    let session = ScannerSession {
        id: generate_code(SESSION_ID_LEN),
        invitation: descriptor.code,
        event: descriptor.event_id,
        volunteer_name: volunteer_name.to_owned(),
        volunteer_contact: volunteer_contact.to_owned(),
        created_at: now,
        expires_at: (now + SESSION_WINDOW).min(descriptor.expires_at),
        status: SessionStatus::Active,
    };

    db.insert_session(&session).await?;
    log::info!(
        "Created session {} for {} on event {}",
        session.id,
        session.volunteer_name,
        session.event
    );
    Ok(session)
}

/// Returns the authoritative status of a session, lazily persisting the
/// active-to-expired transition when its window has passed.
pub async fn session_status(
    db: &ScanDb,
    session_id: &str,
    now: time::OffsetDateTime,
) -> Result<SessionStatus> {
    Ok(fetch_refreshed(db, session_id, now).await?.status)
}

/// Fetches a session and refuses anything that is not currently active.
/// Every resolving or marking call goes through this; a locally cached
/// session descriptor is never enough on its own.
pub async fn require_active(
    db: &ScanDb,
    session_id: &str,
    now: time::OffsetDateTime,
) -> Result<ScannerSession> {
    let session = fetch_refreshed(db, session_id, now).await?;
    match session.status {
        SessionStatus::Active => Ok(session),
        SessionStatus::Expired | SessionStatus::Revoked => Err(Error::SessionExpired),
    }
}

async fn fetch_refreshed(
    db: &ScanDb,
    session_id: &str,
    now: time::OffsetDateTime,
) -> Result<ScannerSession> {
    let mut session = db
        .get_session(session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("unknown session {}", session_id)))?;

    if session.status == SessionStatus::Active && now >= session.expires_at {
        log::debug!("Session {} passed its expiry, marking expired", session.id);
        db.set_session_status(&session.id, SessionStatus::Expired)
            .await?;
        session.status = SessionStatus::Expired;
    }

    Ok(session)
}

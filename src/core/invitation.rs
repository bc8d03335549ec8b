use serde::Serialize;
use sqlx::prelude::FromRow;
use sqlx::types::time;

use super::db::ScanDb;
use super::serialize_datetime;
use crate::error::{Error, Result};

/// Length of generated invitation codes.
pub const INVITATION_CODE_LEN: usize = 10;

/// An event-scoped, time-limited code that grants scanning capability.
/// Immutable once issued; it stops working when it expires or is revoked.
#[derive(PartialEq, Debug, Clone, FromRow, Serialize)]
pub struct InvitationGrant {
    pub code: String,

    /// The one event this code can open sessions for
    pub event: i64,

    /// Reference to the issuing admin, if recorded
    pub issued_by: Option<String>,

    #[serde(serialize_with = "serialize_datetime")]
    pub expires_at: time::OffsetDateTime,

    pub revoked: bool,
}

/// What a volunteer gets back from a successful validation: enough to show
/// which event they are about to scan for.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct InvitationDescriptor {
    pub code: String,
    pub event_id: i64,
    pub event_name: String,
    #[serde(serialize_with = "serialize_datetime")]
    pub expires_at: time::OffsetDateTime,
}

/// Checks an invitation code. Read-only and safe to call repeatedly; every
/// failure is terminal for that code, but each reason gets its own error so
/// the volunteer can be told what happened.
pub async fn validate_invitation(
    db: &ScanDb,
    code: &str,
    now: time::OffsetDateTime,
) -> Result<InvitationDescriptor> {
    let grant = db
        .get_invitation(code)
        .await?
        .ok_or(Error::InvitationNotFound)?;

    if grant.revoked {
        return Err(Error::InvitationRevoked);
    }

    if now >= grant.expires_at {
        return Err(Error::InvitationExpired);
    }

    let event = db.get_event(grant.event).await?;

    Ok(InvitationDescriptor {
        code: grant.code,
        event_id: event.id,
        event_name: event.name,
        expires_at: grant.expires_at,
    })
}

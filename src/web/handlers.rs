use std::{convert::Infallible, sync::Arc};

use serde::{Deserialize, Serialize};
use sqlx::types::time;
use warp::http::StatusCode;

use crate::core::attendance::{mark_attendance, ParticipantMark};
use crate::core::db::ScanDb;
use crate::core::invitation::validate_invitation;
use crate::core::roster::{resolve_roster, FullRegistration};
use crate::core::session::{self, ScannerSession, SessionStatus};
use crate::error::Error;
use crate::token::IdentityToken;

/// Body for invitation validation
#[derive(Serialize, Deserialize, Debug)]
pub struct ValidateInvitation {
    pub code: String,
}

/// Body for session creation
#[derive(Serialize, Deserialize, Debug)]
pub struct CreateSession {
    pub code: String,
    pub volunteer_name: String,
    pub volunteer_contact: String,
}

/// Body for roster resolution; `token` is the raw scanned payload
#[derive(Serialize, Deserialize, Debug)]
pub struct ResolveRoster {
    pub session_id: String,
    pub token: String,
}

/// Body for attendance marking. `decisions` lists member registration ids
/// for team tokens and is ignored for individual tokens.
#[derive(Serialize, Deserialize, Debug)]
pub struct MarkAttendance {
    pub session_id: String,
    pub token: String,
    pub decisions: Option<Vec<i64>>,
}

#[derive(Serialize, Debug)]
pub struct SessionStatusReply {
    pub status: SessionStatus,
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn error_kind(e: &Error) -> &'static str {
    match e {
        Error::InvitationNotFound => "invitation_not_found",
        Error::InvitationExpired => "invitation_expired",
        Error::InvitationRevoked => "invitation_revoked",
        Error::UnsupportedVersion(_) => "unsupported_version",
        Error::MalformedToken(_) => "malformed_token",
        Error::EventMismatch { .. } => "event_mismatch",
        Error::SessionExpired => "session_expired",
        Error::NotFound(_) => "not_found",
        Error::Invalid(_) => "invalid",
        Error::Storage(_) | Error::Json(_) | Error::Io(_) => "internal",
    }
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::InvitationNotFound | Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvitationExpired => StatusCode::GONE,
        Error::InvitationRevoked => StatusCode::FORBIDDEN,
        Error::UnsupportedVersion(_) | Error::MalformedToken(_) | Error::Invalid(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::EventMismatch { .. } => StatusCode::CONFLICT,
        Error::SessionExpired => StatusCode::UNAUTHORIZED,
        Error::Storage(_) | Error::Json(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn to_http_output<T: Serialize>(
    result: Result<T, Error>,
) -> Result<impl warp::Reply, Infallible> {
    Ok(match result {
        Ok(data) => warp::reply::with_status(warp::reply::json(&data), StatusCode::OK),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                log::error!("{}", e);
            } else {
                log::warn!("{}", e);
            }
            warp::reply::with_status(
                warp::reply::json(&ErrorBody {
                    error: error_kind(&e),
                    message: e.to_string(),
                }),
                status,
            )
        }
    })
}

pub async fn validate_invitation_handler(
    req: ValidateInvitation,
    db: Arc<ScanDb>,
) -> Result<impl warp::Reply, Infallible> {
    let now = time::OffsetDateTime::now_utc();
    to_http_output(validate_invitation(&db, &req.code, now).await)
}

pub async fn create_session_handler(
    req: CreateSession,
    db: Arc<ScanDb>,
) -> Result<impl warp::Reply, Infallible> {
    let now = time::OffsetDateTime::now_utc();
    to_http_output(
        session::create_session(&db, &req.code, &req.volunteer_name, &req.volunteer_contact, now)
            .await,
    )
}

pub async fn session_status_handler(
    session_id: String,
    db: Arc<ScanDb>,
) -> Result<impl warp::Reply, Infallible> {
    let now = time::OffsetDateTime::now_utc();
    to_http_output(
        session::session_status(&db, &session_id, now)
            .await
            .map(|status| SessionStatusReply { status }),
    )
}

async fn resolve_roster_inner(db: &ScanDb, req: ResolveRoster) -> Result<FullRegistration, Error> {
    let token = IdentityToken::decode(&req.token)?;
    let now = time::OffsetDateTime::now_utc();
    let session: ScannerSession = session::require_active(db, &req.session_id, now).await?;
    resolve_roster(db, &session, &token).await
}

pub async fn resolve_roster_handler(
    req: ResolveRoster,
    db: Arc<ScanDb>,
) -> Result<impl warp::Reply, Infallible> {
    to_http_output(resolve_roster_inner(&db, req).await)
}

async fn mark_attendance_inner(
    db: &ScanDb,
    req: MarkAttendance,
) -> Result<Vec<ParticipantMark>, Error> {
    let token = IdentityToken::decode(&req.token)?;
    let now = time::OffsetDateTime::now_utc();
    let session = session::require_active(db, &req.session_id, now).await?;
    mark_attendance(db, &session, &token, req.decisions.as_deref(), now).await
}

pub async fn mark_attendance_handler(
    req: MarkAttendance,
    db: Arc<ScanDb>,
) -> Result<impl warp::Reply, Infallible> {
    to_http_output(mark_attendance_inner(&db, req).await)
}

//! The attendance marking engine. Marks are monotonic: a participant goes
//! from pending to present exactly once, and repeating the mark observes the
//! existing record instead of erroring or rewriting it. Moving someone back
//! to pending is an administrative correction outside this surface.

use serde::Serialize;
use sqlx::prelude::FromRow;
use sqlx::types::time;

use super::db::ScanDb;
use super::roster::check_event_binding;
use super::serialize_datetime;
use super::session::ScannerSession;
use crate::error::{Error, Result};
use crate::token::{IdentityToken, TokenKind};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Pending,
    Present,
}

/// One attendance row per `(event, registration)`, created lazily on the
/// first mark and never deleted here.
#[derive(PartialEq, Debug, Clone, FromRow, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub event: i64,
    pub registration: i64,
    pub status: AttendanceStatus,

    #[serde(serialize_with = "serialize_datetime")]
    pub marked_at: time::OffsetDateTime,

    /// Which scanning session produced the mark, for audit
    pub marked_by_session: String,
}

/// The outcome for one targeted participant. `was_created` distinguishes
/// "this call marked them" from "they were already present" without the
/// caller having to compare timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantMark {
    pub registration_id: i64,
    pub was_created: bool,
    pub record: AttendanceRecord,
}

/// Applies presence decisions for a scanned token under an active session.
///
/// An individual token implicitly targets its own registration. A team
/// token targets exactly the member registrations listed in `decisions`;
/// unlisted members are left untouched, never implicitly marked absent, so
/// an empty list is a legal no-op.
pub async fn mark_attendance(
    db: &ScanDb,
    session: &ScannerSession,
    token: &IdentityToken,
    decisions: Option<&[i64]>,
    now: time::OffsetDateTime,
) -> Result<Vec<ParticipantMark>> {
    check_event_binding(db, session, token).await?;

    let targets = match &token.kind {
        TokenKind::Individual => {
            let registration = db.get_registration(token.registration_id).await?;
            if registration.event != session.event {
                return Err(Error::NotFound(format!(
                    "registration {} does not belong to event {}",
                    registration.id, session.event
                )));
            }
            vec![registration.id]
        }
        TokenKind::TeamLeader { team_id } | TokenKind::TeamMember { team_id, .. } => {
            let composition = db.get_team_composition(*team_id).await?;
            if composition.team.event != session.event {
                return Err(Error::NotFound(format!(
                    "team {} does not belong to event {}",
                    team_id, session.event
                )));
            }

            let decisions = decisions.unwrap_or(&[]);
            for target in decisions {
                let in_team = composition.leader.id == *target
                    || composition.members.iter().any(|m| m.id == *target);
                if !in_team {
                    return Err(Error::NotFound(format!(
                        "registration {} is not part of team {}",
                        target, composition.team.name
                    )));
                }
            }
            decisions.to_vec()
        }
    };

    let mut marks = Vec::with_capacity(targets.len());
    for target in targets {
        let (record, was_created) = db
            .mark_attendance_if_absent(session.event, target, &session.id, now)
            .await?;
        if was_created {
            log::info!(
                "Session {} marked registration {} present for event {}",
                session.id,
                target,
                session.event
            );
        }
        marks.push(ParticipantMark {
            registration_id: target,
            was_created,
            record,
        });
    }

    Ok(marks)
}

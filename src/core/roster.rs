//! Roster resolution: expanding a scanned token into the live registration
//! data it points at. Tokens are pointers, so membership and attendance are
//! always re-read from the store rather than trusted from the payload.

use serde::Serialize;
use sqlx::types::time;

use super::attendance::{AttendanceRecord, AttendanceStatus};
use super::db::ScanDb;
use super::registration::Registration;
use super::serialize_datetime_opt;
use super::session::ScannerSession;
use crate::error::{Error, Result};
use crate::token::{IdentityToken, TokenKind};

/// One participant with their live attendance state.
#[derive(Debug, Clone, Serialize)]
pub struct MemberStanding {
    pub registration: Registration,
    pub status: AttendanceStatus,
    #[serde(serialize_with = "serialize_datetime_opt")]
    pub marked_at: Option<time::OffsetDateTime>,
}

impl MemberStanding {
    fn new(registration: Registration, record: Option<AttendanceRecord>) -> MemberStanding {
        match record {
            Some(record) => MemberStanding {
                registration,
                status: record.status,
                marked_at: Some(record.marked_at),
            },
            None => MemberStanding {
                registration,
                status: AttendanceStatus::Pending,
                marked_at: None,
            },
        }
    }
}

/// The current roster of a team, leader included.
#[derive(Debug, Clone, Serialize)]
pub struct TeamRoster {
    pub team_id: i64,
    pub team_name: String,
    pub declared_size: i64,
    pub leader: MemberStanding,
    pub members: Vec<MemberStanding>,
}

/// A fully expanded scan result: the scanned participant, and for team
/// tokens the whole current team.
#[derive(Debug, Clone, Serialize)]
pub struct FullRegistration {
    pub event_id: i64,
    pub event_name: String,
    pub participant: MemberStanding,
    pub team: Option<TeamRoster>,
}

/// Rejects tokens whose event does not match the session's bound event.
/// Runs before any roster read or write, in both resolve and mark.
pub async fn check_event_binding(
    db: &ScanDb,
    session: &ScannerSession,
    token: &IdentityToken,
) -> Result<()> {
    if token.event_id == session.event {
        return Ok(());
    }

    let bound = db.get_event(session.event).await?;
    log::warn!(
        "Session {} (event {}) scanned a token for event {}",
        session.id,
        session.event,
        token.event_id
    );
    Err(Error::EventMismatch {
        expected_event_id: session.event,
        expected_event_name: bound.name,
        got_event_id: token.event_id,
        got_event_name: token.event_name.clone(),
    })
}

/// Expands a token into the authoritative registration data under an
/// active session.
pub async fn resolve_roster(
    db: &ScanDb,
    session: &ScannerSession,
    token: &IdentityToken,
) -> Result<FullRegistration> {
    check_event_binding(db, session, token).await?;

    let event = db.get_event(session.event).await?;
    let registration = db.get_registration(token.registration_id).await?;
    if registration.event != session.event {
        // Stale or forged token; the row is authoritative.
        return Err(Error::NotFound(format!(
            "registration {} does not belong to event {}",
            registration.id, session.event
        )));
    }

    let team = match &token.kind {
        TokenKind::Individual => None,
        TokenKind::TeamLeader { team_id } | TokenKind::TeamMember { team_id, .. } => {
            if registration.team != Some(*team_id) {
                return Err(Error::NotFound(format!(
                    "registration {} is not part of team {}",
                    registration.id, team_id
                )));
            }

            let composition = db.get_team_composition(*team_id).await?;
            if composition.team.event != session.event {
                return Err(Error::NotFound(format!(
                    "team {} does not belong to event {}",
                    team_id, session.event
                )));
            }

            let leader_record = db
                .get_attendance(session.event, composition.leader.id)
                .await?;
            let leader = MemberStanding::new(composition.leader, leader_record);

            let mut members = Vec::with_capacity(composition.members.len());
            for member in composition.members {
                let record = db.get_attendance(session.event, member.id).await?;
                members.push(MemberStanding::new(member, record));
            }

            Some(TeamRoster {
                team_id: composition.team.id,
                team_name: composition.team.name,
                declared_size: composition.team.declared_size,
                leader,
                members,
            })
        }
    };

    let record = db.get_attendance(session.event, registration.id).await?;
    Ok(FullRegistration {
        event_id: event.id,
        event_name: event.name,
        participant: MemberStanding::new(registration, record),
        team,
    })
}

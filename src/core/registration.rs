use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::types::time;

use super::serialize_datetime_opt;

/// A single event that participants register for and get scanned into.
#[derive(PartialEq, Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: i64,

    pub name: String,

    pub location: Option<String>,

    #[serde(serialize_with = "serialize_datetime_opt")]
    pub starts_at: Option<time::OffsetDateTime>,

    #[serde(serialize_with = "serialize_datetime_opt")]
    pub ends_at: Option<time::OffsetDateTime>,
}

/// How a registration participates in its event.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ParticipantKind {
    Individual,
    TeamLeader,
    TeamMember,
}

/// One participant's registration for one event, as held by the
/// registration store. Snapshot fields (name, enrollment, department) are
/// what gets stamped into generated tokens; the row stays authoritative.
#[derive(PartialEq, Debug, Clone, FromRow, Serialize)]
pub struct Registration {
    pub id: i64,

    /// The event this registration belongs to
    pub event: i64,

    pub kind: ParticipantKind,

    pub name: String,

    /// Enrollment or employee identifier
    pub enrollment: String,

    pub department: Option<String>,

    /// Owning team, for team kinds
    pub team: Option<i64>,

    /// Position within the team; the leader is always 0
    pub member_order: Option<i64>,
}

/// A team row. `declared_size` is frozen at creation time; the member list
/// that matters for attendance is always re-read from the registrations.
#[derive(PartialEq, Debug, Clone, FromRow, Serialize)]
pub struct Team {
    pub id: i64,
    pub event: i64,
    pub name: String,
    pub declared_size: i64,
}

/// A team together with its current leader and member registrations.
#[derive(Debug, Clone, Serialize)]
pub struct TeamComposition {
    pub team: Team,
    pub leader: Registration,
    pub members: Vec<Registration>,
}

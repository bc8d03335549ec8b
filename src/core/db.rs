use std::path::PathBuf;

use sqlx::{migrate::MigrateDatabase, sqlite::Sqlite, types::time, SqlitePool};

use crate::core::attendance::{AttendanceRecord, AttendanceStatus};
use crate::core::invitation::InvitationGrant;
use crate::core::registration::{Event, ParticipantKind, Registration, Team, TeamComposition};
use crate::core::session::{ScannerSession, SessionStatus};
use crate::error::{Error, Result};

/// A participant to be inserted into the registration store.
pub struct NewParticipant<'a> {
    pub name: &'a str,
    pub enrollment: &'a str,
    pub department: Option<&'a str>,
}

/// The backing store for registrations, invitations, sessions, and
/// attendance. One SQLite database per deployment.
pub struct ScanDb {
    db: SqlitePool,
}

impl ScanDb {
    /// Creates the database file and schema.
    pub async fn create(file: &PathBuf) -> Result<Self> {
        let url = format!("sqlite://{}", file.display());
        Sqlite::create_database(&url).await?;

        let db = SqlitePool::connect(&url).await?;
        create_schema(&db).await?;
        Ok(ScanDb { db })
    }

    /// Opens an existing database file.
    pub async fn open(file: &PathBuf) -> Result<Self> {
        let url = format!("sqlite://{}", file.display());
        let db = SqlitePool::connect(&url).await?;
        Ok(ScanDb { db })
    }

    /// An in-memory database for tests. Pinned to one connection so every
    /// query sees the same memory instance.
    #[cfg(test)]
    pub async fn memory() -> ScanDb {
        use sqlx::sqlite::SqlitePoolOptions;

        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        create_schema(&db).await.expect("Failed to create schema");
        ScanDb { db }
    }

    /// Raw pool access for test fixtures.
    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn add_event(
        &self,
        name: &str,
        location: Option<&str>,
        starts_at: Option<time::OffsetDateTime>,
        ends_at: Option<time::OffsetDateTime>,
    ) -> Result<i64> {
        log::debug!("Creating event {}", name);
        let result = sqlx::query(
            "insert into events(name, location, starts_at, ends_at) values(?, ?, ?, ?)",
        )
        .bind(name)
        .bind(location)
        .bind(starts_at.map(|t| t.unix_timestamp()))
        .bind(ends_at.map(|t| t.unix_timestamp()))
        .execute(&self.db)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_event(&self, event_id: i64) -> Result<Event> {
        sqlx::query_as("select * from events where id = ? limit 1")
            .bind(event_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {} does not exist", event_id)))
    }

    pub async fn add_individual(
        &self,
        event_id: i64,
        participant: &NewParticipant<'_>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "insert into registrations(event, kind, name, enrollment, department)
                values(?, ?, ?, ?, ?)",
        )
        .bind(event_id)
        .bind(ParticipantKind::Individual)
        .bind(participant.name)
        .bind(participant.enrollment)
        .bind(participant.department)
        .execute(&self.db)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Registers a team with its leader and members in one transaction.
    /// Returns the new team id.
    pub async fn add_team(
        &self,
        event_id: i64,
        team_name: &str,
        leader: &NewParticipant<'_>,
        members: &[NewParticipant<'_>],
    ) -> Result<i64> {
        log::debug!("Creating team {} for event {}", team_name, event_id);
        let mut tx = self.db.begin().await?;

        let team_id = sqlx::query(
            "insert into teams(event, name, declared_size) values(?, ?, ?)",
        )
        .bind(event_id)
        .bind(team_name)
        .bind(1 + members.len() as i64)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "insert into registrations(event, kind, name, enrollment, department, team, member_order)
                values(?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(event_id)
        .bind(ParticipantKind::TeamLeader)
        .bind(leader.name)
        .bind(leader.enrollment)
        .bind(leader.department)
        .bind(team_id)
        .execute(&mut *tx)
        .await?;

        for (i, member) in members.iter().enumerate() {
            sqlx::query(
                "insert into registrations(event, kind, name, enrollment, department, team, member_order)
                    values(?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(event_id)
            .bind(ParticipantKind::TeamMember)
            .bind(member.name)
            .bind(member.enrollment)
            .bind(member.department)
            .bind(team_id)
            .bind(1 + i as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(team_id)
    }

    pub async fn get_registration(&self, registration_id: i64) -> Result<Registration> {
        sqlx::query_as("select * from registrations where id = ? limit 1")
            .bind(registration_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("registration {} does not exist", registration_id))
            })
    }

    /// Fetches a team with its current leader and members, ordered by their
    /// position in the team.
    pub async fn get_team_composition(&self, team_id: i64) -> Result<TeamComposition> {
        let team: Team = sqlx::query_as("select * from teams where id = ? limit 1")
            .bind(team_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("team {} does not exist", team_id)))?;

        let mut roster: Vec<Registration> = sqlx::query_as(
            "select * from registrations where team = ? order by member_order",
        )
        .bind(team_id)
        .fetch_all(&self.db)
        .await?;

        let leader_at = roster
            .iter()
            .position(|r| r.kind == ParticipantKind::TeamLeader)
            .ok_or_else(|| {
                Error::NotFound(format!("team {} has no leader registration", team_id))
            })?;
        let leader = roster.remove(leader_at);

        Ok(TeamComposition {
            team,
            leader,
            members: roster,
        })
    }

    pub async fn add_invitation(&self, grant: &InvitationGrant) -> Result<()> {
        log::debug!(
            "Issuing invitation {} for event {}",
            grant.code,
            grant.event
        );
        sqlx::query(
            "insert into invitations(code, event, issued_by, expires_at, revoked)
                values(?, ?, ?, ?, ?)",
        )
        .bind(&grant.code)
        .bind(grant.event)
        .bind(&grant.issued_by)
        .bind(grant.expires_at.unix_timestamp())
        .bind(grant.revoked)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn get_invitation(&self, code: &str) -> Result<Option<InvitationGrant>> {
        Ok(
            sqlx::query_as("select * from invitations where code = ? limit 1")
                .bind(code)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    pub async fn revoke_invitation(&self, code: &str) -> Result<()> {
        sqlx::query("update invitations set revoked = true where code = ?")
            .bind(code)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn insert_session(&self, session: &ScannerSession) -> Result<()> {
        sqlx::query(
            "insert into sessions(
                    id, invitation, event, volunteer_name,
                    volunteer_contact, created_at, expires_at, status
                ) values(?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.invitation)
        .bind(session.event)
        .bind(&session.volunteer_name)
        .bind(&session.volunteer_contact)
        .bind(session.created_at.unix_timestamp())
        .bind(session.expires_at.unix_timestamp())
        .bind(session.status)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<ScannerSession>> {
        Ok(
            sqlx::query_as("select * from sessions where id = ? limit 1")
                .bind(session_id)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    pub async fn set_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        sqlx::query("update sessions set status = ? where id = ?")
            .bind(status)
            .bind(session_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get_attendance(
        &self,
        event_id: i64,
        registration_id: i64,
    ) -> Result<Option<AttendanceRecord>> {
        Ok(sqlx::query_as(
            "select * from attendance where event = ? and registration = ? limit 1",
        )
        .bind(event_id)
        .bind(registration_id)
        .fetch_optional(&self.db)
        .await?)
    }

    /// Marks a participant present if they are not already. The uniqueness
    /// constraint on `(event, registration)` makes this a single atomic
    /// check-and-set: two concurrent scanners get exactly one insert between
    /// them, and the loser observes the winner's record.
    ///
    /// Returns the record and whether this call caused the state change.
    pub async fn mark_attendance_if_absent(
        &self,
        event_id: i64,
        registration_id: i64,
        session_id: &str,
        now: time::OffsetDateTime,
    ) -> Result<(AttendanceRecord, bool)> {
        let result = sqlx::query(
            "insert into attendance(event, registration, status, marked_at, marked_by_session)
                values(?, ?, ?, ?, ?)
                on conflict(event, registration) do update set
                    status = excluded.status,
                    marked_at = excluded.marked_at,
                    marked_by_session = excluded.marked_by_session
                where attendance.status = ?",
        )
        .bind(event_id)
        .bind(registration_id)
        .bind(AttendanceStatus::Present)
        .bind(now.unix_timestamp())
        .bind(session_id)
        .bind(AttendanceStatus::Pending)
        .execute(&self.db)
        .await?;

        let record = sqlx::query_as(
            "select * from attendance where event = ? and registration = ? limit 1",
        )
        .bind(event_id)
        .bind(registration_id)
        .fetch_one(&self.db)
        .await?;

        Ok((record, result.rows_affected() > 0))
    }
}

async fn create_schema(db: &SqlitePool) -> Result<()> {
    sqlx::query(
        "create table events(
                id integer primary key,
                name text not null,
                location text,
                starts_at integer,
                ends_at integer
            );",
    )
    .execute(db)
    .await?;

    sqlx::query(
        "create table teams(
                id integer primary key,
                event integer not null,
                name text not null,
                declared_size integer not null,
                foreign key(event) references events(id) on delete cascade
            );",
    )
    .execute(db)
    .await?;

    sqlx::query(
        "create table registrations(
                id integer primary key,
                event integer not null,
                kind text not null,
                name text not null,
                enrollment text not null,
                department text,
                team integer,
                member_order integer,
                foreign key(event) references events(id) on delete cascade,
                foreign key(team) references teams(id) on delete cascade
            );",
    )
    .execute(db)
    .await?;

    sqlx::query(
        "create table invitations(
                code text primary key not null,
                event integer not null,
                issued_by text,
                expires_at integer not null,
                revoked boolean not null default false,
                foreign key(event) references events(id) on delete cascade
            );",
    )
    .execute(db)
    .await?;

    sqlx::query(
        "create table sessions(
                id text primary key not null,
                invitation text not null,
                event integer not null,
                volunteer_name text not null,
                volunteer_contact text not null,
                created_at integer not null,
                expires_at integer not null,
                status text not null,
                foreign key(invitation) references invitations(code) on delete cascade,
                foreign key(event) references events(id) on delete cascade
            );",
    )
    .execute(db)
    .await?;

    sqlx::query(
        "create table attendance(
                id integer primary key autoincrement,
                event integer not null,
                registration integer not null,
                status text not null,
                marked_at integer not null,
                marked_by_session text not null,
                unique(event, registration),
                foreign key(event) references events(id) on delete cascade,
                foreign key(registration) references registrations(id) on delete cascade
            );",
    )
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn team_composition_orders_members() {
        let db = ScanDb::memory().await;
        let event = db.add_event("Hack Night", None, None, None).await.unwrap();

        let team = db
            .add_team(
                event,
                "Segfault Society",
                &NewParticipant {
                    name: "Lead",
                    enrollment: "EN0",
                    department: None,
                },
                &[
                    NewParticipant {
                        name: "First",
                        enrollment: "EN1",
                        department: None,
                    },
                    NewParticipant {
                        name: "Second",
                        enrollment: "EN2",
                        department: None,
                    },
                ],
            )
            .await
            .unwrap();

        let composition = db.get_team_composition(team).await.unwrap();
        assert_eq!(composition.team.declared_size, 3);
        assert_eq!(composition.leader.enrollment, "EN0");
        assert_eq!(composition.leader.kind, ParticipantKind::TeamLeader);
        assert_eq!(
            composition
                .members
                .iter()
                .map(|m| m.enrollment.as_str())
                .collect::<Vec<_>>(),
            vec!["EN1", "EN2"]
        );
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let db = ScanDb::memory().await;
        assert!(matches!(db.get_event(1).await, Err(Error::NotFound(_))));
        assert!(matches!(
            db.get_registration(1).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.get_team_composition(1).await,
            Err(Error::NotFound(_))
        ));
        assert!(db.get_invitation("NOPE").await.unwrap().is_none());
        assert!(db.get_session("NOPE").await.unwrap().is_none());
    }
}

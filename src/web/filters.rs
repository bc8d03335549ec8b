use std::{convert::Infallible, sync::Arc};

use warp::{reject::Rejection, Filter};

use crate::core::db::ScanDb;

use super::handlers::{
    create_session_handler, mark_attendance_handler, resolve_roster_handler,
    session_status_handler, validate_invitation_handler,
};

pub fn with_db(
    db: Arc<ScanDb>,
) -> impl Filter<Extract = (Arc<ScanDb>,), Error = Infallible> + Clone {
    warp::any().map(move || db.clone())
}

/// The scanning operation surface: validate an invitation, open a session,
/// poll its status, resolve a scanned token, mark attendance.
pub fn api_filters(
    db: Arc<ScanDb>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let validate_invitation = warp::path!("api" / "invitation" / "validate")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_db(db.clone()))
        .and_then(validate_invitation_handler);

    let create_session = warp::path!("api" / "session")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_db(db.clone()))
        .and_then(create_session_handler);

    let session_status = warp::path!("api" / "session" / String)
        .and(warp::get())
        .and(with_db(db.clone()))
        .and_then(session_status_handler);

    let resolve_roster = warp::path!("api" / "roster" / "resolve")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_db(db.clone()))
        .and_then(resolve_roster_handler);

    let mark_attendance = warp::path!("api" / "attendance" / "mark")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_db(db))
        .and_then(mark_attendance_handler);

    validate_invitation
        .or(create_session)
        .or(session_status)
        .or(resolve_roster)
        .or(mark_attendance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::NewParticipant;
    use crate::core::invitation::InvitationGrant;
    use crate::core::session::ScannerSession;
    use crate::token::IdentityToken;
    use crate::web::handlers::{CreateSession, MarkAttendance, ValidateInvitation};
    use sqlx::types::time;
    use std::time::Duration;

    async fn seeded_db() -> (Arc<ScanDb>, i64, i64) {
        let db = ScanDb::memory().await;
        let event = db.add_event("API Day", None, None, None).await.unwrap();
        let reg = db
            .add_individual(
                event,
                &NewParticipant {
                    name: "Ada",
                    enrollment: "EN1",
                    department: None,
                },
            )
            .await
            .unwrap();
        db.add_invitation(&InvitationGrant {
            code: "INV123".to_owned(),
            event,
            issued_by: None,
            expires_at: time::OffsetDateTime::now_utc() + Duration::from_secs(3600),
            revoked: false,
        })
        .await
        .unwrap();
        (Arc::new(db), event, reg)
    }

    #[tokio::test]
    async fn unknown_invitation_is_a_404() {
        let (db, _, _) = seeded_db().await;
        let api = api_filters(db);

        let res = warp::test::request()
            .method("POST")
            .path("/api/invitation/validate")
            .json(&ValidateInvitation {
                code: "WRONG".to_owned(),
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn scan_flow_end_to_end() {
        let (db, event, reg) = seeded_db().await;
        let api = api_filters(db.clone());

        let res = warp::test::request()
            .method("POST")
            .path("/api/session")
            .json(&CreateSession {
                code: "INV123".to_owned(),
                volunteer_name: "Sam".to_owned(),
                volunteer_contact: "sam@example.org".to_owned(),
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let session: ScannerSession = serde_json_session(res.body());

        let registration = db.get_registration(reg).await.unwrap();
        let event_row = db.get_event(event).await.unwrap();
        let token = IdentityToken::for_registration(&registration, &event_row, None)
            .unwrap()
            .encode()
            .unwrap();

        let mark = MarkAttendance {
            session_id: session.id.clone(),
            token,
            decisions: None,
        };
        let res = warp::test::request()
            .method("POST")
            .path("/api/attendance/mark")
            .json(&mark)
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body[0]["was_created"], true);

        // Rescanning the same token is a successful no-op.
        let res = warp::test::request()
            .method("POST")
            .path("/api/attendance/mark")
            .json(&mark)
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body[0]["was_created"], false);

        let res = warp::test::request()
            .method("GET")
            .path(&format!("/api/session/{}", session.id))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "active");
    }

    #[tokio::test]
    async fn unreadable_token_is_a_400() {
        let (db, _, _) = seeded_db().await;
        let api = api_filters(db.clone());

        let now = time::OffsetDateTime::now_utc();
        let session =
            crate::core::session::create_session(&db, "INV123", "Sam", "sam@example.org", now)
                .await
                .unwrap();

        let res = warp::test::request()
            .method("POST")
            .path("/api/roster/resolve")
            .json(&crate::web::handlers::ResolveRoster {
                session_id: session.id,
                token: "gibberish".to_owned(),
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "malformed_token");
    }

    /// Sessions serialize timestamps as unix seconds, so they cannot be
    /// deserialized straight back into `ScannerSession`; pull out the
    /// fields the tests need.
    fn serde_json_session(body: &[u8]) -> ScannerSession {
        let value: serde_json::Value = serde_json::from_slice(body).unwrap();
        ScannerSession {
            id: value["id"].as_str().unwrap().to_owned(),
            invitation: value["invitation"].as_str().unwrap().to_owned(),
            event: value["event"].as_i64().unwrap(),
            volunteer_name: value["volunteer_name"].as_str().unwrap().to_owned(),
            volunteer_contact: value["volunteer_contact"].as_str().unwrap().to_owned(),
            created_at: time::OffsetDateTime::from_unix_timestamp(
                value["created_at"].as_i64().unwrap(),
            )
            .unwrap(),
            expires_at: time::OffsetDateTime::from_unix_timestamp(
                value["expires_at"].as_i64().unwrap(),
            )
            .unwrap(),
            status: crate::core::session::SessionStatus::Active,
        }
    }
}

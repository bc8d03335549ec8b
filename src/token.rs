//! The identity token codec.
//!
//! A token is the payload printed into a participant's QR code: a compact,
//! versioned pointer at a registration, never a cache of the roster. Team
//! tokens carry only a team reference, so their size does not grow with the
//! member list. Everything here is a pure transform over strings; resolution
//! against live data happens in [`crate::core::roster`].

use serde::{Deserialize, Serialize};

use crate::core::registration::{Event, ParticipantKind, Registration, TeamComposition};
use crate::error::{Error, Result};

/// Version stamped into newly generated tokens.
pub const TOKEN_VERSION: &str = "2.0";

/// Highest payload major version this build can decode. Tokens with a newer
/// major fail closed; a newer minor within this major decodes permissively.
const SUPPORTED_MAJOR: u32 = 2;

/// Display-only participant snapshot captured at generation time.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub name: String,
    pub enrollment: String,
    pub department: Option<String>,
}

/// The shape of a decoded token. Team kinds carry a team pointer; members
/// additionally carry the leader's enrollment as a cross-check hint.
#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    Individual,
    TeamLeader {
        team_id: i64,
    },
    TeamMember {
        team_id: i64,
        leader_enrollment: Option<String>,
    },
}

/// A decoded QR payload.
#[derive(PartialEq, Debug, Clone)]
pub struct IdentityToken {
    pub version: String,
    pub registration_id: i64,
    pub event_id: i64,

    /// Display only; the roster resolver re-reads the authoritative name
    pub event_name: String,

    pub student: StudentSnapshot,
    pub kind: TokenKind,
}

/// The wire layout. Unknown extra fields are ignored on decode so that
/// newer-minor payloads keep working.
#[derive(Serialize, Deserialize)]
struct RawToken {
    version: String,
    registration_id: i64,
    event_id: i64,
    event_name: String,
    kind: String,
    student: StudentSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    team: Option<RawTeamBlock>,
}

#[derive(Serialize, Deserialize)]
struct RawTeamBlock {
    team_id: i64,
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    leader_enrollment: Option<String>,
}

impl IdentityToken {
    /// Builds a token for a registration. Team kinds require the team
    /// context so the pointer block can be filled in.
    pub fn for_registration(
        registration: &Registration,
        event: &Event,
        team: Option<&TeamComposition>,
    ) -> Result<IdentityToken> {
        let kind = match registration.kind {
            ParticipantKind::Individual => TokenKind::Individual,
            ParticipantKind::TeamLeader => {
                let team = team.ok_or_else(|| {
                    Error::Invalid(format!(
                        "registration {} is a team leader but no team was supplied",
                        registration.id
                    ))
                })?;
                TokenKind::TeamLeader {
                    team_id: team.team.id,
                }
            }
            ParticipantKind::TeamMember => {
                let team = team.ok_or_else(|| {
                    Error::Invalid(format!(
                        "registration {} is a team member but no team was supplied",
                        registration.id
                    ))
                })?;
                TokenKind::TeamMember {
                    team_id: team.team.id,
                    leader_enrollment: Some(team.leader.enrollment.clone()),
                }
            }
        };

        Ok(IdentityToken {
            version: TOKEN_VERSION.to_owned(),
            registration_id: registration.id,
            event_id: registration.event,
            event_name: event.name.clone(),
            student: StudentSnapshot {
                name: registration.name.clone(),
                enrollment: registration.enrollment.clone(),
                department: registration.department.clone(),
            },
            kind,
        })
    }

    /// Serializes to the compact JSON payload that gets rendered as a QR
    /// code. The output length is bounded independent of team size.
    pub fn encode(&self) -> Result<String> {
        let (kind, team) = match &self.kind {
            TokenKind::Individual => ("individual", None),
            TokenKind::TeamLeader { team_id } => (
                "team_leader",
                Some(RawTeamBlock {
                    team_id: *team_id,
                    role: "leader".to_owned(),
                    leader_enrollment: None,
                }),
            ),
            TokenKind::TeamMember {
                team_id,
                leader_enrollment,
            } => (
                "team_member",
                Some(RawTeamBlock {
                    team_id: *team_id,
                    role: "member".to_owned(),
                    leader_enrollment: leader_enrollment.clone(),
                }),
            ),
        };

        Ok(serde_json::to_string(&RawToken {
            version: self.version.clone(),
            registration_id: self.registration_id,
            event_id: self.event_id,
            event_name: self.event_name.clone(),
            kind: kind.to_owned(),
            student: self.student.clone(),
            team,
        })?)
    }

    /// Decodes a scanned payload, dispatching on its declared version
    /// before anything else is parsed.
    pub fn decode(raw: &str) -> Result<IdentityToken> {
        #[derive(Deserialize)]
        struct VersionProbe {
            version: String,
        }

        let probe: VersionProbe = serde_json::from_str(raw)
            .map_err(|e| Error::MalformedToken(format!("no readable version field: {}", e)))?;

        let major = probe
            .version
            .split('.')
            .next()
            .and_then(|m| m.parse::<u32>().ok())
            .ok_or_else(|| {
                Error::MalformedToken(format!("unparseable version \"{}\"", probe.version))
            })?;

        if major != SUPPORTED_MAJOR {
            return Err(Error::UnsupportedVersion(probe.version));
        }

        let raw: RawToken = serde_json::from_str(raw)
            .map_err(|e| Error::MalformedToken(e.to_string()))?;

        let kind = match raw.kind.as_str() {
            "individual" => TokenKind::Individual,
            "team_leader" => {
                let team = raw
                    .team
                    .ok_or_else(|| Error::MalformedToken("team token has no team block".into()))?;
                if team.role != "leader" {
                    return Err(Error::MalformedToken(format!(
                        "leader token declares team role \"{}\"",
                        team.role
                    )));
                }
                TokenKind::TeamLeader {
                    team_id: team.team_id,
                }
            }
            "team_member" => {
                let team = raw
                    .team
                    .ok_or_else(|| Error::MalformedToken("team token has no team block".into()))?;
                if team.role != "member" {
                    return Err(Error::MalformedToken(format!(
                        "member token declares team role \"{}\"",
                        team.role
                    )));
                }
                TokenKind::TeamMember {
                    team_id: team.team_id,
                    leader_enrollment: team.leader_enrollment,
                }
            }
            other => {
                return Err(Error::MalformedToken(format!(
                    "unknown participant kind \"{}\"",
                    other
                )))
            }
        };

        Ok(IdentityToken {
            version: raw.version,
            registration_id: raw.registration_id,
            event_id: raw.event_id,
            event_name: raw.event_name,
            student: raw.student,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registration::{Event, ParticipantKind, Registration, Team, TeamComposition};

    fn event() -> Event {
        Event {
            id: 7,
            name: "Tech Summit".to_owned(),
            location: None,
            starts_at: None,
            ends_at: None,
        }
    }

    fn registration(id: i64, kind: ParticipantKind, team: Option<i64>) -> Registration {
        Registration {
            id,
            event: 7,
            kind,
            name: format!("Person {}", id),
            enrollment: format!("EN{:04}", id),
            department: Some("CS".to_owned()),
            team,
            member_order: team.map(|_| 0),
        }
    }

    fn composition(member_count: usize) -> TeamComposition {
        let leader = registration(100, ParticipantKind::TeamLeader, Some(5));
        let members = (0..member_count)
            .map(|i| registration(101 + i as i64, ParticipantKind::TeamMember, Some(5)))
            .collect();
        TeamComposition {
            team: Team {
                id: 5,
                event: 7,
                name: "Rustaceans".to_owned(),
                declared_size: 1 + member_count as i64,
            },
            leader,
            members,
        }
    }

    #[test]
    fn individual_round_trip() {
        let reg = registration(42, ParticipantKind::Individual, None);
        let token = IdentityToken::for_registration(&reg, &event(), None).unwrap();
        let decoded = IdentityToken::decode(&token.encode().unwrap()).unwrap();

        assert_eq!(decoded.registration_id, 42);
        assert_eq!(decoded.event_id, 7);
        assert_eq!(decoded.kind, TokenKind::Individual);
        assert_eq!(decoded.student.enrollment, "EN0042");
        assert_eq!(decoded, token);
    }

    #[test]
    fn team_member_round_trip() {
        let team = composition(3);
        let token =
            IdentityToken::for_registration(&team.members[1], &event(), Some(&team)).unwrap();
        let decoded = IdentityToken::decode(&token.encode().unwrap()).unwrap();

        assert_eq!(
            decoded.kind,
            TokenKind::TeamMember {
                team_id: 5,
                leader_enrollment: Some("EN0100".to_owned())
            }
        );
        assert_eq!(decoded.registration_id, team.members[1].id);
    }

    #[test]
    fn leader_token_size_independent_of_membership() {
        let small = composition(2);
        let large = composition(50);

        let small_token = IdentityToken::for_registration(&small.leader, &event(), Some(&small))
            .unwrap()
            .encode()
            .unwrap();
        let large_token = IdentityToken::for_registration(&large.leader, &event(), Some(&large))
            .unwrap()
            .encode()
            .unwrap();

        // The member list is never embedded, only the team pointer.
        assert_eq!(small_token.len(), large_token.len());
    }

    #[test]
    fn newer_major_fails_closed() {
        let reg = registration(1, ParticipantKind::Individual, None);
        let mut token = IdentityToken::for_registration(&reg, &event(), None).unwrap();
        token.version = "3.0".to_owned();
        let raw = token.encode().unwrap();

        assert!(matches!(
            IdentityToken::decode(&raw),
            Err(Error::UnsupportedVersion(v)) if v == "3.0"
        ));

        token.version = "10.2".to_owned();
        assert!(matches!(
            IdentityToken::decode(&token.encode().unwrap()),
            Err(Error::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn newer_minor_decodes_permissively() {
        let raw = r#"{
            "version": "2.4",
            "registration_id": 9,
            "event_id": 7,
            "event_name": "Tech Summit",
            "kind": "individual",
            "student": {"name": "A", "enrollment": "EN1", "department": null},
            "checksum": "added-in-2.4"
        }"#;

        let decoded = IdentityToken::decode(raw).unwrap();
        assert_eq!(decoded.version, "2.4");
        assert_eq!(decoded.kind, TokenKind::Individual);
    }

    #[test]
    fn team_kind_without_team_block_is_malformed() {
        let raw = r#"{
            "version": "2.0",
            "registration_id": 9,
            "event_id": 7,
            "event_name": "Tech Summit",
            "kind": "team_leader",
            "student": {"name": "A", "enrollment": "EN1", "department": null}
        }"#;

        assert!(matches!(
            IdentityToken::decode(raw),
            Err(Error::MalformedToken(_))
        ));
    }

    #[test]
    fn kind_and_role_must_agree() {
        let raw = r#"{
            "version": "2.0",
            "registration_id": 9,
            "event_id": 7,
            "event_name": "Tech Summit",
            "kind": "team_leader",
            "student": {"name": "A", "enrollment": "EN1", "department": null},
            "team": {"team_id": 5, "role": "member"}
        }"#;

        assert!(matches!(
            IdentityToken::decode(raw),
            Err(Error::MalformedToken(_))
        ));
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let raw = r#"{
            "version": "2.0",
            "registration_id": 9,
            "event_id": 7,
            "event_name": "Tech Summit",
            "kind": "mascot",
            "student": {"name": "A", "enrollment": "EN1", "department": null}
        }"#;

        assert!(matches!(
            IdentityToken::decode(raw),
            Err(Error::MalformedToken(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            IdentityToken::decode("not a token"),
            Err(Error::MalformedToken(_))
        ));
        assert!(matches!(
            IdentityToken::decode("{\"version\": true}"),
            Err(Error::MalformedToken(_))
        ));
    }
}

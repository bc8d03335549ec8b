use rand::{distributions::Alphanumeric, Rng};
use serde::Serializer;
use sqlx::types::time;

pub mod attendance;
pub mod db;
pub mod invitation;
pub mod registration;
pub mod roster;
pub mod session;

/// Generates a random alphanumeric code, used for invitation codes and
/// session ids.
pub fn generate_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn serialize_datetime<S>(x: &time::OffsetDateTime, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_i64(x.unix_timestamp())
}

pub fn serialize_datetime_opt<S>(x: &Option<time::OffsetDateTime>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if let Some(x) = x {
        s.serialize_i64(x.unix_timestamp())
    } else {
        s.serialize_none()
    }
}

//! Local persistence for scanner sessions, so a volunteer's client can
//! resume after a reload without re-validating the invitation. One JSON
//! descriptor per invitation code under a cache directory.
//!
//! The cache is advisory only: entries past their expiry are discarded on
//! read, malformed entries are dropped silently, and a cached descriptor is
//! never a substitute for a server-side session status check before a
//! mutating call.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The locally persisted session descriptor. Timestamps are unix seconds.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CachedSession {
    pub session_id: String,
    pub invitation_code: String,
    pub bound_event_id: i64,
    pub volunteer_name: String,
    pub volunteer_contact: String,
    pub created_at: i64,
    pub expires_at: i64,
}

pub struct SessionCache {
    dir: PathBuf,
}

impl SessionCache {
    pub fn new(dir: impl Into<PathBuf>) -> SessionCache {
        SessionCache { dir: dir.into() }
    }

    fn entry_path(&self, code: &str) -> PathBuf {
        // Codes are alphanumeric; strip anything else so a scanned string
        // can never escape the cache directory.
        let safe: String = code.chars().filter(char::is_ascii_alphanumeric).collect();
        self.dir.join(format!("{}.json", safe))
    }

    /// Persists a session descriptor, keyed by its invitation code.
    pub fn save(&self, entry: &CachedSession) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(&entry.invitation_code);
        fs::write(&path, serde_json::to_string_pretty(entry)?)?;
        log::debug!("Cached session {} at {}", entry.session_id, path.display());
        Ok(())
    }

    /// Returns the cached session for an invitation code, unless it is
    /// missing, expired, or unreadable. Stale and corrupt entries are
    /// deleted on the way out, never surfaced.
    pub fn load(&self, code: &str, now: i64) -> Option<CachedSession> {
        let path = self.entry_path(code);
        let raw = fs::read_to_string(&path).ok()?;

        match serde_json::from_str::<CachedSession>(&raw) {
            Ok(entry) if now < entry.expires_at => Some(entry),
            Ok(_) => {
                log::debug!("Dropping expired cached session at {}", path.display());
                discard(&path);
                None
            }
            Err(e) => {
                log::debug!("Dropping unparseable cache entry {}: {}", path.display(), e);
                discard(&path);
                None
            }
        }
    }

    /// Removes the entry for an invitation code, if any.
    pub fn forget(&self, code: &str) {
        discard(&self.entry_path(code));
    }

    /// Removes every expired or malformed entry. Best-effort and safe to
    /// call opportunistically; an empty or missing cache directory is fine.
    pub fn sweep(&self, now: i64) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let keep = fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<CachedSession>(&raw).ok())
                .map(|cached| now < cached.expires_at)
                .unwrap_or(false);

            if !keep {
                log::debug!("Sweeping cache entry {}", path.display());
                discard(&path);
            }
        }
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::debug!("Failed to remove cache entry {}: {}", path.display(), e);
    }
}

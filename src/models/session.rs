use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Default access-session lifetime.
pub const SESSION_TTL_HOURS: i64 = 6;

/// Short-lived token binding a student browser to one agent.
///
/// Created when an access code is validated; `accepted` flips once the
/// student passes the consent gate. Every grading request must present a
/// live, accepted session for the right agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessSession {
    pub token: String,
    pub agent_id: Uuid,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessSession {
    /// Mint a new session with a random url-safe token and the default TTL.
    pub fn create(agent_id: Uuid) -> Self {
        let mut raw = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw);
        let now = Utc::now();
        Self {
            token,
            agent_id,
            accepted: false,
            created_at: now,
            expires_at: now + Duration::hours(SESSION_TTL_HOURS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Stable digest of the raw token, safe to persist on a submission.
    /// Not reversible to the token itself.
    pub fn digest(&self) -> String {
        session_digest(&self.token)
    }
}

/// First 16 hex chars of SHA-256 over the raw token.
pub fn session_digest(token: &str) -> String {
    let hash = Sha256::digest(token.as_bytes());
    let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sets_six_hour_expiry() {
        let s = AccessSession::create(Uuid::new_v4());
        let ttl = s.expires_at - s.created_at;
        assert_eq!(ttl.num_hours(), SESSION_TTL_HOURS);
        assert!(!s.accepted);
        assert!(!s.is_expired(Utc::now()));
    }

    #[test]
    fn expired_after_ttl() {
        let s = AccessSession::create(Uuid::new_v4());
        let later = s.expires_at + Duration::seconds(1);
        assert!(s.is_expired(later));
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = AccessSession::create(Uuid::new_v4());
        let b = AccessSession::create(Uuid::new_v4());
        assert_ne!(a.token, b.token);
        assert!(!a.token.contains('/'));
        assert!(!a.token.contains('+'));
    }

    #[test]
    fn digest_is_stable_and_short() {
        let d1 = session_digest("some-token");
        let d2 = session_digest("some-token");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 16);
        assert_ne!(d1, session_digest("other-token"));
    }
}

//! Bearer-token sessions.
//!
//! [`SessionStore`] maps opaque tokens to verified identities for the life
//! of the process. Tokens are 256 bits from the OS random generator, so they
//! cannot be derived from the username or the clock.
//!
//! All reads and writes of the token map go through one `RwLock`. Callers
//! authenticate *before* issuing, so no directory I/O ever happens while the
//! lock is held.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::SessionError;
use crate::models::Identity;

const TOKEN_BYTES: usize = 32;
/// Upper bound on a configured lifetime (ten years).
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// A live session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub identity: Identity,
    pub issued_at: DateTime<Utc>,
    /// `None` when sessions never expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-wide token store.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Option<Duration>,
}

impl SessionStore {
    /// Create a store whose sessions live for `ttl_secs` seconds. `0`
    /// disables expiry.
    pub fn new(ttl_secs: u64) -> Self {
        let ttl = (ttl_secs > 0).then(|| Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64));
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Mint a fresh token bound to `identity`.
    pub async fn issue(&self, identity: Identity) -> Session {
        let issued_at = Utc::now();
        let expires_at = self.ttl.map(|ttl| issued_at + ttl);

        let mut sessions = self.sessions.write().await;
        let mut token = generate_token();
        while sessions.contains_key(&token) {
            token = generate_token();
        }

        let session = Session {
            token: token.clone(),
            identity,
            issued_at,
            expires_at,
        };
        sessions.insert(token, session.clone());

        info!(
            username = %session.identity.username,
            role = %session.identity.role,
            active = sessions.len(),
            "issued session"
        );
        session
    }

    /// Look up the identity behind a token.
    pub async fn resolve(&self, token: &str) -> Result<Identity, SessionError> {
        self.resolve_at(token, Utc::now()).await
    }

    async fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, SessionError> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return Err(SessionError::Unauthenticated),
                Some(session) if !session.is_expired(now) => return Ok(session.identity.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.remove(token) {
            debug!(username = %session.identity.username, "dropped expired session");
        }
        Err(SessionError::Expired)
    }

    /// Forget a token. Returns whether it was known.
    pub async fn revoke(&self, token: &str) -> bool {
        let removed = self.sessions.write().await.remove(token);
        if let Some(ref session) = removed {
            info!(username = %session.identity.username, "revoked session");
        }
        removed.is_some()
    }

    /// Drop every expired session and return how many were removed.
    pub async fn prune_expired(&self) -> usize {
        self.prune_expired_at(Utc::now()).await
    }

    async fn prune_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!(pruned, remaining = sessions.len(), "pruned expired sessions");
        }
        pruned
    }

    /// Number of sessions currently held (expired ones included until pruned).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

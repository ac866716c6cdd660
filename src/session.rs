//! Session abstraction. Session storage proper is an
//! external collaborator; core code only ever needs to turn an opaque token
//! into a `PlayerSession`. The JWT adapter decodes claims produced
//! elsewhere rather than owning login/issuance.

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSession {
    pub player_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    tenant_id: String,
    exp: usize,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn authenticate(&self, token: &str) -> Option<PlayerSession>;
}

pub struct JwtSessionStore {
    secret: String,
}

impl JwtSessionStore {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl SessionStore for JwtSessionStore {
    async fn authenticate(&self, token: &str) -> Option<PlayerSession> {
        let decoded = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .ok()?;
        Some(PlayerSession {
            player_id: decoded.claims.sub,
            tenant_id: decoded.claims.tenant_id,
        })
    }
}

/// Fixed lookup table for tests — no encoding/decoding involved.
#[derive(Default)]
pub struct FakeSessionStore {
    sessions: Mutex<HashMap<String, PlayerSession>>,
}

impl FakeSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, session: PlayerSession) {
        self.sessions.lock().insert(token.into(), session);
    }
}

#[async_trait]
impl SessionStore for FakeSessionStore {
    async fn authenticate(&self, token: &str) -> Option<PlayerSession> {
        self.sessions.lock().get(token).cloned()
    }
}

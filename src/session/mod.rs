//! Client-side session: the stored bearer token and everything derived from it.
//!
//! Nothing here verifies signatures. The server that issued the token is the
//! authority; the client only reads claims to pick routes and fill requests.

pub mod claims;
pub mod decoder;
pub mod token_store;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

pub use claims::{Claims, UserRole};
pub use decoder::{decode_jwt_payload, ClaimsMap};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};

/// Role reported when no role can be read from the session.
pub const FALLBACK_ROLE: &str = "patient";

/// Read-only accessor over the token store. Every read goes back to the
/// store, so there is no cached claim set to go stale after sign-in/out.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub fn get_token(&self) -> Option<String> {
        self.store.load()
    }

    /// Typed claims of the current token, `None` when absent or undecodable.
    pub fn claims(&self) -> Option<Claims> {
        let token = self.get_token()?;
        decode_jwt_payload(&token).map(|map| Claims::from_map(&map))
    }

    pub fn get_user_id(&self) -> Option<String> {
        self.claims()?.user_id
    }

    /// Raw role claim, or `"patient"` when there is none.
    ///
    /// The fallback also applies to signed-out visitors, so callers must not
    /// read this as proof of a patient session.
    pub fn get_user_role(&self) -> String {
        self.claims()
            .and_then(|claims| claims.role)
            .unwrap_or_else(|| FALLBACK_ROLE.to_string())
    }

    pub fn is_token_expired(&self) -> bool {
        self.is_token_expired_at(Utc::now().timestamp())
    }

    pub fn is_token_expired_at(&self, now_secs: i64) -> bool {
        match self.claims() {
            Some(claims) => claims.is_expired_at(now_secs),
            None => true,
        }
    }

    /// `Authorization` header value for the current token.
    pub fn auth_header(&self) -> Option<String> {
        self.get_token().map(|token| format!("Bearer {token}"))
    }

    pub fn store(&self, token: &str) -> Result<(), TokenStoreError> {
        self.store.save(token)?;
        debug!("Session token replaced");
        Ok(())
    }

    /// Drops the stored token. Failures are logged; the caller is leaving the
    /// session either way.
    pub fn clear(&self) {
        if let Err(error) = self.store.clear() {
            warn!(%error, "Failed to clear stored session token");
        }
    }
}

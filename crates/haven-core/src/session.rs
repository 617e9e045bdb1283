//! Signed-in session

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::Result;

#[derive(Clone)]
pub struct Session {
    /// Opaque user id issued by the auth provider
    pub user_id: String,
    token: String,
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        let token = token.into();

        if user_id.trim().is_empty() {
            return Err(CoreError::EmptyIdentity);
        }
        if token.is_empty() {
            return Err(CoreError::MissingToken);
        }

        Ok(Self {
            user_id,
            token,
            signed_in_at: Utc::now(),
        })
    }

    /// Bearer token for REST calls
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("signed_in_at", &self.signed_in_at)
            .finish()
    }
}

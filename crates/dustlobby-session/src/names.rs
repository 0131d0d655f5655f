//! Display-name hook for logged-in users.
//!
//! Players identify with nothing more than a numeric account id. The
//! lobby shows names, so every login goes through a [`NameResolver`]
//! first. The server plugs in an HTTP-backed resolver; tests and offline
//! setups use [`StaticNames`] or [`NumericNames`].

use std::collections::HashMap;

use dustlobby_protocol::UserId;

use crate::SessionError;

/// Resolves a user id to the display name shown in rosters and scores.
///
/// `Send + Sync + 'static` because one resolver is shared by every
/// connection task for the life of the server.
///
/// # Example
///
/// ```rust
/// use dustlobby_protocol::UserId;
/// use dustlobby_session::{NameResolver, SessionError};
///
/// struct Shouty;
///
/// impl NameResolver for Shouty {
///     async fn resolve(&self, user: UserId) -> Result<String, SessionError> {
///         Ok(format!("PLAYER{}", user.0))
///     }
/// }
/// ```
pub trait NameResolver: Send + Sync + 'static {
    /// Looks up `user`'s display name.
    ///
    /// # Returns
    /// - `Ok(name)` for a known account
    /// - `Err(SessionError::UnknownUser)` if no such account exists
    /// - `Err(SessionError::LookupFailed)` if the lookup itself failed
    fn resolve(
        &self,
        user: UserId,
    ) -> impl std::future::Future<Output = Result<String, SessionError>> + Send;
}

/// Names every valid user after their id. Rejects out-of-range ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericNames;

impl NameResolver for NumericNames {
    async fn resolve(&self, user: UserId) -> Result<String, SessionError> {
        if !user.is_valid() {
            return Err(SessionError::UnknownUser(user));
        }
        Ok(user.0.to_string())
    }
}

/// A fixed id → name table. Unknown ids are rejected.
#[derive(Debug, Clone, Default)]
pub struct StaticNames {
    names: HashMap<UserId, String>,
}

impl StaticNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user: UserId, name: impl Into<String>) -> Self {
        self.names.insert(user, name.into());
        self
    }
}

impl NameResolver for StaticNames {
    async fn resolve(&self, user: UserId) -> Result<String, SessionError> {
        self.names
            .get(&user)
            .cloned()
            .ok_or(SessionError::UnknownUser(user))
    }
}

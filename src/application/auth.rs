//! Token authentication.
//!
//! Clients send `Authorization: Token <token>`. The token is looked up in
//! the user store and resolved to the acting user's public projection.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::domain::UserSummary;
use crate::infrastructure::{RepositoryError, UserRepository};

/// Authentication scheme expected in the `Authorization` header, and
/// advertised in `WWW-Authenticate` on failure.
pub const TOKEN_SCHEME: &str = "Token";

/// Extracts the token from an `Authorization` header value.
///
/// The value must consist of exactly two whitespace-separated fields, the
/// first being [`TOKEN_SCHEME`].
#[must_use]
pub fn parse_authorization(header: &str) -> Option<&str> {
    let mut fields = header.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(TOKEN_SCHEME), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Resolves a token to the user it belongs to.
pub trait Authenticator: Send + Sync {
    /// Returns `Ok(None)` when no user holds `token`.
    fn resolve<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserSummary>, RepositoryError>>;
}

/// [`Authenticator`] backed by the user store.
#[derive(Clone)]
pub struct TokenAuthenticator {
    users: Arc<dyn UserRepository + Send + Sync>,
}

impl TokenAuthenticator {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository + Send + Sync>) -> Self {
        Self { users }
    }
}

impl Authenticator for TokenAuthenticator {
    fn resolve<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserSummary>, RepositoryError>> {
        Box::pin(async move {
            let user = self.users.find_by_token(token).await?;
            Ok(user.map(|user| user.summary()))
        })
    }
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenAuthenticator")
            .field("users", &"Arc<dyn UserRepository>")
            .finish()
    }
}

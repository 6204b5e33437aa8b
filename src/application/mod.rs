//! Application layer: authentication and the conditional patch protocol.

pub mod auth;
pub mod patch;

pub use auth::{Authenticator, TOKEN_SCHEME, TokenAuthenticator, parse_authorization};
pub use patch::{PatchApplier, PatchError, is_json_patch};

//! GitHub login: CSRF state, browser sessions, and the authorization-code flow.
//!
//! | Module     | Responsibility                                           |
//! |------------|----------------------------------------------------------|
//! | `state`    | `StateStore`: single-use, session-bound, expiring state |
//! | `session`  | `SessionStore`: pending state and credential per cookie |
//! | `provider` | `IdentityProvider`: authorize URL, code exchange        |
//! | `manager`  | `OAuthSessionManager`: ties the above into one flow     |

pub mod manager;
pub mod provider;
pub mod session;
pub mod state;

use std::fmt;

pub use manager::{AuthStatus, CallbackParams, OAuthSessionManager};
pub use provider::{GitHubOAuth, GitHubOAuthConfig, IdentityProvider};
pub use session::SessionStore;
pub use state::{InMemoryStateStore, StateCheck, StateStore};

/// An access token together with the login it resolved to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    login: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            login: login.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn login(&self) -> &str {
        &self.login
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("login", &self.login)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let cred = Credential::new("gho_supersecret", "octo");
        let printed = format!("{:?}", cred);
        assert!(!printed.contains("supersecret"));
        assert!(printed.contains("octo"));
    }
}

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::provider::IdentityProvider;
use super::session::SessionStore;
use super::state::{StateCheck, StateStore};
use super::Credential;
use crate::errors::OAuthError;
use crate::tracker::IssueTracker;
use crate::tracker::github::is_valid_github_token;

/// Query parameters GitHub sends to the callback.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub login: Option<String>,
    pub client_id_configured: bool,
}

/// Drives login for browser sessions.
///
/// A session's credential only ever changes through `complete_login`,
/// `connect_token`, `logout` and `revoke`.
pub struct OAuthSessionManager {
    states: Arc<dyn StateStore>,
    sessions: Arc<SessionStore>,
    provider: Option<Arc<dyn IdentityProvider>>,
    tracker: Arc<dyn IssueTracker>,
}

impl OAuthSessionManager {
    pub fn new(
        states: Arc<dyn StateStore>,
        sessions: Arc<SessionStore>,
        provider: Option<Arc<dyn IdentityProvider>>,
        tracker: Arc<dyn IssueTracker>,
    ) -> Self {
        Self {
            states,
            sessions,
            provider,
            tracker,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&Arc<dyn IdentityProvider>, OAuthError> {
        self.provider
            .as_ref()
            .ok_or(OAuthError::NotConfigured("GITHUB_CLIENT_ID"))
    }

    /// Issue a state for the session and return the provider URL to visit.
    pub fn begin_login(&self, session_id: &str) -> Result<String, OAuthError> {
        let provider = self.provider()?;
        self.states.purge_expired();
        let state = self.states.issue(session_id);
        self.sessions.set_pending_state(session_id, &state);
        provider.authorize_url(&state)
    }

    pub async fn complete_login(
        &self,
        session_id: &str,
        params: CallbackParams,
    ) -> Result<Credential, OAuthError> {
        let provider = self.provider()?;

        let state = params.state.as_deref().unwrap_or_default();
        if state.is_empty() || !self.sessions.take_pending_state_if(session_id, state) {
            warn!("OAuth callback state does not match the session");
            return Err(OAuthError::StateMismatch);
        }
        match self.states.consume(session_id, state) {
            StateCheck::Valid => {}
            StateCheck::Mismatch | StateCheck::Expired => {
                warn!("OAuth state was replayed or expired");
                return Err(OAuthError::StateMismatch);
            }
        }

        if let Some(error) = params.error {
            warn!(error = %error, description = ?params.error_description, "provider denied authorization");
            return Err(OAuthError::ProviderDenied(error));
        }
        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::ExchangeFailed("missing authorization code".into()))?;

        let token = provider.exchange_code(&code).await?;
        let login = provider.resolve_identity(&token).await?;

        let credential = Credential::new(token, login);
        self.sessions.set_credential(session_id, credential.clone());
        info!(login = credential.login(), "GitHub login completed");
        Ok(credential)
    }

    /// Attach a personal access token to the session after verifying it.
    pub async fn connect_token(
        &self,
        session_id: &str,
        token: &str,
    ) -> Result<Credential, OAuthError> {
        let credential = self.verify_token(token).await?;
        self.sessions.set_credential(session_id, credential.clone());
        info!(login = credential.login(), "GitHub token connected");
        Ok(credential)
    }

    /// Resolve a caller-supplied token without storing it. Works without an
    /// OAuth client configured.
    pub async fn verify_token(&self, token: &str) -> Result<Credential, OAuthError> {
        let token = token.trim();
        if !is_valid_github_token(token) {
            return Err(OAuthError::VerificationFailed(
                "token does not look like a GitHub token".into(),
            ));
        }
        let identity = self
            .tracker
            .current_user(token)
            .await
            .map_err(|e| OAuthError::VerificationFailed(e.to_string()))?;
        Ok(Credential::new(token, identity.login))
    }

    pub fn credential(&self, session_id: &str) -> Option<Credential> {
        self.sessions.credential(session_id)
    }

    pub fn status(&self, session_id: Option<&str>) -> AuthStatus {
        let login = session_id
            .and_then(|id| self.sessions.credential(id))
            .map(|c| c.login().to_string());
        AuthStatus {
            authenticated: login.is_some(),
            login,
            client_id_configured: self.is_configured(),
        }
    }

    /// Forget the session: credential, pending state and the entry itself.
    pub fn logout(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Drop a credential the tracker has rejected.
    pub fn revoke(&self, session_id: &str) {
        if self.sessions.clear_credential(session_id) {
            warn!("discarded a credential rejected by GitHub");
        }
    }
}

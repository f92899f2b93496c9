use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::OAuthError;
use crate::tracker::IssueTracker;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

/// Response from GitHub's token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Interpret the response: a token, or the reason there is none.
    pub fn into_token(self) -> Result<String, OAuthError> {
        if let Some(err) = self.error {
            let detail = self.error_description.unwrap_or_default();
            return Err(OAuthError::ExchangeFailed(if detail.is_empty() {
                err
            } else {
                format!("{}: {}", err, detail)
            }));
        }
        match self.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(OAuthError::NoToken),
        }
    }
}

/// The identity provider side of the authorization-code flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError>;

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError>;

    /// Resolve a bearer token to the login it belongs to.
    async fn resolve_identity(&self, token: &str) -> Result<String, OAuthError>;
}

#[derive(Debug, Clone)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub scope: String,
}

/// GitHub OAuth App implementation of `IdentityProvider`.
pub struct GitHubOAuth {
    config: GitHubOAuthConfig,
    http: reqwest::Client,
    tracker: Arc<dyn IssueTracker>,
    token_url: String,
}

impl GitHubOAuth {
    pub fn new(config: GitHubOAuthConfig, tracker: Arc<dyn IssueTracker>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            tracker,
            token_url: GITHUB_TOKEN_URL.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GitHubOAuth {
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let mut params = vec![
            ("client_id", self.config.client_id.as_str()),
            ("scope", self.config.scope.as_str()),
            ("state", state),
        ];
        if let Some(uri) = self.config.redirect_uri.as_deref() {
            params.push(("redirect_uri", uri));
        }
        Url::parse_with_params(GITHUB_AUTHORIZE_URL, &params)
            .map(String::from)
            .map_err(|e| OAuthError::ExchangeFailed(format!("invalid authorize URL: {}", e)))
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let mut form = vec![
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
        ];
        if let Some(uri) = self.config.redirect_uri.as_deref() {
            form.push(("redirect_uri", uri));
        }

        let resp = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), "GitHub token endpoint returned error status");
            return Err(OAuthError::ExchangeFailed(format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }

        let body = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(format!("unreadable token response: {}", e)))?;
        debug!(scope = ?body.scope, token_type = ?body.token_type, "token exchange answered");
        body.into_token()
    }

    async fn resolve_identity(&self, token: &str) -> Result<String, OAuthError> {
        self.tracker
            .current_user(token)
            .await
            .map(|identity| identity.login)
            .map_err(|e| OAuthError::VerificationFailed(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted identity provider for login-flow tests.

    use super::*;

    /// Code `good` exchanges to `gho_fromcode` (login `octo`); `empty` yields
    /// no token; anything else is rejected by the provider.
    pub struct FakeProvider;

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
            Ok(format!("https://github.test/authorize?state={}", state))
        }

        async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
            match code {
                "good" => Ok("gho_fromcode".into()),
                "empty" => Err(OAuthError::NoToken),
                _ => Err(OAuthError::ExchangeFailed("bad_verification_code".into())),
            }
        }

        async fn resolve_identity(&self, token: &str) -> Result<String, OAuthError> {
            if token == "gho_fromcode" {
                Ok("octo".into())
            } else {
                Err(OAuthError::VerificationFailed("Bad credentials".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::fake::FakeTracker;

    fn provider(redirect: Option<&str>) -> GitHubOAuth {
        GitHubOAuth::new(
            GitHubOAuthConfig {
                client_id: "Iv1.abc".into(),
                client_secret: "secret".into(),
                redirect_uri: redirect.map(str::to_string),
                scope: "repo read:org".into(),
            },
            Arc::new(FakeTracker::new("octo", "gho_ok")),
        )
    }

    #[test]
    fn test_authorize_url_carries_state_and_scope() {
        let url = provider(Some("http://localhost:8080/api/auth/callback"))
            .authorize_url("st4te")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(parsed.host_str(), Some("github.com"));
        assert_eq!(params["state"], "st4te");
        assert_eq!(params["client_id"], "Iv1.abc");
        assert_eq!(params["scope"], "repo read:org");
        assert_eq!(params["redirect_uri"], "http://localhost:8080/api/auth/callback");
        assert!(!url.contains("secret"));
    }

    #[test]
    fn test_authorize_url_without_redirect() {
        let url = provider(None).authorize_url("s").unwrap();
        assert!(!url.contains("redirect_uri"));
    }

    #[test]
    fn test_token_response_with_access_token() {
        let json = r#"{"access_token":"gho_abc123","token_type":"bearer","scope":"repo"}"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.into_token().unwrap(), "gho_abc123");
    }

    #[test]
    fn test_token_response_error() {
        let json = r#"{"error":"bad_verification_code","error_description":"The code passed is incorrect or expired."}"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        match resp.into_token() {
            Err(OAuthError::ExchangeFailed(msg)) => assert!(msg.starts_with("bad_verification_code")),
            other => panic!("Expected ExchangeFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_token_response_without_token() {
        let resp: TokenResponse = serde_json::from_str(r#"{"token_type":"bearer"}"#).unwrap();
        assert!(matches!(resp.into_token(), Err(OAuthError::NoToken)));
    }

    #[tokio::test]
    async fn test_resolve_identity_uses_tracker() {
        let p = provider(None);
        assert_eq!(p.resolve_identity("gho_ok").await.unwrap(), "octo");
        assert!(matches!(
            p.resolve_identity("gho_bad").await,
            Err(OAuthError::VerificationFailed(_))
        ));
    }
}

//! Typed error hierarchy for issueforge.
//!
//! Three top-level enums cover the three remote collaborators:
//! - `TrackerError`: issue tracker (GitHub REST) failures
//! - `OAuthError`: authorization-code login failures
//! - `GenerateError`: plan/prompt generation failures

use thiserror::Error;

/// Errors from the remote issue tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Bad credentials: {0}")]
    Unauthorized(String),

    #[error("Access to {resource} is forbidden: {message}")]
    Forbidden { resource: String, message: String },

    /// The token authenticates but lacks the scope the call requires.
    #[error("Token is missing required scope for {resource}: {message}")]
    InsufficientScope { resource: String, message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Validation failed for {resource}: {message}")]
    Validation { resource: String, message: String },

    #[error("Failed to reach the tracker: {0}")]
    Transport(String),

    #[error("Unexpected tracker response ({status}): {message}")]
    Unexpected { status: u16, message: String },
}

impl TrackerError {
    /// True when retrying further calls under the same credential cannot succeed.
    pub fn is_scope_failure(&self) -> bool {
        matches!(self, TrackerError::InsufficientScope { .. })
    }

    /// True when the credential itself has been rejected by the tracker.
    pub fn is_bad_credential(&self) -> bool {
        matches!(self, TrackerError::Unauthorized(_))
    }
}

/// Errors from a single OAuth login attempt.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth client is not configured (missing {0})")]
    NotConfigured(&'static str),

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("Authorization denied by provider: {0}")]
    ProviderDenied(String),

    #[error("Code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Provider returned no access token")]
    NoToken,

    #[error("Token could not be resolved to an identity: {0}")]
    VerificationFailed(String),

    #[error("Failed to reach identity provider: {0}")]
    Transport(String),
}

impl OAuthError {
    /// Machine-readable code used on the login-failed redirect.
    pub fn redirect_code(&self) -> &'static str {
        match self {
            OAuthError::StateMismatch => "invalid_state",
            OAuthError::ProviderDenied(reason) if reason == "access_denied" => "access_denied",
            OAuthError::ProviderDenied(_) | OAuthError::ExchangeFailed(_) => {
                "bad_verification_code"
            }
            OAuthError::NoToken => "no_token",
            OAuthError::NotConfigured(_)
            | OAuthError::VerificationFailed(_)
            | OAuthError::Transport(_) => "server_error",
        }
    }
}

/// Errors from the plan/prompt generation collaborator.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Invalid OpenAI API key provided. Please check your API key and try again.")]
    InvalidKey,

    #[error("OpenAI API rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error(
        "Could not connect to OpenAI API. Please check your internet connection and verify your API key is correct."
    )]
    Connection(String),

    #[error("The model returned an empty response")]
    EmptyResponse,

    #[error("OpenAI API error ({status}): {message}")]
    Provider { status: u16, message: String },
}

impl GenerateError {
    /// Message safe to show to the caller.
    pub fn user_message(&self) -> String {
        match self {
            GenerateError::Provider { .. } => {
                "Error generating content from the model provider. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_scope_failure_is_distinct_from_forbidden() {
        let scope = TrackerError::InsufficientScope {
            resource: "owner/repo".into(),
            message: "needs repo".into(),
        };
        let forbidden = TrackerError::Forbidden {
            resource: "owner/repo".into(),
            message: "nope".into(),
        };
        assert!(scope.is_scope_failure());
        assert!(!forbidden.is_scope_failure());
    }

    #[test]
    fn tracker_not_found_names_resource() {
        let err = TrackerError::NotFound {
            resource: "repository octo/missing".into(),
        };
        assert!(err.to_string().contains("octo/missing"));
    }

    #[test]
    fn unauthorized_is_bad_credential() {
        assert!(TrackerError::Unauthorized("Bad credentials".into()).is_bad_credential());
        assert!(!TrackerError::RateLimited("slow".into()).is_bad_credential());
    }

    #[test]
    fn oauth_redirect_codes() {
        assert_eq!(OAuthError::StateMismatch.redirect_code(), "invalid_state");
        assert_eq!(
            OAuthError::ProviderDenied("access_denied".into()).redirect_code(),
            "access_denied"
        );
        assert_eq!(
            OAuthError::ExchangeFailed("bad_verification_code".into()).redirect_code(),
            "bad_verification_code"
        );
        assert_eq!(OAuthError::NoToken.redirect_code(), "no_token");
        assert_eq!(
            OAuthError::VerificationFailed("boom".into()).redirect_code(),
            "server_error"
        );
    }

    #[test]
    fn generate_provider_error_hides_detail() {
        let err = GenerateError::Provider {
            status: 500,
            message: "stack trace here".into(),
        };
        assert!(!err.user_message().contains("stack trace"));
        assert!(GenerateError::RateLimited.user_message().contains("rate limit"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&TrackerError::RateLimited("x".into()));
        assert_std_error(&OAuthError::NoToken);
        assert_std_error(&GenerateError::InvalidKey);
    }
}

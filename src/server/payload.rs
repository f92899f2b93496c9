//! Request bodies, the JSON-or-form extractor, and the session cookie.

use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::{HeaderMap, HeaderValue, header},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use super::api::ApiError;
use crate::plan::TaskRecord;

pub const SESSION_COOKIE: &str = "issueforge_session";

/// Accepts `application/json` or `application/x-www-form-urlencoded`.
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Text(String),
}

/// Booleans arrive as JSON `true` or as form text such as `"on"` or `"1"`.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<FlagValue>::deserialize(deserializer)? {
        Some(FlagValue::Bool(b)) => b,
        Some(FlagValue::Text(t)) => matches!(
            t.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "on" | "yes"
        ),
        None => false,
    })
}

/// Treat blank strings as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateKeyRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeneratePromptsRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project_requirements: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub create_issues: bool,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateIssuesRequest {
    #[serde(default)]
    pub project_plan: Option<String>,
    #[serde(default)]
    pub ai_prompts: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
    /// Pre-extracted tasks; when present the plan is not re-parsed.
    #[serde(default)]
    pub tasks: Option<Vec<TaskRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectTokenRequest {
    pub token: String,
}

/// Session id from the request's `Cookie` header, if any.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value binding the browser to `session_id`.
///
/// `SameSite=Lax` so the cookie survives the top-level redirect back from the
/// identity provider.
pub fn session_cookie(session_id: &str, secure: bool) -> Option<HeaderValue> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, session_id
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; issueforge_session=abc-123; other=1"),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_session_id_absent() {
        let mut headers = HeaderMap::new();
        assert!(session_id(&headers).is_none());
        headers.insert(header::COOKIE, HeaderValue::from_static("issueforge_session="));
        assert!(session_id(&headers).is_none());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc", false).unwrap();
        let text = cookie.to_str().unwrap();
        assert!(text.starts_with("issueforge_session=abc;"));
        assert!(text.contains("HttpOnly"));
        assert!(!text.contains("Secure"));
        assert!(session_cookie("abc", true).unwrap().to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn test_flag_from_json_and_form() {
        let json: GeneratePromptsRequest =
            serde_json::from_str(r#"{"create_issues": true}"#).unwrap();
        assert!(json.create_issues);
        let text: GeneratePromptsRequest =
            serde_json::from_str(r#"{"create_issues": "on"}"#).unwrap();
        assert!(text.create_issues);
        let off: GeneratePromptsRequest =
            serde_json::from_str(r#"{"create_issues": "false"}"#).unwrap();
        assert!(!off.create_issues);
        let missing: GeneratePromptsRequest = serde_json::from_str("{}").unwrap();
        assert!(!missing.create_issues);
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ".into())).as_deref(), Some("x"));
        assert!(non_blank(Some("   ".into())).is_none());
        assert!(non_blank(None).is_none());
    }
}

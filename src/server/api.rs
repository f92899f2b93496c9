use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::payload::{
    ConnectTokenRequest, CreateIssuesRequest, GeneratePromptsRequest, JsonOrForm,
    ValidateKeyRequest, non_blank, session_cookie, session_id,
};
use crate::config::AppConfig;
use crate::errors::{GenerateError, OAuthError, TrackerError};
use crate::generate::{OpenAiGenerator, PlanGenerator};
use crate::oauth::{
    CallbackParams, Credential, GitHubOAuth, GitHubOAuthConfig, IdentityProvider,
    InMemoryStateStore, OAuthSessionManager, SessionStore,
};
use crate::plan::{PromptAligner, TaskExtractor, TaskRecord};
use crate::tracker::{
    BatchResult, BatchStatus, FailureReason, GitHubClient, IssueMaterializer, IssueTracker,
    RepositoryAccessFilter,
};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: AppConfig,
    pub generator: Arc<dyn PlanGenerator>,
    pub tracker: Arc<dyn IssueTracker>,
    pub oauth: OAuthSessionManager,
    pub extractor: TaskExtractor,
    pub aligner: PromptAligner,
    pub materializer: IssueMaterializer,
    pub repositories: RepositoryAccessFilter,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        generator: Arc<dyn PlanGenerator>,
        tracker: Arc<dyn IssueTracker>,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let oauth = OAuthSessionManager::new(
            Arc::new(InMemoryStateStore::with_ttl_secs(config.oauth_state_ttl_secs)),
            Arc::new(SessionStore::with_limits(
                config.session_ttl_secs,
                config.max_sessions,
            )),
            provider,
            Arc::clone(&tracker),
        );
        Self {
            generator,
            oauth,
            extractor: TaskExtractor::new(),
            aligner: PromptAligner::new(),
            materializer: IssueMaterializer::new(Arc::clone(&tracker)),
            repositories: RepositoryAccessFilter::new(Arc::clone(&tracker)),
            tracker,
            config,
        }
    }

    /// Wire the real GitHub and OpenAI collaborators.
    pub fn from_config(config: AppConfig) -> Self {
        let tracker: Arc<dyn IssueTracker> = Arc::new(GitHubClient::default());
        let generator: Arc<dyn PlanGenerator> = Arc::new(OpenAiGenerator::new(
            &config.openai_base_url,
            &config.openai_model,
        ));
        let provider: Option<Arc<dyn IdentityProvider>> = match (
            non_blank(config.github_client_id.clone()),
            non_blank(config.github_client_secret.clone()),
        ) {
            (Some(client_id), Some(client_secret)) => Some(Arc::new(GitHubOAuth::new(
                GitHubOAuthConfig {
                    client_id,
                    client_secret,
                    redirect_uri: non_blank(config.github_redirect_uri.clone()),
                    scope: config.github_scope.clone(),
                },
                Arc::clone(&tracker),
            ))),
            _ => None,
        };
        Self::new(config, generator, tracker, provider)
    }

    fn secure_cookies(&self) -> bool {
        self.config
            .github_redirect_uri
            .as_deref()
            .is_some_and(|uri| uri.starts_with("https://"))
    }

    /// Reuse the caller's session or start a new one. The second value is
    /// the `Set-Cookie` header to send when a session was created.
    fn ensure_session(&self, headers: &HeaderMap) -> (String, HeaderMap) {
        let mut out = HeaderMap::new();
        if let Some(id) = session_id(headers).filter(|id| self.oauth.sessions().exists(id)) {
            return (id, out);
        }
        let id = self.oauth.sessions().create();
        if let Some(cookie) = session_cookie(&id, self.secure_cookies()) {
            out.insert(header::SET_COOKIE, cookie);
        }
        (id, out)
    }

    fn session_credential(&self, headers: &HeaderMap) -> Option<(String, Credential)> {
        let id = session_id(headers)?;
        let credential = self.oauth.credential(&id)?;
        Some((id, credential))
    }
}

// ── Response types ────────────────────────────────────────────────────

/// A `BatchResult` with the summary fields the frontend renders.
#[derive(Debug, Serialize)]
pub struct IssuesReport {
    pub status: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub batch: BatchResult,
}

impl From<BatchResult> for IssuesReport {
    fn from(batch: BatchResult) -> Self {
        let status = match batch.overall_status {
            BatchStatus::FullSuccess => "success",
            BatchStatus::PartialSuccess => "partial_success",
            BatchStatus::TotalFailure => "error",
        };
        Self {
            status,
            message: batch.message(),
            batch,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GeneratePromptsResponse {
    pub project_plan: String,
    pub ai_prompts: String,
    pub tasks: Vec<TaskRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<IssuesReport>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    RateLimited(String),
    Internal(String),
}

impl ApiError {
    /// Log `detail` and answer with a generic message.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "request failed");
        ApiError::Internal("An unexpected error occurred. Please try again.".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::InvalidKey => ApiError::Unauthorized(err.user_message()),
            GenerateError::RateLimited => ApiError::RateLimited(err.user_message()),
            other => {
                error!(error = %other, "plan generation failed");
                ApiError::Internal(other.user_message())
            }
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Unauthorized(_) => {
                ApiError::Unauthorized("GitHub rejected the credential. Please sign in again.".into())
            }
            TrackerError::Forbidden { .. } | TrackerError::InsufficientScope { .. } => {
                ApiError::Forbidden(err.to_string())
            }
            TrackerError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            TrackerError::RateLimited(_) => ApiError::RateLimited(
                "GitHub API rate limit exceeded. Please try again later.".into(),
            ),
            TrackerError::Validation { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::internal(other),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/validate-key", post(validate_key))
        .route("/api/generate-prompts", post(generate_prompts))
        .route("/api/issues", post(create_issues))
        .route("/api/auth/login", get(auth_login))
        .route("/api/auth/callback", get(auth_callback))
        .route("/api/auth/status", get(auth_status))
        .route("/api/auth/logout", post(auth_logout))
        .route("/api/github/connect", post(github_connect))
        .route("/api/repos", get(list_repositories))
        .route("/api/repos/{owner}/{repo}/issues", get(list_repository_issues))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Where the browser goes after a failed login.
pub fn login_failed_url(frontend_url: &str, code: &str) -> String {
    let base = frontend_url.trim_end_matches('/');
    format!("{}/login-failed?error={}", base, code)
}

/// Run extraction, alignment and issue creation for one request.
///
/// An explicit `github_token` takes precedence over the session credential.
/// A session credential the tracker rejects is revoked.
async fn run_issue_pipeline(
    state: &AppState,
    headers: &HeaderMap,
    tasks: Vec<TaskRecord>,
    prompts: &str,
    repository: Option<String>,
    github_token: Option<String>,
) -> BatchResult {
    let repository = non_blank(repository).unwrap_or_default();
    let assignment = state.aligner.align(prompts, &tasks);

    let (credential, session) = match non_blank(github_token) {
        Some(token) => match state.oauth.verify_token(&token).await {
            Ok(credential) => (Some(credential), None),
            Err(e) => {
                warn!(error = %e, "supplied GitHub token could not be verified");
                return BatchResult::precondition_failed(
                    repository,
                    &tasks,
                    FailureReason::BadCredential,
                );
            }
        },
        None => match state.session_credential(headers) {
            Some((id, credential)) => (Some(credential), Some(id)),
            None => (None, None),
        },
    };

    let batch = state
        .materializer
        .materialize(&tasks, &assignment, credential.as_ref(), &repository)
        .await;

    if batch.credential_rejected()
        && let Some(id) = session
    {
        state.oauth.revoke(&id);
    }
    batch
}

fn precondition_status(reason: &FailureReason) -> StatusCode {
    match reason {
        FailureReason::InputMissing { .. } | FailureReason::InvalidRepository { .. } => {
            StatusCode::BAD_REQUEST
        }
        FailureReason::BadCredential => StatusCode::UNAUTHORIZED,
        FailureReason::NotFound { .. } => StatusCode::NOT_FOUND,
        FailureReason::Forbidden { .. }
        | FailureReason::IssuesDisabled { .. }
        | FailureReason::ScopeFailure { .. } => StatusCode::FORBIDDEN,
        FailureReason::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        FailureReason::Aborted | FailureReason::CreateFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "ok", "message": "API is running"}))
}

async fn validate_key(
    State(state): State<SharedState>,
    JsonOrForm(req): JsonOrForm<ValidateKeyRequest>,
) -> Response {
    let Some(api_key) = non_blank(req.api_key) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"valid": false, "message": "API key is required"})),
        )
            .into_response();
    };

    match state.generator.validate_key(&api_key).await {
        Ok(()) => Json(json!({"valid": true, "message": "API key is valid"})).into_response(),
        Err(e) => {
            warn!(error = %e, "API key validation failed");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"valid": false, "message": e.user_message()})),
            )
                .into_response()
        }
    }
}

async fn generate_prompts(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonOrForm(req): JsonOrForm<GeneratePromptsRequest>,
) -> Result<Json<GeneratePromptsResponse>, ApiError> {
    let api_key = non_blank(req.api_key).or_else(|| non_blank(state.config.default_openai_api_key.clone()));
    let (Some(api_key), Some(requirements)) = (api_key, non_blank(req.project_requirements))
    else {
        return Err(ApiError::BadRequest(
            "OpenAI API key and project requirements are required".into(),
        ));
    };

    let project_plan = state.generator.generate_plan(&api_key, &requirements).await?;
    let ai_prompts = state.generator.generate_prompts(&api_key, &project_plan).await?;
    let tasks = state.extractor.extract(&project_plan);
    info!(tasks = tasks.len(), create_issues = req.create_issues, "generated plan and prompts");

    let issues = if req.create_issues {
        let batch = run_issue_pipeline(
            &state,
            &headers,
            tasks.clone(),
            &ai_prompts,
            req.repository,
            req.github_token,
        )
        .await;
        Some(IssuesReport::from(batch))
    } else {
        None
    };

    Ok(Json(GeneratePromptsResponse {
        project_plan,
        ai_prompts,
        tasks,
        issues,
    }))
}

async fn create_issues(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonOrForm(req): JsonOrForm<CreateIssuesRequest>,
) -> Result<Response, ApiError> {
    let tasks = match req.tasks {
        Some(tasks) if !tasks.is_empty() => tasks,
        _ => {
            let plan = non_blank(req.project_plan)
                .ok_or_else(|| ApiError::BadRequest("project_plan is required".into()))?;
            state.extractor.extract(&plan)
        }
    };
    if tasks.is_empty() {
        return Err(ApiError::BadRequest(
            "No tasks could be extracted from the project plan".into(),
        ));
    }

    let prompts = req.ai_prompts.unwrap_or_default();
    let batch = run_issue_pipeline(
        &state,
        &headers,
        tasks,
        &prompts,
        req.repository,
        req.github_token,
    )
    .await;

    let status = batch
        .precondition_failure
        .as_ref()
        .map(precondition_status)
        .unwrap_or(StatusCode::OK);
    Ok((status, Json(IssuesReport::from(batch))).into_response())
}

async fn auth_login(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (session, set_cookie) = state.ensure_session(&headers);
    let url = state.oauth.begin_login(&session).map_err(|e| match e {
        OAuthError::NotConfigured(_) => {
            ApiError::BadRequest("GitHub OAuth is not configured on this server".into())
        }
        other => ApiError::internal(other),
    })?;
    Ok((set_cookie, Redirect::to(&url)).into_response())
}

async fn auth_callback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let result = match session_id(&headers) {
        Some(session) => state.oauth.complete_login(&session, params).await,
        None => Err(OAuthError::StateMismatch),
    };
    match result {
        Ok(_) => Redirect::to(&state.config.frontend_url),
        Err(e) => {
            warn!(error = %e, code = e.redirect_code(), "GitHub login failed");
            Redirect::to(&login_failed_url(&state.config.frontend_url, e.redirect_code()))
        }
    }
}

async fn auth_status(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    let session = session_id(&headers);
    Json(state.oauth.status(session.as_deref()))
}

async fn auth_logout(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(session) = session_id(&headers) {
        state.oauth.logout(&session);
    }
    Json(json!({"status": "logged_out"}))
}

async fn github_connect(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonOrForm(req): JsonOrForm<ConnectTokenRequest>,
) -> Result<Response, ApiError> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("Token is required".into()));
    }
    let (session, set_cookie) = state.ensure_session(&headers);
    let credential = state
        .oauth
        .connect_token(&session, token)
        .await
        .map_err(|e| {
            warn!(error = %e, "GitHub token rejected");
            ApiError::BadRequest("Invalid token: could not authenticate with GitHub".into())
        })?;
    Ok((
        set_cookie,
        Json(json!({"status": "connected", "login": credential.login()})),
    )
        .into_response())
}

async fn list_repositories(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let (session, credential) = state
        .session_credential(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Not signed in to GitHub".into()))?;
    match state.repositories.list(&credential).await {
        Ok(listing) => Ok(Json(listing)),
        Err(e) => {
            if e.is_bad_credential() {
                state.oauth.revoke(&session);
            }
            Err(e.into())
        }
    }
}

async fn list_repository_issues(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, credential) = state
        .session_credential(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Not signed in to GitHub".into()))?;
    let owner_repo = format!("{}/{}", owner, repo);
    match state.tracker.list_issues(credential.token(), &owner_repo).await {
        Ok(issues) => Ok(Json(issues)),
        Err(e) => {
            if e.is_bad_credential() {
                state.oauth.revoke(&session);
            }
            Err(e.into())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

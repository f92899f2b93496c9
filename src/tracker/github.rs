use async_trait::async_trait;
use regex::Regex;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::{
    CreatedIssue, Identity, IssueTracker, NewIssue, Organization, RemoteRepository, TrackerIssue,
};
use crate::errors::TrackerError;

pub const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "issueforge";
const PER_PAGE: usize = 100;
const GITHUB_HOST: &str = "github.com";
const GITHUB_WWW_HOST: &str = "www.github.com";

static OWNER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,38})$").unwrap());

static REPO_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,100}$").unwrap());

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
    "ghr_",        // GitHub App refresh tokens
];

/// Validate that a string looks like a valid GitHub token based on its prefix.
///
/// This performs a format check only; it does not verify the token is active
/// or has appropriate scopes.
pub fn is_valid_github_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// Normalize a repository reference to `owner/repo`.
///
/// Accepts `owner/repo`, `github.com/owner/repo`,
/// `https://github.com/owner/repo[.git]`, token-embedded HTTPS URLs and
/// `git@github.com:owner/repo.git`. Any other host is rejected.
pub fn parse_owner_repo(input: &str) -> Option<String> {
    let input = input.trim().trim_end_matches('/');
    let input = input.strip_suffix(".git").unwrap_or(input);

    let path = if input.contains("://") {
        let url = Url::parse(input).ok()?;
        if !matches!(url.host_str(), Some(GITHUB_HOST) | Some(GITHUB_WWW_HOST)) {
            return None;
        }
        url.path().trim_matches('/').to_string()
    } else if let Some(rest) = input.strip_prefix("git@github.com:") {
        rest.to_string()
    } else if let Some(rest) = input
        .strip_prefix("github.com/")
        .or_else(|| input.strip_prefix("www.github.com/"))
    {
        rest.to_string()
    } else {
        input.to_string()
    };

    let path = path.strip_suffix(".git").unwrap_or(&path);
    match path.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] if OWNER_REGEX.is_match(owner) && is_repo_name(repo) => {
            Some(format!("{}/{}", owner, repo))
        }
        _ => None,
    }
}

fn is_repo_name(name: &str) -> bool {
    name != "." && name != ".." && REPO_NAME_REGEX.is_match(name)
}

/// The parts of an error response needed to classify it.
#[derive(Debug, Default)]
pub struct ErrorResponse {
    pub status: u16,
    pub ratelimit_remaining: Option<String>,
    pub oauth_scopes: Option<String>,
    pub accepted_oauth_scopes: Option<String>,
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn scope_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Map a failed GitHub response onto the tracker error taxonomy.
pub fn classify_error(resp: &ErrorResponse, resource: &str) -> TrackerError {
    let resource = resource.to_string();
    let message = resp.message.clone();

    let accepted = scope_list(resp.accepted_oauth_scopes.as_deref());
    let granted = scope_list(resp.oauth_scopes.as_deref());
    let scope_missing = resp.oauth_scopes.is_some()
        && !accepted.is_empty()
        && !accepted.iter().any(|s| granted.contains(s));
    let lower = message.to_lowercase();
    let mentions_scope = lower.contains("scope") || lower.contains("resource not accessible");

    match resp.status {
        401 => TrackerError::Unauthorized(message),
        429 => TrackerError::RateLimited(message),
        403 if resp.ratelimit_remaining.as_deref() == Some("0")
            || lower.contains("rate limit") =>
        {
            TrackerError::RateLimited(message)
        }
        403 | 404 if scope_missing => TrackerError::InsufficientScope { resource, message },
        403 if mentions_scope => TrackerError::InsufficientScope { resource, message },
        403 => TrackerError::Forbidden { resource, message },
        404 => TrackerError::NotFound { resource },
        422 => TrackerError::Validation { resource, message },
        status => TrackerError::Unexpected { status, message },
    }
}

/// GitHub REST client implementing `IssueTracker`.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new(GITHUB_API_URL)
    }
}

impl GitHubClient {
    pub fn new(api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authed(&self, req: RequestBuilder, token: &str) -> RequestBuilder {
        req.header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, req: RequestBuilder, resource: &str) -> Result<Response, TrackerError> {
        let resp = req
            .send()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(error_from_response(resp, resource).await)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        resource: &str,
    ) -> Result<T, TrackerError> {
        let req = self.authed(self.http.get(self.url(path)), token);
        self.send(req, resource)
            .await?
            .json::<T>()
            .await
            .map_err(|e| TrackerError::Transport(format!("Failed to parse {}: {}", resource, e)))
    }

    /// Follow `page=N` pagination until a short page is returned.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
        resource: &str,
    ) -> Result<Vec<T>, TrackerError> {
        let mut all = Vec::new();
        let mut page = 1u32;
        let per_page = PER_PAGE.to_string();

        loop {
            let page_str = page.to_string();
            let req = self
                .authed(self.http.get(self.url(path)), token)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            let batch: Vec<T> = self
                .send(req, resource)
                .await?
                .json()
                .await
                .map_err(|e| {
                    TrackerError::Transport(format!("Failed to parse {}: {}", resource, e))
                })?;

            let count = batch.len();
            all.extend(batch);
            if count < PER_PAGE {
                break; // Last page
            }
            page += 1;
        }

        debug!(resource, count = all.len(), pages = page, "fetched paginated listing");
        Ok(all)
    }
}

async fn error_from_response(resp: Response, resource: &str) -> TrackerError {
    let status = resp.status();
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let ratelimit_remaining = header("x-ratelimit-remaining");
    let oauth_scopes = header("x-oauth-scopes");
    let accepted_oauth_scopes = header("x-accepted-oauth-scopes");

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

    if status != StatusCode::NOT_FOUND {
        warn!(status = status.as_u16(), resource, %message, "GitHub request failed");
    }

    classify_error(
        &ErrorResponse {
            status: status.as_u16(),
            ratelimit_remaining,
            oauth_scopes,
            accepted_oauth_scopes,
            message,
        },
        resource,
    )
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn current_user(&self, token: &str) -> Result<Identity, TrackerError> {
        self.get_json(token, "/user", "authenticated user").await
    }

    async fn get_repository(
        &self,
        token: &str,
        owner_repo: &str,
    ) -> Result<RemoteRepository, TrackerError> {
        self.get_json(
            token,
            &format!("/repos/{}", owner_repo),
            &format!("repository {}", owner_repo),
        )
        .await
    }

    async fn create_issue(
        &self,
        token: &str,
        owner_repo: &str,
        issue: &NewIssue,
    ) -> Result<CreatedIssue, TrackerError> {
        let req = self
            .authed(
                self.http.post(self.url(&format!("/repos/{}/issues", owner_repo))),
                token,
            )
            .json(issue);
        self.send(req, &format!("repository {}", owner_repo))
            .await?
            .json::<CreatedIssue>()
            .await
            .map_err(|e| TrackerError::Transport(format!("Failed to parse created issue: {}", e)))
    }

    async fn list_issues(
        &self,
        token: &str,
        owner_repo: &str,
    ) -> Result<Vec<TrackerIssue>, TrackerError> {
        let issues: Vec<TrackerIssue> = self
            .get_paginated(
                token,
                &format!("/repos/{}/issues", owner_repo),
                &[("state", "open")],
                &format!("repository {}", owner_repo),
            )
            .await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .collect())
    }

    async fn list_user_repositories(
        &self,
        token: &str,
    ) -> Result<Vec<RemoteRepository>, TrackerError> {
        self.get_paginated(
            token,
            "/user/repos",
            &[
                ("affiliation", "owner,collaborator,organization_member"),
                ("sort", "updated"),
            ],
            "user repositories",
        )
        .await
    }

    async fn list_organizations(&self, token: &str) -> Result<Vec<Organization>, TrackerError> {
        self.get_paginated(token, "/user/orgs", &[], "user organizations")
            .await
    }

    async fn list_org_repositories(
        &self,
        token: &str,
        org: &str,
    ) -> Result<Vec<RemoteRepository>, TrackerError> {
        self.get_paginated(
            token,
            &format!("/orgs/{}/repos", org),
            &[("type", "all")],
            &format!("organization {}", org),
        )
        .await
    }
}

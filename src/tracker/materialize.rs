//! Issue creation for a batch of tasks.
//!
//! Preconditions (credential, repository, issues enabled, write access) are
//! checked once before any issue is created. After that each task is created
//! independently; a failure on one task does not stop the next, except for a
//! scope failure, which aborts the rest of the batch.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::github::parse_owner_repo;
use super::{IssueTracker, NewIssue};
use crate::errors::TrackerError;
use crate::oauth::Credential;
use crate::plan::{PromptAssignment, TaskRecord};

/// GitHub rejects titles longer than this.
const MAX_TITLE_CHARS: usize = 256;

pub const NO_PROMPT_PLACEHOLDER: &str = "No prompt available for this task.";
const NO_DESCRIPTION_PLACEHOLDER: &str = "No description provided.";

/// Why a task did not become an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    InputMissing { field: String },
    /// Not an `owner/repo` slug or a github.com repository URL.
    InvalidRepository { repository: String },
    BadCredential,
    NotFound { repository: String },
    Forbidden { repository: String },
    IssuesDisabled { repository: String },
    RateLimited { message: String },
    /// Token lacks the scope needed to create issues; the batch was aborted here.
    ScopeFailure { message: String },
    /// Not attempted because an earlier scope failure aborted the batch.
    Aborted,
    CreateFailed { message: String },
}

impl FailureReason {
    pub fn message(&self) -> String {
        match self {
            Self::InputMissing { field } => format!("{} is required", field),
            Self::InvalidRepository { repository } => format!(
                "'{}' is not a GitHub repository. Use owner/repo or a github.com URL.",
                repository
            ),
            Self::BadCredential => {
                "GitHub rejected the credential. Please sign in again.".to_string()
            }
            Self::NotFound { repository } => format!(
                "Repository {} not found or you don't have access to it",
                repository
            ),
            Self::Forbidden { repository } => format!(
                "You don't have write access to {}. Issue creation requires push access.",
                repository
            ),
            Self::IssuesDisabled { repository } => {
                format!("Issues are disabled for repository {}", repository)
            }
            Self::RateLimited { .. } => {
                "GitHub API rate limit exceeded. Please try again later.".to_string()
            }
            Self::ScopeFailure { .. } => "Token is missing the permissions needed to create \
                 issues. Please sign in again and grant the 'repo' scope."
                .to_string(),
            Self::Aborted => "Skipped after a permission failure".to_string(),
            Self::CreateFailed { message } => format!("Failed to create issue: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IssueResult {
    Created { url: String, number: i64 },
    Failed { reason: FailureReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
    pub title: String,
    pub assignee: String,
    pub result: IssueResult,
}

impl IssueOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self.result, IssueResult::Created { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    FullSuccess,
    PartialSuccess,
    TotalFailure,
}

impl BatchStatus {
    fn from_counts(created: usize, total: usize) -> Self {
        if total > 0 && created == total {
            Self::FullSuccess
        } else if created > 0 {
            Self::PartialSuccess
        } else {
            Self::TotalFailure
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub repository: String,
    pub created_count: usize,
    pub failed_count: usize,
    pub outcomes: Vec<IssueOutcome>,
    pub overall_status: BatchStatus,
    /// Set when a precondition failed and no issue was attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precondition_failure: Option<FailureReason>,
    /// Set when a scope failure stopped the batch early.
    pub aborted: bool,
}

impl BatchResult {
    fn from_outcomes(
        repository: String,
        outcomes: Vec<IssueOutcome>,
        precondition_failure: Option<FailureReason>,
        aborted: bool,
    ) -> Self {
        let created_count = outcomes.iter().filter(|o| o.is_created()).count();
        let failed_count = outcomes.len() - created_count;
        Self {
            overall_status: BatchStatus::from_counts(created_count, outcomes.len()),
            repository,
            created_count,
            failed_count,
            outcomes,
            precondition_failure,
            aborted,
        }
    }

    /// A batch in which no task was attempted; every task carries `reason`.
    pub fn precondition_failed(
        repository: impl Into<String>,
        tasks: &[TaskRecord],
        reason: FailureReason,
    ) -> Self {
        let outcomes = tasks
            .iter()
            .map(|task| IssueOutcome {
                title: task.title.clone(),
                assignee: task.assignee.clone(),
                result: IssueResult::Failed {
                    reason: reason.clone(),
                },
            })
            .collect();
        Self::from_outcomes(repository.into(), outcomes, Some(reason), false)
    }

    /// Human-readable summary for API responses.
    pub fn message(&self) -> String {
        if let Some(reason) = &self.precondition_failure {
            return reason.message();
        }
        match self.overall_status {
            BatchStatus::FullSuccess => format!(
                "Created {} issues in {}",
                self.created_count, self.repository
            ),
            BatchStatus::PartialSuccess if self.aborted => format!(
                "Created {} issues in {} before a permission failure stopped the batch; {} not created",
                self.created_count, self.repository, self.failed_count
            ),
            BatchStatus::PartialSuccess => format!(
                "Created {} issues in {}; {} failed",
                self.created_count, self.repository, self.failed_count
            ),
            BatchStatus::TotalFailure if self.outcomes.is_empty() => {
                "No tasks to create issues for".to_string()
            }
            BatchStatus::TotalFailure => self
                .outcomes
                .iter()
                .find_map(|o| match &o.result {
                    IssueResult::Failed { reason } if *reason != FailureReason::Aborted => {
                        Some(reason.message())
                    }
                    _ => None,
                })
                .unwrap_or_else(|| "No issues were created".to_string()),
        }
    }

    /// True when the credential was rejected and should be revoked.
    pub fn credential_rejected(&self) -> bool {
        self.precondition_failure == Some(FailureReason::BadCredential)
            || self.outcomes.iter().any(|o| {
                matches!(
                    &o.result,
                    IssueResult::Failed {
                        reason: FailureReason::BadCredential
                    }
                )
            })
    }
}

/// Render the issue body for a task.
pub fn render_issue_body(task: &TaskRecord, prompt: Option<&str>) -> String {
    let description = if task.description.trim().is_empty() {
        NO_DESCRIPTION_PLACEHOLDER
    } else {
        task.description.trim()
    };
    let prompt = prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(NO_PROMPT_PLACEHOLDER);

    format!(
        "## Description\n\n{}\n\n## Assignee\n\n{}\n\n## AI Prompt\n\n{}\n\n---\n\
         *This issue was generated automatically from a project plan.*\n",
        description, task.assignee, prompt
    )
}

fn issue_title(task: &TaskRecord) -> String {
    if task.title.chars().count() <= MAX_TITLE_CHARS {
        task.title.clone()
    } else {
        task.title.chars().take(MAX_TITLE_CHARS).collect()
    }
}

fn precondition_reason(err: &TrackerError, repository: &str) -> FailureReason {
    let repository = repository.to_string();
    match err {
        TrackerError::Unauthorized(_) => FailureReason::BadCredential,
        TrackerError::NotFound { .. } => FailureReason::NotFound { repository },
        TrackerError::Forbidden { .. } => FailureReason::Forbidden { repository },
        TrackerError::InsufficientScope { message, .. } => FailureReason::ScopeFailure {
            message: message.clone(),
        },
        TrackerError::RateLimited(message) => FailureReason::RateLimited {
            message: message.clone(),
        },
        other => FailureReason::CreateFailed {
            message: other.to_string(),
        },
    }
}

fn item_reason(err: TrackerError) -> FailureReason {
    match err {
        TrackerError::InsufficientScope { message, .. } => FailureReason::ScopeFailure { message },
        TrackerError::Unauthorized(_) => FailureReason::BadCredential,
        TrackerError::RateLimited(message) => FailureReason::RateLimited { message },
        other => FailureReason::CreateFailed {
            message: other.to_string(),
        },
    }
}

/// Creates one remote issue per task.
pub struct IssueMaterializer {
    tracker: Arc<dyn IssueTracker>,
}

impl IssueMaterializer {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }

    pub async fn materialize(
        &self,
        tasks: &[TaskRecord],
        prompts: &PromptAssignment,
        credential: Option<&Credential>,
        repository: &str,
    ) -> BatchResult {
        let repository = repository.trim();
        let parsed = parse_owner_repo(repository);
        let owner_repo = parsed.clone().unwrap_or_else(|| repository.to_string());

        if let Err(reason) = self
            .check_preconditions(credential, repository, parsed.as_deref())
            .await
        {
            warn!(repository = %owner_repo, reason = ?reason, "issue batch precondition failed");
            return BatchResult::precondition_failed(owner_repo, tasks, reason);
        }

        // Preconditions guarantee a credential.
        let token = credential.map(|c| c.token()).unwrap_or_default();
        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut aborted = false;

        for task in tasks {
            if aborted {
                outcomes.push(IssueOutcome {
                    title: task.title.clone(),
                    assignee: task.assignee.clone(),
                    result: IssueResult::Failed {
                        reason: FailureReason::Aborted,
                    },
                });
                continue;
            }

            let issue = NewIssue {
                title: issue_title(task),
                body: render_issue_body(task, prompts.get(&task.title)),
                labels: Vec::new(),
            };
            let result = match self.tracker.create_issue(token, &owner_repo, &issue).await {
                Ok(created) => {
                    info!(
                        repository = %owner_repo,
                        number = created.number,
                        title = %task.title,
                        "created issue"
                    );
                    IssueResult::Created {
                        url: created.html_url,
                        number: created.number,
                    }
                }
                Err(err) => {
                    warn!(repository = %owner_repo, title = %task.title, error = %err, "issue creation failed");
                    if err.is_scope_failure() {
                        aborted = true;
                    }
                    IssueResult::Failed {
                        reason: item_reason(err),
                    }
                }
            };
            outcomes.push(IssueOutcome {
                title: task.title.clone(),
                assignee: task.assignee.clone(),
                result,
            });
        }

        let batch = BatchResult::from_outcomes(owner_repo, outcomes, None, aborted);
        info!(
            repository = %batch.repository,
            created = batch.created_count,
            failed = batch.failed_count,
            status = ?batch.overall_status,
            "issue batch finished"
        );
        batch
    }

    async fn check_preconditions(
        &self,
        credential: Option<&Credential>,
        repository: &str,
        owner_repo: Option<&str>,
    ) -> Result<(), FailureReason> {
        let credential = credential.ok_or_else(|| FailureReason::InputMissing {
            field: "GitHub credential".to_string(),
        })?;
        if repository.is_empty() {
            return Err(FailureReason::InputMissing {
                field: "Repository".to_string(),
            });
        }
        let owner_repo = owner_repo.ok_or_else(|| FailureReason::InvalidRepository {
            repository: repository.to_string(),
        })?;

        let repo = self
            .tracker
            .get_repository(credential.token(), owner_repo)
            .await
            .map_err(|e| precondition_reason(&e, owner_repo))?;

        if !repo.has_issues {
            return Err(FailureReason::IssuesDisabled {
                repository: owner_repo.to_string(),
            });
        }
        if !repo.can_write() {
            return Err(FailureReason::Forbidden {
                repository: owner_repo.to_string(),
            });
        }
        Ok(())
    }
}

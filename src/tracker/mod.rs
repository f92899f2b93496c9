//! Remote issue tracker access.
//!
//! | Module        | Responsibility                                          |
//! |---------------|---------------------------------------------------------|
//! | `github`      | `GitHubClient`: REST implementation of `IssueTracker`  |
//! | `materialize` | `IssueMaterializer`: one issue per task, `BatchResult` |
//! | `repos`       | `RepositoryAccessFilter`: repos eligible for issues    |
//!
//! Every call takes the bearer token explicitly; the tracker holds no
//! credential of its own.

pub mod github;
pub mod materialize;
pub mod repos;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TrackerError;

pub use github::GitHubClient;
pub use materialize::{BatchResult, BatchStatus, FailureReason, IssueMaterializer, IssueOutcome};
pub use repos::{RepositoryAccessFilter, RepositoryDescriptor, RepositoryListing};

/// The authenticated account behind a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoPermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

/// A repository as reported by the tracker (subset of fields we care about).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub full_name: String,
    pub name: String,
    pub owner: RepoOwner,
    pub private: bool,
    pub html_url: String,
    #[serde(default = "default_true")]
    pub has_issues: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Only present when the request was authenticated.
    #[serde(default)]
    pub permissions: Option<RepoPermissions>,
}

fn default_true() -> bool {
    true
}

impl RemoteRepository {
    pub fn can_write(&self) -> bool {
        self.permissions
            .as_ref()
            .is_some_and(|p| p.push || p.admin)
    }

    pub fn is_owned_by(&self, login: &str) -> bool {
        self.owner.login.eq_ignore_ascii_case(login)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub login: String,
}

/// Payload for a new issue.
#[derive(Debug, Clone, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// Issue as returned by the create endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub number: i64,
    pub html_url: String,
    #[serde(default)]
    pub title: String,
}

/// An existing issue (subset of fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerIssue {
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub html_url: String,
    /// Pull requests also come through the issues endpoint; filter them out.
    #[serde(default, skip_serializing)]
    pub pull_request: Option<serde_json::Value>,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn current_user(&self, token: &str) -> Result<Identity, TrackerError>;

    async fn get_repository(
        &self,
        token: &str,
        owner_repo: &str,
    ) -> Result<RemoteRepository, TrackerError>;

    async fn create_issue(
        &self,
        token: &str,
        owner_repo: &str,
        issue: &NewIssue,
    ) -> Result<CreatedIssue, TrackerError>;

    /// Open issues only, pull requests excluded.
    async fn list_issues(
        &self,
        token: &str,
        owner_repo: &str,
    ) -> Result<Vec<TrackerIssue>, TrackerError>;

    async fn list_user_repositories(
        &self,
        token: &str,
    ) -> Result<Vec<RemoteRepository>, TrackerError>;

    async fn list_organizations(&self, token: &str) -> Result<Vec<Organization>, TrackerError>;

    async fn list_org_repositories(
        &self,
        token: &str,
        org: &str,
    ) -> Result<Vec<RemoteRepository>, TrackerError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory tracker used by unit tests across the crate.

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    pub fn repo(full_name: &str, has_issues: bool, push: bool) -> RemoteRepository {
        let (owner, name) = full_name.split_once('/').unwrap();
        RemoteRepository {
            full_name: full_name.to_string(),
            name: name.to_string(),
            owner: RepoOwner {
                login: owner.to_string(),
            },
            private: false,
            html_url: format!("https://github.com/{}", full_name),
            has_issues,
            description: None,
            permissions: Some(RepoPermissions {
                admin: false,
                push,
                pull: true,
            }),
        }
    }

    #[derive(Default)]
    pub struct FakeTracker {
        pub login: String,
        pub valid_tokens: HashSet<String>,
        pub repos: HashMap<String, RemoteRepository>,
        pub user_repos: Vec<RemoteRepository>,
        pub orgs: Vec<Organization>,
        pub org_repos: HashMap<String, Result<Vec<RemoteRepository>, u16>>,
        /// Titles whose creation fails with a generic error.
        pub fail_titles: HashSet<String>,
        /// Titles whose creation fails with a scope error.
        pub scope_fail_titles: HashSet<String>,
        /// Reject the token on issue creation even though reads succeed.
        pub reject_token_on_create: bool,
        pub created: Mutex<Vec<NewIssue>>,
    }

    impl FakeTracker {
        pub fn new(login: &str, token: &str) -> Self {
            Self {
                login: login.to_string(),
                valid_tokens: HashSet::from([token.to_string()]),
                ..Default::default()
            }
        }

        pub fn with_repo(mut self, repo: RemoteRepository) -> Self {
            self.repos.insert(repo.full_name.clone(), repo);
            self
        }

        pub fn created_titles(&self) -> Vec<String> {
            self.created
                .lock()
                .unwrap()
                .iter()
                .map(|i| i.title.clone())
                .collect()
        }

        fn check(&self, token: &str) -> Result<(), TrackerError> {
            if self.valid_tokens.contains(token) {
                Ok(())
            } else {
                Err(TrackerError::Unauthorized("Bad credentials".into()))
            }
        }
    }

    #[async_trait]
    impl IssueTracker for FakeTracker {
        async fn current_user(&self, token: &str) -> Result<Identity, TrackerError> {
            self.check(token)?;
            Ok(Identity {
                login: self.login.clone(),
                name: None,
                avatar_url: None,
            })
        }

        async fn get_repository(
            &self,
            token: &str,
            owner_repo: &str,
        ) -> Result<RemoteRepository, TrackerError> {
            self.check(token)?;
            self.repos
                .get(owner_repo)
                .cloned()
                .ok_or_else(|| TrackerError::NotFound {
                    resource: format!("repository {}", owner_repo),
                })
        }

        async fn create_issue(
            &self,
            token: &str,
            owner_repo: &str,
            issue: &NewIssue,
        ) -> Result<CreatedIssue, TrackerError> {
            self.check(token)?;
            if self.reject_token_on_create {
                return Err(TrackerError::Unauthorized("Bad credentials".into()));
            }
            if self.scope_fail_titles.contains(&issue.title) {
                return Err(TrackerError::InsufficientScope {
                    resource: owner_repo.to_string(),
                    message: "Resource not accessible by integration".into(),
                });
            }
            if self.fail_titles.contains(&issue.title) {
                return Err(TrackerError::Validation {
                    resource: owner_repo.to_string(),
                    message: "title is invalid".into(),
                });
            }
            let mut created = self.created.lock().unwrap();
            created.push(issue.clone());
            let number = created.len() as i64;
            Ok(CreatedIssue {
                number,
                html_url: format!("https://github.com/{}/issues/{}", owner_repo, number),
                title: issue.title.clone(),
            })
        }

        async fn list_issues(
            &self,
            token: &str,
            owner_repo: &str,
        ) -> Result<Vec<TrackerIssue>, TrackerError> {
            self.check(token)?;
            Ok(self
                .created
                .lock()
                .unwrap()
                .iter()
                .enumerate()
                .map(|(i, issue)| TrackerIssue {
                    number: i as i64 + 1,
                    title: issue.title.clone(),
                    body: Some(issue.body.clone()),
                    state: "open".into(),
                    html_url: format!("https://github.com/{}/issues/{}", owner_repo, i + 1),
                    pull_request: None,
                })
                .collect())
        }

        async fn list_user_repositories(
            &self,
            token: &str,
        ) -> Result<Vec<RemoteRepository>, TrackerError> {
            self.check(token)?;
            Ok(self.user_repos.clone())
        }

        async fn list_organizations(&self, token: &str) -> Result<Vec<Organization>, TrackerError> {
            self.check(token)?;
            Ok(self.orgs.clone())
        }

        async fn list_org_repositories(
            &self,
            token: &str,
            org: &str,
        ) -> Result<Vec<RemoteRepository>, TrackerError> {
            self.check(token)?;
            match self.org_repos.get(org) {
                Some(Ok(repos)) => Ok(repos.clone()),
                Some(Err(_)) => Err(TrackerError::Forbidden {
                    resource: format!("organization {}", org),
                    message: "Must have admin rights".into(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_write_access() {
        let mut repo = fake::repo("octo/app", true, true);
        assert!(repo.can_write());
        repo.permissions = Some(RepoPermissions {
            admin: true,
            push: false,
            pull: true,
        });
        assert!(repo.can_write());
        repo.permissions = None;
        assert!(!repo.can_write());
    }

    #[test]
    fn test_repository_deserialize_with_permissions() {
        let json = r#"{
            "full_name": "octo/app",
            "name": "app",
            "owner": {"login": "octo"},
            "private": true,
            "html_url": "https://github.com/octo/app",
            "has_issues": false,
            "description": null,
            "permissions": {"admin": false, "push": true, "pull": true}
        }"#;
        let repo: RemoteRepository = serde_json::from_str(json).unwrap();
        assert!(!repo.has_issues);
        assert!(repo.can_write());
        assert!(repo.is_owned_by("OCTO"));
    }

    #[test]
    fn test_new_issue_omits_empty_labels() {
        let issue = NewIssue {
            title: "t".into(),
            body: "b".into(),
            labels: vec![],
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert!(json.get("labels").is_none());
    }
}

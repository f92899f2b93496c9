use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{IssueTracker, RemoteRepository};
use crate::errors::TrackerError;
use crate::oauth::Credential;

/// Name fragments that mark a repository as a throwaway artifact.
const ARTIFACT_MARKERS: &[&str] = &["test", "example", "demo", "sample"];

/// A repository the identity can create issues in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryDescriptor {
    pub full_name: String,
    pub name: String,
    pub owner: String,
    pub is_owner: bool,
    pub has_issues: bool,
    pub private: bool,
    pub url: String,
}

impl RepositoryDescriptor {
    fn from_remote(repo: &RemoteRepository, login: &str) -> Self {
        Self {
            full_name: repo.full_name.clone(),
            name: repo.name.clone(),
            owner: repo.owner.login.clone(),
            is_owner: repo.is_owned_by(login),
            has_issues: repo.has_issues,
            private: repo.private,
            url: repo.html_url.clone(),
        }
    }

    fn looks_like_artifact(&self) -> bool {
        let name = self.name.to_lowercase();
        ARTIFACT_MARKERS.iter().any(|m| name.contains(m))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryListing {
    pub repositories: Vec<RepositoryDescriptor>,
    /// Writable repositories left out because issues are disabled.
    pub issues_disabled_count: usize,
}

/// Lists and ranks repositories eligible to receive issues.
pub struct RepositoryAccessFilter {
    tracker: Arc<dyn IssueTracker>,
}

impl RepositoryAccessFilter {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }

    pub async fn list(&self, credential: &Credential) -> Result<RepositoryListing, TrackerError> {
        let token = credential.token();
        let login = credential.login();

        let mut candidates = self.tracker.list_user_repositories(token).await?;

        // Organization listings are best-effort; the token may lack read:org.
        match self.tracker.list_organizations(token).await {
            Ok(orgs) => {
                for org in orgs {
                    match self.tracker.list_org_repositories(token, &org.login).await {
                        Ok(repos) => candidates.extend(repos),
                        Err(e) => {
                            warn!(org = %org.login, error = %e, "skipping organization repositories")
                        }
                    }
                }
            }
            Err(e) if e.is_bad_credential() => return Err(e),
            Err(e) => warn!(error = %e, "could not list organizations"),
        }

        let listing = filter_repositories(candidates, login);
        debug!(
            login,
            eligible = listing.repositories.len(),
            issues_disabled = listing.issues_disabled_count,
            "listed repositories"
        );
        Ok(listing)
    }
}

/// De-duplicate, filter to writable repositories, and rank.
pub fn filter_repositories(candidates: Vec<RemoteRepository>, login: &str) -> RepositoryListing {
    let mut seen = HashSet::new();
    let mut repositories = Vec::new();
    let mut issues_disabled_count = 0;

    for repo in candidates {
        if !seen.insert(repo.full_name.to_lowercase()) {
            continue;
        }
        if !repo.is_owned_by(login) && !repo.can_write() {
            continue;
        }
        if !repo.has_issues {
            issues_disabled_count += 1;
            continue;
        }
        repositories.push(RepositoryDescriptor::from_remote(&repo, login));
    }

    repositories.sort_by_cached_key(|r| {
        (
            !r.is_owner,
            r.looks_like_artifact(),
            r.full_name.to_lowercase(),
        )
    });

    RepositoryListing {
        repositories,
        issues_disabled_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Organization;
    use crate::tracker::fake::{FakeTracker, repo};

    fn names(listing: &RepositoryListing) -> Vec<&str> {
        listing
            .repositories
            .iter()
            .map(|r| r.full_name.as_str())
            .collect()
    }

    #[test]
    fn test_excludes_read_only_repositories() {
        let listing = filter_repositories(
            vec![repo("octo/app", true, true), repo("other/lib", true, false)],
            "octo",
        );
        assert_eq!(names(&listing), vec!["octo/app"]);
    }

    #[test]
    fn test_owner_without_permissions_block_is_kept() {
        let mut owned = repo("octo/app", true, false);
        owned.permissions = None;
        let listing = filter_repositories(vec![owned], "octo");
        assert_eq!(listing.repositories.len(), 1);
        assert!(listing.repositories[0].is_owner);
    }

    #[test]
    fn test_issues_disabled_counted_separately() {
        let listing = filter_repositories(
            vec![
                repo("octo/app", true, true),
                repo("octo/wiki", false, true),
                repo("other/locked", false, false),
            ],
            "octo",
        );
        assert_eq!(names(&listing), vec!["octo/app"]);
        assert_eq!(listing.issues_disabled_count, 1);
    }

    #[test]
    fn test_deduplicates_by_full_name() {
        let listing = filter_repositories(
            vec![repo("acme/api", true, true), repo("acme/api", true, true)],
            "octo",
        );
        assert_eq!(listing.repositories.len(), 1);
    }

    #[test]
    fn test_ranking() {
        let listing = filter_repositories(
            vec![
                repo("acme/zeta", true, true),
                repo("octo/test-sandbox", true, true),
                repo("acme/Alpha", true, true),
                repo("acme/demo-site", true, true),
                repo("octo/app", true, true),
            ],
            "octo",
        );
        assert_eq!(
            names(&listing),
            vec![
                "octo/app",
                "octo/test-sandbox",
                "acme/Alpha",
                "acme/zeta",
                "acme/demo-site",
            ]
        );
    }

    #[tokio::test]
    async fn test_list_merges_org_repositories() {
        let mut fake = FakeTracker::new("octo", "gho_ok");
        fake.user_repos = vec![repo("octo/app", true, true), repo("acme/api", true, true)];
        fake.orgs = vec![
            Organization {
                login: "acme".into(),
            },
            Organization {
                login: "locked".into(),
            },
        ];
        fake.org_repos.insert(
            "acme".into(),
            Ok(vec![repo("acme/api", true, true), repo("acme/web", true, true)]),
        );
        fake.org_repos.insert("locked".into(), Err(403));

        let filter = RepositoryAccessFilter::new(Arc::new(fake));
        let listing = filter
            .list(&Credential::new("gho_ok", "octo"))
            .await
            .unwrap();
        assert_eq!(names(&listing), vec!["octo/app", "acme/api", "acme/web"]);
    }

    #[tokio::test]
    async fn test_list_with_bad_credential() {
        let filter = RepositoryAccessFilter::new(Arc::new(FakeTracker::new("octo", "gho_ok")));
        let err = filter
            .list(&Credential::new("gho_wrong", "octo"))
            .await
            .unwrap_err();
        assert!(err.is_bad_credential());
    }
}

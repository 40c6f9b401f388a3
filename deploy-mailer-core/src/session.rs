//! State carried between front-end actions.
//!
//! The repository list is fetched lazily and cached; any delete invalidates it
//! and the next read refetches. Deletion selections must come from the cached
//! list so the user only ever deletes names the remote reported.

use tracing::{info, warn};

use crate::contract::RepositoryHost;
use crate::error::{CoreError, Result};

#[derive(Debug, Default)]
pub struct SessionState {
    repositories: Option<Vec<String>>,
    selected: Vec<String>,
}

/// Outcome of deleting one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub name: String,
    pub deleted: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached list, fetching it first if the cache is empty or stale.
    pub async fn repositories<H>(&mut self, host: &H) -> &[String]
    where
        H: RepositoryHost + ?Sized,
    {
        if self.repositories.is_none() {
            let names = host.list_repositories().await;
            info!(count = names.len(), "Repository list fetched");
            self.repositories = Some(names);
        }
        self.repositories.as_deref().unwrap_or_default()
    }

    pub fn cached_repositories(&self) -> Option<&[String]> {
        self.repositories.as_deref()
    }

    pub fn invalidate(&mut self) {
        self.repositories = None;
        self.selected.clear();
    }

    /// Replaces the selection. Every name must be in the cached list.
    pub fn select(&mut self, names: &[String]) -> Result<()> {
        let cached = self.repositories.as_deref().unwrap_or_default();
        if let Some(unknown) = names.iter().find(|n| !cached.contains(n)) {
            warn!(repo = %unknown, "Selected repository is not in the list");
            return Err(CoreError::Validation(format!(
                "Repository '{unknown}' is not in your repository list."
            )));
        }
        self.selected = names.to_vec();
        Ok(())
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Deletes every selected repository in order, then drops the cache.
    pub async fn delete_selected<H>(&mut self, host: &H) -> Vec<DeleteOutcome>
    where
        H: RepositoryHost + ?Sized,
    {
        let mut outcomes = Vec::with_capacity(self.selected.len());
        for name in &self.selected {
            let deleted = host.delete_repository(name).await;
            info!(repo = %name, deleted, "Repository delete attempted");
            outcomes.push(DeleteOutcome {
                name: name.clone(),
                deleted,
            });
        }
        self.invalidate();
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockRepositoryHost;
    use mockall::Sequence;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn list_is_fetched_once_and_cached() {
        let mut host = MockRepositoryHost::new();
        host.expect_list_repositories()
            .times(1)
            .returning(|| names(&["alpha", "beta"]));

        let mut session = SessionState::new();
        assert!(session.cached_repositories().is_none());
        assert_eq!(session.repositories(&host).await, ["alpha", "beta"]);
        assert_eq!(session.repositories(&host).await, ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn selection_must_be_subset_of_cache() {
        let mut host = MockRepositoryHost::new();
        host.expect_list_repositories()
            .returning(|| names(&["alpha", "beta"]));
        let mut session = SessionState::new();
        session.repositories(&host).await;

        let err = session.select(&names(&["alpha", "gamma"])).unwrap_err();
        assert!(err.is_validation());
        assert!(session.selected().is_empty());

        session.select(&names(&["beta"])).unwrap();
        assert_eq!(session.selected(), ["beta"]);
    }

    #[tokio::test]
    async fn delete_invalidates_and_next_read_refetches() {
        let mut seq = Sequence::new();
        let mut host = MockRepositoryHost::new();
        host.expect_list_repositories()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| names(&["alpha", "beta", "gamma"]));
        host.expect_delete_repository()
            .withf(|n| n == "alpha")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| true);
        host.expect_delete_repository()
            .withf(|n| n == "gamma")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| false);
        host.expect_list_repositories()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| names(&["beta", "gamma"]));

        let mut session = SessionState::new();
        session.repositories(&host).await;
        session.select(&names(&["alpha", "gamma"])).unwrap();

        let outcomes = session.delete_selected(&host).await;
        assert_eq!(
            outcomes,
            vec![
                DeleteOutcome { name: "alpha".into(), deleted: true },
                DeleteOutcome { name: "gamma".into(), deleted: false },
            ]
        );
        assert!(session.cached_repositories().is_none());
        assert!(session.selected().is_empty());
        assert_eq!(session.repositories(&host).await, ["beta", "gamma"]);
    }
}

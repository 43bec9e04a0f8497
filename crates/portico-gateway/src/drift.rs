//! Content drift: tracking the head of the bundle repository
//!
//! The repository's current head commit is recorded in status. Because the
//! workload template is annotated with the recorded commit, a new commit
//! rolls the gateway on the following pass.

use async_trait::async_trait;
use git2::{Cred, Direction, Remote, RemoteCallbacks};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use portico_common::Error;

/// Source of the latest content version
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Current version identifier of the content at `url`
    async fn latest_version(&self, url: &str) -> Result<String, Error>;
}

/// Reads the advertised `HEAD` of a git remote without cloning it
#[derive(Debug, Default, Clone, Copy)]
pub struct GitContentSource;

#[async_trait]
impl ContentSource for GitContentSource {
    async fn latest_version(&self, url: &str) -> Result<String, Error> {
        let owned = url.to_string();
        tokio::task::spawn_blocking(move || remote_head(&owned))
            .await
            .map_err(|e| Error::internal_with_context("git", format!("ls-remote task failed: {e}")))?
    }
}

fn remote_head(url: &str) -> Result<String, Error> {
    let git_err = |e: git2::Error| Error::external_source(url, e.message().to_string());

    let mut remote = Remote::create_detached(url).map_err(git_err)?;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, _username, _allowed| Cred::default());

    // dropping the connection disconnects
    let connection = remote
        .connect_auth(Direction::Fetch, Some(callbacks), None)
        .map_err(git_err)?;
    let head = connection
        .list()
        .map_err(git_err)?
        .iter()
        .find(|h| h.name() == "HEAD")
        .map(|h| h.oid().to_string());
    drop(connection);

    let head = head.ok_or_else(|| Error::external_source(url, "remote does not advertise HEAD"))?;
    debug!(url, head = %head, "read remote head");
    Ok(head)
}

/// The new version to record, if it differs from the recorded one
pub fn detect_drift(recorded: Option<&str>, latest: &str) -> Option<String> {
    (recorded != Some(latest)).then(|| latest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_commit_is_not_drift() {
        assert_eq!(detect_drift(Some("abc"), "abc"), None);
    }

    #[test]
    fn new_or_first_commit_is_drift() {
        assert_eq!(detect_drift(Some("abc"), "def").as_deref(), Some("def"));
        assert_eq!(detect_drift(None, "abc").as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn unreachable_remote_is_an_external_source_error() {
        let err = GitContentSource
            .latest_version("file:///nonexistent/portico/repo.git")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalSource { .. }));
        assert!(err.is_retryable());
    }
}

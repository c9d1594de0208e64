//! Command builders for repository operations.
//!
//! Builders accumulate options fluently and perform all I/O in a terminal
//! `execute`. Setters are idempotent; `execute(self)` consumes the builder,
//! so a command can run at most once — repeating a network side effect
//! requires constructing a new builder. Credentials are resolved at execute
//! time, so registrations made after a builder was created are honored.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::backend::{is_remote_url, Capability, CheckoutParams, CloneParams, FetchParams};
use crate::client::GitClient;
use crate::error::{GitError, Result};
use crate::refspec::RefSpec;

/// Treats a zero or unset timeout as "no deadline".
fn timeout_from_secs(seconds: Option<u64>) -> Option<Duration> {
    seconds.filter(|&s| s > 0).map(Duration::from_secs)
}

// ---------------------------------------------------------------------------
// InitCommand
// ---------------------------------------------------------------------------

/// Creates an empty repository.
#[must_use = "builders do nothing until execute() is called"]
pub struct InitCommand<'a> {
    client: &'a GitClient,
    workspace: Option<PathBuf>,
}

impl<'a> InitCommand<'a> {
    pub(crate) fn new(client: &'a GitClient) -> Self {
        Self {
            client,
            workspace: None,
        }
    }

    /// Directory to initialize; defaults to the client's working directory.
    pub fn workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace = Some(path.into());
        self
    }

    /// Creates the repository.
    ///
    /// Fails if the target exists, is non-empty, and is not already a
    /// repository.
    pub fn execute(self) -> Result<()> {
        let dir = self
            .workspace
            .unwrap_or_else(|| self.client.workdir().to_path_buf());

        if dir.exists() && !dir.join(".git").exists() {
            let occupied = std::fs::read_dir(&dir)?.next().is_some();
            if occupied {
                return Err(GitError::inconsistent(
                    "init",
                    dir.display().to_string(),
                    "directory is non-empty and not a repository",
                ));
            }
        }

        info!(dir = %dir.display(), "init repository");
        self.client.backend().init(&dir)
    }
}

// ---------------------------------------------------------------------------
// FetchCommand
// ---------------------------------------------------------------------------

/// Fetches refs from a remote into the working repository.
#[must_use = "builders do nothing until execute() is called"]
pub struct FetchCommand<'a> {
    client: &'a GitClient,
    remote: Option<String>,
    refspecs: Vec<RefSpec>,
    shallow: bool,
    prune: bool,
    timeout_secs: Option<u64>,
}

impl<'a> FetchCommand<'a> {
    pub(crate) fn new(client: &'a GitClient) -> Self {
        Self {
            client,
            remote: None,
            refspecs: Vec::new(),
            shallow: false,
            prune: false,
            timeout_secs: None,
        }
    }

    /// Remote URL and the refspecs to fetch from it.
    pub fn from(mut self, remote: impl Into<String>, refspecs: Vec<RefSpec>) -> Self {
        self.remote = Some(remote.into());
        self.refspecs = refspecs;
        self
    }

    /// Truncate history to depth 1.
    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    /// Remove remote-tracking refs with no corresponding remote ref.
    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Deadline in seconds; zero means no timeout.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = Some(seconds);
        self
    }

    /// Performs the fetch, resolving the applicable credential now.
    pub fn execute(self) -> Result<()> {
        let remote = self.remote.ok_or_else(|| {
            GitError::inconsistent("fetch", "remote", "no remote URL configured")
        })?;

        let timeout = timeout_from_secs(self.timeout_secs).or_else(|| {
            // Network-tuning default applies to network remotes only.
            if is_remote_url(&remote) {
                self.client.default_timeout()
            } else {
                None
            }
        });
        let params = FetchParams {
            shallow: self.shallow,
            prune: self.prune,
            timeout,
        };

        let credential = self.client.credential_for(&remote);
        info!(
            remote,
            refspecs = self.refspecs.len(),
            authenticated = credential.is_some(),
            "fetch"
        );
        self.client.backend().fetch(
            self.client.workdir(),
            &remote,
            &self.refspecs,
            credential.as_ref(),
            &params,
        )
    }
}

// ---------------------------------------------------------------------------
// CloneCommand
// ---------------------------------------------------------------------------

/// Clones a remote repository into the working directory.
#[must_use = "builders do nothing until execute() is called"]
pub struct CloneCommand<'a> {
    client: &'a GitClient,
    source: Option<String>,
    remote_name: String,
    reference: Option<String>,
    shallow: bool,
    prune: bool,
    timeout_secs: Option<u64>,
}

impl<'a> CloneCommand<'a> {
    pub(crate) fn new(client: &'a GitClient) -> Self {
        Self {
            client,
            source: None,
            remote_name: "origin".to_string(),
            reference: None,
            shallow: false,
            prune: false,
            timeout_secs: None,
        }
    }

    /// Source URL to clone from.
    pub fn url(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Name for the default remote (defaults to "origin").
    pub fn repository_name(mut self, name: impl Into<String>) -> Self {
        self.remote_name = name.into();
        self
    }

    /// Local reference repository to share objects with.
    ///
    /// Rejected at execute time with `NotSupportedByBackend` if the active
    /// backend cannot link reference repositories.
    pub fn reference(mut self, path: impl Into<String>) -> Self {
        self.reference = Some(path.into());
        self
    }

    /// Truncate history to depth 1.
    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    /// Configure the created remote to prune on future fetches.
    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Deadline in seconds; zero means no timeout.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = Some(seconds);
        self
    }

    /// Performs the clone and configures the default remote.
    pub fn execute(self) -> Result<()> {
        let source = self.source.ok_or_else(|| {
            GitError::inconsistent("clone", "source", "no source URL configured")
        })?;
        let backend = self.client.backend();

        // Reject unsupported options before any I/O; a partial clone must
        // never be left behind.
        if self.reference.is_some() && !backend.supports(Capability::ReferenceClone) {
            return Err(GitError::not_supported(
                "clone",
                backend.kind().as_str(),
                Capability::ReferenceClone.as_str(),
            ));
        }

        let timeout = timeout_from_secs(self.timeout_secs).or_else(|| {
            if is_remote_url(&source) {
                self.client.default_timeout()
            } else {
                None
            }
        });
        let params = CloneParams {
            remote_name: self.remote_name,
            reference_repository: self.reference,
            shallow: self.shallow,
            timeout,
        };

        let credential = self.client.credential_for(&source);
        info!(
            source,
            remote = %params.remote_name,
            authenticated = credential.is_some(),
            "clone"
        );
        backend.clone_repository(
            self.client.workdir(),
            &source,
            credential.as_ref(),
            &params,
        )?;

        if self.prune {
            backend.set_fetch_prune(self.client.workdir(), &params.remote_name)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CheckoutCommand
// ---------------------------------------------------------------------------

/// Checks out a commit or remote ref onto a local branch.
#[must_use = "builders do nothing until execute() is called"]
pub struct CheckoutCommand<'a> {
    client: &'a GitClient,
    branch: Option<String>,
    target: Option<String>,
    delete_branch_if_exists: bool,
}

impl<'a> CheckoutCommand<'a> {
    pub(crate) fn new(client: &'a GitClient) -> Self {
        Self {
            client,
            branch: None,
            target: None,
            delete_branch_if_exists: false,
        }
    }

    /// Local branch name to check out onto.
    pub fn branch(mut self, name: impl Into<String>) -> Self {
        self.branch = Some(name.into());
        self
    }

    /// Commit id or remote ref name to check out.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Delete and recreate the branch if it already exists with a different
    /// target; without this, such a checkout fails with
    /// `BranchAlreadyExists`.
    pub fn delete_branch_if_exists(mut self, delete: bool) -> Self {
        self.delete_branch_if_exists = delete;
        self
    }

    /// Performs the checkout and verifies the resulting branch state.
    pub fn execute(self) -> Result<()> {
        let branch = self.branch.ok_or_else(|| {
            GitError::inconsistent("checkout", "branch", "no branch name configured")
        })?;
        let target = self.target.ok_or_else(|| {
            GitError::inconsistent("checkout", &branch, "no target ref configured")
        })?;

        let params = CheckoutParams {
            delete_branch_if_exists: self.delete_branch_if_exists,
        };
        info!(branch, target, "checkout");
        let backend = self.client.backend();
        backend.checkout(self.client.workdir(), &target, &branch, &params)?;

        let current = backend.current_branch(self.client.workdir())?;
        if current.as_deref() != Some(branch.as_str()) {
            return Err(GitError::inconsistent(
                "checkout",
                &branch,
                format!("current branch is {current:?} after checkout"),
            ));
        }
        Ok(())
    }
}

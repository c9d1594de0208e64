//! The [`GitClient`] façade and its [`Git`] entry-point builder.
//!
//! A client owns one credential store, one working-directory handle, and
//! one transport backend. Command builders borrow the client and outlive
//! neither the store nor the backend; one logical operation per client is
//! expected to run to completion before the next is issued.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use git_client_credentials::{Credential, CredentialStore};

use crate::backend::{Backend, BackendKind, EmbeddedBackend, NativeBackend};
use crate::commands::{CheckoutCommand, CloneCommand, FetchCommand, InitCommand};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::oid::ObjectId;
use crate::repository::WorkingRepository;

// ---------------------------------------------------------------------------
// Entry-point builder
// ---------------------------------------------------------------------------

/// Configures and constructs a [`GitClient`].
///
/// ```no_run
/// use git_client::{BackendKind, Git};
///
/// let client = Git::in_dir("/tmp/checkout").using(BackendKind::Embedded).client();
/// ```
#[must_use]
pub struct Git {
    workdir: PathBuf,
    kind: BackendKind,
    git_binary: Option<String>,
    default_timeout_secs: u64,
}

impl Git {
    /// Starts building a client rooted at the given working directory.
    pub fn in_dir(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            kind: BackendKind::Native,
            git_binary: None,
            default_timeout_secs: 0,
        }
    }

    /// Selects the transport backend.
    pub fn using(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Applies backend, binary, and timeout settings from a config file.
    pub fn with_config(mut self, config: &ClientConfig) -> Self {
        self.kind = config.backend;
        self.git_binary = config.git_binary.clone();
        self.default_timeout_secs = config.default_timeout_secs;
        self
    }

    /// Builds the client.
    pub fn client(self) -> GitClient {
        let backend: Box<dyn Backend> = match self.kind {
            BackendKind::Native => match self.git_binary {
                Some(binary) => Box::new(NativeBackend::with_binary(binary)),
                None => Box::new(NativeBackend::new()),
            },
            BackendKind::Embedded => Box::new(EmbeddedBackend::new()),
        };
        GitClient {
            workdir: self.workdir,
            backend,
            store: RwLock::new(CredentialStore::new()),
            default_timeout: (self.default_timeout_secs > 0)
                .then(|| Duration::from_secs(self.default_timeout_secs)),
        }
    }
}

// ---------------------------------------------------------------------------
// GitClient
// ---------------------------------------------------------------------------

/// Uniform command API over one working repository and one transport
/// backend.
pub struct GitClient {
    workdir: PathBuf,
    backend: Box<dyn Backend>,
    store: RwLock<CredentialStore>,
    default_timeout: Option<Duration>,
}

impl GitClient {
    // -- Credentials ---------------------------------------------------------

    /// Registers a credential usable only for the given remote URL.
    pub fn add_credentials(&self, url: impl Into<String>, credential: Credential) {
        self.store_mut().add_for_url(url, credential);
    }

    /// Registers a credential with no URL scope.
    pub fn add_default_credentials(&self, credential: Credential) {
        self.store_mut().add_default(credential);
    }

    /// Removes all registered credentials.
    pub fn clear_credentials(&self) {
        self.store_mut().clear();
    }

    /// Resolves the credential applicable to `url`, cloned out of the store
    /// so no lock is held across a network operation.
    pub(crate) fn credential_for(&self, url: &str) -> Option<Credential> {
        self.store
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .resolve(url)
            .cloned()
    }

    fn store_mut(&self) -> std::sync::RwLockWriteGuard<'_, CredentialStore> {
        self.store
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- Command builders ----------------------------------------------------

    /// Returns a builder that creates an empty repository.
    pub fn init_(&self) -> InitCommand<'_> {
        InitCommand::new(self)
    }

    /// Returns a builder that fetches refs from a remote.
    pub fn fetch_(&self) -> FetchCommand<'_> {
        FetchCommand::new(self)
    }

    /// Returns a builder that clones a remote repository.
    pub fn clone_(&self) -> CloneCommand<'_> {
        CloneCommand::new(self)
    }

    /// Returns a builder that checks out a commit onto a local branch.
    pub fn checkout(&self) -> CheckoutCommand<'_> {
        CheckoutCommand::new(self)
    }

    // -- Repository queries --------------------------------------------------

    /// Resolves the object id `branch` points to on `remote_url`, using the
    /// credential applicable to that URL. The ref need not exist locally.
    pub fn head_rev(&self, remote_url: &str, branch: &str) -> Result<ObjectId> {
        let credential = self.credential_for(remote_url);
        self.backend
            .resolve_head_revision(remote_url, branch, credential.as_ref())
    }

    /// Whether the given commit exists in the local object database.
    pub fn is_commit_in_repo(&self, oid: &ObjectId) -> Result<bool> {
        self.backend.is_commit_present(&self.workdir, oid)
    }

    /// Sets (or creates) the URL of the named remote.
    pub fn set_remote_url(&self, name: &str, url: &str) -> Result<()> {
        self.backend.set_remote_url(&self.workdir, name, url)
    }

    /// Read-only view of the working repository's branch and ref state.
    pub fn repository(&self) -> WorkingRepository<'_> {
        WorkingRepository::new(self)
    }

    // -- Accessors -----------------------------------------------------------

    /// The working directory this client operates on.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Which transport backend this client uses.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub(crate) fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }
}

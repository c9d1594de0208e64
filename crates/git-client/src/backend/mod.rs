//! Transport backend abstraction.
//!
//! Consumers depend on the [`Backend`] trait rather than on a concrete
//! transport so that the native-process and embedded-library drivers can be
//! substituted for one another. Callers that need an optional capability
//! (reference-repository clone sharing, hard timeout enforcement) branch on
//! [`Backend::supports`], never on the backend kind.
//!
//! Both drivers must produce observably equivalent end states for the
//! operations they both support: same HEAD, same branch, same file presence.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use git_client_credentials::Credential;

use crate::error::Result;
use crate::oid::ObjectId;
use crate::refspec::RefSpec;

pub mod embedded;
pub mod native;

pub use embedded::EmbeddedBackend;
pub use native::NativeBackend;

// ---------------------------------------------------------------------------
// Kinds and capabilities
// ---------------------------------------------------------------------------

/// Which concrete transport driver a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Shells out to the `git` binary.
    Native,
    /// In-process transport and object database (libgit2).
    Embedded,
}

impl BackendKind {
    /// The name used in error messages and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Embedded => "embedded",
        }
    }
}

/// Optional capabilities a backend may or may not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Linking a local reference repository during clone to share objects.
    ReferenceClone,
    /// History truncation to depth 1 on fetch/clone.
    ShallowFetch,
    /// Hard timeout enforcement (terminating the underlying operation);
    /// without it, timeouts are best-effort deadlines.
    ProcessTimeout,
}

impl Capability {
    /// The name used in `NotSupportedByBackend` errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReferenceClone => "reference repository clone sharing",
            Self::ShallowFetch => "shallow fetch",
            Self::ProcessTimeout => "process-level timeout enforcement",
        }
    }
}

// ---------------------------------------------------------------------------
// Operation parameters
// ---------------------------------------------------------------------------

/// Options for a fetch operation, assembled by `FetchCommand`.
#[derive(Debug, Clone, Default)]
pub struct FetchParams {
    /// History truncated to depth 1 when set.
    pub shallow: bool,
    /// Remove remote-tracking refs with no corresponding remote ref.
    pub prune: bool,
    /// Per-operation deadline; `None` means no timeout.
    pub timeout: Option<Duration>,
}

/// Options for a clone operation, assembled by `CloneCommand`.
#[derive(Debug, Clone)]
pub struct CloneParams {
    /// Name for the default remote (usually "origin").
    pub remote_name: String,
    /// Local object store to share objects with, if supported.
    pub reference_repository: Option<String>,
    /// History truncated to depth 1 when set.
    pub shallow: bool,
    /// Per-operation deadline; `None` means no timeout.
    pub timeout: Option<Duration>,
}

/// Options for a checkout operation, assembled by `CheckoutCommand`.
#[derive(Debug, Clone, Default)]
pub struct CheckoutParams {
    /// Delete and recreate the branch if it already exists.
    pub delete_branch_if_exists: bool,
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// A polymorphic transport driver.
///
/// The working directory is passed per call; backends hold no repository
/// state of their own beyond driver configuration.
pub trait Backend: Send + Sync {
    /// Which driver this is. Used for error messages, never for dispatch.
    fn kind(&self) -> BackendKind;

    /// Whether this driver provides the given optional capability.
    fn supports(&self, capability: Capability) -> bool;

    /// Creates an empty repository at `workdir`.
    fn init(&self, workdir: &Path) -> Result<()>;

    /// Fetches `refspecs` from `remote` into the repository at `workdir`.
    fn fetch(
        &self,
        workdir: &Path,
        remote: &str,
        refspecs: &[RefSpec],
        credential: Option<&Credential>,
        params: &FetchParams,
    ) -> Result<()>;

    /// Clones `source` into `workdir` and configures the default remote.
    fn clone_repository(
        &self,
        workdir: &Path,
        source: &str,
        credential: Option<&Credential>,
        params: &CloneParams,
    ) -> Result<()>;

    /// Checks out `target` (commit id or remote ref name) onto a local
    /// branch named `branch`.
    fn checkout(
        &self,
        workdir: &Path,
        target: &str,
        branch: &str,
        params: &CheckoutParams,
    ) -> Result<()>;

    /// Resolves the object id a named branch points to on a remote, without
    /// requiring the ref to exist locally.
    fn resolve_head_revision(
        &self,
        remote_url: &str,
        branch: &str,
        credential: Option<&Credential>,
    ) -> Result<ObjectId>;

    /// Whether the given commit exists in the local object database.
    fn is_commit_present(&self, workdir: &Path, oid: &ObjectId) -> Result<bool>;

    /// The currently checked-out branch, or `None` on a detached or unborn
    /// HEAD.
    fn current_branch(&self, workdir: &Path) -> Result<Option<String>>;

    /// The object id HEAD points to, or `None` before the first commit.
    fn head_object_id(&self, workdir: &Path) -> Result<Option<ObjectId>>;

    /// The object id a local ref points to, or `None` if the ref is absent.
    fn ref_object_id(&self, workdir: &Path, refname: &str) -> Result<Option<ObjectId>>;

    /// Sets (or creates) the URL of the named remote.
    fn set_remote_url(&self, workdir: &Path, name: &str, url: &str) -> Result<()>;

    /// Configures the named remote to prune stale remote-tracking refs on
    /// future fetches.
    fn set_fetch_prune(&self, workdir: &Path, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Remote URL classification
// ---------------------------------------------------------------------------

/// URL schemes treated as network remotes; everything else (bare paths,
/// `file:`, relative paths) is local and exempt from shallow/prune/timeout
/// network-tuning defaults.
const REMOTE_SCHEMES: [&str; 6] = ["ftp:", "git:", "http:", "https:", "rsync:", "ssh:"];

/// Returns `true` if the URL names a network remote.
pub fn is_remote_url(url: &str) -> bool {
    REMOTE_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

/// Returns `true` for remotes reached over SSH, which always require a key:
/// explicit `ssh://` URLs and scp-like `user@host:path` shorthand.
pub fn is_ssh_remote(url: &str) -> bool {
    if url.starts_with("ssh:") {
        return true;
    }
    // scp-like syntax: an '@' and a ':' before any '/', and not a scheme URL.
    if url.contains("://") {
        return false;
    }
    match (url.find('@'), url.find(':')) {
        (Some(at), Some(colon)) => {
            at < colon && url.find('/').is_none_or(|slash| colon < slash)
        }
        _ => false,
    }
}

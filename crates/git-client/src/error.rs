//! Git client error types.
//!
//! Every failure names the operation that was running and the URL or ref it
//! was running against, so callers never have to guess which remote or
//! branch an error refers to.

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during git client operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// No credential resolves for the target URL and the active backend
    /// requires one.
    #[error("{operation}: no credential available for {url}")]
    AuthenticationUnavailable {
        /// The operation that needed a credential (e.g. "fetch").
        operation: String,
        /// The remote URL that requires authentication.
        url: String,
    },

    /// The remote refused the supplied credential.
    #[error("{operation}: authentication rejected by {url}: {reason}")]
    AuthenticationRejected {
        /// The operation that presented the credential.
        operation: String,
        /// The remote URL that refused it.
        url: String,
        /// The rejection detail reported by the transport.
        reason: String,
    },

    /// A transport-level failure (connection refused, DNS, broken pipe, ...).
    #[error("{operation}: network failure against {url}: {reason}")]
    NetworkFailure {
        /// The operation in flight when the transport failed.
        operation: String,
        /// The remote URL being contacted.
        url: String,
        /// The underlying transport error.
        reason: String,
    },

    /// The operation exceeded its configured deadline.
    #[error("{operation}: timed out after {seconds}s against {url}")]
    Timeout {
        /// The operation that was terminated.
        operation: String,
        /// The remote URL being contacted.
        url: String,
        /// The configured deadline in seconds.
        seconds: u64,
    },

    /// A refspec string could not be parsed.
    #[error("malformed refspec '{refspec}': {reason}")]
    MalformedRefSpec {
        /// The offending input.
        refspec: String,
        /// Why it does not parse.
        reason: String,
    },

    /// A capability was requested that the active backend cannot perform.
    #[error("{operation}: not supported by the {backend} backend: {capability}")]
    NotSupportedByBackend {
        /// The operation that requested the capability.
        operation: String,
        /// The backend that lacks it ("native" or "embedded").
        backend: String,
        /// The missing capability.
        capability: String,
    },

    /// A local branch of the requested name already exists with a different
    /// target and deletion was not requested.
    #[error("checkout: branch '{branch}' already exists")]
    BranchAlreadyExists {
        /// The branch that could not be created.
        branch: String,
    },

    /// A post-condition check on repository state failed.
    #[error("{operation}: repository state inconsistent for {subject}: {reason}")]
    RepositoryStateInconsistent {
        /// The operation whose post-condition failed.
        operation: String,
        /// The ref, branch, or object id that was checked.
        subject: String,
        /// What was expected versus observed.
        reason: String,
    },

    /// A malformed object id was supplied or returned by a backend.
    #[error("invalid object id '{0}'")]
    InvalidObjectId(String),

    /// An I/O failure: the git binary could not be spawned, or a local
    /// file/directory operation failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The git command exited with a non-zero status.
    #[error("git {operation} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        /// The subcommand that failed.
        operation: String,
        /// The exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// The content of stderr.
        stderr: String,
    },
}

/// A specialized `Result` type for git client operations.
pub type Result<T> = std::result::Result<T, GitError>;

impl GitError {
    // -- Constructors --------------------------------------------------------

    /// Creates an [`GitError::AuthenticationUnavailable`] for an operation
    /// and URL.
    pub fn auth_unavailable(operation: impl Into<String>, url: impl Into<String>) -> Self {
        Self::AuthenticationUnavailable {
            operation: operation.into(),
            url: url.into(),
        }
    }

    /// Creates a [`GitError::NetworkFailure`] with the given detail.
    pub fn network(
        operation: impl Into<String>,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::NetworkFailure {
            operation: operation.into(),
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`GitError::NotSupportedByBackend`].
    pub fn not_supported(
        operation: impl Into<String>,
        backend: impl Into<String>,
        capability: impl Into<String>,
    ) -> Self {
        Self::NotSupportedByBackend {
            operation: operation.into(),
            backend: backend.into(),
            capability: capability.into(),
        }
    }

    /// Creates a [`GitError::RepositoryStateInconsistent`].
    pub fn inconsistent(
        operation: impl Into<String>,
        subject: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RepositoryStateInconsistent {
            operation: operation.into(),
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is an authentication error of either kind.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationUnavailable { .. } | Self::AuthenticationRejected { .. }
        )
    }

    /// Returns `true` if this is a [`GitError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

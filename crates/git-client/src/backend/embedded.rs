//! Embedded transport driver: in-process transport and object database via
//! libgit2.
//!
//! Differences from the native driver, per its declared capabilities: no
//! reference-repository clone sharing, and timeouts are best-effort
//! deadlines checked from the transfer-progress callback rather than hard
//! process kills. For SSH remotes a missing credential is surfaced as
//! `AuthenticationUnavailable` before any network I/O; there is no silent
//! anonymous fallback.

use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, Instant};

use git2::{BranchType, ErrorCode, FetchPrune, Repository};
use tracing::debug;

use git_client_credentials::Credential;

use crate::backend::{
    is_ssh_remote, Backend, BackendKind, Capability, CheckoutParams, CloneParams, FetchParams,
};
use crate::error::{GitError, Result};
use crate::oid::ObjectId;
use crate::refspec::RefSpec;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Transport driver backed by libgit2.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedBackend;

impl EmbeddedBackend {
    /// Creates the in-process driver.
    pub fn new() -> Self {
        Self
    }
}

/// Owned copy of the credential fields the auth callback needs.
#[derive(Clone)]
struct AuthMaterial {
    username: String,
    key: String,
    passphrase: Option<String>,
}

impl AuthMaterial {
    fn from_credential(credential: &Credential) -> Self {
        Self {
            username: credential.username().to_string(),
            key: String::from_utf8_lossy(credential.private_key()).into_owned(),
            passphrase: credential.passphrase().map(str::to_string),
        }
    }
}

/// Tracks whether the transfer-progress callback cancelled on deadline, so
/// the resulting libgit2 error can be reported as a timeout.
struct Deadline {
    at: Option<Instant>,
    seconds: u64,
    hit: Cell<bool>,
}

impl Deadline {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|limit| Instant::now() + limit),
            seconds: timeout.map(|limit| limit.as_secs()).unwrap_or(0),
            hit: Cell::new(false),
        }
    }

    fn expired(&self) -> bool {
        match self.at {
            Some(at) if Instant::now() >= at => {
                self.hit.set(true);
                true
            }
            _ => false,
        }
    }
}

fn remote_callbacks<'cb>(
    auth: Option<AuthMaterial>,
    deadline: &'cb Deadline,
) -> git2::RemoteCallbacks<'cb> {
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, _allowed| match &auth {
        Some(auth) => {
            let username = username_from_url.unwrap_or(&auth.username);
            git2::Cred::ssh_key_from_memory(
                username,
                None,
                &auth.key,
                auth.passphrase.as_deref(),
            )
        }
        None => git2::Cred::default(),
    });
    callbacks.transfer_progress(move |_progress| !deadline.expired());
    callbacks
}

/// Refuses to contact an SSH remote without a key.
fn require_ssh_credential(
    operation: &str,
    url: &str,
    credential: Option<&Credential>,
) -> Result<()> {
    if is_ssh_remote(url) && credential.is_none() {
        return Err(GitError::auth_unavailable(operation, url));
    }
    Ok(())
}

/// Maps a libgit2 error into the caller-facing error kind.
fn map_git2_error(
    operation: &str,
    url: &str,
    deadline: &Deadline,
    err: git2::Error,
) -> GitError {
    if deadline.hit.get() {
        return GitError::Timeout {
            operation: operation.to_string(),
            url: url.to_string(),
            seconds: deadline.seconds,
        };
    }
    match (err.class(), err.code()) {
        (_, ErrorCode::Auth) | (git2::ErrorClass::Ssh, _) => GitError::AuthenticationRejected {
            operation: operation.to_string(),
            url: url.to_string(),
            reason: err.message().to_string(),
        },
        (git2::ErrorClass::Net | git2::ErrorClass::Http, _) => GitError::NetworkFailure {
            operation: operation.to_string(),
            url: url.to_string(),
            reason: err.message().to_string(),
        },
        _ => GitError::network(operation, url, err.message()),
    }
}

fn open_repository(operation: &str, workdir: &Path) -> Result<Repository> {
    Repository::open(workdir).map_err(|err| {
        GitError::inconsistent(operation, workdir.display().to_string(), err.message())
    })
}

// ---------------------------------------------------------------------------
// Backend impl
// ---------------------------------------------------------------------------

impl Backend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::ReferenceClone => false,
            Capability::ShallowFetch => true,
            Capability::ProcessTimeout => false,
        }
    }

    fn init(&self, workdir: &Path) -> Result<()> {
        Repository::init(workdir).map_err(|err| {
            GitError::inconsistent("init", workdir.display().to_string(), err.message())
        })?;
        Ok(())
    }

    fn fetch(
        &self,
        workdir: &Path,
        remote: &str,
        refspecs: &[RefSpec],
        credential: Option<&Credential>,
        params: &FetchParams,
    ) -> Result<()> {
        require_ssh_credential("fetch", remote, credential)?;
        let repo = open_repository("fetch", workdir)?;
        let deadline = Deadline::new(params.timeout);

        let mut options = git2::FetchOptions::new();
        options.remote_callbacks(remote_callbacks(
            credential.map(AuthMaterial::from_credential),
            &deadline,
        ));
        if params.prune {
            options.prune(FetchPrune::On);
        }
        if params.shallow {
            options.depth(1);
        }

        debug!(remote, refspecs = refspecs.len(), "embedded fetch");
        let specs: Vec<String> = refspecs.iter().map(|spec| spec.to_string()).collect();
        let spec_refs: Vec<&str> = specs.iter().map(String::as_str).collect();
        let mut anonymous = repo
            .remote_anonymous(remote)
            .map_err(|err| map_git2_error("fetch", remote, &deadline, err))?;
        anonymous
            .fetch(&spec_refs, Some(&mut options), None)
            .map_err(|err| map_git2_error("fetch", remote, &deadline, err))?;
        Ok(())
    }

    fn clone_repository(
        &self,
        workdir: &Path,
        source: &str,
        credential: Option<&Credential>,
        params: &CloneParams,
    ) -> Result<()> {
        if params.reference_repository.is_some() {
            return Err(GitError::not_supported(
                "clone",
                self.kind().as_str(),
                Capability::ReferenceClone.as_str(),
            ));
        }
        require_ssh_credential("clone", source, credential)?;
        let deadline = Deadline::new(params.timeout);

        let mut options = git2::FetchOptions::new();
        options.remote_callbacks(remote_callbacks(
            credential.map(AuthMaterial::from_credential),
            &deadline,
        ));
        if params.shallow {
            options.depth(1);
        }

        debug!(source, remote = %params.remote_name, "embedded clone");
        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(options);
        let repo = match builder.clone(source, workdir) {
            Ok(repo) => repo,
            Err(err) => {
                // Restore the pre-operation (empty) directory on a cancelled
                // or failed transfer.
                if workdir.exists() {
                    let _ = std::fs::remove_dir_all(workdir);
                    let _ = std::fs::create_dir_all(workdir);
                }
                return Err(map_git2_error("clone", source, &deadline, err));
            }
        };

        if params.remote_name != "origin" {
            repo.remote_rename("origin", &params.remote_name)
                .map_err(|err| map_git2_error("clone", source, &deadline, err))?;
        }
        Ok(())
    }

    fn checkout(
        &self,
        workdir: &Path,
        target: &str,
        branch: &str,
        params: &CheckoutParams,
    ) -> Result<()> {
        let repo = open_repository("checkout", workdir)?;
        let object = repo
            .revparse_single(target)
            .map_err(|err| GitError::inconsistent("checkout", target, err.message()))?;
        let commit = object
            .peel_to_commit()
            .map_err(|err| GitError::inconsistent("checkout", target, err.message()))?;
        let resolved = commit.id();

        if let Ok(existing) = repo.find_branch(branch, BranchType::Local) {
            if existing.get().target() != Some(resolved) && !params.delete_branch_if_exists {
                return Err(GitError::BranchAlreadyExists {
                    branch: branch.to_string(),
                });
            }
        }

        // Detach HEAD so the branch ref can be force-reset even when it is
        // the currently checked-out branch.
        repo.set_head_detached(resolved)
            .map_err(|err| GitError::inconsistent("checkout", branch, err.message()))?;
        repo.branch(branch, &commit, true)
            .map_err(|err| GitError::inconsistent("checkout", branch, err.message()))?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        repo.checkout_tree(&object, Some(&mut checkout))
            .map_err(|err| GitError::inconsistent("checkout", branch, err.message()))?;
        repo.set_head(&format!("refs/heads/{branch}"))
            .map_err(|err| GitError::inconsistent("checkout", branch, err.message()))?;

        let head = self.head_object_id(workdir)?;
        let expected = ObjectId::parse(&resolved.to_string())?;
        if head.as_ref() != Some(&expected) {
            return Err(GitError::inconsistent(
                "checkout",
                branch,
                format!(
                    "HEAD is {:?} after checkout, expected {expected}",
                    head.map(|oid| oid.to_string())
                ),
            ));
        }
        Ok(())
    }

    fn resolve_head_revision(
        &self,
        remote_url: &str,
        branch: &str,
        credential: Option<&Credential>,
    ) -> Result<ObjectId> {
        require_ssh_credential("ls-remote", remote_url, credential)?;
        let deadline = Deadline::new(None);
        let refname = format!("refs/heads/{branch}");

        let mut remote = git2::Remote::create_detached(remote_url)
            .map_err(|err| map_git2_error("ls-remote", remote_url, &deadline, err))?;
        let connection = remote
            .connect_auth(
                git2::Direction::Fetch,
                Some(remote_callbacks(
                    credential.map(AuthMaterial::from_credential),
                    &deadline,
                )),
                None,
            )
            .map_err(|err| map_git2_error("ls-remote", remote_url, &deadline, err))?;

        let head = connection
            .list()
            .map_err(|err| map_git2_error("ls-remote", remote_url, &deadline, err))?
            .iter()
            .find(|head| head.name() == refname || head.name() == branch)
            .ok_or_else(|| {
                GitError::network(
                    "ls-remote",
                    remote_url,
                    format!("remote has no ref {refname}"),
                )
            })?;
        ObjectId::parse(&head.oid().to_string())
    }

    fn is_commit_present(&self, workdir: &Path, oid: &ObjectId) -> Result<bool> {
        let repo = open_repository("commit-lookup", workdir)?;
        let parsed = git2::Oid::from_str(oid.as_str())
            .map_err(|_| GitError::InvalidObjectId(oid.to_string()))?;
        match repo.find_commit(parsed) {
            Ok(_) => Ok(true),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(false),
            Err(err) => Err(GitError::inconsistent(
                "commit-lookup",
                oid.as_str(),
                err.message(),
            )),
        }
    }

    fn current_branch(&self, workdir: &Path) -> Result<Option<String>> {
        let repo = open_repository("branch-lookup", workdir)?;
        let head = repo
            .find_reference("HEAD")
            .map_err(|err| GitError::inconsistent("branch-lookup", "HEAD", err.message()))?;
        Ok(head
            .symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(str::to_string))
    }

    fn head_object_id(&self, workdir: &Path) -> Result<Option<ObjectId>> {
        let repo = open_repository("head-lookup", workdir)?;
        match repo.head() {
            Ok(head) => match head.target() {
                Some(oid) => Ok(Some(ObjectId::parse(&oid.to_string())?)),
                None => Ok(None),
            },
            Err(err)
                if err.code() == ErrorCode::UnbornBranch || err.code() == ErrorCode::NotFound =>
            {
                Ok(None)
            }
            Err(err) => Err(GitError::inconsistent("head-lookup", "HEAD", err.message())),
        }
    }

    fn ref_object_id(&self, workdir: &Path, refname: &str) -> Result<Option<ObjectId>> {
        let repo = open_repository("ref-lookup", workdir)?;
        let qualified = if refname.starts_with("refs/") {
            refname.to_string()
        } else {
            format!("refs/heads/{refname}")
        };
        match repo.find_reference(&qualified) {
            Ok(reference) => {
                let resolved = reference
                    .resolve()
                    .map_err(|err| GitError::inconsistent("ref-lookup", refname, err.message()))?;
                match resolved.target() {
                    Some(oid) => Ok(Some(ObjectId::parse(&oid.to_string())?)),
                    None => Ok(None),
                }
            }
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(GitError::inconsistent("ref-lookup", refname, err.message())),
        }
    }

    fn set_remote_url(&self, workdir: &Path, name: &str, url: &str) -> Result<()> {
        let repo = open_repository("remote", workdir)?;
        if repo.find_remote(name).is_ok() {
            repo.remote_set_url(name, url)
                .map_err(|err| GitError::inconsistent("remote", name, err.message()))?;
        } else {
            repo.remote(name, url)
                .map_err(|err| GitError::inconsistent("remote", name, err.message()))?;
        }
        Ok(())
    }

    fn set_fetch_prune(&self, workdir: &Path, name: &str) -> Result<()> {
        let repo = open_repository("config", workdir)?;
        let mut config = repo
            .config()
            .map_err(|err| GitError::inconsistent("config", name, err.message()))?;
        config
            .set_bool(&format!("remote.{name}.prune"), true)
            .map_err(|err| GitError::inconsistent("config", name, err.message()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Native transport driver: shells out to the `git` binary.
//!
//! Authentication uses an SSH identity written to a private temp file and
//! injected through `GIT_SSH_COMMAND`; the file lives only for the duration
//! of the command. Timeouts are enforced at the process level: the child is
//! killed once the deadline passes.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use git_client_credentials::Credential;

use crate::backend::{
    Backend, BackendKind, Capability, CheckoutParams, CloneParams, FetchParams,
};
use crate::error::{GitError, Result};
use crate::oid::ObjectId;
use crate::refspec::RefSpec;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Transport driver backed by the system `git` executable.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    git_binary: PathBuf,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
        }
    }
}

impl NativeBackend {
    /// Creates a driver that resolves `git` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a driver using an explicit git executable.
    pub fn with_binary(git_binary: impl Into<PathBuf>) -> Self {
        Self {
            git_binary: git_binary.into(),
        }
    }

    /// Runs a git subcommand and returns trimmed stdout.
    ///
    /// `operation` and `target` feed error messages; `target` is the remote
    /// URL for network commands and the workdir otherwise.
    fn run(&self, ctx: &CommandContext<'_>, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.git_binary);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = ctx.cwd {
            cmd.current_dir(dir);
        }
        if let Some(ssh) = ctx.ssh {
            for (key, value) in ssh.env() {
                cmd.env(key, value);
            }
        }
        debug!(operation = ctx.operation, ?args, "running git");

        let mut child = cmd.spawn()?;
        // Drain both pipes while the child runs; once a pipe buffer fills,
        // an undrained child blocks on write and never exits.
        let stdout = drain_in_background(child.stdout.take());
        let stderr = drain_in_background(child.stderr.take());
        let status = match ctx.timeout {
            None => child.wait()?,
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        warn!(operation = ctx.operation, target = ctx.target, "killing git on deadline");
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(GitError::Timeout {
                            operation: ctx.operation.to_string(),
                            url: ctx.target.to_string(),
                            seconds: limit.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
            }
        };

        let stdout = join_drained(stdout);
        let stderr = join_drained(stderr);
        if !status.success() {
            return Err(classify_failure(ctx, status.code(), stderr));
        }
        Ok(stdout.trim().to_string())
    }
}

fn drain_in_background(
    pipe: Option<impl std::io::Read + Send + 'static>,
) -> Option<std::thread::JoinHandle<String>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_drained(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Everything `run` needs besides the argument list.
struct CommandContext<'a> {
    operation: &'a str,
    target: &'a str,
    cwd: Option<&'a Path>,
    ssh: Option<&'a SshIdentity>,
    timeout: Option<Duration>,
}

impl<'a> CommandContext<'a> {
    fn local(operation: &'a str, workdir: &'a Path) -> Self {
        Self {
            operation,
            target: "",
            cwd: Some(workdir),
            ssh: None,
            timeout: None,
        }
    }
}

/// Maps a non-zero git exit into the error kind a caller can act on.
fn classify_failure(ctx: &CommandContext<'_>, code: Option<i32>, stderr: String) -> GitError {
    let stderr = stderr.trim().to_string();
    let lowered = stderr.to_lowercase();
    let network_op = !ctx.target.is_empty();
    if network_op {
        if lowered.contains("permission denied")
            || lowered.contains("authentication failed")
            || lowered.contains("could not read username")
            || lowered.contains("host key verification failed")
        {
            return GitError::AuthenticationRejected {
                operation: ctx.operation.to_string(),
                url: ctx.target.to_string(),
                reason: stderr,
            };
        }
        if lowered.contains("could not resolve host")
            || lowered.contains("unable to access")
            || lowered.contains("connection refused")
            || lowered.contains("connection timed out")
            || lowered.contains("could not read from remote repository")
        {
            return GitError::NetworkFailure {
                operation: ctx.operation.to_string(),
                url: ctx.target.to_string(),
                reason: stderr,
            };
        }
    }
    GitError::CommandFailed {
        operation: ctx.operation.to_string(),
        code,
        stderr,
    }
}

// ---------------------------------------------------------------------------
// SSH identity plumbing
// ---------------------------------------------------------------------------

/// Key material staged on disk for one command invocation.
///
/// The temp files are removed when this is dropped, i.e. as soon as the
/// command has finished.
struct SshIdentity {
    key_file: tempfile::NamedTempFile,
    askpass: Option<AskPass>,
}

/// Askpass plumbing for encrypted keys. The passphrase lives in its own
/// private file and the script only `cat`s it, so passphrase content never
/// reaches shell syntax.
struct AskPass {
    script: tempfile::NamedTempFile,
    passphrase_file: tempfile::NamedTempFile,
}

impl SshIdentity {
    fn stage(credential: &Credential) -> Result<Self> {
        let mut key_file = tempfile::NamedTempFile::new()?;
        use std::io::Write;
        key_file.write_all(credential.private_key())?;
        key_file.flush()?;
        restrict_permissions(key_file.path(), 0o600)?;

        let askpass = match credential.passphrase() {
            Some(passphrase) => {
                let mut passphrase_file = tempfile::NamedTempFile::new()?;
                passphrase_file.write_all(passphrase.as_bytes())?;
                passphrase_file.flush()?;
                restrict_permissions(passphrase_file.path(), 0o600)?;

                let mut script = tempfile::NamedTempFile::new()?;
                writeln!(
                    script,
                    "#!/bin/sh\nexec cat \"{}\"",
                    passphrase_file.path().display()
                )?;
                script.flush()?;
                restrict_permissions(script.path(), 0o700)?;
                Some(AskPass {
                    script,
                    passphrase_file,
                })
            }
            None => None,
        };

        Ok(Self { key_file, askpass })
    }

    fn env(&self) -> Vec<(String, String)> {
        let ssh_command = format!(
            "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=no",
            self.key_file.path().display()
        );
        let mut env = vec![("GIT_SSH_COMMAND".to_string(), ssh_command)];
        if let Some(askpass) = &self.askpass {
            env.push((
                "SSH_ASKPASS".to_string(),
                askpass.script.path().display().to_string(),
            ));
            env.push(("SSH_ASKPASS_REQUIRE".to_string(), "force".to_string()));
            env.push(("DISPLAY".to_string(), ":0".to_string()));
        }
        env
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn stage_identity(credential: Option<&Credential>) -> Result<Option<SshIdentity>> {
    credential.map(SshIdentity::stage).transpose()
}

// ---------------------------------------------------------------------------
// Backend impl
// ---------------------------------------------------------------------------

impl Backend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::ReferenceClone => true,
            Capability::ShallowFetch => true,
            Capability::ProcessTimeout => true,
        }
    }

    fn init(&self, workdir: &Path) -> Result<()> {
        self.run(
            &CommandContext::local("init", workdir),
            &["init", "--quiet"],
        )?;
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
        let ssh = stage_identity(credential)?;
        let mut args: Vec<String> = vec!["fetch".to_string()];
        if params.shallow {
            args.push("--depth".to_string());
            args.push("1".to_string());
        }
        if params.prune {
            args.push("--prune".to_string());
        }
        args.push(remote.to_string());
        args.extend(refspecs.iter().map(|spec| spec.to_string()));

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(
            &CommandContext {
                operation: "fetch",
                target: remote,
                cwd: Some(workdir),
                ssh: ssh.as_ref(),
                timeout: params.timeout,
            },
            &args,
        )?;
        Ok(())
    }

    fn clone_repository(
        &self,
        workdir: &Path,
        source: &str,
        credential: Option<&Credential>,
        params: &CloneParams,
    ) -> Result<()> {
        let ssh = stage_identity(credential)?;
        let mut args: Vec<String> = vec![
            "clone".to_string(),
            "--quiet".to_string(),
            "--origin".to_string(),
            params.remote_name.clone(),
        ];
        if let Some(reference) = &params.reference_repository {
            args.push("--reference".to_string());
            args.push(reference.clone());
        }
        if params.shallow {
            args.push("--depth".to_string());
            args.push("1".to_string());
        }
        args.push(source.to_string());
        args.push(workdir.display().to_string());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = self.run(
            &CommandContext {
                operation: "clone",
                target: source,
                cwd: None,
                ssh: ssh.as_ref(),
                timeout: params.timeout,
            },
            &args,
        );
        if let Err(err) = result {
            // A killed clone can leave a half-written target; restore the
            // pre-operation (empty) directory.
            if err.is_timeout() && workdir.exists() {
                let _ = std::fs::remove_dir_all(workdir);
                let _ = std::fs::create_dir_all(workdir);
            }
            return Err(err);
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
        let ctx = CommandContext::local("checkout", workdir);
        let resolved = ObjectId::parse(&self.run(
            &ctx,
            &["rev-parse", "--verify", &format!("{target}^{{commit}}")],
        )?)?;

        let existing = self.ref_object_id(workdir, branch)?;
        match existing {
            Some(current) if current != resolved && !params.delete_branch_if_exists => {
                return Err(GitError::BranchAlreadyExists {
                    branch: branch.to_string(),
                });
            }
            _ => {}
        }

        // -B resets the branch to the target, which covers both the fresh
        // branch and the delete-and-recreate cases.
        self.run(
            &ctx,
            &["checkout", "--quiet", "-B", branch, resolved.as_str()],
        )?;

        let head = self.head_object_id(workdir)?;
        if head.as_ref() != Some(&resolved) {
            return Err(GitError::inconsistent(
                "checkout",
                branch,
                format!(
                    "HEAD is {:?} after checkout, expected {resolved}",
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
        let ssh = stage_identity(credential)?;
        let refname = qualify_branch(branch);
        let output = self.run(
            &CommandContext {
                operation: "ls-remote",
                target: remote_url,
                cwd: None,
                ssh: ssh.as_ref(),
                timeout: None,
            },
            &["ls-remote", remote_url, &refname],
        )?;

        let oid = output
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .next()
            .ok_or_else(|| {
                GitError::network(
                    "ls-remote",
                    remote_url,
                    format!("remote has no ref {refname}"),
                )
            })?;
        ObjectId::parse(oid)
    }

    fn is_commit_present(&self, workdir: &Path, oid: &ObjectId) -> Result<bool> {
        let result = self.run(
            &CommandContext::local("rev-parse", workdir),
            &[
                "rev-parse",
                "--quiet",
                "--verify",
                &format!("{oid}^{{commit}}"),
            ],
        );
        match result {
            Ok(_) => Ok(true),
            // --quiet --verify exits 1 when the object is absent; anything
            // else is a broken repository.
            Err(GitError::CommandFailed { code: Some(1), .. }) => Ok(false),
            Err(GitError::CommandFailed { code, stderr, .. }) => Err(GitError::inconsistent(
                "rev-parse",
                oid.as_str(),
                format!("object lookup failed (exit {code:?}): {stderr}"),
            )),
            Err(err) => Err(err),
        }
    }

    fn current_branch(&self, workdir: &Path) -> Result<Option<String>> {
        let result = self.run(
            &CommandContext::local("symbolic-ref", workdir),
            &["symbolic-ref", "--short", "-q", "HEAD"],
        );
        match result {
            Ok(name) => Ok(Some(name)),
            Err(GitError::CommandFailed { code: Some(1), .. }) => Ok(None), // detached
            Err(err) => Err(err),
        }
    }

    fn head_object_id(&self, workdir: &Path) -> Result<Option<ObjectId>> {
        let result = self.run(
            &CommandContext::local("rev-parse", workdir),
            &["rev-parse", "--verify", "--quiet", "HEAD^{commit}"],
        );
        match result {
            Ok(oid) => Ok(Some(ObjectId::parse(&oid)?)),
            Err(GitError::CommandFailed { code: Some(1), .. }) => Ok(None), // unborn HEAD
            Err(err) => Err(err),
        }
    }

    fn ref_object_id(&self, workdir: &Path, refname: &str) -> Result<Option<ObjectId>> {
        let refname = qualify_branch(refname);
        let result = self.run(
            &CommandContext::local("show-ref", workdir),
            &["show-ref", "--verify", "--hash", &refname],
        );
        match result {
            Ok(oid) => Ok(Some(ObjectId::parse(&oid)?)),
            Err(GitError::CommandFailed { code: Some(1), .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn set_remote_url(&self, workdir: &Path, name: &str, url: &str) -> Result<()> {
        let ctx = CommandContext::local("remote", workdir);
        match self.run(&ctx, &["remote", "set-url", name, url]) {
            Ok(_) => Ok(()),
            // Only the missing-remote case falls back to creating it; any
            // other failure propagates.
            Err(GitError::CommandFailed { ref stderr, .. })
                if stderr.to_lowercase().contains("no such remote") =>
            {
                self.run(&ctx, &["remote", "add", name, url])?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn set_fetch_prune(&self, workdir: &Path, name: &str) -> Result<()> {
        self.run(
            &CommandContext::local("config", workdir),
            &["config", &format!("remote.{name}.prune"), "true"],
        )?;
        Ok(())
    }
}

/// Expands a short branch name to a full ref name.
fn qualify_branch(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{name}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

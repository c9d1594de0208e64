//! End-to-end transport flows against throwaway local repositories.
//!
//! Each test creates its own upstream repository with the `git` binary
//! (the same binary the native backend drives), then exercises the client
//! API against it. Local-path remotes keep everything network-free while
//! still covering fetch/clone/checkout and the consistency queries.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use git_client::{BackendKind, ClientConfig, Git, GitClient, GitError, ObjectId, RefSpec};
use git_client_credentials::Credential;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Runs `git` in `cwd`, panicking on failure. Test setup only.
fn git(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_AUTHOR_NAME", "tester")
        .env("GIT_AUTHOR_EMAIL", "tester@example.com")
        .env("GIT_COMMITTER_NAME", "tester")
        .env("GIT_COMMITTER_EMAIL", "tester@example.com")
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// An upstream repository with two commits on `master`.
struct Upstream {
    dir: TempDir,
    first: ObjectId,
    second: ObjectId,
}

impl Upstream {
    fn create() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path();
        git(path, &["init", "--quiet"]);
        git(path, &["symbolic-ref", "HEAD", "refs/heads/master"]);

        std::fs::write(path.join("README.md"), "# upstream\n").unwrap();
        git(path, &["add", "README.md"]);
        git(path, &["commit", "--quiet", "-m", "initial commit"]);
        let first = ObjectId::parse(&git(path, &["rev-parse", "HEAD"])).unwrap();

        std::fs::write(path.join("README.md"), "# upstream\n\nmore\n").unwrap();
        git(path, &["commit", "--quiet", "-am", "expand readme"]);
        let second = ObjectId::parse(&git(path, &["rev-parse", "HEAD"])).unwrap();

        Self { dir, first, second }
    }

    fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    /// `file://` form of the repository path. Bare local paths make git
    /// silently ignore `--depth`; the file scheme honors it.
    fn file_url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    /// Creates `count` branches pointing at the tip commit, in one
    /// `update-ref --stdin` batch.
    fn create_branches(&self, count: usize) {
        let mut batch = String::new();
        for i in 0..count {
            batch.push_str(&format!("create refs/heads/branch-{i:04} {}\n", self.second));
        }
        let mut child = Command::new("git")
            .args(["update-ref", "--stdin"])
            .current_dir(self.dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(batch.as_bytes())
            .unwrap();
        assert!(child.wait().unwrap().success());
    }
}

fn client(kind: BackendKind) -> (TempDir, GitClient) {
    let workdir = TempDir::new().unwrap();
    let client = Git::in_dir(workdir.path()).using(kind).client();
    (workdir, client)
}

fn all_heads_refspec() -> Vec<RefSpec> {
    vec![RefSpec::parse("+refs/heads/*:refs/remotes/origin/*").unwrap()]
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_empty_repository() {
    for kind in [BackendKind::Native, BackendKind::Embedded] {
        let (workdir, client) = client(kind);
        client.init_().execute().unwrap();

        // No HEAD commit and no tracked files.
        assert_eq!(client.repository().head().unwrap(), None, "{kind:?}");
        let entries: Vec<_> = std::fs::read_dir(workdir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(".git")], "{kind:?}");
    }
}

#[test]
fn init_refuses_occupied_non_repository_directory() {
    let (workdir, client) = client(BackendKind::Native);
    std::fs::write(workdir.path().join("occupant.txt"), "data").unwrap();

    let err = client.init_().execute().unwrap_err();
    assert!(
        matches!(err, GitError::RepositoryStateInconsistent { .. }),
        "got {err:?}"
    );
}

// ---------------------------------------------------------------------------
// Fetch + checkout
// ---------------------------------------------------------------------------

#[test]
fn fetch_then_checkout_flow() {
    let upstream = Upstream::create();
    for kind in [BackendKind::Native, BackendKind::Embedded] {
        let (workdir, client) = client(kind);
        client.init_().execute().unwrap();
        assert!(!workdir.path().join("README.md").exists());

        client.add_default_credentials(Credential::new(
            "git",
            b"unused-for-local-remotes".to_vec(),
            None,
            "test key",
        ));
        client
            .fetch_()
            .from(upstream.url(), all_heads_refspec())
            .execute()
            .unwrap();
        client.set_remote_url("origin", &upstream.url()).unwrap();

        let master = client.head_rev(&upstream.url(), "master").unwrap();
        assert_eq!(master, upstream.second, "{kind:?}");

        client
            .checkout()
            .branch("master")
            .target(master.as_str())
            .delete_branch_if_exists(true)
            .execute()
            .unwrap();

        assert!(client.is_commit_in_repo(&master).unwrap(), "{kind:?}");
        let repo = client.repository();
        assert_eq!(repo.branch().unwrap().as_deref(), Some("master"), "{kind:?}");
        assert_eq!(repo.head().unwrap(), Some(master.clone()), "{kind:?}");
        assert_eq!(
            repo.ref_object_id("master").unwrap(),
            Some(master),
            "{kind:?}"
        );
        assert!(workdir.path().join("README.md").exists(), "{kind:?}");
    }
}

#[test]
fn fetched_commit_membership_is_exact() {
    let upstream = Upstream::create();
    let (_workdir, client) = client(BackendKind::Native);
    client.init_().execute().unwrap();
    client
        .fetch_()
        .from(upstream.url(), all_heads_refspec())
        .execute()
        .unwrap();

    assert!(client.is_commit_in_repo(&upstream.first).unwrap());
    let absent = ObjectId::parse("0123456789012345678901234567890123456789").unwrap();
    assert!(!client.is_commit_in_repo(&absent).unwrap());
}

#[test]
fn fetch_survives_large_ref_advertisement() {
    // Thousands of new branches make the fetch summary far exceed the OS
    // pipe buffer; the native driver must keep draining while it waits.
    let upstream = Upstream::create();
    upstream.create_branches(4000);

    let (_workdir, client) = client(BackendKind::Native);
    client.init_().execute().unwrap();
    client
        .fetch_()
        .from(upstream.url(), all_heads_refspec())
        .execute()
        .unwrap();

    assert_eq!(
        client
            .repository()
            .ref_object_id("refs/remotes/origin/branch-3999")
            .unwrap(),
        Some(upstream.second.clone())
    );
}

#[test]
fn shallow_fetch_truncates_history() {
    let upstream = Upstream::create();
    let (workdir, client) = client(BackendKind::Native);
    client.init_().execute().unwrap();
    client
        .fetch_()
        .from(upstream.file_url(), all_heads_refspec())
        .shallow(true)
        .execute()
        .unwrap();

    assert_eq!(
        git(
            workdir.path(),
            &["rev-list", "--count", "refs/remotes/origin/master"],
        ),
        "1"
    );
}

#[test]
fn checkout_existing_branch_needs_delete_flag() {
    let upstream = Upstream::create();
    let (_workdir, client) = client(BackendKind::Native);
    client.init_().execute().unwrap();
    client
        .fetch_()
        .from(upstream.url(), all_heads_refspec())
        .execute()
        .unwrap();

    client
        .checkout()
        .branch("work")
        .target(upstream.first.as_str())
        .execute()
        .unwrap();

    // Same branch, different target, no delete flag.
    let err = client
        .checkout()
        .branch("work")
        .target(upstream.second.as_str())
        .execute()
        .unwrap_err();
    assert!(
        matches!(err, GitError::BranchAlreadyExists { ref branch } if branch == "work"),
        "got {err:?}"
    );
    assert_eq!(
        client.repository().head().unwrap(),
        Some(upstream.first.clone())
    );

    // With the flag the branch is recreated at the new target.
    client
        .checkout()
        .branch("work")
        .target(upstream.second.as_str())
        .delete_branch_if_exists(true)
        .execute()
        .unwrap();
    assert_eq!(
        client.repository().head().unwrap(),
        Some(upstream.second.clone())
    );
}

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

#[test]
fn clone_configures_remote_and_working_tree() {
    let upstream = Upstream::create();
    let (workdir, client) = client(BackendKind::Native);

    client
        .clone_()
        .url(upstream.url())
        .repository_name("origin")
        .reference(upstream.url())
        .prune(true)
        .execute()
        .unwrap();

    assert_eq!(
        git(workdir.path(), &["remote", "get-url", "origin"]),
        upstream.url()
    );
    assert_eq!(
        git(workdir.path(), &["config", "remote.origin.prune"]),
        "true"
    );
    assert!(workdir.path().join("README.md").exists());

    let master = client.head_rev(&upstream.url(), "master").unwrap();
    client
        .checkout()
        .branch("master")
        .target("origin/master")
        .delete_branch_if_exists(true)
        .execute()
        .unwrap();
    assert!(client.is_commit_in_repo(&master).unwrap());
    assert_eq!(client.repository().head().unwrap(), Some(master));
    assert_eq!(
        client.repository().branch().unwrap().as_deref(),
        Some("master")
    );
}

#[test]
fn clone_with_custom_remote_name() {
    let upstream = Upstream::create();
    let (workdir, client) = client(BackendKind::Embedded);

    client
        .clone_()
        .url(upstream.url())
        .repository_name("mirror")
        .execute()
        .unwrap();

    assert_eq!(
        git(workdir.path(), &["remote", "get-url", "mirror"]),
        upstream.url()
    );
    assert!(workdir.path().join("README.md").exists());
}

#[test]
fn shallow_clone_truncates_history() {
    let upstream = Upstream::create();
    let (workdir, client) = client(BackendKind::Native);

    client
        .clone_()
        .url(upstream.file_url())
        .shallow(true)
        .execute()
        .unwrap();

    assert_eq!(git(workdir.path(), &["rev-list", "--count", "HEAD"]), "1");
    assert!(workdir.path().join("README.md").exists());
}

#[test]
fn embedded_clone_rejects_reference_repository() {
    let upstream = Upstream::create();
    let (workdir, client) = client(BackendKind::Embedded);

    let err = client
        .clone_()
        .url(upstream.url())
        .reference(upstream.url())
        .execute()
        .unwrap_err();
    assert!(
        matches!(err, GitError::NotSupportedByBackend { .. }),
        "got {err:?}"
    );
    // No partial clone was performed.
    assert!(std::fs::read_dir(workdir.path()).unwrap().next().is_none());
}

#[test]
fn backends_produce_equivalent_clone_state() {
    let upstream = Upstream::create();
    let (native_dir, native) = client(BackendKind::Native);
    let (embedded_dir, embedded) = client(BackendKind::Embedded);

    native.clone_().url(upstream.url()).execute().unwrap();
    embedded.clone_().url(upstream.url()).execute().unwrap();

    assert_eq!(
        native.repository().head().unwrap(),
        embedded.repository().head().unwrap()
    );
    assert_eq!(
        native.repository().branch().unwrap(),
        embedded.repository().branch().unwrap()
    );
    assert_eq!(
        native_dir.path().join("README.md").exists(),
        embedded_dir.path().join("README.md").exists()
    );
}

// ---------------------------------------------------------------------------
// Credentials and failures
// ---------------------------------------------------------------------------

#[test]
fn cleared_credentials_surface_authentication_unavailable() {
    let (_workdir, client) = client(BackendKind::Embedded);
    client.init_().execute().unwrap();
    client.add_default_credentials(Credential::new(
        "git",
        b"key".to_vec(),
        None,
        "soon to be cleared",
    ));
    client.clear_credentials();

    let err = client
        .fetch_()
        .from("ssh://git@example.invalid/repo.git", all_heads_refspec())
        .execute()
        .unwrap_err();
    assert!(
        matches!(err, GitError::AuthenticationUnavailable { .. }),
        "got {err:?}"
    );
}

#[test]
fn credentials_registered_after_builder_creation_are_honored() {
    // The builder resolves its credential at execute time: registering and
    // clearing between creation and execute must be observed.
    let (_workdir, client) = client(BackendKind::Embedded);
    client.init_().execute().unwrap();
    client.add_default_credentials(Credential::new("git", b"key".to_vec(), None, "default"));

    let cmd = client
        .fetch_()
        .from("ssh://git@example.invalid/repo.git", all_heads_refspec());
    client.clear_credentials();

    let err = cmd.execute().unwrap_err();
    assert!(
        matches!(err, GitError::AuthenticationUnavailable { .. }),
        "got {err:?}"
    );
}

#[test]
fn head_rev_for_missing_branch_is_a_network_failure() {
    let upstream = Upstream::create();
    let (_workdir, client) = client(BackendKind::Native);

    let err = client
        .head_rev(&upstream.url(), "no-such-branch")
        .unwrap_err();
    assert!(matches!(err, GitError::NetworkFailure { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Writes an executable shell script standing in for the git binary.
#[cfg(unix)]
fn stub_git_binary(dir: &Path, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("git-stub");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[cfg(unix)]
#[test]
fn timed_out_clone_surfaces_timeout_and_leaves_no_partial_state() {
    let stub_dir = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let config = ClientConfig {
        backend: BackendKind::Native,
        git_binary: Some(stub_git_binary(stub_dir.path(), "sleep 30")),
        default_timeout_secs: 0,
    };
    let client = Git::in_dir(workdir.path()).with_config(&config).client();

    let err = client
        .clone_()
        .url("https://example.invalid/repo.git")
        .timeout(1)
        .execute()
        .unwrap_err();
    assert!(matches!(err, GitError::Timeout { .. }), "got {err:?}");
    // Pre-operation state: the target directory is present and empty.
    assert!(std::fs::read_dir(workdir.path()).unwrap().next().is_none());
}

//! Credential-aware git transport client.
//!
//! One uniform command API over two interchangeable transport backends: a
//! native driver that shells out to the `git` binary and an embedded driver
//! built on libgit2. A [`GitClient`] owns a credential store, a
//! working-directory handle, and a selected backend; callers obtain fluent
//! command builders ([`InitCommand`], [`FetchCommand`], [`CloneCommand`],
//! [`CheckoutCommand`]) and query the resulting repository state through
//! [`WorkingRepository`].
//!
//! ```no_run
//! use git_client::{BackendKind, Git, RefSpec};
//! use git_client_credentials::Credential;
//!
//! # fn main() -> git_client::Result<()> {
//! let client = Git::in_dir("/tmp/checkout").using(BackendKind::Native).client();
//! client.init_().execute()?;
//! client.add_default_credentials(Credential::new(
//!     "git",
//!     std::fs::read("/home/me/.ssh/id_rsa")?,
//!     None,
//!     "private key from ~/.ssh/id_rsa",
//! ));
//!
//! let url = "ssh://git@example.com/project.git";
//! let refspecs = vec![RefSpec::parse("+refs/heads/*:refs/remotes/origin/*")?];
//! client.fetch_().from(url, refspecs).shallow(true).prune(true).timeout(60).execute()?;
//!
//! let master = client.head_rev(url, "master")?;
//! client.checkout().branch("master").target(master.as_str()).execute()?;
//! assert!(client.is_commit_in_repo(&master)?);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod oid;
pub mod refspec;
pub mod repository;

pub use backend::{Backend, BackendKind, Capability};
pub use client::{Git, GitClient};
pub use commands::{CheckoutCommand, CloneCommand, FetchCommand, InitCommand};
pub use config::{load_config, save_config, ClientConfig};
pub use error::{GitError, Result};
pub use oid::ObjectId;
pub use refspec::RefSpec;
pub use repository::WorkingRepository;

//! Read-only view of a working repository's state.

use std::path::Path;

use crate::backend::BackendKind;
use crate::client::GitClient;
use crate::error::Result;
use crate::oid::ObjectId;

/// Branch, HEAD, and ref queries against a client's working repository.
///
/// Values are recomputed per call; nothing is cached between queries.
pub struct WorkingRepository<'a> {
    client: &'a GitClient,
}

impl<'a> WorkingRepository<'a> {
    pub(crate) fn new(client: &'a GitClient) -> Self {
        Self { client }
    }

    /// The repository's filesystem location.
    pub fn path(&self) -> &Path {
        self.client.workdir()
    }

    /// Which transport backend manages this repository.
    pub fn backend_kind(&self) -> BackendKind {
        self.client.backend_kind()
    }

    /// The currently checked-out branch, or `None` on a detached HEAD.
    pub fn branch(&self) -> Result<Option<String>> {
        self.client.backend().current_branch(self.path())
    }

    /// The object id HEAD points to, or `None` before the first commit.
    pub fn head(&self) -> Result<Option<ObjectId>> {
        self.client.backend().head_object_id(self.path())
    }

    /// The object id a local ref points to, or `None` if the ref is absent.
    /// Short branch names are expanded under `refs/heads/`.
    pub fn ref_object_id(&self, refname: &str) -> Result<Option<ObjectId>> {
        self.client.backend().ref_object_id(self.path(), refname)
    }
}

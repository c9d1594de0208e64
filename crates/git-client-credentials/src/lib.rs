//! Scoped SSH credential storage and resolution for the git client.
//!
//! A [`CredentialStore`] holds private-key credentials either globally (the
//! "default" credential) or bound to a specific remote URL. At operation time
//! the client asks the store which credential applies to the remote it is
//! about to contact; the store answers with the most specific match.
//!
//! Key material is treated as an opaque blob: nothing here parses or
//! validates it, it is handed to the transport backend as-is.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// The scope a credential was registered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialScope {
    /// Usable for any remote URL that has no URL-bound credential.
    Global,
    /// Usable only when the remote URL matches exactly.
    Url(String),
}

/// An SSH private-key identity.
///
/// Immutable once constructed; the store owns registered credentials and
/// hands out shared references during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    scope: CredentialScope,
    username: String,
    private_key: Vec<u8>,
    passphrase: Option<String>,
    description: String,
}

impl Credential {
    /// Creates a credential from a username and raw private-key material.
    ///
    /// The scope is assigned by the store when the credential is registered;
    /// a freshly constructed credential is global.
    pub fn new(
        username: impl Into<String>,
        private_key: impl Into<Vec<u8>>,
        passphrase: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            scope: CredentialScope::Global,
            username: username.into(),
            private_key: private_key.into(),
            passphrase,
            description: description.into(),
        }
    }

    /// The principal this key authenticates as (e.g. `git`).
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The raw private-key bytes, unvalidated.
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// The key passphrase, if the key is encrypted.
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    /// Human-readable description (e.g. where the key came from).
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The scope this credential is registered under.
    pub fn scope(&self) -> &CredentialScope {
        &self.scope
    }

    fn with_scope(mut self, scope: CredentialScope) -> Self {
        self.scope = scope;
        self
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Holds registered credentials and resolves which one applies to a URL.
///
/// Resolution order: exact URL match, then the default credential, then
/// none. Resolving no credential is not an error; the caller decides whether
/// anonymous access is acceptable for the backend in use.
///
/// Registration policy: last-registered wins, both for the default slot and
/// for repeated registrations against the same URL.
#[derive(Debug, Default)]
pub struct CredentialStore {
    by_url: HashMap<String, Credential>,
    default: Option<Credential>,
}

impl CredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a credential with no URL scope.
    ///
    /// Replaces any previously registered default.
    pub fn add_default(&mut self, credential: Credential) {
        self.default = Some(credential.with_scope(CredentialScope::Global));
    }

    /// Registers a credential usable only for the given remote URL
    /// (scheme + host + path, matched exactly).
    ///
    /// A later registration for the same URL replaces the earlier one.
    pub fn add_for_url(&mut self, url: impl Into<String>, credential: Credential) {
        let url = url.into();
        let credential = credential.with_scope(CredentialScope::Url(url.clone()));
        self.by_url.insert(url, credential);
    }

    /// Removes all registered credentials.
    pub fn clear(&mut self) {
        self.by_url.clear();
        self.default = None;
    }

    /// Returns the credential applicable to `url`, if any.
    pub fn resolve(&self, url: &str) -> Option<&Credential> {
        self.by_url.get(url).or(self.default.as_ref())
    }

    /// Returns `true` if no credentials are registered.
    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty() && self.default.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

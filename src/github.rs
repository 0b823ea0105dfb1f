//! GitHub repository secrets: domain types, the collaborator trait and its REST implementation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub mod error;
pub mod publisher;
pub mod rest;

pub use error::GitHubClientError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Public key secrets of a repository must be sealed against. GitHub may rotate it at any time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoPublicKey {
    pub key_id: String,
    /// Base64 encoded X25519 public key.
    pub key: String,
}

/// What GitHub discloses about an existing secret. Values are write-only.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretMetadata {
    pub name: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A plaintext value to publish under a repository secret name.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBinding {
    pub secret_name: String,
    pub secret_value: String,
}

impl SecretBinding {
    pub fn new(secret_name: impl Into<String>, secret_value: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            secret_value: secret_value.into(),
        }
    }
}

impl fmt::Debug for SecretBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBinding")
            .field("secret_name", &self.secret_name)
            .field("secret_value", &"<redacted>")
            .finish()
    }
}

/// Token used to authenticate against the GitHub REST API.
#[derive(Clone, PartialEq, Eq)]
pub struct GitHubToken(String);

impl GitHubToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for GitHubToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Debug for GitHubToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GitHubToken(<redacted>)")
    }
}

/// Settings page where an operator can inspect the repository secrets.
pub fn secrets_settings_url(repository: &Repository) -> String {
    format!(
        "https://github.com/{}/{}/settings/secrets/actions",
        repository.owner, repository.name
    )
}

/// Repository secrets operations consumed by the provisioner.
pub trait SecretsApi {
    fn get_public_key(&self, repository: &Repository) -> Result<RepoPublicKey, GitHubClientError>;

    fn get_secret(
        &self,
        repository: &Repository,
        secret_name: &str,
    ) -> Result<Option<SecretMetadata>, GitHubClientError>;

    /// Creates the secret or overwrites its value.
    fn put_secret(
        &self,
        repository: &Repository,
        secret_name: &str,
        encrypted_value: &str,
        key_id: &str,
    ) -> Result<(), GitHubClientError>;

    fn delete_secret(
        &self,
        repository: &Repository,
        secret_name: &str,
    ) -> Result<(), GitHubClientError>;
}

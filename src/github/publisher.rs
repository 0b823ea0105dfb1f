use tracing::debug;

use crate::error::ProvisionError;
use crate::reconcile::{Desired, Observed, Outcome, Resource, ResourceDescriptor, reconcile};
use crate::sealer::seal;

use super::{
    GitHubClientError, RepoPublicKey, Repository, SecretBinding, SecretsApi,
    secrets_settings_url,
};

/// A secret value sealed against a repository public key.
pub struct SealedSecret {
    pub encrypted_value: String,
    pub key_id: String,
}

/// A repository secret. Values cannot be read back, so an existing secret is always considered
/// drifted and re-published.
pub struct RepoSecretResource<'a, G> {
    pub api: &'a G,
    pub repository: &'a Repository,
    pub secret_name: &'a str,
    /// Only needed to publish the secret.
    pub sealed: Option<&'a SealedSecret>,
}

impl<G: SecretsApi> Resource for RepoSecretResource<'_, G> {
    type Error = GitHubClientError;

    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::RepoSecret {
            owner: self.repository.owner.clone(),
            repo: self.repository.name.clone(),
            secret_name: self.secret_name.to_string(),
        }
    }

    fn observe(&self) -> Result<Observed, GitHubClientError> {
        Ok(match self.api.get_secret(self.repository, self.secret_name)? {
            Some(_) => Observed::Drifted,
            None => Observed::Absent,
        })
    }

    fn apply(&self) -> Result<(), GitHubClientError> {
        let sealed = self.sealed.ok_or_else(|| {
            GitHubClientError::Encoder(format!("no sealed value for `{}`", self.secret_name))
        })?;
        self.api.put_secret(
            self.repository,
            self.secret_name,
            &sealed.encrypted_value,
            &sealed.key_id,
        )
    }

    fn remove(&self) -> Result<(), GitHubClientError> {
        self.api.delete_secret(self.repository, self.secret_name)
    }
}

/// Publishes and removes the secrets of a single repository.
pub struct SecretsPublisher<G: SecretsApi> {
    api: G,
    repository: Repository,
}

impl<G: SecretsApi> SecretsPublisher<G> {
    pub fn new(api: G, repository: Repository) -> Self {
        Self { api, repository }
    }

    pub fn api(&self) -> &G {
        &self.api
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn get_repo_public_key(&self) -> Result<RepoPublicKey, ProvisionError> {
        let key = self.api.get_public_key(&self.repository)?;
        debug!(repository = %self.repository, key_id = %key.key_id, "repository public key fetched");
        Ok(key)
    }

    /// Creates the secret or overwrites its value.
    pub fn upsert_secret(
        &self,
        secret_name: &str,
        sealed: &SealedSecret,
    ) -> Result<Outcome, ProvisionError> {
        Ok(reconcile(
            &self.secret(secret_name, Some(sealed)),
            Desired::Present,
        )?)
    }

    /// Deletes the secret. A secret that does not exist is not an error.
    pub fn delete_secret(&self, secret_name: &str) -> Result<Outcome, ProvisionError> {
        Ok(reconcile(&self.secret(secret_name, None), Desired::Absent)?)
    }

    pub fn secrets_settings_url(&self) -> String {
        secrets_settings_url(&self.repository)
    }

    /// Seals every binding against a freshly fetched repository key and publishes it.
    pub fn publish(&self, bindings: &[SecretBinding]) -> Result<Vec<Outcome>, ProvisionError> {
        let key = self.get_repo_public_key()?;

        bindings
            .iter()
            .map(|binding| {
                let sealed = SealedSecret {
                    encrypted_value: seal(&binding.secret_value, &key.key)?,
                    key_id: key.key_id.clone(),
                };
                self.upsert_secret(&binding.secret_name, &sealed)
            })
            .collect()
    }

    pub fn unpublish<S: AsRef<str>>(&self, secret_names: &[S]) -> Result<(), ProvisionError> {
        for secret_name in secret_names {
            self.delete_secret(secret_name.as_ref())?;
        }
        Ok(())
    }

    fn secret<'a>(
        &'a self,
        secret_name: &'a str,
        sealed: Option<&'a SealedSecret>,
    ) -> RepoSecretResource<'a, G> {
        RepoSecretResource {
            api: &self.api,
            repository: &self.repository,
            secret_name,
            sealed,
        }
    }
}

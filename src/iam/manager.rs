use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::ProvisionError;
use crate::key_cache::{AccessKeyMaterial, CacheError, LocalKeyCache};
use crate::reconcile::{Desired, Observed, Outcome, RemoteError, Resource, reconcile};

use super::resources::{
    AccessKeyResource, InlinePolicyResource, ManagedPolicyAttachmentResource, UserResource,
};
use super::{IamApi, IamClientError, Tags};

/// Desired end state of the provisioned IAM identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySpec {
    pub iam_user_name: String,
    pub tags: Tags,
    pub inline_policy_name: String,
    /// Opaque policy document, only validated by IAM itself.
    pub policy_document: Value,
    pub managed_policy_arns: Vec<String>,
}

/// Owns the lifecycle of the IAM user, its policies and its access key.
pub struct IdentityManager<I: IamApi> {
    iam: I,
    spec: IdentitySpec,
}

impl<I: IamApi> IdentityManager<I> {
    pub fn new(iam: I, spec: IdentitySpec) -> Self {
        Self { iam, spec }
    }

    pub fn iam(&self) -> &I {
        &self.iam
    }

    fn user_name(&self) -> &str {
        &self.spec.iam_user_name
    }

    pub fn create_user(&self) -> Result<Outcome, ProvisionError> {
        Ok(reconcile(&self.user(), Desired::Present)?)
    }

    /// Puts the inline policy and makes the attached managed policies match the configured set.
    pub fn put_policies(&self) -> Result<(), ProvisionError> {
        reconcile(&self.inline_policy(), Desired::Present)?;

        let desired: BTreeSet<&str> = self
            .spec
            .managed_policy_arns
            .iter()
            .map(String::as_str)
            .collect();

        for policy_arn in &desired {
            reconcile(&self.attachment(policy_arn), Desired::Present).map_err(|e| {
                if e.is_not_found() {
                    ProvisionError::Policy(format!(
                        "managed policy `{policy_arn}` does not exist or is not attachable: {e}"
                    ))
                } else {
                    e.into()
                }
            })?;
        }

        let attached = self.iam.list_attached_user_policies(self.user_name())?;
        for policy_arn in attached.iter().filter(|a| !desired.contains(a.as_str())) {
            info!(user = %self.user_name(), policy_arn = %policy_arn, "detaching unmanaged policy");
            reconcile(&self.attachment(policy_arn), Desired::Absent)?;
        }

        Ok(())
    }

    /// Returns the cached access key when it still exists for the user, minting and caching a new
    /// one otherwise.
    pub fn create_or_get_access_key(
        &self,
        cache: &LocalKeyCache,
    ) -> Result<AccessKeyMaterial, ProvisionError> {
        if let Some(material) = self.cached_key(cache)? {
            let key = self.access_key(&material.access_key_id);
            match key.observe()? {
                Observed::Converged => {
                    info!(resource = %key.descriptor(), "reusing cached access key");
                    return Ok(material);
                }
                Observed::Drifted => {
                    warn!(resource = %key.descriptor(), "cached access key is inactive, re-activating it");
                    key.apply()?;
                    return Ok(material);
                }
                Observed::Absent => {
                    warn!(
                        resource = %key.descriptor(),
                        "cached access key no longer exists, minting a new one"
                    );
                    cache.clear()?;
                }
            }
        }

        let material = self
            .iam
            .create_access_key(self.user_name())
            .map_err(|e| match e {
                IamClientError::LimitExceeded(message) => ProvisionError::KeyLimit {
                    user_name: self.user_name().to_string(),
                    message,
                },
                e => e.into(),
            })?;
        info!(
            user = %self.user_name(),
            access_key_id = %material.access_key_id,
            "access key created"
        );

        if let Err(e) = cache.save(&material) {
            // An uncached key could never be reused nor cleaned up by a later teardown.
            error!(access_key_id = %material.access_key_id, "caching the new access key failed, deleting it");
            reconcile(&self.access_key(&material.access_key_id), Desired::Absent)?;
            return Err(e.into());
        }

        Ok(material)
    }

    /// Deletes the cached key and every other key of the user, then erases the cache. A cache
    /// holding the key of another IAM user is left in place.
    pub fn delete_access_key(&self, cache: &LocalKeyCache) -> Result<(), ProvisionError> {
        let cached = self.read_cache(cache)?;
        let foreign = cached
            .as_ref()
            .is_some_and(|m| m.iam_user_name != self.spec.iam_user_name);

        let mut access_key_ids: Vec<String> = cached
            .filter(|m| !foreign && m.is_usable())
            .map(|m| m.access_key_id)
            .into_iter()
            .collect();

        match self.iam.list_access_keys(self.user_name()) {
            Ok(keys) => {
                for key in keys {
                    if !access_key_ids.contains(&key.access_key_id) {
                        access_key_ids.push(key.access_key_id);
                    }
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        for access_key_id in &access_key_ids {
            reconcile(&self.access_key(access_key_id), Desired::Absent)?;
        }

        if foreign {
            warn!(
                path = %cache.path().display(),
                "access key cache belongs to another iam user, keeping it"
            );
            return Ok(());
        }
        cache.clear()?;
        Ok(())
    }

    /// Detaches the configured managed policies (and any other attached one) and deletes the
    /// inline policy.
    pub fn delete_policies(&self) -> Result<(), ProvisionError> {
        let mut policy_arns: BTreeSet<String> =
            self.spec.managed_policy_arns.iter().cloned().collect();

        match self.iam.list_attached_user_policies(self.user_name()) {
            Ok(attached) => policy_arns.extend(attached),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        for policy_arn in &policy_arns {
            reconcile(&self.attachment(policy_arn), Desired::Absent)?;
        }

        reconcile(&self.inline_policy(), Desired::Absent)?;
        Ok(())
    }

    /// Deletes the IAM user. Its access keys and policies must have been removed beforehand, IAM
    /// rejects the deletion otherwise.
    pub fn delete_user(&self) -> Result<Outcome, ProvisionError> {
        Ok(reconcile(&self.user(), Desired::Absent)?)
    }

    /// Loads the cache file, a corrupt one reads as empty.
    fn read_cache(
        &self,
        cache: &LocalKeyCache,
    ) -> Result<Option<AccessKeyMaterial>, ProvisionError> {
        match cache.load() {
            Ok(material) => Ok(material),
            Err(CacheError::Corrupt(path, reason)) => {
                warn!(path = %path.display(), reason = %reason, "ignoring corrupt access key cache");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Loads the cached key if it is usable for the managed user.
    fn cached_key(
        &self,
        cache: &LocalKeyCache,
    ) -> Result<Option<AccessKeyMaterial>, ProvisionError> {
        Ok(self.read_cache(cache)?.filter(|m| {
            if !m.is_usable() {
                warn!(path = %cache.path().display(), "ignoring incomplete access key cache");
                return false;
            }
            if m.iam_user_name != self.spec.iam_user_name {
                warn!(
                    path = %cache.path().display(),
                    cached_user = %m.iam_user_name,
                    "ignoring access key cached for another iam user"
                );
                return false;
            }
            true
        }))
    }

    fn user(&self) -> UserResource<'_, I> {
        UserResource {
            iam: &self.iam,
            user_name: &self.spec.iam_user_name,
            tags: &self.spec.tags,
        }
    }

    fn inline_policy(&self) -> InlinePolicyResource<'_, I> {
        InlinePolicyResource {
            iam: &self.iam,
            user_name: &self.spec.iam_user_name,
            policy_name: &self.spec.inline_policy_name,
            document: &self.spec.policy_document,
        }
    }

    fn attachment<'a>(&'a self, policy_arn: &'a str) -> ManagedPolicyAttachmentResource<'a, I> {
        ManagedPolicyAttachmentResource {
            iam: &self.iam,
            user_name: &self.spec.iam_user_name,
            policy_arn,
        }
    }

    fn access_key<'a>(&'a self, access_key_id: &'a str) -> AccessKeyResource<'a, I> {
        AccessKeyResource {
            iam: &self.iam,
            user_name: &self.spec.iam_user_name,
            access_key_id,
        }
    }
}

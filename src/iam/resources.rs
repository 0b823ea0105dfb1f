//! The IAM entities owned by the provisioner, expressed as reconcilable resources.

use serde_json::Value;
use tracing::debug;

use crate::reconcile::{Observed, RemoteError, Resource, ResourceDescriptor};

use super::{AccessKeyStatus, IamApi, IamClientError, Tags};

/// Missing parents (e.g. listing the policies of a deleted user) mean the child is absent too.
fn absent_if_not_found(
    result: Result<Observed, IamClientError>,
) -> Result<Observed, IamClientError> {
    match result {
        Err(e) if e.is_not_found() => Ok(Observed::Absent),
        other => other,
    }
}

pub struct UserResource<'a, I> {
    pub iam: &'a I,
    pub user_name: &'a str,
    /// Only applied on creation, existing users are never re-tagged.
    pub tags: &'a Tags,
}

impl<I: IamApi> Resource for UserResource<'_, I> {
    type Error = IamClientError;

    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::User {
            user_name: self.user_name.to_string(),
        }
    }

    fn observe(&self) -> Result<Observed, IamClientError> {
        Ok(match self.iam.get_user(self.user_name)? {
            Some(_) => Observed::Converged,
            None => Observed::Absent,
        })
    }

    fn apply(&self) -> Result<(), IamClientError> {
        let user = self.iam.create_user(self.user_name, self.tags)?;
        debug!(user = %user.user_name, arn = %user.arn, "iam user created");
        Ok(())
    }

    fn remove(&self) -> Result<(), IamClientError> {
        self.iam.delete_user(self.user_name)
    }
}

/// The inline policy is stored under a fixed name, so applying it again replaces the document.
pub struct InlinePolicyResource<'a, I> {
    pub iam: &'a I,
    pub user_name: &'a str,
    pub policy_name: &'a str,
    pub document: &'a Value,
}

impl<I: IamApi> Resource for InlinePolicyResource<'_, I> {
    type Error = IamClientError;

    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::InlinePolicy {
            user_name: self.user_name.to_string(),
            policy_name: self.policy_name.to_string(),
        }
    }

    fn observe(&self) -> Result<Observed, IamClientError> {
        absent_if_not_found(
            self.iam
                .get_user_policy(self.user_name, self.policy_name)
                .map(|stored| match stored {
                    None => Observed::Absent,
                    Some(stored) if stored == *self.document => Observed::Converged,
                    Some(_) => Observed::Drifted,
                }),
        )
    }

    fn apply(&self) -> Result<(), IamClientError> {
        let document = serde_json::to_string(self.document)
            .map_err(|e| IamClientError::MalformedPolicy(e.to_string()))?;
        self.iam
            .put_user_policy(self.user_name, self.policy_name, &document)
    }

    fn remove(&self) -> Result<(), IamClientError> {
        self.iam.delete_user_policy(self.user_name, self.policy_name)
    }
}

pub struct ManagedPolicyAttachmentResource<'a, I> {
    pub iam: &'a I,
    pub user_name: &'a str,
    pub policy_arn: &'a str,
}

impl<I: IamApi> Resource for ManagedPolicyAttachmentResource<'_, I> {
    type Error = IamClientError;

    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::ManagedPolicyAttachment {
            user_name: self.user_name.to_string(),
            policy_arn: self.policy_arn.to_string(),
        }
    }

    fn observe(&self) -> Result<Observed, IamClientError> {
        absent_if_not_found(
            self.iam
                .list_attached_user_policies(self.user_name)
                .map(|attached| {
                    if attached.iter().any(|arn| arn == self.policy_arn) {
                        Observed::Converged
                    } else {
                        Observed::Absent
                    }
                }),
        )
    }

    fn apply(&self) -> Result<(), IamClientError> {
        self.iam.attach_user_policy(self.user_name, self.policy_arn)
    }

    fn remove(&self) -> Result<(), IamClientError> {
        self.iam.detach_user_policy(self.user_name, self.policy_arn)
    }
}

/// An existing access key. Keys cannot be created with a chosen id, so applying only re-activates
/// an inactive key; new keys are minted by the identity manager.
pub struct AccessKeyResource<'a, I> {
    pub iam: &'a I,
    pub user_name: &'a str,
    pub access_key_id: &'a str,
}

impl<I: IamApi> Resource for AccessKeyResource<'_, I> {
    type Error = IamClientError;

    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::AccessKey {
            user_name: self.user_name.to_string(),
            access_key_id: self.access_key_id.to_string(),
        }
    }

    fn observe(&self) -> Result<Observed, IamClientError> {
        absent_if_not_found(self.iam.list_access_keys(self.user_name).map(|keys| {
            match keys
                .iter()
                .find(|k| k.access_key_id == self.access_key_id)
            {
                None => Observed::Absent,
                Some(k) if k.status == AccessKeyStatus::Active => Observed::Converged,
                Some(_) => Observed::Drifted,
            }
        }))
    }

    fn apply(&self) -> Result<(), IamClientError> {
        self.iam.update_access_key_status(
            self.user_name,
            self.access_key_id,
            AccessKeyStatus::Active,
        )
    }

    /// Deactivates the key before deleting it.
    fn remove(&self) -> Result<(), IamClientError> {
        self.iam.update_access_key_status(
            self.user_name,
            self.access_key_id,
            AccessKeyStatus::Inactive,
        )?;
        self.iam.delete_access_key(self.user_name, self.access_key_id)
    }
}

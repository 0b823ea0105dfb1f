//! AWS IAM collaborator interface and the identity lifecycle built on top of it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::key_cache::AccessKeyMaterial;

pub mod error;
pub mod manager;
pub mod resources;
pub mod sdk;

pub use error::IamClientError;

/// IAM refuses to create more access keys than this for a single user.
pub const MAX_ACCESS_KEYS_PER_USER: usize = 2;

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct IamUser {
    pub user_name: String,
    pub arn: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKeyStatus {
    Active,
    Inactive,
}

impl fmt::Display for AccessKeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Inactive => write!(f, "Inactive"),
        }
    }
}

/// Public information about an access key; the secret half is only ever returned on creation.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessKeyMetadata {
    pub access_key_id: String,
    pub status: AccessKeyStatus,
    pub created_at: Option<DateTime<Utc>>,
}

/// Blocking view of the IAM operations the provisioner needs.
///
/// Getters report absence with `None`; every other operation reports it as
/// [IamClientError::NotFound].
pub trait IamApi {
    fn get_user(&self, user_name: &str) -> Result<Option<IamUser>, IamClientError>;

    fn create_user(&self, user_name: &str, tags: &Tags) -> Result<IamUser, IamClientError>;

    fn delete_user(&self, user_name: &str) -> Result<(), IamClientError>;

    fn get_user_policy(
        &self,
        user_name: &str,
        policy_name: &str,
    ) -> Result<Option<Value>, IamClientError>;

    fn put_user_policy(
        &self,
        user_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<(), IamClientError>;

    fn delete_user_policy(&self, user_name: &str, policy_name: &str)
    -> Result<(), IamClientError>;

    fn list_attached_user_policies(&self, user_name: &str) -> Result<Vec<String>, IamClientError>;

    fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<(), IamClientError>;

    fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<(), IamClientError>;

    fn list_access_keys(&self, user_name: &str)
    -> Result<Vec<AccessKeyMetadata>, IamClientError>;

    fn create_access_key(&self, user_name: &str) -> Result<AccessKeyMaterial, IamClientError>;

    fn update_access_key_status(
        &self,
        user_name: &str,
        access_key_id: &str,
        status: AccessKeyStatus,
    ) -> Result<(), IamClientError>;

    fn delete_access_key(&self, user_name: &str, access_key_id: &str)
    -> Result<(), IamClientError>;
}

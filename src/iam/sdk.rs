//! [IamApi] implementation backed by the AWS SDK.
//!
//! The SDK is asynchronous, the provisioner is not: every call is driven to completion on a
//! private current-thread runtime.

use std::fmt::Debug;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_iam::Client;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_iam::primitives::DateTime as AwsDateTime;
use aws_sdk_iam::types::{StatusType, Tag};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use super::{AccessKeyMetadata, AccessKeyStatus, IamApi, IamClientError, IamUser, Tags};
use crate::key_cache::AccessKeyMaterial;

pub struct SdkIamClient {
    runtime: Runtime,
    client: Client,
}

impl SdkIamClient {
    /// Builds a client from the default AWS credential chain, optionally pinned to a named
    /// profile and region.
    pub fn new(region: Option<&str>, profile: Option<&str>) -> Result<Self, IamClientError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| IamClientError::Transport(format!("failed to create runtime: {e}")))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = runtime.block_on(loader.load());
        debug!(region = ?sdk_config.region(), "aws configuration loaded");

        Ok(Self {
            runtime,
            client: Client::new(&sdk_config),
        })
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> IamClientError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    if let Some(code) = err.as_service_error().and_then(|e| e.code()) {
        let message = err
            .as_service_error()
            .and_then(|e| e.message())
            .unwrap_or(code)
            .to_string();
        return IamClientError::from_code(code, message);
    }
    IamClientError::Transport(DisplayErrorContext(&err).to_string())
}

fn none_if_not_found<T>(result: Result<T, IamClientError>) -> Result<Option<T>, IamClientError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(IamClientError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn to_chrono(date: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(date.secs(), date.subsec_nanos())
}

fn to_status(status: &StatusType) -> AccessKeyStatus {
    match status {
        StatusType::Active => AccessKeyStatus::Active,
        _ => AccessKeyStatus::Inactive,
    }
}

fn from_status(status: AccessKeyStatus) -> StatusType {
    match status {
        AccessKeyStatus::Active => StatusType::Active,
        AccessKeyStatus::Inactive => StatusType::Inactive,
    }
}

/// IAM returns policy documents URL-encoded.
fn decode_policy_document(document: &str) -> Result<Value, IamClientError> {
    let decoded = urlencoding::decode(document)
        .map_err(|e| IamClientError::Decoder(format!("policy document is not utf-8: {e}")))?;
    serde_json::from_str(&decoded)
        .map_err(|e| IamClientError::Decoder(format!("policy document is not json: {e}")))
}

impl IamApi for SdkIamClient {
    fn get_user(&self, user_name: &str) -> Result<Option<IamUser>, IamClientError> {
        let result = self
            .runtime
            .block_on(self.client.get_user().user_name(user_name).send())
            .map_err(classify);

        Ok(none_if_not_found(result)?
            .and_then(|output| output.user().cloned())
            .map(|user| IamUser {
                user_name: user.user_name().to_string(),
                arn: user.arn().to_string(),
            }))
    }

    fn create_user(&self, user_name: &str, tags: &Tags) -> Result<IamUser, IamClientError> {
        let tags = tags
            .iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(|e| IamClientError::Encoder(format!("invalid tag `{key}`: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .runtime
            .block_on(
                self.client
                    .create_user()
                    .user_name(user_name)
                    .set_tags(Some(tags).filter(|t| !t.is_empty()))
                    .send(),
            )
            .map_err(classify)?;

        let user = output
            .user()
            .ok_or_else(|| IamClientError::Decoder("created user missing in response".into()))?;
        Ok(IamUser {
            user_name: user.user_name().to_string(),
            arn: user.arn().to_string(),
        })
    }

    fn delete_user(&self, user_name: &str) -> Result<(), IamClientError> {
        self.runtime
            .block_on(self.client.delete_user().user_name(user_name).send())
            .map(|_| ())
            .map_err(classify)
    }

    fn get_user_policy(
        &self,
        user_name: &str,
        policy_name: &str,
    ) -> Result<Option<Value>, IamClientError> {
        let result = self
            .runtime
            .block_on(
                self.client
                    .get_user_policy()
                    .user_name(user_name)
                    .policy_name(policy_name)
                    .send(),
            )
            .map_err(classify);

        none_if_not_found(result)?
            .map(|output| decode_policy_document(output.policy_document()))
            .transpose()
    }

    fn put_user_policy(
        &self,
        user_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<(), IamClientError> {
        self.runtime
            .block_on(
                self.client
                    .put_user_policy()
                    .user_name(user_name)
                    .policy_name(policy_name)
                    .policy_document(policy_document)
                    .send(),
            )
            .map(|_| ())
            .map_err(classify)
    }

    fn delete_user_policy(
        &self,
        user_name: &str,
        policy_name: &str,
    ) -> Result<(), IamClientError> {
        self.runtime
            .block_on(
                self.client
                    .delete_user_policy()
                    .user_name(user_name)
                    .policy_name(policy_name)
                    .send(),
            )
            .map(|_| ())
            .map_err(classify)
    }

    fn list_attached_user_policies(&self, user_name: &str) -> Result<Vec<String>, IamClientError> {
        let mut policy_arns = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .runtime
                .block_on(
                    self.client
                        .list_attached_user_policies()
                        .user_name(user_name)
                        .set_marker(marker.take())
                        .send(),
                )
                .map_err(classify)?;

            policy_arns.extend(
                output
                    .attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn().map(str::to_string)),
            );

            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(policy_arns)
    }

    fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<(), IamClientError> {
        self.runtime
            .block_on(
                self.client
                    .attach_user_policy()
                    .user_name(user_name)
                    .policy_arn(policy_arn)
                    .send(),
            )
            .map(|_| ())
            .map_err(classify)
    }

    fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<(), IamClientError> {
        self.runtime
            .block_on(
                self.client
                    .detach_user_policy()
                    .user_name(user_name)
                    .policy_arn(policy_arn)
                    .send(),
            )
            .map(|_| ())
            .map_err(classify)
    }

    fn list_access_keys(
        &self,
        user_name: &str,
    ) -> Result<Vec<AccessKeyMetadata>, IamClientError> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .runtime
                .block_on(
                    self.client
                        .list_access_keys()
                        .user_name(user_name)
                        .set_marker(marker.take())
                        .send(),
                )
                .map_err(classify)?;

            keys.extend(output.access_key_metadata().iter().filter_map(|k| {
                Some(AccessKeyMetadata {
                    access_key_id: k.access_key_id()?.to_string(),
                    status: k.status().map(to_status).unwrap_or(AccessKeyStatus::Inactive),
                    created_at: k.create_date().and_then(to_chrono),
                })
            }));

            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(keys)
    }

    fn create_access_key(&self, user_name: &str) -> Result<AccessKeyMaterial, IamClientError> {
        let output = self
            .runtime
            .block_on(self.client.create_access_key().user_name(user_name).send())
            .map_err(classify)?;

        let key = output
            .access_key()
            .ok_or_else(|| IamClientError::Decoder("access key missing in response".into()))?;
        Ok(AccessKeyMaterial {
            iam_user_name: key.user_name().to_string(),
            access_key_id: key.access_key_id().to_string(),
            secret_access_key: key.secret_access_key().to_string(),
            created_at: key.create_date().and_then(to_chrono).unwrap_or_else(Utc::now),
        })
    }

    fn update_access_key_status(
        &self,
        user_name: &str,
        access_key_id: &str,
        status: AccessKeyStatus,
    ) -> Result<(), IamClientError> {
        self.runtime
            .block_on(
                self.client
                    .update_access_key()
                    .user_name(user_name)
                    .access_key_id(access_key_id)
                    .status(from_status(status))
                    .send(),
            )
            .map(|_| ())
            .map_err(classify)
    }

    fn delete_access_key(
        &self,
        user_name: &str,
        access_key_id: &str,
    ) -> Result<(), IamClientError> {
        self.runtime
            .block_on(
                self.client
                    .delete_access_key()
                    .user_name(user_name)
                    .access_key_id(access_key_id)
                    .send(),
            )
            .map(|_| ())
            .map_err(classify)
    }
}

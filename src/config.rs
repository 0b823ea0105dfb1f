//! Caller-facing configuration, loaded from a JSON file and validated before any remote call.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::github::{DEFAULT_API_URL, Repository, SecretBinding};
use crate::iam::Tags;
use crate::iam::manager::IdentitySpec;
use crate::key_cache::{AccessKeyMaterial, LocalKeyCache};

pub const DEFAULT_INLINE_POLICY_NAME: &str = "github-actions-inline-policy";

const MAX_IAM_USER_NAME_LENGTH: usize = 64;
const RESERVED_SECRET_PREFIX: &str = "GITHUB_";
const PARTITION_SEGMENTS: [&str; 5] = ["gov", "iso", "isob", "isoe", "isof"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config file `{0}`: `{1}`")]
    Read(PathBuf, String),
    #[error("parsing config file `{0}`: `{1}`")]
    Parse(PathBuf, String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Region of the AWS session, also published to the repository.
    pub aws_region: String,
    /// Named profile of the shared AWS config, the default credential chain is used otherwise.
    #[serde(default)]
    pub aws_profile: Option<String>,
    pub iam_user_name: String,
    #[serde(default)]
    pub tags: Tags,
    pub policy_document: Value,
    #[serde(default = "default_inline_policy_name")]
    pub inline_policy_name: String,
    #[serde(default)]
    pub managed_policy_arns: Vec<String>,
    pub access_key_cache_path: PathBuf,
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub secret_names: SecretNames,
}

/// Names of the repository secrets holding each credential.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretNames {
    pub aws_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

impl SecretNames {
    pub fn all(&self) -> [&str; 3] {
        [
            &self.aws_region,
            &self.aws_access_key_id,
            &self.aws_secret_access_key,
        ]
    }
}

fn default_inline_policy_name() -> String {
    DEFAULT_INLINE_POLICY_NAME.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl ProvisionConfig {
    /// Reads, parses and validates the config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_iam_user_name(&self.iam_user_name)?;
        validate_region(&self.aws_region)?;

        if !self.policy_document.is_object() {
            return Err(ConfigError::Invalid(
                "policy_document must be a JSON object".to_string(),
            ));
        }
        if self.inline_policy_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "inline_policy_name must not be empty".to_string(),
            ));
        }
        if let Some(arn) = self
            .managed_policy_arns
            .iter()
            .find(|arn| !arn.starts_with("arn:"))
        {
            return Err(ConfigError::Invalid(format!(
                "managed policy `{arn}` is not an ARN"
            )));
        }
        if self.access_key_cache_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "access_key_cache_path must not be empty".to_string(),
            ));
        }

        if self.github.owner.trim().is_empty() || self.github.repo.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "github owner and repo must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for name in self.github.secret_names.all() {
            validate_secret_name(name)?;
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "secret name `{name}` is used more than once"
                )));
            }
        }

        Ok(())
    }

    pub fn identity_spec(&self) -> IdentitySpec {
        IdentitySpec {
            iam_user_name: self.iam_user_name.clone(),
            tags: self.tags.clone(),
            inline_policy_name: self.inline_policy_name.clone(),
            policy_document: self.policy_document.clone(),
            managed_policy_arns: self.managed_policy_arns.clone(),
        }
    }

    pub fn repository(&self) -> Repository {
        Repository::new(&self.github.owner, &self.github.repo)
    }

    pub fn key_cache(&self) -> LocalKeyCache {
        LocalKeyCache::new(&self.access_key_cache_path)
    }

    /// The three secrets published for a key: region, key id and secret key.
    pub fn secret_bindings(&self, material: &AccessKeyMaterial) -> Vec<SecretBinding> {
        let names = &self.github.secret_names;
        vec![
            SecretBinding::new(&names.aws_region, &self.aws_region),
            SecretBinding::new(&names.aws_access_key_id, &material.access_key_id),
            SecretBinding::new(&names.aws_secret_access_key, &material.secret_access_key),
        ]
    }
}

fn validate_iam_user_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c));
    if name.is_empty() || name.len() > MAX_IAM_USER_NAME_LENGTH || !valid_chars {
        return Err(ConfigError::Invalid(format!(
            "iam user name `{name}` must be 1 to {MAX_IAM_USER_NAME_LENGTH} characters of [A-Za-z0-9+=,.@_-]"
        )));
    }
    Ok(())
}

/// Accepts `<area>-<subarea>-<number>`, optionally with a partition segment such as
/// `us-gov-west-1`.
fn validate_region(region: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = region.split('-').collect();
    let lowercase = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase());

    let valid = match parts[..] {
        [area, subarea, number] => {
            area.len() == 2 && lowercase(area) && lowercase(subarea) && is_number(number)
        }
        [area, partition, subarea, number] => {
            area.len() == 2
                && lowercase(area)
                && PARTITION_SEGMENTS.contains(&partition)
                && lowercase(subarea)
                && is_number(number)
        }
        _ => false,
    };

    if !valid {
        return Err(ConfigError::Invalid(format!(
            "`{region}` is not a valid AWS region"
        )));
    }
    Ok(())
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn validate_secret_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(ConfigError::Invalid(format!(
            "secret name `{name}` may only contain alphanumeric characters or underscores and must not start with a number"
        )));
    }
    if name.to_ascii_uppercase().starts_with(RESERVED_SECRET_PREFIX) {
        return Err(ConfigError::Invalid(format!(
            "secret name `{name}` must not start with the `{RESERVED_SECRET_PREFIX}` prefix"
        )));
    }
    Ok(())
}

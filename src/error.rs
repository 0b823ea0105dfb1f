use thiserror::Error;

use crate::github::GitHubClientError;
use crate::iam::IamClientError;
use crate::key_cache::CacheError;
use crate::sealer::SealError;

/// Failure of a provisioning step.
///
/// Steps that delete resources never report a missing target, so `NotFound` is only raised
/// when a resource required by a setup step is unreachable.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("authentication failed: `{0}`")]
    Auth(String),
    #[error("permission denied: `{0}`")]
    Permission(String),
    #[error("required resource not found: `{0}`")]
    NotFound(String),
    #[error("invalid policy: `{0}`")]
    Policy(String),
    #[error(
        "iam user `{user_name}` already has the maximum number of access keys and none is cached locally, delete one manually: `{message}`"
    )]
    KeyLimit { user_name: String, message: String },
    #[error("encrypting secret value: `{0}`")]
    Encryption(#[from] SealError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("iam request failed: `{0}`")]
    Iam(IamClientError),
    #[error("github request failed: `{0}`")]
    GitHub(GitHubClientError),
}

impl From<IamClientError> for ProvisionError {
    fn from(err: IamClientError) -> Self {
        match err {
            IamClientError::NotFound(msg) => Self::NotFound(msg),
            IamClientError::Auth(msg) => Self::Auth(msg),
            IamClientError::PermissionDenied(msg) => Self::Permission(msg),
            IamClientError::MalformedPolicy(msg) => Self::Policy(msg),
            err => Self::Iam(err),
        }
    }
}

impl From<GitHubClientError> for ProvisionError {
    fn from(err: GitHubClientError) -> Self {
        match err {
            GitHubClientError::NotFound(msg) => Self::NotFound(msg),
            GitHubClientError::Unauthorized(msg) => Self::Auth(msg),
            GitHubClientError::Forbidden(msg) => Self::Permission(msg),
            err => Self::GitHub(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn iam_errors_map_to_the_taxonomy() {
        assert_matches!(
            ProvisionError::from(IamClientError::Auth("expired".into())),
            ProvisionError::Auth(_)
        );
        assert_matches!(
            ProvisionError::from(IamClientError::PermissionDenied("iam:CreateUser".into())),
            ProvisionError::Permission(_)
        );
        assert_matches!(
            ProvisionError::from(IamClientError::MalformedPolicy("syntax".into())),
            ProvisionError::Policy(_)
        );
        assert_matches!(
            ProvisionError::from(IamClientError::DeleteConflict("keys".into())),
            ProvisionError::Iam(IamClientError::DeleteConflict(_))
        );
    }

    #[test]
    fn github_errors_map_to_the_taxonomy() {
        assert_matches!(
            ProvisionError::from(GitHubClientError::Unauthorized("bad token".into())),
            ProvisionError::Auth(_)
        );
        assert_matches!(
            ProvisionError::from(GitHubClientError::NotFound("repo".into())),
            ProvisionError::NotFound(_)
        );
        assert_matches!(
            ProvisionError::from(GitHubClientError::Forbidden("scope".into())),
            ProvisionError::Permission(_)
        );
    }
}

use thiserror::Error;

use crate::reconcile::RemoteError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IamClientError {
    #[error("iam entity not found: `{0}`")]
    NotFound(String),
    #[error("iam entity already exists: `{0}`")]
    AlreadyExists(String),
    #[error("iam limit exceeded: `{0}`")]
    LimitExceeded(String),
    #[error("malformed iam policy: `{0}`")]
    MalformedPolicy(String),
    #[error("not authorized to perform the iam action: `{0}`")]
    PermissionDenied(String),
    #[error("invalid aws credentials: `{0}`")]
    Auth(String),
    #[error("iam entity still has dependent resources: `{0}`")]
    DeleteConflict(String),
    #[error("iam service error `{code}`: `{message}`")]
    Service { code: String, message: String },
    #[error("error building the iam request: `{0}`")]
    Encoder(String),
    #[error("error decoding the iam response: `{0}`")]
    Decoder(String),
    #[error("transport error: `{0}`")]
    Transport(String),
}

impl IamClientError {
    /// Classifies an AWS error code as returned by the IAM query API.
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "NoSuchEntity" => Self::NotFound(message),
            "EntityAlreadyExists" => Self::AlreadyExists(message),
            "LimitExceeded" => Self::LimitExceeded(message),
            "MalformedPolicyDocument" | "InvalidInput" => Self::MalformedPolicy(message),
            "AccessDenied" | "AccessDeniedException" | "UnauthorizedOperation" => {
                Self::PermissionDenied(message)
            }
            "InvalidClientTokenId"
            | "SignatureDoesNotMatch"
            | "ExpiredToken"
            | "IncompleteSignature"
            | "UnrecognizedClientException"
            | "MissingAuthenticationToken" => Self::Auth(message),
            "DeleteConflict" => Self::DeleteConflict(message),
            code => Self::Service {
                code: code.to_string(),
                message,
            },
        }
    }
}

impl RemoteError for IamClientError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

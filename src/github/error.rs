use thiserror::Error;

use crate::reconcile::RemoteError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GitHubClientError {
    #[error("github resource not found: `{0}`")]
    NotFound(String),
    #[error("github rejected the token: `{0}`")]
    Unauthorized(String),
    #[error("github token lacks the required permission: `{0}`")]
    Forbidden(String),
    #[error("unsuccessful github response, status `{0}`: `{1}`")]
    UnsuccessfulResponse(u16, String),
    #[error("error building the github request: `{0}`")]
    Encoder(String),
    #[error("error decoding the github response: `{0}`")]
    Decoder(String),
    #[error("transport error: `{0}`")]
    Transport(String),
}

impl RemoteError for GitHubClientError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderValue, Method, Request, Response, StatusCode, Uri};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::http_client::HttpClient;

use super::{
    GitHubClientError, GitHubToken, RepoPublicKey, Repository, SecretMetadata, SecretsApi,
};

const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";
const CLIENT_USER_AGENT: &str = concat!("gh-aws-creds/", env!("CARGO_PKG_VERSION"));

/// Error payload returned by the GitHub REST API.
#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Implementation of [SecretsApi] on top of the GitHub REST API.
pub struct HttpGitHubClient<C: HttpClient> {
    http_client: C,
    api_url: String,
    token: GitHubToken,
}

impl<C: HttpClient> HttpGitHubClient<C> {
    pub fn new(http_client: C, api_url: &str, token: GitHubToken) -> Self {
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn secrets_endpoint(
        &self,
        repository: &Repository,
        leaf: &str,
    ) -> Result<Uri, GitHubClientError> {
        format!(
            "{}/repos/{}/{}/actions/secrets/{}",
            self.api_url,
            urlencoding::encode(&repository.owner),
            urlencoding::encode(&repository.name),
            urlencoding::encode(leaf)
        )
        .parse()
        .map_err(|e| GitHubClientError::Encoder(format!("invalid endpoint: {e}")))
    }

    fn build_request(
        &self,
        method: Method,
        uri: Uri,
        body: Option<Vec<u8>>,
    ) -> Result<Request<Vec<u8>>, GitHubClientError> {
        let mut bearer_token_header =
            HeaderValue::from_str(&format!("Bearer {}", self.token.expose())).map_err(|_| {
                GitHubClientError::Encoder(
                    "invalid HTTP header value set for Authorization".to_string(),
                )
            })?;
        bearer_token_header.set_sensitive(true);

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(AUTHORIZATION, bearer_token_header);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }

        builder
            .body(body.unwrap_or_default())
            .map_err(|e| GitHubClientError::Encoder(format!("failed to build request: {e}")))
    }

    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, GitHubClientError> {
        debug!(method = %request.method(), uri = %request.uri(), "calling github");
        let response = self
            .http_client
            .send(request)
            .map_err(|e| GitHubClientError::Transport(e.to_string()))?;

        check_status(response)
    }
}

fn check_status(response: Response<Vec<u8>>) -> Result<Response<Vec<u8>>, GitHubClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = serde_json::from_slice::<ApiErrorBody>(response.body())
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(response.body()).into_owned());

    Err(match status {
        StatusCode::UNAUTHORIZED => GitHubClientError::Unauthorized(message),
        StatusCode::FORBIDDEN => GitHubClientError::Forbidden(message),
        StatusCode::NOT_FOUND => GitHubClientError::NotFound(message),
        status => GitHubClientError::UnsuccessfulResponse(status.as_u16(), message),
    })
}

impl<C: HttpClient> SecretsApi for HttpGitHubClient<C> {
    fn get_public_key(&self, repository: &Repository) -> Result<RepoPublicKey, GitHubClientError> {
        let uri = self.secrets_endpoint(repository, "public-key")?;
        let response = self.send(self.build_request(Method::GET, uri, None)?)?;

        serde_json::from_slice(response.body())
            .map_err(|e| GitHubClientError::Decoder(format!("failed to decode public key: {e}")))
    }

    fn get_secret(
        &self,
        repository: &Repository,
        secret_name: &str,
    ) -> Result<Option<SecretMetadata>, GitHubClientError> {
        let uri = self.secrets_endpoint(repository, secret_name)?;
        let response = match self.send(self.build_request(Method::GET, uri, None)?) {
            Ok(response) => response,
            Err(GitHubClientError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        serde_json::from_slice(response.body())
            .map(Some)
            .map_err(|e| GitHubClientError::Decoder(format!("failed to decode secret: {e}")))
    }

    fn put_secret(
        &self,
        repository: &Repository,
        secret_name: &str,
        encrypted_value: &str,
        key_id: &str,
    ) -> Result<(), GitHubClientError> {
        let uri = self.secrets_endpoint(repository, secret_name)?;
        let body = serde_json::to_vec(&json!({
            "encrypted_value": encrypted_value,
            "key_id": key_id,
        }))
        .map_err(|e| GitHubClientError::Encoder(format!("failed to encode JSON: {e}")))?;

        self.send(self.build_request(Method::PUT, uri, Some(body))?)
            .map(|_| ())
    }

    fn delete_secret(
        &self,
        repository: &Repository,
        secret_name: &str,
    ) -> Result<(), GitHubClientError> {
        let uri = self.secrets_endpoint(repository, secret_name)?;
        self.send(self.build_request(Method::DELETE, uri, None)?)
            .map(|_| ())
    }
}

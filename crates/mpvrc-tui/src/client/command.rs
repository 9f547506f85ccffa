//! Command Client: posts raw mpv commands to `/command`.
//!
//! Requests are independent of the event stream: nothing here waits for or
//! matches an event, and nothing here touches the Property Store.

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use mpvrc_proto::protocol::{CommandForm, FileSystemListing};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid JSON in response: {0}")]
    Json(#[source] serde_json::Error),
    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct CommandClient {
    http: Client,
    base_url: String,
}

impl CommandClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Post one command.  A non-success status is an error carrying the
    /// backend's message; no retry.
    pub async fn send(&self, args: &[Value]) -> Result<Response, ClientError> {
        let form = CommandForm::encode(args).map_err(ClientError::Encode)?;
        debug!("command: {}", form.command);

        let response = self.http.post(self.url("/command")).form(&form).send().await?;
        ensure_success(response).await
    }

    /// Post a command and read its JSON result.
    pub async fn query(&self, args: &[Value]) -> Result<Value, ClientError> {
        let body = self.send(args).await?.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(ClientError::Json)
    }

    /// Fetch a directory listing.  With `parent_of`, the backend lists the
    /// directory containing `path`.
    pub async fn list_directory(&self, path: &str, parent_of: bool) -> Result<FileSystemListing, ClientError> {
        let mut query = vec![("path", path)];
        if parent_of {
            query.push(("dir", "true"));
        }
        let response = self
            .http
            .get(self.url("/file-system"))
            .query(&query)
            .send()
            .await?;
        let body = ensure_success(response).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(ClientError::Json)
    }
}

pub(crate) async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("backend returned {}: {}", status, body);
    Err(ClientError::Status { status, body })
}

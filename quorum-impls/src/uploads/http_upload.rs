use async_trait::async_trait;
use log::warn;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use quorum_core::{MediaUpload, UploadError, UploadedMedia};

/// Environment variable naming the endpoint uploads are posted to.
pub const UPLOAD_URL_VAR: &str = "QUORUM_UPLOAD_URL";

/// A [MediaUpload] posting multipart bodies to an HTTP endpoint.
///
/// The endpoint is expected to answer a successful upload with a JSON
/// body carrying the public `url` of the stored object.
pub struct HttpUpload {
    endpoint: Url,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
}

impl HttpUpload {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            client: Client::new(),
        }
    }

    /// Builds an uploader from [UPLOAD_URL_VAR], when it is set and parses
    /// as a URL.
    pub fn from_env() -> Option<Self> {
        let raw = std::env::var(UPLOAD_URL_VAR).ok()?;

        match Url::parse(&raw) {
            Ok(endpoint) => Some(Self::new(endpoint)),
            Err(error) => {
                warn!("{} is not a valid url: {}", UPLOAD_URL_VAR, error);
                None
            }
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// What an endpoint response means, separated from the transport.
    /// Any non-2xx status is terminal, and a success body must carry a
    /// non-empty `url`.
    fn accept(status: StatusCode, body: UploadResponse) -> Result<UploadedMedia, UploadError> {
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }

        body.url
            .filter(|url| !url.is_empty())
            .map(|url| UploadedMedia { url })
            .ok_or(UploadError::MissingUrl)
    }
}

#[async_trait]
impl MediaUpload for HttpUpload {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadedMedia, UploadError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();

        // Error responses aren't required to carry a decodable body.
        let body = if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| UploadError::Transport(e.to_string()))?
        } else {
            UploadResponse { url: None }
        };

        Self::accept(status, body)
    }
}

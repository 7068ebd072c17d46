use async_trait::async_trait;
use thiserror::Error;

/// A successfully stored media object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    /// Public URL the object can be fetched from.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("upload endpoint answered with status {0}")]
    Status(u16),
    #[error("upload response carried no usable url")]
    MissingUrl,
    #[error("upload transport failure: {0}")]
    Transport(String),
}

/// Side-channel storage for binary blobs, used for proof photos.
///
/// The document store never sees the bytes, only the URL returned here
/// gets written into documents.
#[async_trait]
pub trait MediaUpload: Send + Sync + 'static {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadedMedia, UploadError>;
}

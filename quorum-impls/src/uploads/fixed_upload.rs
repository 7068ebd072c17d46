use async_trait::async_trait;
use parking_lot::Mutex;

use quorum_core::{MediaUpload, UploadError, UploadedMedia};

/// A [MediaUpload] that stores nothing and mints predictable URLs.
///
/// Used in tests and local development, where the bytes themselves don't
/// matter but the resulting URL does.
pub struct FixedUpload {
    base: String,
    state: Mutex<UploadState>,
}

#[derive(Default)]
struct UploadState {
    uploads: Vec<RecordedUpload>,
    fail_next: Option<String>,
}

/// What an upload looked like when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    pub url: String,
}

impl FixedUpload {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            state: Default::default(),
        }
    }

    /// Makes the next upload fail with [UploadError::Transport].
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }

    /// Every upload accepted so far, oldest first.
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.lock().uploads.clone()
    }
}

impl Default for FixedUpload {
    fn default() -> Self {
        Self::new("https://media.invalid")
    }
}

#[async_trait]
impl MediaUpload for FixedUpload {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadedMedia, UploadError> {
        let mut state = self.state.lock();

        if let Some(reason) = state.fail_next.take() {
            return Err(UploadError::Transport(reason));
        }

        let url = format!("{}/{}-{}", self.base, state.uploads.len() + 1, filename);

        state.uploads.push(RecordedUpload {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
            url: url.clone(),
        });

        Ok(UploadedMedia { url })
    }
}

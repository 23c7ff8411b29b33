//! In-process provider for tests. Replies are scripted per attempt number.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ContentPart, FileHandle, GenerativeProvider, ProviderError};

type ReplyFn = dyn Fn(usize) -> Result<String, ProviderError> + Send + Sync;

/// What the stub saw when asked to upload a file.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub path: PathBuf,
    pub existed: bool,
    pub contents: Vec<u8>,
    pub mime_type: String,
}

pub struct StubProvider {
    reply: Box<ReplyFn>,
    fail_uploads: bool,
    attempts: AtomicUsize,
    uploads: Mutex<Vec<UploadRecord>>,
    prompts: Mutex<Vec<String>>,
    parts: Mutex<Vec<ContentPart>>,
}

impl StubProvider {
    /// Replies with `reply(attempt)`; attempts are numbered from 1.
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(usize) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            fail_uploads: false,
            attempts: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            parts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn always_rate_limited() -> Self {
        Self::new(|_| Err(ProviderError::RateLimited("RESOURCE_EXHAUSTED".into())))
    }

    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_parts(&self) -> Vec<ContentPart> {
        self.parts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeProvider for StubProvider {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<FileHandle, ProviderError> {
        let contents = std::fs::read(path).unwrap_or_default();
        self.uploads.lock().unwrap().push(UploadRecord {
            path: path.to_path_buf(),
            existed: path.exists(),
            contents,
            mime_type: mime_type.to_string(),
        });

        if self.fail_uploads {
            return Err(ProviderError::Api {
                status: 400,
                message: "upload rejected".into(),
            });
        }

        Ok(FileHandle {
            uri: "https://files.example/stub-1".into(),
            mime_type: mime_type.to_string(),
        })
    }

    async fn generate(&self, prompt: &str, parts: &[ContentPart]) -> Result<String, ProviderError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.to_string());
        *self.parts.lock().unwrap() = parts.to_vec();
        (self.reply)(attempt)
    }

    fn model(&self) -> &str {
        "stub-model"
    }
}

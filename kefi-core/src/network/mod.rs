pub mod backend_client;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioPayload;
use crate::operations::OperationOptions;

pub use backend_client::BackendClient;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to build http client: {0}")]
    ClientBuild(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TextProcessRequest<'a> {
    pub operation: &'a str,
    pub text: &'a str,
    pub options: &'a OperationOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteOperationInfo {
    pub id: String,
    #[serde(default)]
    pub requires_llm: bool,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

pub trait TextBackend: Send + Sync {
    fn process_text<'a>(
        &'a self,
        request: TextProcessRequest<'a>,
    ) -> BoxFuture<'a, Result<String, NetworkError>>;
}

pub trait TranscriptionService: Send + Sync {
    fn transcribe(&self, payload: AudioPayload) -> BoxFuture<'_, Result<String, NetworkError>>;
}

use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::multipart;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{NetworkError, RemoteOperationInfo, TextBackend, TextProcessRequest, TranscriptionService};
use crate::audio::AudioPayload;
use crate::config::CoreSettings;

const TEXT_PROCESS_PATH: &str = "/api/text/process";
const TRANSCRIBE_PATH: &str = "/api/transcription/audio";
const OPERATIONS_INFO_PATH: &str = "/api/text/operations/info";
const AUDIO_FORM_FIELD: &str = "audio";
const SLOW_REQUEST_MS: u64 = 2_000;

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    processed_text: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct OperationsInfoResponse {
    operations: Vec<RemoteOperationInfo>,
}

pub struct BackendClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(settings: &CoreSettings) -> Result<Self, NetworkError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|err| NetworkError::ClientBuild(err.to_string()))?;

        Ok(Self {
            http_client,
            base_url: settings.backend_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn process(&self, request: TextProcessRequest<'_>) -> Result<String, NetworkError> {
        let started = Instant::now();
        let response = self
            .http_client
            .post(self.endpoint(TEXT_PROCESS_PATH))
            .json(&request)
            .send()
            .await
            .map_err(|err| NetworkError::Request(err.to_string()))?;

        let payload: ProcessResponse = decode_success(response).await?;
        log_latency("text.process", request.operation, started);
        Ok(payload.processed_text)
    }

    pub async fn transcribe_audio(&self, payload: AudioPayload) -> Result<String, NetworkError> {
        let started = Instant::now();
        let byte_len = payload.bytes.len();
        let part = multipart::Part::bytes(payload.bytes)
            .file_name(payload.file_name)
            .mime_str(payload.mime_type)
            .map_err(|err| NetworkError::Request(err.to_string()))?;
        let form = multipart::Form::new().part(AUDIO_FORM_FIELD, part);

        let response = self
            .http_client
            .post(self.endpoint(TRANSCRIBE_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(|err| NetworkError::Request(err.to_string()))?;

        let transcript: TranscriptionResponse = decode_success(response).await?;
        debug!(
            bytes = byte_len,
            duration_ms = payload.duration_ms,
            "audio payload transcribed"
        );
        log_latency("transcription", payload.mime_type, started);
        Ok(transcript.text)
    }

    pub async fn fetch_operation_info(&self) -> Result<Vec<RemoteOperationInfo>, NetworkError> {
        let response = self
            .http_client
            .get(self.endpoint(OPERATIONS_INFO_PATH))
            .send()
            .await
            .map_err(|err| NetworkError::Request(err.to_string()))?;

        let payload: OperationsInfoResponse = decode_success(response).await?;
        info!(
            operations = payload.operations.len(),
            "fetched backend operation info"
        );
        Ok(payload.operations)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl TextBackend for BackendClient {
    fn process_text<'a>(
        &'a self,
        request: TextProcessRequest<'a>,
    ) -> BoxFuture<'a, Result<String, NetworkError>> {
        self.process(request).boxed()
    }
}

impl TranscriptionService for BackendClient {
    fn transcribe(&self, payload: AudioPayload) -> BoxFuture<'_, Result<String, NetworkError>> {
        self.transcribe_audio(payload).boxed()
    }
}

async fn decode_success<T>(response: reqwest::Response) -> Result<T, NetworkError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body
            }
        });
        warn!(status = status.as_u16(), "backend request failed: {message}");
        return Err(NetworkError::Status {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|err| NetworkError::Decode(err.to_string()))
}

fn extract_error_message(payload: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(payload).ok()?;
    value
        .get("error")
        .and_then(|item| item.as_str())
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

fn log_latency(kind: &str, subject: &str, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if elapsed_ms >= SLOW_REQUEST_MS {
        warn!(kind, subject, elapsed_ms, "backend request is slower than expected");
    } else {
        debug!(kind, subject, elapsed_ms, "backend request completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{ListOrder, OperationOptions};
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> BackendClient {
        let settings = CoreSettings {
            backend_url: format!("{}/", server.url()),
            ..CoreSettings::default()
        };
        match BackendClient::new(&settings) {
            Ok(client) => client,
            Err(err) => panic!("failed to build client: {err}"),
        }
    }

    #[tokio::test]
    async fn process_posts_operation_text_and_options() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", TEXT_PROCESS_PATH)
            .match_body(Matcher::PartialJson(json!({
                "operation": "reorder-list",
                "text": "b\na",
                "options": { "order": "desc" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"processed_text":"b\na","operation":"reorder-list"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let options = OperationOptions {
            order: Some(ListOrder::Desc),
            ..OperationOptions::default()
        };
        let result = client
            .process(TextProcessRequest {
                operation: "reorder-list",
                text: "b\na",
                options: &options,
            })
            .await
            .expect("process should succeed");

        assert_eq!(result, "b\na");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn instruction_is_sent_as_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", TEXT_PROCESS_PATH)
            .match_body(Matcher::PartialJson(json!({
                "options": { "prompt": "make it formal" }
            })))
            .with_status(200)
            .with_body(r#"{"processed_text":"Greetings."}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let options = OperationOptions::with_instruction("make it formal");
        let result = client
            .process(TextProcessRequest {
                operation: "custom-prompt",
                text: "hey",
                options: &options,
            })
            .await
            .expect("process should succeed");

        assert_eq!(result, "Greetings.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_surfaces_backend_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TEXT_PROCESS_PATH)
            .with_status(501)
            .with_body(r#"{"error":"Summarization requires LLM integration."}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let options = OperationOptions::default();
        let result = client
            .process(TextProcessRequest {
                operation: "summarize",
                text: "long text",
                options: &options,
            })
            .await;

        match result {
            Err(NetworkError::Status { status, message }) => {
                assert_eq!(status, 501);
                assert!(message.contains("LLM integration"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TEXT_PROCESS_PATH)
            .with_status(200)
            .with_body(r#"{"unexpected":true}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let options = OperationOptions::default();
        let result = client
            .process(TextProcessRequest {
                operation: "clean-transcription",
                text: "um hi",
                options: &options,
            })
            .await;

        assert!(matches!(result, Err(NetworkError::Decode(_))));
    }

    #[tokio::test]
    async fn transcription_uploads_multipart_audio() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", TRANSCRIBE_PATH)
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".to_string()),
            )
            .match_body(Matcher::Regex("name=\"audio\"".to_string()))
            .with_status(200)
            .with_body(r#"{"text":"hello there","language":"en","duration":1.2}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let payload = AudioPayload {
            bytes: vec![0_u8; 64],
            mime_type: "audio/wav",
            file_name: "recording.wav",
            duration_ms: 1_200,
        };
        let text = client
            .transcribe(payload)
            .await
            .expect("transcription should succeed");

        assert_eq!(text, "hello there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn operation_info_lists_remote_availability() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", OPERATIONS_INFO_PATH)
            .with_status(200)
            .with_body(
                r#"{"operations":[
                    {"id":"clean-transcription","requires_llm":false,"available":true},
                    {"id":"custom-prompt","requires_llm":true,"available":false}
                ]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let info = client
            .fetch_operation_info()
            .await
            .expect("info should load");

        assert_eq!(info.len(), 2);
        assert!(info[0].available);
        assert!(!info[1].available && info[1].requires_llm);
    }

    #[test]
    fn extract_error_ignores_blank_messages() {
        assert_eq!(extract_error_message(r#"{"error":"  "}"#), None);
        assert_eq!(
            extract_error_message(r#"{"error":"Text required"}"#),
            Some("Text required".to_string())
        );
        assert_eq!(extract_error_message("plain text"), None);
    }
}

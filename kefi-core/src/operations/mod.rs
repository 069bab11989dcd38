pub mod catalog;
pub mod local;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::network::{NetworkError, TextBackend, TextProcessRequest};

pub use catalog::{Catalog, build_catalog};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("operation `{0}` requires an instruction")]
    MissingInstruction(String),
    #[error("the selected text changed while the operation was running; select it again")]
    StaleSelection,
    #[error("operation failed: {0}")]
    HandlerFailure(String),
    #[error("no text is selected")]
    NoSelection,
    #[error("another operation is still running")]
    Busy,
}

impl From<NetworkError> for OperationError {
    fn from(err: NetworkError) -> Self {
        OperationError::HandlerFailure(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Format,
    Transform,
    Ai,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Format, Category::Transform, Category::Ai];

    pub fn label(self) -> &'static str {
        match self {
            Category::Format => "Format",
            Category::Transform => "Transform",
            Category::Ai => "AI",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    Asc,
    Desc,
    Reverse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationOptions {
    #[serde(rename = "prompt", default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<ListOrder>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OperationOptions {
    pub fn with_instruction(instruction: impl Into<String>) -> Self {
        Self {
            instruction: Some(instruction.into()),
            ..Self::default()
        }
    }

    pub fn has_instruction(&self) -> bool {
        self.instruction
            .as_deref()
            .is_some_and(|instruction| !instruction.trim().is_empty())
    }
}

pub type LocalTransform = fn(&str, &OperationOptions) -> Result<String, String>;
pub type CapabilityPredicate = fn(&str) -> bool;

#[derive(Debug, Clone)]
pub enum OperationKind {
    Local(LocalTransform),
    BackendSimple,
    BackendPrompted,
    Disabled { reason: String },
}

#[derive(Clone)]
pub struct OperationDescriptor {
    id: String,
    label: String,
    category: Category,
    kind: OperationKind,
    predicate: CapabilityPredicate,
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("category", &self.category)
            .field("kind", &self.kind)
            .finish()
    }
}

impl OperationDescriptor {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        category: Category,
        kind: OperationKind,
    ) -> Self {
        let predicate = match kind {
            OperationKind::Local(_) => has_text,
            _ => has_visible_text,
        };
        Self {
            id: id.into(),
            label: label.into(),
            category,
            kind,
            predicate,
        }
    }

    pub fn with_predicate(mut self, predicate: CapabilityPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn is_async(&self) -> bool {
        matches!(
            self.kind,
            OperationKind::BackendSimple | OperationKind::BackendPrompted
        )
    }

    pub fn requires_prompt(&self) -> bool {
        matches!(self.kind, OperationKind::BackendPrompted)
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.kind, OperationKind::Disabled { .. })
    }

    /// Evaluates the capability predicate. A panicking predicate counts as
    /// unavailable.
    pub fn is_available(&self, text: &str) -> bool {
        if self.is_disabled() {
            return false;
        }

        let predicate = self.predicate;
        match catch_unwind(AssertUnwindSafe(|| predicate(text))) {
            Ok(available) => available,
            Err(_) => {
                warn!(
                    operation = self.id.as_str(),
                    "capability predicate panicked; treating operation as unavailable"
                );
                false
            }
        }
    }

    pub async fn invoke(
        &self,
        text: &str,
        options: &OperationOptions,
        backend: &dyn TextBackend,
    ) -> Result<String, OperationError> {
        match &self.kind {
            OperationKind::Local(transform) => {
                let transform = *transform;
                match catch_unwind(AssertUnwindSafe(|| transform(text, options))) {
                    Ok(result) => result.map_err(OperationError::HandlerFailure),
                    Err(_) => Err(OperationError::HandlerFailure(format!(
                        "local operation `{}` panicked",
                        self.id
                    ))),
                }
            }
            OperationKind::BackendSimple | OperationKind::BackendPrompted => {
                if self.requires_prompt() && !options.has_instruction() {
                    return Err(OperationError::MissingInstruction(self.id.clone()));
                }
                let request = TextProcessRequest {
                    operation: &self.id,
                    text,
                    options,
                };
                Ok(backend.process_text(request).await?)
            }
            OperationKind::Disabled { reason } => Err(OperationError::HandlerFailure(format!(
                "operation `{}` is disabled: {reason}",
                self.id
            ))),
        }
    }
}

pub fn has_text(text: &str) -> bool {
    !text.is_empty()
}

pub fn has_visible_text(text: &str) -> bool {
    !text.trim().is_empty()
}

pub fn has_multiple_lines(text: &str) -> bool {
    text.lines().filter(|line| !line.trim().is_empty()).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;

    struct EchoBackend;

    impl TextBackend for EchoBackend {
        fn process_text<'a>(
            &'a self,
            request: TextProcessRequest<'a>,
        ) -> BoxFuture<'a, Result<String, NetworkError>> {
            let echoed = format!("{}:{}", request.operation, request.text);
            async move { Ok(echoed) }.boxed()
        }
    }

    fn panicking_predicate(_text: &str) -> bool {
        panic!("predicate bug")
    }

    fn failing_transform(_text: &str, _options: &OperationOptions) -> Result<String, String> {
        Err("cannot transform".to_string())
    }

    #[test]
    fn kind_drives_capability_flags() {
        let local = OperationDescriptor::new(
            "uppercase",
            "UPPERCASE",
            Category::Format,
            OperationKind::Local(local::uppercase),
        );
        let prompted = OperationDescriptor::new(
            "custom-prompt",
            "Custom prompt",
            Category::Ai,
            OperationKind::BackendPrompted,
        );
        assert!(!local.is_async() && !local.requires_prompt());
        assert!(prompted.is_async() && prompted.requires_prompt());
    }

    #[test]
    fn panicking_predicate_is_unavailable() {
        let descriptor = OperationDescriptor::new(
            "broken",
            "Broken",
            Category::Transform,
            OperationKind::BackendSimple,
        )
        .with_predicate(panicking_predicate);
        assert!(!descriptor.is_available("anything"));
    }

    #[test]
    fn disabled_is_never_available() {
        let descriptor = OperationDescriptor::new(
            "summarize",
            "Summarize",
            Category::Ai,
            OperationKind::Disabled {
                reason: "not enabled".to_string(),
            },
        );
        assert!(!descriptor.is_available("plenty of text"));
    }

    #[tokio::test]
    async fn prompted_invoke_requires_instruction() {
        let descriptor = OperationDescriptor::new(
            "custom-prompt",
            "Custom prompt",
            Category::Ai,
            OperationKind::BackendPrompted,
        );
        let result = descriptor
            .invoke("text", &OperationOptions::with_instruction("   "), &EchoBackend)
            .await;
        assert_eq!(
            result,
            Err(OperationError::MissingInstruction("custom-prompt".to_string()))
        );
    }

    #[tokio::test]
    async fn backend_invoke_forwards_operation_id() {
        let descriptor = OperationDescriptor::new(
            "clean-transcription",
            "Clean up",
            Category::Transform,
            OperationKind::BackendSimple,
        );
        let result = descriptor
            .invoke("um hello", &OperationOptions::default(), &EchoBackend)
            .await;
        assert_eq!(result, Ok("clean-transcription:um hello".to_string()));
    }

    #[tokio::test]
    async fn local_errors_become_handler_failures() {
        let descriptor = OperationDescriptor::new(
            "fails",
            "Fails",
            Category::Format,
            OperationKind::Local(failing_transform),
        );
        let result = descriptor
            .invoke("abc", &OperationOptions::default(), &EchoBackend)
            .await;
        assert_eq!(
            result,
            Err(OperationError::HandlerFailure("cannot transform".to_string()))
        );
    }

    #[test]
    fn options_serialize_instruction_as_prompt() {
        let mut options = OperationOptions::with_instruction("shorter");
        options
            .extra
            .insert("max_tokens".to_string(), Value::from(120));
        let value = serde_json::to_value(&options).expect("serialize");
        assert_eq!(value["prompt"], "shorter");
        assert_eq!(value["max_tokens"], 120);
        assert!(value.get("order").is_none());
    }

    #[test]
    fn multiple_lines_ignores_blank_lines() {
        assert!(has_multiple_lines("- b\n\n- a"));
        assert!(!has_multiple_lines("- only\n   \n"));
    }
}

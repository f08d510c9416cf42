//! Hosted assistant service client.
//!
//! The rest of AskDocs talks to the assistant only through the
//! [`AssistantApi`] capability trait. [`OpenAiAssistant`] implements it over
//! the OpenAI Assistants v1 REST API; tests substitute scripted fakes.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use askdocs_shared::Result;

pub use openai::{AssistantConfig, OpenAiAssistant};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Author of a message added to a remote thread. Assistants v1 only accepts
/// user-authored messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// Lifecycle status of a remote run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    /// A status this client does not know. Treated as still running.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled
        )
    }
}

/// One message read back from a remote thread.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteMessage {
    pub id: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl RemoteMessage {
    /// Text segments joined by a blank line. Non-text segments are ignored.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.value.as_str()),
                MessageContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A typed content segment of a remote message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextContent {
    pub value: String,
}

/// Tools an assistant may be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantTool {
    Retrieval,
}

/// Parameters for creating a remote assistant.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantSpec {
    pub model: String,
    pub instructions: String,
    pub tools: Vec<AssistantTool>,
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// Operations AskDocs needs from the hosted assistant service.
///
/// Constructed once per process and shared as `Arc<dyn AssistantApi>`.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Create an empty conversation thread, returning its id.
    async fn create_thread(&self) -> Result<String>;

    /// Append a message to a thread, returning the message id.
    async fn add_message(&self, thread_id: &str, role: Role, text: &str) -> Result<String>;

    /// Start a run of `assistant_id` on a thread, returning the run id.
    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<String>;

    /// Current status of a run.
    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus>;

    /// All messages created after `after_message_id`, oldest first.
    async fn list_messages_after(
        &self,
        thread_id: &str,
        after_message_id: &str,
    ) -> Result<Vec<RemoteMessage>>;

    /// Upload a retrieval file, returning the file id.
    async fn upload_file(&self, file_name: &str, contents: &str) -> Result<String>;

    /// Make an uploaded file available to an assistant.
    async fn attach_file(&self, assistant_id: &str, file_id: &str) -> Result<()>;

    /// Create an assistant, returning its id.
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String>;
}

//! Core domain records for AskDocs.
//!
//! Records reference each other only through the plain string keys `url` and
//! `session_id`; the store resolves them through its unique indexes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// One ingested documentation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identity, stable across content replacements.
    pub id: String,
    /// Source page URL (unique natural key).
    pub url: String,
    /// Rendered Markdown-like text.
    pub text: String,
    /// Remote file uploaded for this text, if any. Reset when the text changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_file_id: Option<String>,
    /// When the row was inserted or last replaced.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ConversationThread
// ---------------------------------------------------------------------------

/// Binds a caller-supplied session to a remote conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    /// Caller/UI session identifier (unique natural key).
    pub session_id: String,
    /// Opaque thread identifier issued by the assistant service.
    pub remote_thread_id: String,
    /// When the mapping was persisted.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One turn of a session's visible transcript. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic store sequence number.
    pub id: i64,
    /// Owning session.
    pub session_id: String,
    /// `true` for a user-authored turn, `false` for an assistant reply.
    pub is_viewer: bool,
    /// Rendered content of the turn.
    pub text: String,
    pub created_at: DateTime<Utc>,
}

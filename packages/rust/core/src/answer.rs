//! Answer poll loop.
//!
//! A question moves through `Submitted → Polling → terminal`. Only
//! [`AnswerState::Completed`] yields the assistant's own messages; every
//! other terminal state appends a single [`FALLBACK_TEXT`] message.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use askdocs_assistant::{AssistantApi, Role, RunStatus};
use askdocs_shared::{AppConfig, Message, Result};
use askdocs_storage::Storage;

use crate::session::get_or_create_thread;

/// Reply stored when a run ends without an answer.
pub const FALLBACK_TEXT: &str = "I cannot reply at this time. Reach out to the team on Discord";

// ---------------------------------------------------------------------------
// Poll policy
// ---------------------------------------------------------------------------

/// How often and how long to check a run's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each status check.
    pub interval: Duration,
    /// Give up after this many checks. `None` or `Some(0)` polls until the
    /// run ends.
    pub max_attempts: Option<u32>,
}

impl From<&AppConfig> for PollPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.answer.poll_interval_ms),
            max_attempts: Some(config.answer.max_poll_attempts).filter(|&max| max > 0),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Where a question is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerState {
    Submitted,
    Polling,
    Completed,
    Failed,
    Expired,
    Cancelled,
    /// The poll policy ran out of attempts before the run ended.
    TimedOut,
}

impl AnswerState {
    /// Next state after observing `status`.
    pub fn after(self, status: RunStatus) -> Self {
        if self.is_terminal() {
            return self;
        }
        if !status.is_terminal() {
            return Self::Polling;
        }
        match status {
            RunStatus::Completed => Self::Completed,
            RunStatus::Failed => Self::Failed,
            RunStatus::Expired => Self::Expired,
            RunStatus::Cancelled => Self::Cancelled,
            _ => Self::Polling,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Submitted | Self::Polling)
    }
}

/// Result of driving one question to a terminal state.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub state: AnswerState,
    /// Assistant messages appended to the session, in order.
    pub messages_added: Vec<Message>,
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// Answers questions for sessions against one assistant.
pub struct Responder {
    storage: Arc<Storage>,
    assistant: Arc<dyn AssistantApi>,
    assistant_id: String,
    policy: PollPolicy,
}

impl Responder {
    pub fn new(
        storage: Arc<Storage>,
        assistant: Arc<dyn AssistantApi>,
        assistant_id: impl Into<String>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            storage,
            assistant,
            assistant_id: assistant_id.into(),
            policy,
        }
    }

    /// Record the viewer's question in the transcript, then answer it.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<AnswerOutcome> {
        self.storage.insert_message(session_id, true, question).await?;
        self.answer(session_id, question).await
    }

    /// Submit `question` on the session's thread and poll until the run ends.
    ///
    /// Network errors while polling propagate and leave the transcript
    /// without a reply.
    #[instrument(skip(self, question))]
    pub async fn answer(&self, session_id: &str, question: &str) -> Result<AnswerOutcome> {
        let thread_id =
            get_or_create_thread(&self.storage, self.assistant.as_ref(), session_id).await?;

        let question_id = self
            .assistant
            .add_message(&thread_id, Role::User, question)
            .await?;
        let run_id = self
            .assistant
            .start_run(&thread_id, &self.assistant_id)
            .await?;
        info!(%thread_id, %run_id, "run submitted");

        let state = self.poll(&thread_id, &run_id).await?;

        let messages_added = match state {
            AnswerState::Completed => {
                let replies = self
                    .assistant
                    .list_messages_after(&thread_id, &question_id)
                    .await?;
                let mut stored = Vec::with_capacity(replies.len());
                for reply in &replies {
                    stored.push(
                        self.storage
                            .insert_message(session_id, false, &reply.text())
                            .await?,
                    );
                }
                stored
            }
            _ => {
                warn!(%run_id, ?state, "run ended without an answer");
                vec![
                    self.storage
                        .insert_message(session_id, false, FALLBACK_TEXT)
                        .await?,
                ]
            }
        };

        info!(?state, messages = messages_added.len(), "answer finished");
        Ok(AnswerOutcome {
            state,
            messages_added,
        })
    }

    async fn poll(&self, thread_id: &str, run_id: &str) -> Result<AnswerState> {
        let mut state = AnswerState::Submitted;
        let mut attempts: u32 = 0;
        let limit = self.policy.max_attempts.filter(|&max| max > 0);

        while !state.is_terminal() {
            if limit.is_some_and(|max| attempts >= max) {
                return Ok(AnswerState::TimedOut);
            }

            tokio::time::sleep(self.policy.interval).await;
            attempts += 1;

            let status = self.assistant.run_status(thread_id, run_id).await?;
            state = state.after(status);
            debug!(%run_id, ?status, ?state, attempts, "run status checked");
        }

        Ok(state)
    }
}

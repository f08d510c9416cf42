//! Test doubles shared by the core test modules.

use std::collections::VecDeque;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use askdocs_assistant::{
    AssistantApi, AssistantSpec, MessageContent, RemoteMessage, Role, RunStatus, TextContent,
};
use askdocs_shared::{AskDocsError, Result};
use askdocs_storage::Storage;

/// Storage in its own temp directory, removed when the handle drops.
pub struct TempStorage {
    storage: Arc<Storage>,
    dir: PathBuf,
}

impl Deref for TempStorage {
    type Target = Arc<Storage>;

    fn deref(&self) -> &Arc<Storage> {
        &self.storage
    }
}

impl Drop for TempStorage {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Open a fresh storage file under the temp dir.
pub async fn temp_storage() -> TempStorage {
    let dir = std::env::temp_dir().join(format!("askdocs-core-{}", Uuid::now_v7()));
    let storage = Storage::open(&dir.join("test.db")).await.expect("open test db");
    TempStorage {
        storage: Arc::new(storage),
        dir,
    }
}

/// Build a remote message with a single text segment.
pub fn remote_text(id: &str, value: &str) -> RemoteMessage {
    RemoteMessage {
        id: id.to_string(),
        content: vec![MessageContent::Text {
            text: TextContent {
                value: value.to_string(),
            },
        }],
    }
}

/// Scripted assistant that replays run statuses and records every call.
#[derive(Default)]
pub struct ScriptedAssistant {
    statuses: Mutex<VecDeque<RunStatus>>,
    replies: Vec<RemoteMessage>,
    /// Upload file names that fail.
    failing_uploads: Vec<String>,
    pub threads_created: AtomicUsize,
    pub status_checks: AtomicUsize,
    pub added: Mutex<Vec<(String, Role, String)>>,
    pub list_calls: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(String, String)>>,
    pub attached: Mutex<Vec<(String, String)>>,
    pub created_assistants: Mutex<Vec<AssistantSpec>>,
}

impl ScriptedAssistant {
    pub fn with_statuses(statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_replies(mut self, replies: Vec<RemoteMessage>) -> Self {
        self.replies = replies;
        self
    }

    pub fn failing_upload(mut self, file_name: &str) -> Self {
        self.failing_uploads.push(file_name.to_string());
        self
    }
}

#[async_trait]
impl AssistantApi for ScriptedAssistant {
    async fn create_thread(&self) -> Result<String> {
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread_{n}"))
    }

    async fn add_message(&self, thread_id: &str, role: Role, text: &str) -> Result<String> {
        let mut added = self.added.lock().unwrap();
        added.push((thread_id.to_string(), role, text.to_string()));
        Ok(format!("msg_q{}", added.len()))
    }

    async fn start_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<String> {
        Ok("run_1".to_string())
    }

    async fn run_status(&self, _thread_id: &str, _run_id: &str) -> Result<RunStatus> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunStatus::InProgress))
    }

    async fn list_messages_after(
        &self,
        _thread_id: &str,
        after_message_id: &str,
    ) -> Result<Vec<RemoteMessage>> {
        self.list_calls
            .lock()
            .unwrap()
            .push(after_message_id.to_string());
        Ok(self.replies.clone())
    }

    async fn upload_file(&self, file_name: &str, contents: &str) -> Result<String> {
        if self.failing_uploads.iter().any(|f| f == file_name) {
            return Err(AskDocsError::assistant_status(500, "upload rejected"));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((file_name.to_string(), contents.to_string()));
        Ok(format!("file_{file_name}"))
    }

    async fn attach_file(&self, assistant_id: &str, file_id: &str) -> Result<()> {
        self.attached
            .lock()
            .unwrap()
            .push((assistant_id.to_string(), file_id.to_string()));
        Ok(())
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String> {
        self.created_assistants.lock().unwrap().push(spec.clone());
        Ok("asst_test".to_string())
    }
}

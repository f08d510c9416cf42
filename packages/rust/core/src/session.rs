//! Session → remote thread mapping.

use tracing::{debug, info, instrument};

use askdocs_assistant::AssistantApi;
use askdocs_shared::Result;
use askdocs_storage::Storage;

/// Return the remote thread bound to `session_id`, creating one on first use.
///
/// If two callers race on a never-seen session, both create a remote thread
/// but only the first binding is stored; both get the stored thread back.
#[instrument(skip(storage, assistant))]
pub async fn get_or_create_thread(
    storage: &Storage,
    assistant: &dyn AssistantApi,
    session_id: &str,
) -> Result<String> {
    if let Some(thread) = storage.get_thread(session_id).await? {
        debug!(thread_id = %thread.remote_thread_id, "reusing thread");
        return Ok(thread.remote_thread_id);
    }

    let thread_id = assistant.create_thread().await?;
    let stored = storage.save_thread(session_id, &thread_id).await?;
    info!(thread_id = %stored.remote_thread_id, "thread created for session");
    Ok(stored.remote_thread_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedAssistant, temp_storage};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_second_call_reuses_thread() {
        let storage = temp_storage().await;
        let assistant = ScriptedAssistant::default();

        let first = get_or_create_thread(&storage, &assistant, "session-1")
            .await
            .unwrap();
        let second = get_or_create_thread(&storage, &assistant, "session-1")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(assistant.threads_created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sessions_get_distinct_threads() {
        let storage = temp_storage().await;
        let assistant = ScriptedAssistant::default();

        let a = get_or_create_thread(&storage, &assistant, "a").await.unwrap();
        let b = get_or_create_thread(&storage, &assistant, "b").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(assistant.threads_created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_existing_binding_wins() {
        let storage = temp_storage().await;
        storage.save_thread("s", "thread_existing").await.unwrap();
        let assistant = ScriptedAssistant::default();

        let thread = get_or_create_thread(&storage, &assistant, "s").await.unwrap();
        assert_eq!(thread, "thread_existing");
        assert_eq!(assistant.threads_created.load(Ordering::SeqCst), 0);
    }
}

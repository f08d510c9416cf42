//! Upload stage: push stored documents to the assistant as retrieval files.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use askdocs_assistant::{AssistantApi, AssistantSpec, AssistantTool};
use askdocs_shared::{AskDocsError, Result};
use askdocs_storage::Storage;

/// Documents read and uploaded per batch.
pub const UPLOAD_BATCH_SIZE: u32 = 20;

/// Instructions given to a newly created assistant.
pub const ASSISTANT_INSTRUCTIONS: &str = "Answer the user questions based on the provided documents \
or report that the question cannot be answered based on \
these documents. Keep the answer informative but brief, \
do not enumerate all possibilities.";

static LAST_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*/([^/]+)").expect("last segment regex"));

/// Summary of an upload pass.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub uploaded: usize,
    /// Documents already uploaded, or deleted before their turn came.
    pub skipped: usize,
    /// Failed documents as (document id, error message).
    pub errors: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentUpload {
    Uploaded,
    Skipped,
}

/// File name used for a document's upload: its last URL path segment plus `.md`.
pub fn file_name_for_url(url: &str) -> String {
    format!("{}.md", LAST_SEGMENT_RE.replace(url, "$1"))
}

/// Upload every document that has no remote file yet.
///
/// Documents are paged in id order, `batch_size` at a time; uploads within a
/// batch run concurrently. One document failing does not stop the others.
#[instrument(skip(storage, assistant))]
pub async fn upload_all_documents(
    storage: Arc<Storage>,
    assistant: Arc<dyn AssistantApi>,
    assistant_id: &str,
    batch_size: u32,
) -> Result<UploadReport> {
    let batch_size = batch_size.max(1);
    let mut report = UploadReport::default();
    let mut cursor: Option<String> = None;

    loop {
        let page = storage.list_documents(cursor.as_deref(), batch_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(last.id.clone());
        let full_page = page.len() == batch_size as usize;
        debug!(batch = page.len(), "uploading batch");

        let mut tasks = JoinSet::new();
        for doc in page {
            let storage = storage.clone();
            let assistant = assistant.clone();
            let assistant_id = assistant_id.to_string();
            tasks.spawn(async move {
                let outcome = upload_document(&storage, assistant.as_ref(), &assistant_id, &doc.id)
                    .await;
                (doc.id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(DocumentUpload::Uploaded))) => report.uploaded += 1,
                Ok((_, Ok(DocumentUpload::Skipped))) => report.skipped += 1,
                Ok((id, Err(e))) => {
                    warn!(document_id = %id, error = %e, "upload failed");
                    report.errors.push((id, e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "upload task panicked");
                    report.errors.push(("task".into(), e.to_string()));
                }
            }
        }

        if !full_page {
            break;
        }
    }

    info!(
        uploaded = report.uploaded,
        skipped = report.skipped,
        errors = report.errors.len(),
        "upload completed"
    );
    Ok(report)
}

/// Upload one document, re-reading it so concurrent edits are respected.
async fn upload_document(
    storage: &Storage,
    assistant: &dyn AssistantApi,
    assistant_id: &str,
    document_id: &str,
) -> Result<DocumentUpload> {
    let Some(doc) = storage.get_document(document_id).await? else {
        return Ok(DocumentUpload::Skipped);
    };
    if doc.external_file_id.is_some() {
        return Ok(DocumentUpload::Skipped);
    }

    let file_id = assistant
        .upload_file(&file_name_for_url(&doc.url), &doc.text)
        .await?;
    assistant.attach_file(assistant_id, &file_id).await?;

    if !storage.set_document_file_id(&doc.id, &file_id).await? {
        warn!(url = %doc.url, %file_id, "document vanished after upload");
    }
    debug!(url = %doc.url, %file_id, "document uploaded");
    Ok(DocumentUpload::Uploaded)
}

/// Create a retrieval assistant with the standard instructions.
pub async fn create_assistant(assistant: &dyn AssistantApi, model: &str) -> Result<String> {
    if model.trim().is_empty() {
        return Err(AskDocsError::validation("assistant model must not be empty"));
    }

    let spec = AssistantSpec {
        model: model.to_string(),
        instructions: ASSISTANT_INSTRUCTIONS.to_string(),
        tools: vec![AssistantTool::Retrieval],
    };
    let id = assistant.create_assistant(&spec).await?;
    info!(assistant_id = %id, model, "assistant created");
    Ok(id)
}

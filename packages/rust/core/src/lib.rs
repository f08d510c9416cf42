//! Core orchestration for AskDocs.
//!
//! Ties discovery, crawling, storage and the assistant service into the two
//! end-to-end paths:
//! - ingestion: [`pipeline::ingest_site`] and [`upload::upload_all_documents`]
//! - answering: [`session::get_or_create_thread`] and [`answer::Responder`]

pub mod answer;
pub mod pipeline;
pub mod session;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use answer::{AnswerOutcome, AnswerState, FALLBACK_TEXT, PollPolicy, Responder};
pub use pipeline::{IngestConfig, IngestResult, ProgressReporter, SilentProgress, ingest_site};
pub use session::get_or_create_thread;
pub use upload::{
    ASSISTANT_INSTRUCTIONS, UPLOAD_BATCH_SIZE, UploadReport, create_assistant, file_name_for_url,
    upload_all_documents,
};

//! OpenAI Assistants v1 client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use askdocs_shared::{AppConfig, AskDocsError, Result, resolve_api_key};

use crate::{AssistantApi, AssistantSpec, RemoteMessage, Role, RunStatus};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("AskDocs/", env!("CARGO_PKG_VERSION"));

/// Page size used when listing thread messages.
const MESSAGE_PAGE_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Connection settings for [`OpenAiAssistant`].
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    /// API base URL without the `/v1` suffix.
    pub base_url: String,
    pub timeout: Duration,
}

impl AssistantConfig {
    /// Build from the app config, reading the API key from its env var.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            api_key: resolve_api_key(config)?,
            base_url: config.openai.base_url.clone(),
            timeout: Duration::from_secs(config.defaults.request_timeout_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    data: Vec<RemoteMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`AssistantApi`] over the OpenAI REST API.
pub struct OpenAiAssistant {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAssistant {
    pub fn new(config: AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AskDocsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/v1/{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v1")
    }

    /// Send a request and decode a JSON body, mapping non-2xx to an error.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let res = req
            .send()
            .await
            .map_err(|e| AskDocsError::assistant(format!("request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AskDocsError::assistant_status(status.as_u16(), message));
        }

        res.json::<T>()
            .await
            .map_err(|e| AskDocsError::parse(format!("invalid assistant response: {e}")))
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistant {
    async fn create_thread(&self) -> Result<String> {
        let res: IdResponse = self
            .send(self.request(Method::POST, "threads").json(&json!({})))
            .await?;
        debug!(thread_id = %res.id, "thread created");
        Ok(res.id)
    }

    async fn add_message(&self, thread_id: &str, role: Role, text: &str) -> Result<String> {
        let res: IdResponse = self
            .send(
                self.request(Method::POST, &format!("threads/{thread_id}/messages"))
                    .json(&json!({ "role": role, "content": text })),
            )
            .await?;
        Ok(res.id)
    }

    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<String> {
        let res: IdResponse = self
            .send(
                self.request(Method::POST, &format!("threads/{thread_id}/runs"))
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await?;
        debug!(thread_id, run_id = %res.id, "run started");
        Ok(res.id)
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus> {
        let res: RunResponse = self
            .send(self.request(Method::GET, &format!("threads/{thread_id}/runs/{run_id}")))
            .await?;
        Ok(res.status)
    }

    #[instrument(skip(self))]
    async fn list_messages_after(
        &self,
        thread_id: &str,
        after_message_id: &str,
    ) -> Result<Vec<RemoteMessage>> {
        let mut messages = Vec::new();
        let mut cursor = after_message_id.to_string();

        loop {
            let limit = MESSAGE_PAGE_LIMIT.to_string();
            let page: MessageListResponse = self
                .send(
                    self.request(Method::GET, &format!("threads/{thread_id}/messages"))
                        .query(&[
                            ("order", "asc"),
                            ("after", cursor.as_str()),
                            ("limit", limit.as_str()),
                        ]),
                )
                .await?;

            let next = page
                .last_id
                .or_else(|| page.data.last().map(|m| m.id.clone()));
            let empty = page.data.is_empty();
            messages.extend(page.data);

            match next {
                Some(id) if page.has_more && !empty => cursor = id,
                _ => break,
            }
        }

        debug!(count = messages.len(), "messages listed");
        Ok(messages)
    }

    async fn upload_file(&self, file_name: &str, contents: &str) -> Result<String> {
        let part = Part::bytes(contents.as_bytes().to_vec()).file_name(file_name.to_string());
        let form = Form::new().text("purpose", "assistants").part("file", part);

        let res: IdResponse = self
            .send(self.request(Method::POST, "files").multipart(form))
            .await?;
        debug!(file_name, file_id = %res.id, "file uploaded");
        Ok(res.id)
    }

    async fn attach_file(&self, assistant_id: &str, file_id: &str) -> Result<()> {
        let _: IdResponse = self
            .send(
                self.request(Method::POST, &format!("assistants/{assistant_id}/files"))
                    .json(&json!({ "file_id": file_id })),
            )
            .await?;
        Ok(())
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String> {
        let res: IdResponse = self
            .send(self.request(Method::POST, "assistants").json(spec))
            .await?;
        Ok(res.id)
    }
}

//! Retrieval/LLM collaborator API

mod http;
mod lorem;
mod sse;

pub use http::HttpRetrievalProvider;
pub use lorem::LoremProvider;

use std::{pin::Pin, time::Duration};

use rocket::{async_trait, futures::Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    config::AppConfig,
    db::models::SourcePassage,
    model_catalog::ProviderApiKeys,
    turn::ChatMessageInput,
};

const DEFAULT_LOREM_INTERVAL_MS: u64 = 50;

/// Retrieval/LLM collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Retrieval request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Retrieval service error {status}: {message}")]
    Service { status: u16, message: String },
    #[error("Retrieval stream error: {0}")]
    Stream(String),
    #[error("Failed to parse retrieval event: {0}")]
    Parsing(#[from] serde_json::Error),
}

/// Shared stream type for the generated answer tokens
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, RetrievalError>> + Send>>;

/// A single retrieval/LLM invocation for one chat turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalRequest {
    pub question: String,
    /// Role-tagged transcript of the previous messages
    pub chat_history: String,
    pub previous_messages: Vec<ChatMessageInput>,
    /// Key of the document to retrieve against
    pub file_key: String,
    pub is_admin: bool,
    /// Validated model ID. `None` lets the collaborator choose its default model.
    pub selected_model: Option<String>,
    pub api_keys: ProviderApiKeys,
}

/// A document passage returned by the retrieval step
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedDocument {
    pub page_content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl RetrievedDocument {
    /// Page number from the passage metadata (`pageNumber`, or `loc.pageNumber`
    /// as set by PDF loaders)
    pub fn page_number(&self) -> Option<u32> {
        self.metadata
            .get("pageNumber")
            .or_else(|| self.metadata.get("loc").and_then(|loc| loc.get("pageNumber")))
            .and_then(|page| page.as_u64())
            .and_then(|page| u32::try_from(page).ok())
    }
}

impl From<&RetrievedDocument> for SourcePassage {
    fn from(document: &RetrievedDocument) -> Self {
        SourcePassage {
            content: document.page_content.clone(),
            page_number: document.page_number(),
        }
    }
}

/// The final output of the generation step
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    /// The model that generated the answer, if reported by the collaborator
    pub model: Option<String>,
}

/// Completion events fired during an invocation, in no guaranteed order
#[derive(Debug, Clone)]
pub enum RetrievalEvent {
    RetrievalEnd(Vec<RetrievedDocument>),
    GenerationEnd(GenerationOutput),
}

/// The token stream for the client, and the channel of completion events.
/// The event channel closes when the invocation is finished.
pub struct RetrievalResponse {
    pub tokens: TokenStream,
    pub events: mpsc::Receiver<RetrievalEvent>,
}

/// Unified API for retrieval/LLM collaborators. Implementations must keep the
/// invocation running (and keep sending events) after the token stream is dropped.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Display name of the provider
    fn name(&self) -> &'static str;

    /// Start retrieval and generation, returning as soon as the answer starts streaming
    async fn retrieve(&self, request: RetrievalRequest)
        -> Result<RetrievalResponse, RetrievalError>;
}

/// Build the retrieval provider from the server configuration
pub fn build_retrieval_provider(
    config: &AppConfig,
    http_client: &reqwest::Client,
) -> Box<dyn RetrievalProvider> {
    match config.retrieval_url.as_deref() {
        Some(base_url) => Box::new(HttpRetrievalProvider::new(
            http_client,
            base_url,
            config.retrieval_api_key.as_deref(),
        )),
        None => {
            rocket::warn!("No retrieval service configured: using lorem ipsum provider");
            Box::new(LoremProvider::new(Duration::from_millis(
                config
                    .lorem_interval_ms
                    .unwrap_or(DEFAULT_LOREM_INTERVAL_MS),
            )))
        }
    }
}

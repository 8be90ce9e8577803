use rocket::{async_trait, futures::Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::retrieval::{
    sse::{get_sse_frames, SseFrame},
    GenerationOutput, RetrievalError, RetrievalEvent, RetrievalProvider, RetrievalRequest,
    RetrievalResponse, RetrievedDocument,
};

/// Buffered tokens waiting to be sent to the client
const TOKEN_BUFFER: usize = 64;

/// Retrieval provider calling an external retrieval/LLM service over HTTP.
/// The service answers with an SSE stream of `token`, `sources`, `end` and `error` events.
pub struct HttpRetrievalProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRetrievalProvider {
    pub fn new(http_client: &reqwest::Client, base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            client: http_client.clone(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.map(|key| key.to_owned()),
        }
    }
}

#[async_trait]
impl RetrievalProvider for HttpRetrievalProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn retrieve(
        &self,
        request: RetrievalRequest,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let mut request_builder = self
            .client
            .post(format!("{}/retrieve", self.base_url))
            .header("accept", "text/event-stream")
            .json(&request);
        if let Some(api_key) = &self.api_key {
            request_builder = request_builder.bearer_auth(api_key);
        }
        let response = request_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Service { status, message });
        }

        let (token_tx, token_rx) = mpsc::channel(TOKEN_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(4);
        tokio::spawn(forward_service_stream(
            get_sse_frames(response),
            token_tx,
            event_tx,
        ));

        Ok(RetrievalResponse {
            tokens: Box::pin(ReceiverStream::new(token_rx)),
            events: event_rx,
        })
    }
}

/// Events sent by the retrieval service
#[derive(Debug, PartialEq)]
enum ServiceEvent {
    Token(String),
    Sources(Vec<RetrievedDocument>),
    End {
        output: Option<String>,
        model: Option<String>,
    },
    Error(String),
}

#[derive(Deserialize)]
struct TokenData {
    text: String,
}

#[derive(Deserialize)]
struct SourcesData {
    documents: Vec<RetrievedDocument>,
}

#[derive(Default, Deserialize)]
struct EndData {
    output: Option<String>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct ErrorData {
    message: String,
}

/// Parse an SSE frame from the retrieval service. Unknown events are skipped.
fn parse_service_event(frame: &SseFrame) -> Result<Option<ServiceEvent>, RetrievalError> {
    let event = match frame.event.as_deref() {
        Some("token") => {
            ServiceEvent::Token(serde_json::from_str::<TokenData>(&frame.data)?.text)
        }
        Some("sources") => {
            ServiceEvent::Sources(serde_json::from_str::<SourcesData>(&frame.data)?.documents)
        }
        Some("end") => {
            let data = match frame.data.trim() {
                "" => EndData::default(),
                data => serde_json::from_str::<EndData>(data)?,
            };
            ServiceEvent::End {
                output: data.output,
                model: data.model,
            }
        }
        Some("error") => {
            ServiceEvent::Error(serde_json::from_str::<ErrorData>(&frame.data)?.message)
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Read the service stream to the end, forwarding tokens to the client and
/// completion events to the turn. Keeps reading after the client disconnects.
async fn forward_service_stream(
    frames: impl Stream<Item = Result<SseFrame, RetrievalError>>,
    token_tx: mpsc::Sender<Result<String, RetrievalError>>,
    event_tx: mpsc::Sender<RetrievalEvent>,
) {
    let mut frames = Box::pin(frames);
    let mut answer = String::new();
    let mut client_connected = true;

    while let Some(frame) = frames.next().await {
        let event = match frame.and_then(|frame| parse_service_event(&frame)) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Retrieval stream error: {}", e);
                let _ = token_tx.send(Err(e)).await;
                return;
            }
        };

        match event {
            ServiceEvent::Token(text) => {
                answer.push_str(&text);
                if client_connected && token_tx.send(Ok(text)).await.is_err() {
                    tracing::debug!("Client disconnected, continuing generation");
                    client_connected = false;
                }
            }
            ServiceEvent::Sources(documents) => {
                let _ = event_tx.send(RetrievalEvent::RetrievalEnd(documents)).await;
            }
            ServiceEvent::End { output, model } => {
                let text = output.unwrap_or_else(|| std::mem::take(&mut answer));
                let _ = event_tx
                    .send(RetrievalEvent::GenerationEnd(GenerationOutput { text, model }))
                    .await;
                return;
            }
            ServiceEvent::Error(message) => {
                tracing::warn!("Retrieval service reported error: {}", message);
                let _ = token_tx.send(Err(RetrievalError::Stream(message))).await;
                return;
            }
        }
    }
    tracing::warn!("Retrieval stream ended before generation completed");
}

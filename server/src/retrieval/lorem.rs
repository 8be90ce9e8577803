use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::retrieval::{
    GenerationOutput, RetrievalError, RetrievalEvent, RetrievalProvider, RetrievalRequest,
    RetrievalResponse, RetrievedDocument,
};

const LOREM_WORDS: [&str; 26] = [
    "Lorem ipsum ",
    "dolor sit ",
    "amet, consectetur ",
    "adipiscing elit, ",
    "sed do",
    " eiusmod tempor",
    " incididunt ut",
    " labore et",
    " dolore magna ",
    "aliqua. Ut ",
    "enim ad ",
    "minim veniam,",
    " quis nostrud",
    " exercitation ullamco",
    " laboris nisi ",
    "ut aliquip ",
    "ex ea ",
    "commodo consequat. ",
    "Duis aute ",
    "irure dolor ",
    "in reprehenderit ",
    "in voluptate ",
    "velit esse ",
    "cillum dolore ",
    "eu fugiat ",
    "nulla pariatur.",
];

/// A test/dummy provider that retrieves one passage and streams 'lorem ipsum...'
pub struct LoremProvider {
    interval: Duration,
}

impl LoremProvider {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[rocket::async_trait]
impl RetrievalProvider for LoremProvider {
    fn name(&self) -> &'static str {
        "lorem"
    }

    async fn retrieve(
        &self,
        request: RetrievalRequest,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let (token_tx, token_rx) = mpsc::channel(LOREM_WORDS.len());
        let (event_tx, event_rx) = mpsc::channel(2);
        let interval = self.interval;

        tokio::spawn(async move {
            let passage = RetrievedDocument {
                page_content: format!("{} (document {})", LOREM_WORDS.concat(), request.file_key),
                metadata: json!({ "pageNumber": 1 }),
            };
            let _ = event_tx
                .send(RetrievalEvent::RetrievalEnd(vec![passage]))
                .await;

            let mut ticker = tokio::time::interval(interval);
            for word in LOREM_WORDS {
                ticker.tick().await;
                // keep going if the client has disconnected
                let _ = token_tx.send(Ok(word.to_owned())).await;
            }
            drop(token_tx);

            let output = GenerationOutput {
                text: LOREM_WORDS.concat(),
                model: None,
            };
            let _ = event_tx.send(RetrievalEvent::GenerationEnd(output)).await;
        });

        Ok(RetrievalResponse {
            tokens: Box::pin(ReceiverStream::new(token_rx)),
            events: event_rx,
        })
    }
}

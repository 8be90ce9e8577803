use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    db::models::SourcePassage,
    retrieval::{GenerationOutput, RetrievalEvent, RetrievedDocument},
    turn::{ChatStore, CompletedTurn, PersistedTurn, StoreError},
};

/// Progress of a chat turn towards persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingSources,
    AwaitingGeneration,
    Persisting,
    Done,
}

/// Joins the two completion events of a retrieval/LLM invocation. The turn is
/// ready once the generation is present, and either sources were received or
/// no more events can arrive (retrieval found nothing).
#[derive(Debug, Default)]
pub struct TurnJoin {
    sources: Option<Vec<SourcePassage>>,
    generation: Option<GenerationOutput>,
    events_closed: bool,
    taken: bool,
}

impl TurnJoin {
    /// Record retrieved passages. A repeated firing replaces the earlier sources.
    pub fn record_sources(&mut self, documents: &[RetrievedDocument]) {
        self.sources = Some(documents.iter().map(SourcePassage::from).collect());
    }

    /// Record the generated answer. Only the first one is kept.
    pub fn record_generation(&mut self, output: GenerationOutput) {
        if self.generation.is_some() {
            tracing::debug!("Ignoring repeated generation event");
            return;
        }
        self.generation = Some(output);
    }

    /// No more events will arrive
    pub fn close(&mut self) {
        self.events_closed = true;
    }

    pub fn state(&self) -> TurnState {
        if self.taken || (self.events_closed && self.generation.is_none()) {
            TurnState::Done
        } else if self.generation.is_some() && (self.sources.is_some() || self.events_closed) {
            TurnState::Persisting
        } else if self.sources.is_some() {
            TurnState::AwaitingGeneration
        } else {
            TurnState::AwaitingSources
        }
    }

    /// Take the generation and sources once the turn is ready. Returns `Some` at most once.
    pub fn take_ready(&mut self) -> Option<(GenerationOutput, Vec<SourcePassage>)> {
        if self.state() != TurnState::Persisting {
            return None;
        }
        self.taken = true;
        let generation = self.generation.take()?;
        Some((generation, self.sources.take().unwrap_or_default()))
    }
}

/// How a turn ended, after the token stream was handed to the client
#[derive(Debug)]
pub enum TurnOutcome {
    Persisted(PersistedTurn),
    /// The invocation finished without generating an answer: nothing was saved
    Abandoned,
    Failed(StoreError),
}

/// A started turn waiting on the completion events of its invocation
pub struct PendingTurn {
    pub store: Arc<dyn ChatStore>,
    pub events: mpsc::Receiver<RetrievalEvent>,
    pub user_id: String,
    pub chat_id: Uuid,
    pub question: String,
    /// The validated model selection, used if the collaborator doesn't report one
    pub selected_model: Option<String>,
}

impl PendingTurn {
    /// Read completion events until the turn can be saved, then save it once.
    pub async fn run(self) -> TurnOutcome {
        let PendingTurn {
            store,
            mut events,
            user_id,
            chat_id,
            question,
            selected_model,
        } = self;

        let mut join = TurnJoin::default();
        loop {
            match events.recv().await {
                Some(RetrievalEvent::RetrievalEnd(documents)) => join.record_sources(&documents),
                Some(RetrievalEvent::GenerationEnd(output)) => join.record_generation(output),
                None => join.close(),
            }

            if let Some((generation, sources)) = join.take_ready() {
                let turn = CompletedTurn {
                    user_id,
                    chat_id,
                    question,
                    answer: generation.text,
                    model: generation.model.or(selected_model),
                    sources,
                };
                return save_turn(store.as_ref(), &turn).await;
            }
            if join.state() == TurnState::Done {
                tracing::warn!(%chat_id, "Turn abandoned: generation did not complete");
                return TurnOutcome::Abandoned;
            }
        }
    }
}

async fn save_turn(store: &dyn ChatStore, turn: &CompletedTurn) -> TurnOutcome {
    match store.persist_turn(turn).await {
        Ok(persisted) => {
            tracing::info!(
                chat_id = %turn.chat_id,
                user_message_id = %persisted.user_message_id,
                assistant_message_id = %persisted.assistant_message_id,
                "Saved chat turn"
            );
            TurnOutcome::Persisted(persisted)
        }
        Err(e) => {
            tracing::error!(chat_id = %turn.chat_id, "Failed saving chat turn: {}", e);
            TurnOutcome::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::turn::memory::MemoryChatStore;

    fn document(content: &str, page: u32) -> RetrievedDocument {
        RetrievedDocument {
            page_content: content.into(),
            metadata: json!({ "pageNumber": page }),
        }
    }

    fn generation(text: &str) -> GenerationOutput {
        GenerationOutput {
            text: text.into(),
            model: None,
        }
    }

    fn pending_turn(
        store: Arc<MemoryChatStore>,
        chat_id: Uuid,
    ) -> (PendingTurn, mpsc::Sender<RetrievalEvent>) {
        let (event_tx, events) = mpsc::channel(8);
        let turn = PendingTurn {
            store,
            events,
            user_id: "user_1".into(),
            chat_id,
            question: "What is the refund policy?".into(),
            selected_model: Some("gemini-2.5-flash".into()),
        };
        (turn, event_tx)
    }

    #[test]
    fn join_states() {
        let mut join = TurnJoin::default();
        assert_eq!(join.state(), TurnState::AwaitingSources);
        join.record_sources(&[document("Refunds within 30 days", 2)]);
        assert_eq!(join.state(), TurnState::AwaitingGeneration);
        assert!(join.take_ready().is_none());
        join.record_generation(generation("Policy is 30 days"));
        assert_eq!(join.state(), TurnState::Persisting);

        let (output, sources) = join.take_ready().unwrap();
        assert_eq!(output.text, "Policy is 30 days");
        assert_eq!(sources[0].page_number, Some(2));
        assert_eq!(join.state(), TurnState::Done);
        assert!(join.take_ready().is_none());
    }

    #[test]
    fn generation_first_waits_for_sources_or_close() {
        let mut join = TurnJoin::default();
        join.record_generation(generation("Policy is 30 days"));
        assert_eq!(join.state(), TurnState::AwaitingSources);
        join.close();
        let (_, sources) = join.take_ready().unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn repeated_events() {
        let mut join = TurnJoin::default();
        join.record_sources(&[document("a", 1)]);
        join.record_sources(&[document("b", 2), document("c", 3)]);
        join.record_generation(generation("first"));
        join.record_generation(generation("second"));
        let (output, sources) = join.take_ready().unwrap();
        assert_eq!(output.text, "first");
        let contents: Vec<_> = sources.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[test]
    fn repeated_retrieval_does_not_duplicate_sources() {
        let mut join = TurnJoin::default();
        join.record_sources(&[document("a", 1)]);
        join.record_sources(&[document("a", 1)]);
        join.record_generation(generation("x"));
        let (_, sources) = join.take_ready().unwrap();
        assert_eq!(
            sources,
            vec![SourcePassage {
                content: "a".into(),
                page_number: Some(1)
            }]
        );
    }

    #[test]
    fn closed_without_generation_is_done() {
        let mut join = TurnJoin::default();
        join.record_sources(&[document("a", 1)]);
        join.close();
        assert_eq!(join.state(), TurnState::Done);
        assert!(join.take_ready().is_none());
    }

    #[tokio::test]
    async fn persists_sources_then_generation() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        let store = Arc::new(store);
        let (turn, event_tx) = pending_turn(store.clone(), chat_id);
        let completion = tokio::spawn(turn.run());

        event_tx
            .send(RetrievalEvent::RetrievalEnd(vec![document("Refunds within 30 days", 4)]))
            .await
            .unwrap();
        event_tx
            .send(RetrievalEvent::GenerationEnd(generation("Policy is 30 days")))
            .await
            .unwrap();

        let TurnOutcome::Persisted(persisted) = completion.await.unwrap() else {
            panic!("expected persisted turn");
        };
        assert!(persisted.source_id.is_some());
        let turns = store.persisted_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].answer, "Policy is 30 days");
        assert_eq!(turns[0].model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(
            turns[0].sources,
            vec![SourcePassage {
                content: "Refunds within 30 days".into(),
                page_number: Some(4)
            }]
        );
    }

    #[tokio::test]
    async fn persists_generation_then_sources() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        let store = Arc::new(store);
        let (turn, event_tx) = pending_turn(store.clone(), chat_id);
        let completion = tokio::spawn(turn.run());

        event_tx
            .send(RetrievalEvent::GenerationEnd(GenerationOutput {
                text: "Policy is 30 days".into(),
                model: Some("gpt-5".into()),
            }))
            .await
            .unwrap();
        event_tx
            .send(RetrievalEvent::RetrievalEnd(vec![document("Refunds within 30 days", 4)]))
            .await
            .unwrap();
        drop(event_tx);

        assert!(matches!(
            completion.await.unwrap(),
            TurnOutcome::Persisted(_)
        ));
        let turns = store.persisted_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].sources.len(), 1);
        assert_eq!(turns[0].model.as_deref(), Some("gpt-5"));
        assert_eq!(store.message_count("user_1"), Some(1));
    }

    #[tokio::test]
    async fn persists_generation_without_sources() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        let store = Arc::new(store);
        let (turn, event_tx) = pending_turn(store.clone(), chat_id);
        let completion = tokio::spawn(turn.run());

        event_tx
            .send(RetrievalEvent::GenerationEnd(generation("Policy is 30 days")))
            .await
            .unwrap();
        drop(event_tx);

        let TurnOutcome::Persisted(persisted) = completion.await.unwrap() else {
            panic!("expected persisted turn");
        };
        assert_eq!(persisted.source_id, None);
        let turns = store.persisted_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].answer, "Policy is 30 days");
        assert!(turns[0].sources.is_empty());
    }

    #[tokio::test]
    async fn abandons_turn_without_generation() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        let store = Arc::new(store);
        let (turn, event_tx) = pending_turn(store.clone(), chat_id);
        let completion = tokio::spawn(turn.run());

        event_tx
            .send(RetrievalEvent::RetrievalEnd(vec![document("a", 1)]))
            .await
            .unwrap();
        drop(event_tx);

        assert!(matches!(completion.await.unwrap(), TurnOutcome::Abandoned));
        assert!(store.persisted_turns().is_empty());
        assert_eq!(store.message_count("user_1"), None);
    }

    #[tokio::test]
    async fn reports_persistence_failure() {
        let (mut store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        store.fail_persist = true;
        let (turn, event_tx) = pending_turn(Arc::new(store), chat_id);
        let completion = tokio::spawn(turn.run());

        event_tx
            .send(RetrievalEvent::GenerationEnd(generation("Policy is 30 days")))
            .await
            .unwrap();
        drop(event_tx);

        assert!(matches!(
            completion.await.unwrap(),
            TurnOutcome::Failed(StoreError::Pool(_))
        ));
    }
}

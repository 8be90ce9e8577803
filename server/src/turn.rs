//! Chat turns: one user question and its streamed, persisted answer

mod history;
mod join;
mod quota;
mod store;

pub use history::format_history;
pub use join::{PendingTurn, TurnJoin, TurnOutcome, TurnState};
pub use quota::{check_quota, UsageQuota};
pub use store::{ChatStore, CompletedTurn, PersistedTurn, StoreError};

#[cfg(test)]
pub(crate) use store::memory;

use std::sync::Arc;

use rocket::fairing::AdHoc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    config::get_app_config,
    db::{DbChatStore, DbPool},
    errors::ApiError,
    model_catalog::{ModelCatalog, ProviderApiKeys},
    retrieval::{
        build_retrieval_provider, RetrievalProvider, RetrievalRequest, RetrievalResponse,
        TokenStream,
    },
};

/// Role of a message sent by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, JsonSchema, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRole {
    User,
    Assistant,
    System,
    #[serde(other)]
    Other,
}

/// A previous chat message
#[derive(Debug, Clone, PartialEq, JsonSchema, Serialize, Deserialize)]
pub struct ChatMessageInput {
    pub role: InputRole,
    pub content: String,
}

#[derive(Debug, JsonSchema, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChatInput {
    /// The chat so far. The last message is the new question.
    pub messages: Vec<ChatMessageInput>,
    /// Ignored: the document key stored with the chat is used
    #[serde(rename = "fileKey", default)]
    _file_key: Option<String>,
    pub chat_id: Uuid,
    /// Ignored: usage is counted by the server
    #[serde(rename = "messageCount", default)]
    _message_count: Option<i64>,
    #[serde(default)]
    pub is_admin: bool,
    pub selected_model: Option<String>,
    /// The user's own API keys, per model provider
    #[serde(default)]
    pub api_keys: ProviderApiKeys,
}

/// Collaborators used by chat turns
pub struct TurnServices {
    pub store: Arc<dyn ChatStore>,
    pub retrieval: Arc<dyn RetrievalProvider>,
}

/// A started turn: the answer tokens for the client, and the task that saves
/// the turn once generation completes
pub struct TurnHandle {
    pub tokens: TokenStream,
    pub completion: JoinHandle<TurnOutcome>,
}

/// Check the user's quota and the request, then start retrieval and generation.
/// Returns as soon as the answer starts streaming.
pub async fn start_turn(
    user_id: &str,
    input: SendChatInput,
    services: &TurnServices,
    catalog: &ModelCatalog,
) -> Result<TurnHandle, ApiError> {
    let usage = services.store.find_usage(user_id).await?;
    check_quota(usage.as_ref())?;

    let Some((question, previous_messages)) = input.messages.split_last() else {
        return Err(ApiError::BadRequest("No messages provided".into()));
    };
    let chat = services
        .store
        .find_chat(user_id, &input.chat_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let chat_history = format_history(previous_messages);
    let selected_model = catalog.validate_model(input.selected_model.as_deref());

    let request = RetrievalRequest {
        question: question.content.clone(),
        chat_history,
        previous_messages: previous_messages.to_vec(),
        file_key: chat.file_key,
        is_admin: input.is_admin,
        selected_model: selected_model.clone(),
        api_keys: input.api_keys,
    };
    let RetrievalResponse { tokens, events } = services.retrieval.retrieve(request).await?;

    let pending = PendingTurn {
        store: services.store.clone(),
        events,
        user_id: user_id.to_owned(),
        chat_id: chat.id,
        question: question.content.clone(),
        selected_model,
    };
    tracing::debug!(chat_id = %chat.id, provider = services.retrieval.name(), "Started chat turn");

    Ok(TurnHandle {
        tokens,
        completion: tokio::spawn(pending.run()),
    })
}

/// Fairing that sets up the chat turn services. Must be attached after the database setup.
pub fn setup_turn_services() -> AdHoc {
    AdHoc::on_ignite("Chat turn services", |rocket| async {
        let app_config = get_app_config(&rocket);
        let pool = rocket
            .state::<DbPool>()
            .expect("Database pool should be initialized")
            .clone();
        let http_client = reqwest::Client::builder()
            .build()
            .expect("Should build HTTP client");

        let retrieval = build_retrieval_provider(app_config, &http_client);
        rocket::info!("Retrieval provider: {}", retrieval.name());
        let services = TurnServices {
            store: Arc::new(DbChatStore::new(pool, app_config.default_free_messages)),
            retrieval: Arc::from(retrieval),
        };

        rocket.manage(services)
    })
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use rocket::async_trait;
    use tokio::sync::mpsc;
    use tokio_stream::{wrappers::ReceiverStream, StreamExt};

    use super::*;
    use crate::{
        model_catalog::ModelCatalog,
        retrieval::{
            GenerationOutput, RetrievalError, RetrievalEvent, RetrievedDocument,
        },
        turn::memory::MemoryChatStore,
    };

    /// Retrieval fake that streams the given answer, firing retrieval-complete
    /// with the given documents before generation completes
    #[derive(Default)]
    struct ScriptedRetrieval {
        answer: Vec<&'static str>,
        documents: Vec<RetrievedDocument>,
        calls: AtomicU32,
        requests: std::sync::Mutex<Vec<RetrievalRequest>>,
    }

    #[async_trait]
    impl RetrievalProvider for ScriptedRetrieval {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn retrieve(
            &self,
            request: RetrievalRequest,
        ) -> Result<RetrievalResponse, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);

            let (token_tx, token_rx) = mpsc::channel(16);
            let (event_tx, event_rx) = mpsc::channel(4);
            let answer = self.answer.clone();
            let documents = self.documents.clone();
            tokio::spawn(async move {
                let _ = event_tx.send(RetrievalEvent::RetrievalEnd(documents)).await;
                for token in &answer {
                    let _ = token_tx.send(Ok(token.to_string())).await;
                }
                let output = GenerationOutput {
                    text: answer.concat(),
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

    fn question(content: &str) -> ChatMessageInput {
        ChatMessageInput {
            role: InputRole::User,
            content: content.into(),
        }
    }

    fn input(chat_id: Uuid, messages: Vec<ChatMessageInput>) -> SendChatInput {
        SendChatInput {
            messages,
            _file_key: Some("ignored".into()),
            chat_id,
            _message_count: Some(0),
            is_admin: false,
            selected_model: None,
            api_keys: Default::default(),
        }
    }

    fn services(
        store: Arc<MemoryChatStore>,
        retrieval: Arc<ScriptedRetrieval>,
    ) -> TurnServices {
        TurnServices { store, retrieval }
    }

    #[tokio::test]
    async fn refund_policy_turn() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "uploads/policy.pdf");
        store.set_usage("user_1", 0, Some(5));
        let store = Arc::new(store);
        let retrieval = Arc::new(ScriptedRetrieval {
            answer: vec!["Policy is ", "30 days"],
            ..Default::default()
        });
        let catalog = ModelCatalog::default();

        let TurnHandle { tokens, completion } = start_turn(
            "user_1",
            input(chat_id, vec![question("What is the refund policy?")]),
            &services(store.clone(), retrieval.clone()),
            &catalog,
        )
        .await
        .unwrap();

        let text: Vec<String> = tokens.map(|token| token.unwrap()).collect().await;
        assert_eq!(text.concat(), "Policy is 30 days");
        let TurnOutcome::Persisted(persisted) = completion.await.unwrap() else {
            panic!("expected persisted turn");
        };
        assert_eq!(persisted.message_count, 1);
        assert_eq!(persisted.source_id, None);

        let request = retrieval.requests.lock().unwrap().remove(0);
        assert_eq!(request.question, "What is the refund policy?");
        assert_eq!(request.chat_history, "");
        assert_eq!(request.file_key, "uploads/policy.pdf");
        assert_eq!(request.selected_model, None);

        let turns = store.persisted_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].question, "What is the refund policy?");
        assert_eq!(turns[0].answer, "Policy is 30 days");
        assert!(turns[0].sources.is_empty());
        assert_eq!(store.message_count("user_1"), Some(1));
    }

    #[test]
    fn client_file_key_and_count_are_optional() {
        let chat_id = Uuid::new_v4();
        let minimal: SendChatInput = serde_json::from_value(serde_json::json!({
            "messages": [{ "role": "user", "content": "Hi" }],
            "chatId": chat_id,
        }))
        .unwrap();
        assert_eq!(minimal.chat_id, chat_id);
        assert!(!minimal.is_admin);

        let full: SendChatInput = serde_json::from_value(serde_json::json!({
            "messages": [{ "role": "user", "content": "Hi" }],
            "fileKey": "client.pdf",
            "chatId": chat_id,
            "messageCount": 3,
            "isAdmin": true,
            "selectedModel": "gpt-5",
            "apiKeys": { "OpenAI": "sk-1" }
        }))
        .unwrap();
        assert!(full.is_admin);
        assert_eq!(full.selected_model.as_deref(), Some("gpt-5"));
        assert_eq!(full.api_keys.len(), 1);
    }

    #[tokio::test]
    async fn sends_history_and_valid_model() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        let store = Arc::new(store);
        let retrieval = Arc::new(ScriptedRetrieval {
            answer: vec!["Yes"],
            documents: vec![RetrievedDocument {
                page_content: "Shipping is free".into(),
                metadata: serde_json::json!({ "pageNumber": 3 }),
            }],
            ..Default::default()
        });
        let mut chat_input = input(
            chat_id,
            vec![
                question("Hi"),
                ChatMessageInput {
                    role: InputRole::Assistant,
                    content: "Hello".into(),
                },
                question("Is shipping free?"),
            ],
        );
        chat_input.selected_model = Some("gpt-5".into());

        let handle = start_turn(
            "user_1",
            chat_input,
            &services(store.clone(), retrieval.clone()),
            &ModelCatalog::default(),
        )
        .await
        .unwrap();
        drop(handle.tokens);
        assert!(matches!(
            handle.completion.await.unwrap(),
            TurnOutcome::Persisted(_)
        ));

        let request = retrieval.requests.lock().unwrap().remove(0);
        assert_eq!(request.question, "Is shipping free?");
        assert_eq!(request.chat_history, "Human: Hi\nAssistant: Hello");
        assert_eq!(request.previous_messages.len(), 2);
        assert_eq!(request.selected_model.as_deref(), Some("gpt-5"));

        let turns = store.persisted_turns();
        assert_eq!(turns[0].model.as_deref(), Some("gpt-5"));
        assert_eq!(turns[0].sources[0].page_number, Some(3));
    }

    #[tokio::test]
    async fn quota_exceeded_makes_no_calls() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        store.set_usage("user_1", 5, Some(5));
        let store = Arc::new(store);
        let retrieval = Arc::new(ScriptedRetrieval::default());

        let result = start_turn(
            "user_1",
            input(chat_id, vec![question("What is the refund policy?")]),
            &services(store.clone(), retrieval.clone()),
            &ModelCatalog::default(),
        )
        .await;

        assert!(matches!(result, Err(ApiError::QuotaExceeded)));
        assert_eq!(retrieval.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*store.chat_lookups.lock().unwrap(), 0);
        assert!(store.persisted_turns().is_empty());
        assert_eq!(store.message_count("user_1"), Some(5));
    }

    #[tokio::test]
    async fn invalid_model_uses_default() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        let store = Arc::new(store);
        let retrieval = Arc::new(ScriptedRetrieval {
            answer: vec!["Policy is 30 days"],
            ..Default::default()
        });
        let mut chat_input = input(chat_id, vec![question("What is the refund policy?")]);
        chat_input.selected_model = Some("not-a-real-model".into());

        let handle = start_turn(
            "user_1",
            chat_input,
            &services(store.clone(), retrieval.clone()),
            &ModelCatalog::default(),
        )
        .await
        .unwrap();
        handle.completion.await.unwrap();

        let request = retrieval.requests.lock().unwrap().remove(0);
        assert_eq!(request.selected_model, None);
        assert_eq!(store.persisted_turns()[0].model, None);
    }

    #[tokio::test]
    async fn rejects_empty_messages_and_unknown_chats() {
        let (store, chat_id) = MemoryChatStore::with_chat("user_1", "file_1");
        let store = Arc::new(store);
        let retrieval = Arc::new(ScriptedRetrieval::default());
        let services = services(store.clone(), retrieval.clone());
        let catalog = ModelCatalog::default();

        let empty = start_turn("user_1", input(chat_id, vec![]), &services, &catalog).await;
        assert!(matches!(empty, Err(ApiError::BadRequest(message)) if message == "No messages provided"));

        let other_user =
            start_turn("user_2", input(chat_id, vec![question("Hi")]), &services, &catalog).await;
        assert!(matches!(other_user, Err(ApiError::NotFound)));

        let unknown_chat = start_turn(
            "user_1",
            input(Uuid::new_v4(), vec![question("Hi")]),
            &services,
            &catalog,
        )
        .await;
        assert!(matches!(unknown_chat, Err(ApiError::NotFound)));
        assert_eq!(retrieval.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.persisted_turns().is_empty());
    }
}

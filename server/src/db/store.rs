use diesel_async::{
    pooled_connection::deadpool::Object, scoped_futures::ScopedFutureExt, AsyncConnection,
    AsyncPgConnection,
};
use rocket::async_trait;
use uuid::Uuid;

use crate::{
    db::{
        models::{
            DocChat, DocChatMessageRole, NewDocChatMessage, NewMessageSource, SourcePassages,
        },
        services::{ChatDbService, SettingsDbService},
        DbPool,
    },
    turn::{ChatStore, CompletedTurn, PersistedTurn, StoreError, UsageQuota},
};

/// Chat turn storage backed by the Postgres pool
pub struct DbChatStore {
    pool: DbPool,
    default_free_messages: Option<i32>,
}

impl DbChatStore {
    pub fn new(pool: DbPool, default_free_messages: Option<i32>) -> Self {
        Self {
            pool,
            default_free_messages,
        }
    }

    async fn connection(&self) -> Result<Object<AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl ChatStore for DbChatStore {
    async fn find_usage(&self, user_id: &str) -> Result<Option<UsageQuota>, StoreError> {
        let mut conn = self.connection().await?;
        let settings = SettingsDbService::new(&mut conn).find_by_user(user_id).await?;
        Ok(settings.as_ref().map(UsageQuota::from))
    }

    async fn find_chat(
        &self,
        user_id: &str,
        chat_id: &Uuid,
    ) -> Result<Option<DocChat>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(ChatDbService::new(&mut conn).find_chat(user_id, chat_id).await?)
    }

    async fn persist_turn(&self, turn: &CompletedTurn) -> Result<PersistedTurn, StoreError> {
        let mut conn = self.connection().await?;
        let default_free_messages = self.default_free_messages;

        let persisted = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let user_message = ChatDbService::new(conn)
                        .save_message(NewDocChatMessage {
                            chat_id: &turn.chat_id,
                            role: DocChatMessageRole::User,
                            content: &turn.question,
                            model: None,
                        })
                        .await?;
                    let message_count = SettingsDbService::new(conn)
                        .increment_message_count(&turn.user_id, default_free_messages)
                        .await?;
                    let assistant_message = ChatDbService::new(conn)
                        .save_message(NewDocChatMessage {
                            chat_id: &turn.chat_id,
                            role: DocChatMessageRole::Assistant,
                            content: &turn.answer,
                            model: turn.model.as_deref(),
                        })
                        .await?;
                    let source_id = match turn.sources.is_empty() {
                        true => None,
                        false => Some(
                            ChatDbService::new(conn)
                                .save_sources(NewMessageSource {
                                    message_id: &assistant_message.id,
                                    chat_id: &turn.chat_id,
                                    data: SourcePassages(turn.sources.clone()),
                                })
                                .await?,
                        ),
                    };

                    Ok(PersistedTurn {
                        user_message_id: user_message.id,
                        assistant_message_id: assistant_message.id,
                        source_id,
                        message_count,
                    })
                }
                .scope_boxed()
            })
            .await?;

        Ok(persisted)
    }
}

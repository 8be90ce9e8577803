use rocket::async_trait;
use uuid::Uuid;

use crate::{
    db::models::{DocChat, SourcePassage},
    turn::UsageQuota,
};

/// Storage errors while running a chat turn
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] diesel::result::Error),
    #[error("Couldn't get database connection: {0}")]
    Pool(String),
}

/// A finished turn, ready to be saved
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTurn {
    pub user_id: String,
    pub chat_id: Uuid,
    pub question: String,
    pub answer: String,
    /// The model that generated the answer
    pub model: Option<String>,
    pub sources: Vec<SourcePassage>,
}

/// IDs of the rows written for a turn
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTurn {
    pub user_message_id: Uuid,
    pub assistant_message_id: Uuid,
    /// Only present if the turn had sources
    pub source_id: Option<Uuid>,
    /// The user's message count after this turn
    pub message_count: i32,
}

/// Storage used by chat turns
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Get the user's current usage, if they have any settings saved
    async fn find_usage(&self, user_id: &str) -> Result<Option<UsageQuota>, StoreError>;

    /// Find a chat owned by the user
    async fn find_chat(&self, user_id: &str, chat_id: &Uuid)
        -> Result<Option<DocChat>, StoreError>;

    /// Save the user message, count it against the user's usage, then save
    /// the assistant message and its sources. All or nothing.
    async fn persist_turn(&self, turn: &CompletedTurn) -> Result<PersistedTurn, StoreError>;
}

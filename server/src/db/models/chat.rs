use chrono::{DateTime, Utc};
use diesel::{
    prelude::{Associations, Identifiable, Insertable, Queryable},
    Selectable,
};
use diesel_as_jsonb::AsJsonb;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat over one uploaded PDF document
#[derive(Debug, Clone, Identifiable, Queryable, Selectable, JsonSchema, Serialize)]
#[diesel(table_name = crate::db::schema::chats)]
#[serde(rename_all = "camelCase")]
pub struct DocChat {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: String,
    /// Key of the uploaded file in object storage
    pub file_key: String,
    /// Human-readable document name
    pub pdf_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::db::schema::chats)]
pub struct NewDocChat<'r> {
    pub user_id: &'r str,
    pub file_key: &'r str,
    pub pdf_name: &'r str,
}

#[derive(diesel_derive_enum::DbEnum)]
#[db_enum(existing_type_path = "crate::db::schema::sql_types::ChatMessageRole")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, JsonSchema, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocChatMessageRole {
    User,
    #[serde(alias = "system")]
    Assistant,
}

#[derive(
    Debug, Clone, Identifiable, Queryable, Selectable, Associations, JsonSchema, Serialize,
)]
#[diesel(belongs_to(DocChat, foreign_key = chat_id))]
#[diesel(table_name = crate::db::schema::chat_messages)]
#[serde(rename_all = "camelCase")]
pub struct DocChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: DocChatMessageRole,
    pub content: String,
    /// Assistant messages: the model that generated the answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::db::schema::chat_messages)]
pub struct NewDocChatMessage<'r> {
    pub chat_id: &'r Uuid,
    pub role: DocChatMessageRole,
    pub content: &'r str,
    pub model: Option<&'r str>,
}

/// A retrieved passage cited in support of an answer
#[derive(Debug, Clone, PartialEq, JsonSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePassage {
    pub content: String,
    pub page_number: Option<u32>,
}

/// The passages stored for one assistant message, as a JSON list
#[derive(Debug, Clone, Default, PartialEq, JsonSchema, Serialize, Deserialize, AsJsonb)]
pub struct SourcePassages(pub Vec<SourcePassage>);

#[derive(Debug, Clone, Identifiable, Queryable, Selectable, Associations)]
#[diesel(belongs_to(DocChatMessage, foreign_key = message_id))]
#[diesel(table_name = crate::db::schema::message_sources)]
pub struct MessageSource {
    pub id: Uuid,
    pub message_id: Uuid,
    pub chat_id: Uuid,
    pub data: SourcePassages,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::db::schema::message_sources)]
pub struct NewMessageSource<'r> {
    pub message_id: &'r Uuid,
    pub chat_id: &'r Uuid,
    pub data: SourcePassages,
}

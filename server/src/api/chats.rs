use rocket::{delete, get, post, serde::json::Json, Route};
use rocket_okapi::{
    okapi::openapi3::OpenApi, openapi, openapi_get_routes_spec, settings::OpenApiSettings,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::DocChatUserId,
    db::{
        models::{DocChat, DocChatMessage, NewDocChat, SourcePassage},
        services::ChatDbService,
        DbConnection,
    },
    errors::ApiError,
};

pub fn get_routes(settings: &OpenApiSettings) -> (Vec<Route>, OpenApi) {
    openapi_get_routes_spec![settings: get_all_chats, create_chat, get_chat_messages, delete_chat]
}

/// # List chats
/// Get the user's chats, newest first
#[openapi(tag = "Chats")]
#[get("/")]
async fn get_all_chats(
    user_id: DocChatUserId,
    mut db: DbConnection,
) -> Result<Json<Vec<DocChat>>, ApiError> {
    let chats = ChatDbService::new(&mut db).get_all_chats(&user_id).await?;

    Ok(Json(chats))
}

#[derive(JsonSchema, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatInput {
    /// Key of the uploaded PDF in object storage
    file_key: String,
    file_name: String,
}

/// # Create chat
/// Start a chat about an uploaded PDF
#[openapi(tag = "Chats")]
#[post("/", data = "<input>")]
async fn create_chat(
    user_id: DocChatUserId,
    mut db: DbConnection,
    input: Json<CreateChatInput>,
) -> Result<Json<DocChat>, ApiError> {
    if input.file_key.trim().is_empty() {
        return Err(ApiError::BadRequest("File key is required".into()));
    }
    let chat = ChatDbService::new(&mut db)
        .create_chat(NewDocChat {
            user_id: &user_id,
            file_key: &input.file_key,
            pdf_name: &input.file_name,
        })
        .await?;

    Ok(Json(chat))
}

#[derive(JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessageWithSources {
    #[serde(flatten)]
    message: DocChatMessage,
    sources: Vec<SourcePassage>,
}

#[derive(JsonSchema, Serialize)]
struct GetChatMessagesResponse {
    chat: DocChat,
    messages: Vec<ChatMessageWithSources>,
}

/// # Get chat messages
/// Get the chat's messages in order, with the sources cited by each answer
#[openapi(tag = "Chats")]
#[get("/<chat_id>/messages")]
async fn get_chat_messages(
    user_id: DocChatUserId,
    mut db: DbConnection,
    chat_id: Uuid,
) -> Result<Json<GetChatMessagesResponse>, ApiError> {
    let (chat, messages) = ChatDbService::new(&mut db)
        .get_chat_with_messages(&user_id, &chat_id)
        .await?;
    let messages = messages
        .into_iter()
        .map(|(message, source)| ChatMessageWithSources {
            message,
            sources: source.map(|source| source.data.0).unwrap_or_default(),
        })
        .collect();

    Ok(Json(GetChatMessagesResponse { chat, messages }))
}

/// # Delete chat
/// Delete a chat with its messages and sources
#[openapi(tag = "Chats")]
#[delete("/<chat_id>")]
async fn delete_chat(
    user_id: DocChatUserId,
    mut db: DbConnection,
    chat_id: Uuid,
) -> Result<String, ApiError> {
    let id = ChatDbService::new(&mut db)
        .delete_chat(&user_id, &chat_id)
        .await?;

    Ok(id.to_string())
}

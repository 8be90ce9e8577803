use rocket::{get, serde::json::Json, Route};
use rocket_okapi::{
    okapi::openapi3::OpenApi, openapi, openapi_get_routes_spec, settings::OpenApiSettings,
};
use schemars::JsonSchema;
use serde::Serialize;

use crate::{
    auth::DocChatUserId,
    db::{services::SettingsDbService, DbConnection},
    errors::ApiError,
};

pub fn get_routes(settings: &OpenApiSettings) -> (Vec<Route>, OpenApi) {
    openapi_get_routes_spec![settings: get_settings]
}

#[derive(Debug, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageResponse {
    /// Messages sent so far
    message_count: i32,
    /// Free message allowance. Unlimited if absent.
    free_messages: Option<i32>,
}

/// # Get usage settings
/// Get the user's message count and free message allowance
#[openapi(tag = "Settings")]
#[get("/")]
async fn get_settings(
    user_id: DocChatUserId,
    mut db: DbConnection,
) -> Result<Json<UsageResponse>, ApiError> {
    let settings = SettingsDbService::new(&mut db).find_by_user(&user_id).await?;
    let response = match settings {
        Some(settings) => UsageResponse {
            message_count: settings.message_count,
            free_messages: settings.free_messages,
        },
        None => UsageResponse {
            message_count: 0,
            free_messages: None,
        },
    };

    Ok(Json(response))
}

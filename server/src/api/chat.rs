use std::pin::Pin;

use rocket::{
    futures::{Stream, StreamExt},
    post,
    response::{self, stream::TextStream, Responder},
    serde::json::Json,
    Request, Route, State,
};
use rocket_okapi::{
    gen::OpenApiGenerator,
    okapi::openapi3::{MediaType, OpenApi, RefOr, Response as OpenApiResponse, Responses},
    openapi, openapi_get_routes_spec,
    response::OpenApiResponderInner,
    settings::OpenApiSettings,
};

use crate::{
    auth::DocChatUserId,
    errors::ApiError,
    model_catalog::ModelCatalog,
    retrieval::TokenStream,
    turn::{start_turn, SendChatInput, TurnHandle, TurnServices},
};

pub fn get_routes(settings: &OpenApiSettings) -> (Vec<Route>, OpenApi) {
    openapi_get_routes_spec![settings: send_chat]
}

/// # Send chat message
/// Ask a question about the chat's document, and stream the answer as plain text.
/// The question and answer are saved once the answer is complete.
#[openapi(tag = "Chat")]
#[post("/", data = "<input>")]
async fn send_chat(
    user_id: DocChatUserId,
    services: &State<TurnServices>,
    catalog: &State<ModelCatalog>,
    input: Json<SendChatInput>,
) -> Result<ChatTextStream, ApiError> {
    let TurnHandle { tokens, completion } =
        start_turn(&user_id, input.into_inner(), services, catalog).await?;
    drop(completion); // the turn is saved in the background

    Ok(ChatTextStream::new(tokens))
}

/// Plain text stream of the generated answer. A stream error ends the response.
pub struct ChatTextStream(Pin<Box<dyn Stream<Item = String> + Send>>);

impl ChatTextStream {
    fn new(tokens: TokenStream) -> Self {
        let text = tokens
            .take_while(|token| std::future::ready(token.is_ok()))
            .filter_map(|token| std::future::ready(token.ok()));
        Self(text.boxed())
    }
}

impl<'r> Responder<'r, 'r> for ChatTextStream {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'r> {
        TextStream(self.0).respond_to(req)
    }
}

impl OpenApiResponderInner for ChatTextStream {
    fn responses(gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut content = schemars::Map::new();
        content.insert(
            "text/plain".to_string(),
            MediaType {
                schema: Some(gen.json_schema::<String>()),
                ..Default::default()
            },
        );
        let mut responses = schemars::Map::new();
        responses.insert(
            "200".to_string(),
            RefOr::Object(OpenApiResponse {
                description: "The generated answer, streamed as it's written".to_string(),
                content,
                ..Default::default()
            }),
        );
        Ok(Responses {
            responses,
            ..Default::default()
        })
    }
}

use rocket::{
    catch, catchers,
    response::{self, Responder},
    serde::json::Json,
    Catcher, Request,
};
use rocket_okapi::response::OpenApiResponderInner;
use schemars::JsonSchema;

use crate::{retrieval::RetrievalError, turn::StoreError};

pub const QUOTA_EXCEEDED_MESSAGE: &str = "Free messages limit reached";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Db(#[from] diesel::result::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{}", QUOTA_EXCEEDED_MESSAGE)]
    QuotaExceeded,
    #[error("{0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// JSON body of every error response
#[derive(Debug, JsonSchema, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
impl ErrorBody {
    fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Responder)]
enum ApiErrorResponse {
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<ErrorBody>),
    #[response(status = 401, content_type = "json")]
    Unauthorized(Json<ErrorBody>),
    #[response(status = 403, content_type = "json")]
    Forbidden(Json<ErrorBody>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<ErrorBody>),
    #[response(status = 500, content_type = "json")]
    Server(Json<ErrorBody>),
}

impl ApiError {
    fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound
                | ApiError::Db(diesel::result::Error::NotFound)
                | ApiError::Store(StoreError::Db(diesel::result::Error::NotFound))
        )
    }
}

/// API error response handling
impl<'r, 'o: 'r> response::Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let response = match self {
            ApiError::Unauthorized => {
                ApiErrorResponse::Unauthorized(Json(ErrorBody::new(&self.to_string())))
            }
            ApiError::QuotaExceeded => {
                ApiErrorResponse::Forbidden(Json(ErrorBody::new(QUOTA_EXCEEDED_MESSAGE)))
            }
            ApiError::BadRequest(ref message) => {
                ApiErrorResponse::BadRequest(Json(ErrorBody::new(message)))
            }
            _ if self.is_not_found() => ApiErrorResponse::NotFound(Json(ErrorBody::new("Not found"))),
            _ => {
                tracing::error!("API error: {:?}", self);
                return ApiErrorResponse::Server(Json(ErrorBody::new(&self.to_string())))
                    .respond_to(req);
            }
        };
        tracing::info!("API error: {:?}", self);
        response.respond_to(req)
    }
}

/// Default JSON catchers for request errors.
pub fn get_catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        unprocessable_entity,
        not_found,
        server_error
    ]
}
#[catch(400)]
fn bad_request(_req: &Request) -> ApiErrorResponse {
    ApiErrorResponse::BadRequest(Json(ErrorBody::new("Bad request")))
}
#[catch(401)]
fn unauthorized(_req: &Request) -> ApiErrorResponse {
    ApiErrorResponse::Unauthorized(Json(ErrorBody::new("Unauthorized")))
}
#[catch(403)]
fn forbidden(_req: &Request) -> ApiErrorResponse {
    ApiErrorResponse::Forbidden(Json(ErrorBody::new("Forbidden")))
}
#[catch(404)]
fn not_found(_req: &Request) -> ApiErrorResponse {
    ApiErrorResponse::NotFound(Json(ErrorBody::new("Not found")))
}
#[catch(422)]
fn unprocessable_entity(_req: &Request) -> ApiErrorResponse {
    ApiErrorResponse::BadRequest(Json(ErrorBody::new("Incorrectly formatted")))
}
#[catch(500)]
fn server_error(_req: &Request) -> ApiErrorResponse {
    ApiErrorResponse::Server(Json(ErrorBody::new("Server error")))
}

/// OpenAPI specification for API error responses
impl OpenApiResponderInner for ApiError {
    fn responses(
        gen: &mut rocket_okapi::r#gen::OpenApiGenerator,
    ) -> rocket_okapi::Result<rocket_okapi::okapi::openapi3::Responses> {
        use rocket_okapi::okapi::openapi3::{
            MediaType, RefOr, Response as OpenApiResponse, Responses,
        };

        let mut responses = schemars::Map::new();
        let mut content = schemars::Map::new();
        content.insert(
            "application/json".to_string(),
            MediaType {
                schema: Some(gen.json_schema::<ErrorBody>()),
                ..Default::default()
            },
        );
        let response_data = vec![
            ("400", "Bad request"),
            ("401", "Authentication error"),
            ("403", "Free messages limit reached"),
            ("404", "Not found"),
            ("422", "Incorrectly formatted"),
            ("500", "Internal error"),
        ];
        for (status, description) in response_data {
            responses.insert(
                status.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    content: content.clone(),
                    ..Default::default()
                }),
            );
        }
        Ok(Responses {
            responses,
            ..Default::default()
        })
    }
}

use std::ops::Deref;

use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
};
use rocket_okapi::{
    gen::OpenApiGenerator,
    okapi::openapi3,
    request::{OpenApiFromRequest, RequestHeaderInput},
};

use crate::auth::TokenVerifier;

/// Cookie holding the session token, for browser requests
pub const SESSION_COOKIE: &str = "__session";

/// User ID request guard to ensure a logged-in user.
pub struct DocChatUserId(pub(super) String);

impl Deref for DocChatUserId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Request guard / middleware to ensure a logged-in user. The session token is
/// read from the `Authorization: Bearer` header, or else the session cookie.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for DocChatUserId {
    type Error = &'r str;

    async fn from_request(req: &'r rocket::Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(verifier) = req.rocket().state::<TokenVerifier>() else {
            rocket::error!("User guard: token verifier not initialized");
            return Outcome::Error((Status::InternalServerError, "Server error"));
        };

        let token = match req
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "))
        {
            Some(token) => Some(token.trim().to_owned()),
            None => req
                .cookies()
                .get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_owned()),
        };
        let Some(token) = token else {
            tracing::info!("User guard: missing session token");
            return Outcome::Error((Status::Unauthorized, "Unauthorized"));
        };

        match verifier.verify(&token) {
            Ok(claims) => Outcome::Success(DocChatUserId(claims.sub)),
            Err(e) => {
                tracing::info!("User guard: invalid session token: {}", e);
                Outcome::Error((Status::Unauthorized, "Unauthorized"))
            }
        }
    }
}

/// OpenAPI documentation for session token authentication when using the DocChatUserId guard.
impl<'a> OpenApiFromRequest<'a> for DocChatUserId {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = openapi3::SecurityScheme {
            description: Some("Requires a session token from the identity provider.".to_owned()),
            data: openapi3::SecuritySchemeData::Http {
                scheme: "bearer".to_owned(),
                bearer_format: Some("JWT".to_owned()),
            },
            extensions: openapi3::Object::default(),
        };
        let mut security_req = openapi3::SecurityRequirement::new();
        security_req.insert("Session".to_owned(), Vec::new());
        Ok(RequestHeaderInput::Security(
            "Session".to_owned(),
            security_scheme,
            security_req,
        ))
    }
}

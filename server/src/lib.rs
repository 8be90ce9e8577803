pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod model_catalog;
pub mod retrieval;
pub mod turn;
pub mod utils;

use rocket::{fairing::AdHoc, get, Build, Rocket};
use rocket_okapi::{mount_endpoints_and_merged_docs, openapi, openapi_get_routes_spec};

use crate::{
    auth::setup_auth,
    config::{get_config_provider, AppConfig},
    db::setup_db,
    errors::get_catchers,
    model_catalog::setup_model_catalog,
    turn::setup_turn_services,
};

/// Build the rocket server, load configuration and routes, prepare for launch
pub fn build_rocket() -> Rocket<Build> {
    let server = rocket::custom(get_config_provider())
        .attach(AdHoc::config::<AppConfig>())
        .attach(setup_db())
        .attach(setup_auth())
        .attach(setup_model_catalog())
        .attach(setup_turn_services());

    mount_routes(server)
}

/// Register the catchers, API routes and OpenAPI docs. The token verifier, model
/// catalog and turn services must be managed by the server.
pub fn mount_routes(server: Rocket<Build>) -> Rocket<Build> {
    let mut server = server
        .register("/", get_catchers())
        .mount("/api/docs", get_doc_routes());

    let openapi_settings = rocket_okapi::settings::OpenApiSettings::default();
    mount_endpoints_and_merged_docs! {
        server, "/api", openapi_settings,
        "/" => openapi_get_routes_spec![health],
        "/chat" => api::chat_routes(&openapi_settings),
        "/chats" => api::chats_routes(&openapi_settings),
        "/settings" => api::settings_routes(&openapi_settings),
        "/models" => api::models_routes(&openapi_settings),
    };

    server
}

/// Health route
#[openapi]
#[get("/health")]
async fn health() -> String {
    "OK".to_owned()
}

/// Create the OpenAPI doc routes
fn get_doc_routes() -> impl Into<Vec<rocket::Route>> {
    use rocket_okapi::{
        rapidoc::{make_rapidoc, GeneralConfig, Layout, LayoutConfig, RapiDocConfig, RenderStyle},
        settings::UrlObject,
    };

    make_rapidoc(&RapiDocConfig {
        general: GeneralConfig {
            spec_urls: vec![UrlObject::new("OpenAPI Schema", "/api/openapi.json")],
            ..Default::default()
        },
        layout: LayoutConfig {
            layout: Layout::Column,
            render_style: RenderStyle::View,
            ..Default::default()
        },
        ..Default::default()
    })
}

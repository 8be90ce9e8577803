use rocket::{get, serde::json::Json, Route, State};
use rocket_okapi::{
    okapi::openapi3::OpenApi, openapi, openapi_get_routes_spec, settings::OpenApiSettings,
};

use crate::model_catalog::ModelCatalog;

pub fn get_routes(settings: &OpenApiSettings) -> (Vec<Route>, OpenApi) {
    openapi_get_routes_spec![settings: get_models]
}

/// # List models
/// Get the selectable models, grouped by provider
#[openapi(tag = "Models")]
#[get("/")]
async fn get_models(catalog: &State<ModelCatalog>) -> Json<ModelCatalog> {
    Json(catalog.inner().clone())
}

//! The models users can select, grouped by provider

use std::collections::{BTreeMap, HashSet};

use rocket::{
    fairing::AdHoc,
    figment::{
        providers::{Format, Toml},
        Figment,
    },
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::get_app_config;

/// Built-in model catalog
const DEFAULT_CATALOG: &str = include_str!("../models.toml");

/// Model provider
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema, Serialize, Deserialize,
)]
pub enum ModelProvider {
    OpenAI,
    Anthropic,
    Google,
    DeepSeek,
}

/// The user's own API keys, per provider
pub type ProviderApiKeys = BTreeMap<ModelProvider, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, JsonSchema, Serialize, Deserialize)]
pub enum ModelTier {
    Basic,
    /// Requires the user's own API key for the provider
    Pro,
}

#[derive(Debug, Clone, JsonSchema, Serialize, Deserialize)]
pub struct ModelOption {
    /// Model ID sent to the provider
    pub id: String,
    pub label: String,
    pub description: String,
    pub credits: u32,
    pub tier: ModelTier,
}

#[derive(Debug, Clone, JsonSchema, Serialize, Deserialize)]
pub struct ModelProviderGroup {
    pub provider: ModelProvider,
    pub models: Vec<ModelOption>,
}

/// The allow-list of selectable models
#[derive(Debug, Clone, JsonSchema, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ModelCatalog {
    /// Model used when none (or an unknown one) is selected
    pub default_model: String,
    pub providers: Vec<ModelProviderGroup>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read model catalog: {0}")]
    Parsing(#[from] Box<rocket::figment::Error>),
    #[error("Default model {0} is not in the catalog")]
    UnknownDefault(String),
    #[error("Duplicate model ID in catalog: {0}")]
    DuplicateModel(String),
}

impl ModelCatalog {
    /// Parse a catalog from TOML
    pub fn from_toml(toml: &str) -> Result<Self, CatalogError> {
        Self::extract(Figment::from(Toml::string(toml)))
    }

    /// Load the catalog from the given TOML file, or the built-in catalog
    pub fn load(path: Option<&str>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::extract(Figment::from(Toml::file(path))),
            None => Self::from_toml(DEFAULT_CATALOG),
        }
    }

    fn extract(figment: Figment) -> Result<Self, CatalogError> {
        let catalog: ModelCatalog = figment.extract().map_err(Box::new)?;

        let mut ids = HashSet::new();
        for model in catalog.models() {
            if !ids.insert(model.id.as_str()) {
                return Err(CatalogError::DuplicateModel(model.id.clone()));
            }
        }
        if !catalog.contains(&catalog.default_model) {
            return Err(CatalogError::UnknownDefault(catalog.default_model.clone()));
        }
        Ok(catalog)
    }

    /// All models, in display order
    pub fn models(&self) -> impl Iterator<Item = &ModelOption> {
        self.providers.iter().flat_map(|group| group.models.iter())
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.find(model_id).is_some()
    }

    /// Find a model and its provider
    pub fn find(&self, model_id: &str) -> Option<(ModelProvider, &ModelOption)> {
        self.providers.iter().find_map(|group| {
            group
                .models
                .iter()
                .find(|model| model.id == model_id)
                .map(|model| (group.provider, model))
        })
    }

    /// Returns the selected model if it's in the catalog. Otherwise returns `None`,
    /// letting the retrieval service use its default model.
    pub fn validate_model(&self, selected: Option<&str>) -> Option<String> {
        match selected {
            Some(model_id) if self.contains(model_id) => Some(model_id.to_owned()),
            Some(model_id) if !model_id.is_empty() => {
                tracing::warn!("Invalid model selected, using default: {}", model_id);
                None
            }
            _ => None,
        }
    }
}

impl Default for ModelCatalog {
    /// The built-in catalog
    fn default() -> Self {
        Self::from_toml(DEFAULT_CATALOG).expect("built-in model catalog should be valid")
    }
}

/// Fairing that loads the model catalog
pub fn setup_model_catalog() -> AdHoc {
    AdHoc::on_ignite("Model catalog", |rocket| async {
        let models_path = get_app_config(&rocket).models_path.clone();
        let catalog = match ModelCatalog::load(models_path.as_deref()) {
            Ok(catalog) => catalog,
            Err(e) => panic!("Invalid model catalog: {}", e),
        };
        rocket::info!(
            "Loaded {} models, default model {}",
            catalog.models().count(),
            catalog.default_model
        );

        rocket.manage(catalog)
    })
}

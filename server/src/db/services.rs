mod chat;
mod settings;

pub use chat::ChatDbService;
pub use settings::SettingsDbService;

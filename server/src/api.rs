mod chat;
mod chats;
mod models;
mod settings;

pub use chat::{get_routes as chat_routes, ChatTextStream};
pub use chats::get_routes as chats_routes;
pub use models::get_routes as models_routes;
pub use settings::get_routes as settings_routes;

mod chat;
mod settings;

pub use chat::*;
pub use settings::*;

use doc_chat_api::{build_rocket, utils::setup_logging};
use rocket::launch;

#[launch]
pub fn rocket() -> _ {
    setup_logging();

    build_rocket()
}

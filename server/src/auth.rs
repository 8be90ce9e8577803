mod guard;
mod token;

pub use guard::{DocChatUserId, SESSION_COOKIE};
pub use token::{AuthError, SessionClaims, TokenVerifier};

use rocket::fairing::AdHoc;

use crate::config::get_app_config;

/// Fairing that sets up session token verification
pub fn setup_auth() -> AdHoc {
    AdHoc::on_ignite("Session token setup", |rocket| async {
        let app_config = get_app_config(&rocket);
        let verifier = match TokenVerifier::from_config(app_config) {
            Ok(verifier) => verifier,
            Err(e) => panic!("Invalid auth configuration: {}", e),
        };

        rocket.manage(verifier)
    })
}

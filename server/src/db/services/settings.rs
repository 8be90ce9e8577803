use diesel::prelude::*;
use diesel::result::Error;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::db::{
    models::{NewUserSettings, UserSettings},
    schema::user_settings,
};

pub struct SettingsDbService<'a> {
    pub db: &'a mut AsyncPgConnection,
}

impl<'a> SettingsDbService<'a> {
    pub fn new(db: &'a mut AsyncPgConnection) -> Self {
        SettingsDbService { db }
    }

    pub async fn find_by_user(&mut self, user_id: &str) -> Result<Option<UserSettings>, Error> {
        user_settings::table
            .find(user_id)
            .select(UserSettings::as_select())
            .first(self.db)
            .await
            .optional()
    }

    /// Atomically add one to the user's message count, creating the settings
    /// row (with the given allowance) if it doesn't exist yet.
    pub async fn increment_message_count(
        &mut self,
        user_id: &str,
        default_free_messages: Option<i32>,
    ) -> Result<i32, Error> {
        diesel::insert_into(user_settings::table)
            .values(NewUserSettings {
                user_id,
                message_count: 1,
                free_messages: default_free_messages,
            })
            .on_conflict(user_settings::user_id)
            .do_update()
            .set((
                user_settings::message_count.eq(user_settings::message_count + 1),
                user_settings::updated_at.eq(diesel::dsl::now),
            ))
            .returning(user_settings::message_count)
            .get_result(self.db)
            .await
    }
}

use chrono::{DateTime, Utc};
use diesel::{
    prelude::{Identifiable, Insertable, Queryable},
    Selectable,
};

/// Per-user usage settings
#[derive(Debug, Clone, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::db::schema::user_settings)]
#[diesel(primary_key(user_id))]
pub struct UserSettings {
    pub user_id: String,
    pub message_count: i32,
    pub free_messages: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::db::schema::user_settings)]
pub struct NewUserSettings<'r> {
    pub user_id: &'r str,
    pub message_count: i32,
    pub free_messages: Option<i32>,
}

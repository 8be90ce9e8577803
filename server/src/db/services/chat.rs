use diesel::{pg::Pg, prelude::*};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::{
    models::{
        DocChat, DocChatMessage, MessageSource, NewDocChat, NewDocChatMessage, NewMessageSource,
    },
    schema::{chat_messages, chats, message_sources},
};

fn user_chats(user_id: &str) -> chats::BoxedQuery<'_, Pg> {
    chats::table
        .filter(chats::user_id.eq(user_id))
        .order_by(chats::created_at.desc())
        .into_boxed()
}

pub struct ChatDbService<'a> {
    pub db: &'a mut AsyncPgConnection,
}

impl<'a> ChatDbService<'a> {
    pub fn new(db: &'a mut AsyncPgConnection) -> Self {
        ChatDbService { db }
    }

    pub async fn create_chat(
        &mut self,
        chat: NewDocChat<'_>,
    ) -> Result<DocChat, diesel::result::Error> {
        diesel::insert_into(chats::table)
            .values(chat)
            .returning(DocChat::as_returning())
            .get_result(self.db)
            .await
    }

    pub async fn find_chat(
        &mut self,
        user_id: &str,
        chat_id: &Uuid,
    ) -> Result<Option<DocChat>, diesel::result::Error> {
        chats::table
            .filter(chats::user_id.eq(user_id))
            .filter(chats::id.eq(chat_id))
            .select(DocChat::as_select())
            .first(self.db)
            .await
            .optional()
    }

    /// Get all of the user's chats, newest first
    pub async fn get_all_chats(
        &mut self,
        user_id: &str,
    ) -> Result<Vec<DocChat>, diesel::result::Error> {
        user_chats(user_id)
            .select(DocChat::as_select())
            .load(self.db)
            .await
    }

    /// Get the chat's messages in insertion order, along with their sources
    pub async fn get_chat_with_messages(
        &mut self,
        user_id: &str,
        chat_id: &Uuid,
    ) -> Result<(DocChat, Vec<(DocChatMessage, Option<MessageSource>)>), diesel::result::Error>
    {
        let chat = chats::table
            .filter(chats::user_id.eq(user_id))
            .filter(chats::id.eq(chat_id))
            .select(DocChat::as_select())
            .first(self.db)
            .await?;
        let messages = DocChatMessage::belonging_to(&chat)
            .select(DocChatMessage::as_select())
            .order_by(chat_messages::created_at.asc())
            .load(self.db)
            .await?;
        let sources = MessageSource::belonging_to(&messages)
            .select(MessageSource::as_select())
            .load(self.db)
            .await?;
        let messages_with_sources = sources
            .grouped_by(&messages)
            .into_iter()
            .zip(messages)
            .map(|(mut sources, message)| (message, sources.pop()))
            .collect();

        Ok((chat, messages_with_sources))
    }

    pub async fn save_message(
        &mut self,
        message: NewDocChatMessage<'_>,
    ) -> Result<DocChatMessage, diesel::result::Error> {
        diesel::insert_into(chat_messages::table)
            .values(message)
            .returning(DocChatMessage::as_returning())
            .get_result(self.db)
            .await
    }

    pub async fn save_sources(
        &mut self,
        source: NewMessageSource<'_>,
    ) -> Result<Uuid, diesel::result::Error> {
        diesel::insert_into(message_sources::table)
            .values(source)
            .returning(message_sources::id)
            .get_result(self.db)
            .await
    }

    pub async fn delete_chat(
        &mut self,
        user_id: &str,
        chat_id: &Uuid,
    ) -> Result<Uuid, diesel::result::Error> {
        diesel::delete(chats::table.find(chat_id))
            .filter(chats::user_id.eq(user_id))
            .returning(chats::id)
            .get_result(self.db)
            .await
    }
}

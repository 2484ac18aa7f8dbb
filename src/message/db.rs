use async_trait::async_trait;
use mongodb::bson::{self, Document};
use mongodb::Database;

use crate::campaign::CampaignId;
use crate::channel::Channel;
use crate::contact::ContactId;
use crate::database::mongo::{
    create_indexes, find_sorted, replace_versioned, to_bson, MongoAttemptStore, MongoMessageStore,
};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{CampaignMessage, DeliveryAttempt, MessageId, MessageStatus};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "campaign_messages",
        vec![
            bson::doc! {
                "key": { "campaign_id": 1, "contact_id": 1, "channel": 1 },
                "name": "by_recipient",
                "unique": true,
            },
            bson::doc! { "key": { "user_id": 1, "campaign_id": 1, "status": 1 }, "name": "by_status" },
        ],
    )
    .await?;

    create_indexes(
        db,
        "message_delivery_attempts",
        vec![bson::doc! { "key": { "message_id": 1, "attempt_number": 1 }, "name": "by_message_id" }],
    )
    .await
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &CampaignMessage) -> Result<(), Error>;

    async fn fetch_messages_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        status: Option<MessageStatus>,
    ) -> Result<Vec<CampaignMessage>, Error>;

    async fn fetch_message_by_id(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<Option<CampaignMessage>, Error>;

    async fn fetch_message_by_recipient(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        contact_id: ContactId,
        channel: Channel,
    ) -> Result<Option<CampaignMessage>, Error>;

    async fn update_message(&self, message: CampaignMessage) -> Result<CampaignMessage, Error>;

    async fn delete_messages_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error>;

    async fn delete_messages_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl MessageStore for MongoMessageStore {
    #[tracing::instrument(skip(self))]
    async fn insert_message(&self, message: &CampaignMessage) -> Result<(), Error> {
        self.insert_one(message, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_messages_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        status: Option<MessageStatus>,
    ) -> Result<Vec<CampaignMessage>, Error> {
        let mut filter = Document::new();
        filter.insert("user_id", user_id);
        filter.insert("campaign_id", campaign_id);
        if let Some(status) = status {
            filter.insert("status", to_bson(&status)?);
        }

        find_sorted(self, filter, bson::doc! { "created_at": 1 }).await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_message_by_id(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<Option<CampaignMessage>, Error> {
        let message = self
            .find_one(bson::doc! { "_id": message_id, "user_id": user_id }, None)
            .await?;

        Ok(message)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_message_by_recipient(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        contact_id: ContactId,
        channel: Channel,
    ) -> Result<Option<CampaignMessage>, Error> {
        let message = self
            .find_one(
                bson::doc! {
                    "user_id": user_id,
                    "campaign_id": campaign_id,
                    "contact_id": contact_id,
                    "channel": to_bson(&channel)?,
                },
                None,
            )
            .await?;

        Ok(message)
    }

    #[tracing::instrument(skip(self))]
    async fn update_message(&self, message: CampaignMessage) -> Result<CampaignMessage, Error> {
        replace_versioned(self, message).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_messages_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error> {
        let result = self
            .delete_many(
                bson::doc! { "user_id": user_id, "campaign_id": campaign_id },
                None,
            )
            .await?;

        Ok(result.deleted_count)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_messages_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl MessageStore for MemoryCollection<CampaignMessage> {
    async fn insert_message(&self, message: &CampaignMessage) -> Result<(), Error> {
        self.insert(message);
        Ok(())
    }

    async fn fetch_messages_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        status: Option<MessageStatus>,
    ) -> Result<Vec<CampaignMessage>, Error> {
        let mut messages = self.find(|m| {
            m.user_id == user_id
                && m.campaign_id == campaign_id
                && status.map_or(true, |s| m.status == s)
        });
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn fetch_message_by_id(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<Option<CampaignMessage>, Error> {
        Ok(self.find_one(|m| m.id == message_id && m.user_id == user_id))
    }

    async fn fetch_message_by_recipient(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        contact_id: ContactId,
        channel: Channel,
    ) -> Result<Option<CampaignMessage>, Error> {
        Ok(self.find_one(|m| {
            m.user_id == user_id
                && m.campaign_id == campaign_id
                && m.contact_id == contact_id
                && m.channel == channel
        }))
    }

    async fn update_message(&self, message: CampaignMessage) -> Result<CampaignMessage, Error> {
        self.replace_versioned(message)
    }

    async fn delete_messages_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error> {
        Ok(self.delete_where(|m| m.user_id == user_id && m.campaign_id == campaign_id))
    }

    async fn delete_messages_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn insert_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), Error>;

    async fn fetch_attempts_by_message(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<Vec<DeliveryAttempt>, Error>;

    async fn delete_attempts_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error>;

    async fn delete_attempts_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl AttemptStore for MongoAttemptStore {
    #[tracing::instrument(skip(self))]
    async fn insert_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), Error> {
        self.insert_one(attempt, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_attempts_by_message(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<Vec<DeliveryAttempt>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id, "message_id": message_id },
            bson::doc! { "attempt_number": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_attempts_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error> {
        let result = self
            .delete_many(
                bson::doc! { "user_id": user_id, "campaign_id": campaign_id },
                None,
            )
            .await?;

        Ok(result.deleted_count)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_attempts_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl AttemptStore for MemoryCollection<DeliveryAttempt> {
    async fn insert_attempt(&self, attempt: &DeliveryAttempt) -> Result<(), Error> {
        self.insert(attempt);
        Ok(())
    }

    async fn fetch_attempts_by_message(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<Vec<DeliveryAttempt>, Error> {
        let mut attempts = self.find(|a| a.user_id == user_id && a.message_id == message_id);
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    async fn delete_attempts_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error> {
        Ok(self.delete_where(|a| a.user_id == user_id && a.campaign_id == campaign_id))
    }

    async fn delete_attempts_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

use async_trait::async_trait;
use mongodb::options::FindOneOptions;
use mongodb::{bson, Database};

use crate::channel::Channel;
use crate::contact::ContactId;
use crate::database::mongo::{
    create_indexes, find_sorted, replace_versioned, to_bson, MongoConsentHistoryStore,
    MongoConsentStore,
};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{ConsentHistory, ContactConsent};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "contact_consents",
        vec![bson::doc! {
            "key": { "contact_id": 1, "channel": 1, "modified_at": -1 },
            "name": "by_contact_id_and_channel",
        }],
    )
    .await?;

    create_indexes(
        db,
        "consent_history",
        vec![bson::doc! {
            "key": { "contact_id": 1, "occurred_at": 1 },
            "name": "by_contact_id",
        }],
    )
    .await
}

#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn insert_consent(&self, consent: &ContactConsent) -> Result<(), Error>;

    async fn fetch_consents_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Vec<ContactConsent>, Error>;

    async fn fetch_latest_consent(
        &self,
        user_id: UserId,
        contact_id: ContactId,
        channel: Channel,
    ) -> Result<Option<ContactConsent>, Error>;

    async fn update_consent(&self, consent: ContactConsent) -> Result<ContactConsent, Error>;

    async fn delete_consents_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<u64, Error>;

    async fn delete_consents_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl ConsentStore for MongoConsentStore {
    #[tracing::instrument(skip(self))]
    async fn insert_consent(&self, consent: &ContactConsent) -> Result<(), Error> {
        self.insert_one(consent, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_consents_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Vec<ContactConsent>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id, "contact_id": contact_id },
            bson::doc! { "created_at": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_latest_consent(
        &self,
        user_id: UserId,
        contact_id: ContactId,
        channel: Channel,
    ) -> Result<Option<ContactConsent>, Error> {
        let options = FindOneOptions::builder()
            .sort(bson::doc! { "modified_at": -1 })
            .build();

        let consent = self
            .find_one(
                bson::doc! {
                    "user_id": user_id,
                    "contact_id": contact_id,
                    "channel": to_bson(&channel)?,
                },
                options,
            )
            .await?;

        Ok(consent)
    }

    #[tracing::instrument(skip(self))]
    async fn update_consent(&self, consent: ContactConsent) -> Result<ContactConsent, Error> {
        replace_versioned(self, consent).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_consents_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<u64, Error> {
        let result = self
            .delete_many(
                bson::doc! { "user_id": user_id, "contact_id": contact_id },
                None,
            )
            .await?;

        Ok(result.deleted_count)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_consents_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl ConsentStore for MemoryCollection<ContactConsent> {
    async fn insert_consent(&self, consent: &ContactConsent) -> Result<(), Error> {
        self.insert(consent);
        Ok(())
    }

    async fn fetch_consents_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Vec<ContactConsent>, Error> {
        let mut consents = self.find(|c| c.user_id == user_id && c.contact_id == contact_id);
        consents.sort_by_key(|c| c.created_at);
        Ok(consents)
    }

    async fn fetch_latest_consent(
        &self,
        user_id: UserId,
        contact_id: ContactId,
        channel: Channel,
    ) -> Result<Option<ContactConsent>, Error> {
        let consents = self.find(|c| {
            c.user_id == user_id && c.contact_id == contact_id && c.channel == channel
        });
        Ok(consents.into_iter().max_by_key(|c| c.modified_at))
    }

    async fn update_consent(&self, consent: ContactConsent) -> Result<ContactConsent, Error> {
        self.replace_versioned(consent)
    }

    async fn delete_consents_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<u64, Error> {
        Ok(self.delete_where(|c| c.user_id == user_id && c.contact_id == contact_id))
    }

    async fn delete_consents_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

#[async_trait]
pub trait ConsentHistoryStore: Send + Sync {
    async fn insert_history(&self, entry: &ConsentHistory) -> Result<(), Error>;

    async fn fetch_history_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Vec<ConsentHistory>, Error>;

    async fn delete_history_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<u64, Error>;

    async fn delete_history_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl ConsentHistoryStore for MongoConsentHistoryStore {
    #[tracing::instrument(skip(self))]
    async fn insert_history(&self, entry: &ConsentHistory) -> Result<(), Error> {
        self.insert_one(entry, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_history_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Vec<ConsentHistory>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id, "contact_id": contact_id },
            bson::doc! { "occurred_at": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_history_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<u64, Error> {
        let result = self
            .delete_many(
                bson::doc! { "user_id": user_id, "contact_id": contact_id },
                None,
            )
            .await?;

        Ok(result.deleted_count)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_history_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl ConsentHistoryStore for MemoryCollection<ConsentHistory> {
    async fn insert_history(&self, entry: &ConsentHistory) -> Result<(), Error> {
        self.insert(entry);
        Ok(())
    }

    async fn fetch_history_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Vec<ConsentHistory>, Error> {
        let mut history = self.find(|h| h.user_id == user_id && h.contact_id == contact_id);
        history.sort_by_key(|h| h.occurred_at);
        Ok(history)
    }

    async fn delete_history_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<u64, Error> {
        Ok(self.delete_where(|h| h.user_id == user_id && h.contact_id == contact_id))
    }

    async fn delete_history_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

use async_trait::async_trait;
use mongodb::{bson, Database};

use crate::database::mongo::{
    create_indexes, find_sorted, insert_unique, replace_versioned, MongoContactStore,
    MongoFrequencyStore,
};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{Contact, ContactId, FrequencyControl};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "contacts",
        vec![
            bson::doc! { "key": { "user_id": 1, "created_at": 1 }, "name": "by_user_id" },
            bson::doc! { "key": { "user_id": 1, "phone": 1 }, "name": "by_phone" },
            bson::doc! { "key": { "user_id": 1, "email": 1 }, "name": "by_email" },
        ],
    )
    .await?;

    create_indexes(
        db,
        "frequency_controls",
        vec![bson::doc! { "key": { "contact_id": 1 }, "name": "by_contact_id", "unique": true }],
    )
    .await
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn insert_contact(&self, contact: &Contact) -> Result<(), Error>;

    async fn fetch_contacts_by_user(&self, user_id: UserId) -> Result<Vec<Contact>, Error>;

    async fn fetch_contact_by_id(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Option<Contact>, Error>;

    async fn fetch_contact_by_phone(
        &self,
        user_id: UserId,
        phone: &str,
    ) -> Result<Option<Contact>, Error>;

    async fn fetch_contact_by_email(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<Option<Contact>, Error>;

    async fn update_contact(&self, contact: Contact) -> Result<Contact, Error>;

    async fn delete_contact(&self, user_id: UserId, contact_id: ContactId) -> Result<(), Error>;

    async fn delete_contacts_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl ContactStore for MongoContactStore {
    #[tracing::instrument(skip(self))]
    async fn insert_contact(&self, contact: &Contact) -> Result<(), Error> {
        self.insert_one(contact, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_contacts_by_user(&self, user_id: UserId) -> Result<Vec<Contact>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id },
            bson::doc! { "created_at": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_contact_by_id(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Option<Contact>, Error> {
        let contact = self
            .find_one(bson::doc! { "_id": contact_id, "user_id": user_id }, None)
            .await?;

        Ok(contact)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_contact_by_phone(
        &self,
        user_id: UserId,
        phone: &str,
    ) -> Result<Option<Contact>, Error> {
        let contact = self
            .find_one(bson::doc! { "user_id": user_id, "phone": phone }, None)
            .await?;

        Ok(contact)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_contact_by_email(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<Option<Contact>, Error> {
        let contact = self
            .find_one(bson::doc! { "user_id": user_id, "email": email }, None)
            .await?;

        Ok(contact)
    }

    #[tracing::instrument(skip(self))]
    async fn update_contact(&self, contact: Contact) -> Result<Contact, Error> {
        replace_versioned(self, contact).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_contact(&self, user_id: UserId, contact_id: ContactId) -> Result<(), Error> {
        self.delete_one(bson::doc! { "_id": contact_id, "user_id": user_id }, None)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_contacts_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl ContactStore for MemoryCollection<Contact> {
    async fn insert_contact(&self, contact: &Contact) -> Result<(), Error> {
        self.insert(contact);
        Ok(())
    }

    async fn fetch_contacts_by_user(&self, user_id: UserId) -> Result<Vec<Contact>, Error> {
        let mut contacts = self.find(|c| c.user_id == user_id);
        contacts.sort_by_key(|c| c.created_at);
        Ok(contacts)
    }

    async fn fetch_contact_by_id(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Option<Contact>, Error> {
        Ok(self.find_one(|c| c.id == contact_id && c.user_id == user_id))
    }

    async fn fetch_contact_by_phone(
        &self,
        user_id: UserId,
        phone: &str,
    ) -> Result<Option<Contact>, Error> {
        Ok(self.find_one(|c| c.user_id == user_id && c.phone.as_deref() == Some(phone)))
    }

    async fn fetch_contact_by_email(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<Option<Contact>, Error> {
        Ok(self.find_one(|c| c.user_id == user_id && c.email.as_deref() == Some(email)))
    }

    async fn update_contact(&self, contact: Contact) -> Result<Contact, Error> {
        self.replace_versioned(contact)
    }

    async fn delete_contact(&self, user_id: UserId, contact_id: ContactId) -> Result<(), Error> {
        self.delete_where(|c| c.id == contact_id && c.user_id == user_id);
        Ok(())
    }

    async fn delete_contacts_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

#[async_trait]
pub trait FrequencyStore: Send + Sync {
    /// Fails with `ConcurrentModificationDetected` if the contact already
    /// has a control.
    async fn insert_frequency_control(&self, control: &FrequencyControl) -> Result<(), Error>;

    async fn fetch_frequency_control_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Option<FrequencyControl>, Error>;

    async fn update_frequency_control(
        &self,
        control: FrequencyControl,
    ) -> Result<FrequencyControl, Error>;

    async fn delete_frequency_control_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<(), Error>;

    async fn delete_frequency_controls_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl FrequencyStore for MongoFrequencyStore {
    #[tracing::instrument(skip(self))]
    async fn insert_frequency_control(&self, control: &FrequencyControl) -> Result<(), Error> {
        insert_unique(self, control).await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_frequency_control_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Option<FrequencyControl>, Error> {
        let control = self
            .find_one(
                bson::doc! { "user_id": user_id, "contact_id": contact_id },
                None,
            )
            .await?;

        Ok(control)
    }

    #[tracing::instrument(skip(self))]
    async fn update_frequency_control(
        &self,
        control: FrequencyControl,
    ) -> Result<FrequencyControl, Error> {
        replace_versioned(self, control).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_frequency_control_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<(), Error> {
        self.delete_many(
            bson::doc! { "user_id": user_id, "contact_id": contact_id },
            None,
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_frequency_controls_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl FrequencyStore for MemoryCollection<FrequencyControl> {
    async fn insert_frequency_control(&self, control: &FrequencyControl) -> Result<(), Error> {
        self.insert_unique(control, |f| {
            f.user_id == control.user_id && f.contact_id == control.contact_id
        })
    }

    async fn fetch_frequency_control_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<Option<FrequencyControl>, Error> {
        Ok(self.find_one(|f| f.user_id == user_id && f.contact_id == contact_id))
    }

    async fn update_frequency_control(
        &self,
        control: FrequencyControl,
    ) -> Result<FrequencyControl, Error> {
        self.replace_versioned(control)
    }

    async fn delete_frequency_control_by_contact(
        &self,
        user_id: UserId,
        contact_id: ContactId,
    ) -> Result<(), Error> {
        self.delete_where(|f| f.user_id == user_id && f.contact_id == contact_id);
        Ok(())
    }

    async fn delete_frequency_controls_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

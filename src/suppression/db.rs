use async_trait::async_trait;
use mongodb::{bson, Database};

use crate::database::mongo::{create_indexes, find_sorted, MongoSuppressionStore};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{SuppressionEntry, SuppressionId};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "suppression_list",
        vec![
            bson::doc! {
                "key": { "user_id": 1, "address": 1, "channel": 1 },
                "name": "by_address_and_channel",
                "unique": true,
            },
            bson::doc! { "key": { "user_id": 1, "created_at": -1 }, "name": "by_user_id" },
        ],
    )
    .await
}

#[async_trait]
pub trait SuppressionStore: Send + Sync {
    async fn insert_suppression(&self, entry: &SuppressionEntry) -> Result<(), Error>;

    async fn fetch_suppressions_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SuppressionEntry>, Error>;

    async fn fetch_suppression_by_id(
        &self,
        user_id: UserId,
        suppression_id: SuppressionId,
    ) -> Result<Option<SuppressionEntry>, Error>;

    async fn fetch_suppressions_by_address(
        &self,
        user_id: UserId,
        address: &str,
    ) -> Result<Vec<SuppressionEntry>, Error>;

    async fn delete_suppression(
        &self,
        user_id: UserId,
        suppression_id: SuppressionId,
    ) -> Result<(), Error>;

    async fn delete_suppressions_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl SuppressionStore for MongoSuppressionStore {
    #[tracing::instrument(skip(self))]
    async fn insert_suppression(&self, entry: &SuppressionEntry) -> Result<(), Error> {
        self.insert_one(entry, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_suppressions_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SuppressionEntry>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id },
            bson::doc! { "created_at": -1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_suppression_by_id(
        &self,
        user_id: UserId,
        suppression_id: SuppressionId,
    ) -> Result<Option<SuppressionEntry>, Error> {
        let entry = self
            .find_one(
                bson::doc! { "_id": suppression_id, "user_id": user_id },
                None,
            )
            .await?;

        Ok(entry)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_suppressions_by_address(
        &self,
        user_id: UserId,
        address: &str,
    ) -> Result<Vec<SuppressionEntry>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id, "address": address },
            bson::doc! { "created_at": -1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_suppression(
        &self,
        user_id: UserId,
        suppression_id: SuppressionId,
    ) -> Result<(), Error> {
        self.delete_one(
            bson::doc! { "_id": suppression_id, "user_id": user_id },
            None,
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_suppressions_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl SuppressionStore for MemoryCollection<SuppressionEntry> {
    async fn insert_suppression(&self, entry: &SuppressionEntry) -> Result<(), Error> {
        self.insert(entry);
        Ok(())
    }

    async fn fetch_suppressions_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SuppressionEntry>, Error> {
        let mut entries = self.find(|s| s.user_id == user_id);
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn fetch_suppression_by_id(
        &self,
        user_id: UserId,
        suppression_id: SuppressionId,
    ) -> Result<Option<SuppressionEntry>, Error> {
        Ok(self.find_one(|s| s.id == suppression_id && s.user_id == user_id))
    }

    async fn fetch_suppressions_by_address(
        &self,
        user_id: UserId,
        address: &str,
    ) -> Result<Vec<SuppressionEntry>, Error> {
        let mut entries = self.find(|s| s.user_id == user_id && s.address == address);
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn delete_suppression(
        &self,
        user_id: UserId,
        suppression_id: SuppressionId,
    ) -> Result<(), Error> {
        self.delete_where(|s| s.id == suppression_id && s.user_id == user_id);
        Ok(())
    }

    async fn delete_suppressions_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

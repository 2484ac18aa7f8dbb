use async_trait::async_trait;
use mongodb::{bson, Database};

use crate::campaign::CampaignId;
use crate::database::mongo::{create_indexes, find_sorted, replace_versioned, MongoVariantStore};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{CampaignVariant, VariantId};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "campaign_variants",
        vec![bson::doc! { "key": { "campaign_id": 1, "created_at": 1 }, "name": "by_campaign_id" }],
    )
    .await
}

#[async_trait]
pub trait VariantStore: Send + Sync {
    async fn insert_variant(&self, variant: &CampaignVariant) -> Result<(), Error>;

    async fn fetch_variants_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Vec<CampaignVariant>, Error>;

    async fn fetch_variant_by_id(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        variant_id: VariantId,
    ) -> Result<Option<CampaignVariant>, Error>;

    async fn update_variant(&self, variant: CampaignVariant) -> Result<CampaignVariant, Error>;

    async fn delete_variant(&self, user_id: UserId, variant_id: VariantId) -> Result<(), Error>;

    async fn delete_variants_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error>;

    async fn delete_variants_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl VariantStore for MongoVariantStore {
    #[tracing::instrument(skip(self))]
    async fn insert_variant(&self, variant: &CampaignVariant) -> Result<(), Error> {
        self.insert_one(variant, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_variants_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Vec<CampaignVariant>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id, "campaign_id": campaign_id },
            bson::doc! { "created_at": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_variant_by_id(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        variant_id: VariantId,
    ) -> Result<Option<CampaignVariant>, Error> {
        let variant = self
            .find_one(
                bson::doc! { "_id": variant_id, "user_id": user_id, "campaign_id": campaign_id },
                None,
            )
            .await?;

        Ok(variant)
    }

    #[tracing::instrument(skip(self))]
    async fn update_variant(&self, variant: CampaignVariant) -> Result<CampaignVariant, Error> {
        replace_versioned(self, variant).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_variant(&self, user_id: UserId, variant_id: VariantId) -> Result<(), Error> {
        self.delete_one(bson::doc! { "_id": variant_id, "user_id": user_id }, None)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_variants_by_campaign(
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
    async fn delete_variants_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl VariantStore for MemoryCollection<CampaignVariant> {
    async fn insert_variant(&self, variant: &CampaignVariant) -> Result<(), Error> {
        self.insert(variant);
        Ok(())
    }

    async fn fetch_variants_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Vec<CampaignVariant>, Error> {
        let mut variants = self.find(|v| v.user_id == user_id && v.campaign_id == campaign_id);
        variants.sort_by_key(|v| v.created_at);
        Ok(variants)
    }

    async fn fetch_variant_by_id(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        variant_id: VariantId,
    ) -> Result<Option<CampaignVariant>, Error> {
        Ok(self.find_one(|v| {
            v.id == variant_id && v.user_id == user_id && v.campaign_id == campaign_id
        }))
    }

    async fn update_variant(&self, variant: CampaignVariant) -> Result<CampaignVariant, Error> {
        self.replace_versioned(variant)
    }

    async fn delete_variant(&self, user_id: UserId, variant_id: VariantId) -> Result<(), Error> {
        self.delete_where(|v| v.id == variant_id && v.user_id == user_id);
        Ok(())
    }

    async fn delete_variants_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error> {
        Ok(self.delete_where(|v| v.user_id == user_id && v.campaign_id == campaign_id))
    }

    async fn delete_variants_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

use async_trait::async_trait;
use mongodb::{bson, Database};

use crate::database::mongo::{create_indexes, find_sorted, replace_versioned, MongoCampaignStore};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{Campaign, CampaignId};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "campaigns",
        vec![bson::doc! { "key": { "user_id": 1, "created_at": -1 }, "name": "by_user_id" }],
    )
    .await
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), Error>;

    async fn fetch_campaigns_by_user(&self, user_id: UserId) -> Result<Vec<Campaign>, Error>;

    async fn fetch_campaign_by_id(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Option<Campaign>, Error>;

    async fn update_campaign(&self, campaign: Campaign) -> Result<Campaign, Error>;

    async fn delete_campaign(&self, user_id: UserId, campaign_id: CampaignId)
        -> Result<(), Error>;

    async fn delete_campaigns_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl CampaignStore for MongoCampaignStore {
    #[tracing::instrument(skip(self))]
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), Error> {
        self.insert_one(campaign, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_campaigns_by_user(&self, user_id: UserId) -> Result<Vec<Campaign>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id },
            bson::doc! { "created_at": -1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_campaign_by_id(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Option<Campaign>, Error> {
        let campaign = self
            .find_one(bson::doc! { "_id": campaign_id, "user_id": user_id }, None)
            .await?;

        Ok(campaign)
    }

    #[tracing::instrument(skip(self))]
    async fn update_campaign(&self, campaign: Campaign) -> Result<Campaign, Error> {
        replace_versioned(self, campaign).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<(), Error> {
        self.delete_one(bson::doc! { "_id": campaign_id, "user_id": user_id }, None)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_campaigns_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl CampaignStore for MemoryCollection<Campaign> {
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), Error> {
        self.insert(campaign);
        Ok(())
    }

    async fn fetch_campaigns_by_user(&self, user_id: UserId) -> Result<Vec<Campaign>, Error> {
        let mut campaigns = self.find(|c| c.user_id == user_id);
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    async fn fetch_campaign_by_id(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Option<Campaign>, Error> {
        Ok(self.find_one(|c| c.id == campaign_id && c.user_id == user_id))
    }

    async fn update_campaign(&self, campaign: Campaign) -> Result<Campaign, Error> {
        self.replace_versioned(campaign)
    }

    async fn delete_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<(), Error> {
        self.delete_where(|c| c.id == campaign_id && c.user_id == user_id);
        Ok(())
    }

    async fn delete_campaigns_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

use async_trait::async_trait;
use chrono::Utc;
use mongodb::options::UpdateOptions;
use mongodb::bson::{self, Document};
use mongodb::Collection;

use crate::campaign::CampaignId;
use crate::database::mongo::find_sorted;
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;
use crate::variant::VariantId;

use super::{AnalyticsCounters, AnalyticsEvent, CampaignAnalytics, VariantAnalytics};

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Atomically bumps the event's counter for the campaign and, when
    /// given, the variant, creating either record on first use.
    async fn increment(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        variant_id: Option<VariantId>,
        event: AnalyticsEvent,
    ) -> Result<(), Error>;

    async fn fetch_campaign_analytics(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Option<CampaignAnalytics>, Error>;

    async fn fetch_variant_analytics(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Vec<VariantAnalytics>, Error>;

    async fn delete_analytics_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error>;

    async fn delete_analytics_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[derive(Debug, Clone)]
pub struct MongoAnalyticsStore {
    pub campaigns: Collection<CampaignAnalytics>,
    pub variants: Collection<VariantAnalytics>,
}

#[async_trait]
impl AnalyticsStore for MongoAnalyticsStore {
    #[tracing::instrument(skip(self))]
    async fn increment(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        variant_id: Option<VariantId>,
        event: AnalyticsEvent,
    ) -> Result<(), Error> {
        let now = bson::DateTime::from_chrono(Utc::now());
        let upsert = UpdateOptions::builder().upsert(true).build();
        let mut inc = Document::new();
        inc.insert(event.field(), 1_i64);

        self.campaigns
            .update_one(
                bson::doc! { "_id": campaign_id },
                bson::doc! {
                    "$inc": inc.clone(),
                    "$set": { "updated_at": now },
                    "$setOnInsert": { "user_id": user_id },
                },
                upsert.clone(),
            )
            .await?;

        if let Some(variant_id) = variant_id {
            self.variants
                .update_one(
                    bson::doc! { "_id": variant_id },
                    bson::doc! {
                        "$inc": inc,
                        "$set": { "updated_at": now },
                        "$setOnInsert": { "user_id": user_id, "campaign_id": campaign_id },
                    },
                    upsert,
                )
                .await?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_campaign_analytics(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Option<CampaignAnalytics>, Error> {
        let analytics = self
            .campaigns
            .find_one(bson::doc! { "_id": campaign_id, "user_id": user_id }, None)
            .await?;

        Ok(analytics)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_variant_analytics(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Vec<VariantAnalytics>, Error> {
        find_sorted(
            &self.variants,
            bson::doc! { "user_id": user_id, "campaign_id": campaign_id },
            bson::doc! { "_id": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_analytics_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error> {
        let campaigns = self
            .campaigns
            .delete_many(bson::doc! { "_id": campaign_id, "user_id": user_id }, None)
            .await?;
        let variants = self
            .variants
            .delete_many(
                bson::doc! { "campaign_id": campaign_id, "user_id": user_id },
                None,
            )
            .await?;

        Ok(campaigns.deleted_count + variants.deleted_count)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_analytics_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let campaigns = self
            .campaigns
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;
        let variants = self
            .variants
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(campaigns.deleted_count + variants.deleted_count)
    }
}

#[derive(Debug, Default)]
pub struct MemoryAnalyticsStore {
    campaigns: MemoryCollection<CampaignAnalytics>,
    variants: MemoryCollection<VariantAnalytics>,
}

impl MemoryAnalyticsStore {
    pub fn clear(&self) {
        self.campaigns.clear();
        self.variants.clear();
    }
}

#[async_trait]
impl AnalyticsStore for MemoryAnalyticsStore {
    async fn increment(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
        variant_id: Option<VariantId>,
        event: AnalyticsEvent,
    ) -> Result<(), Error> {
        let now = Utc::now();

        self.campaigns.upsert_with(
            campaign_id.to_string(),
            || CampaignAnalytics::empty(user_id, campaign_id),
            |analytics| {
                analytics.counters.apply(event);
                analytics.updated_at = now;
            },
        );

        if let Some(variant_id) = variant_id {
            self.variants.upsert_with(
                variant_id.to_string(),
                || VariantAnalytics {
                    variant_id,
                    user_id,
                    campaign_id,
                    counters: AnalyticsCounters::default(),
                    updated_at: now,
                },
                |analytics| {
                    analytics.counters.apply(event);
                    analytics.updated_at = now;
                },
            );
        }

        Ok(())
    }

    async fn fetch_campaign_analytics(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Option<CampaignAnalytics>, Error> {
        Ok(self
            .campaigns
            .get(&campaign_id.to_string())
            .filter(|a| a.user_id == user_id))
    }

    async fn fetch_variant_analytics(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<Vec<VariantAnalytics>, Error> {
        let mut analytics = self
            .variants
            .find(|a| a.user_id == user_id && a.campaign_id == campaign_id);
        analytics.sort_by_key(|a| a.variant_id.to_string());
        Ok(analytics)
    }

    async fn delete_analytics_by_campaign(
        &self,
        user_id: UserId,
        campaign_id: CampaignId,
    ) -> Result<u64, Error> {
        let campaigns = self
            .campaigns
            .delete_where(|a| a.user_id == user_id && a.campaign_id == campaign_id);
        let variants = self
            .variants
            .delete_where(|a| a.user_id == user_id && a.campaign_id == campaign_id);

        Ok(campaigns + variants)
    }

    async fn delete_analytics_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.campaigns.delete_by_owner(user_id) + self.variants.delete_by_owner(user_id))
    }
}

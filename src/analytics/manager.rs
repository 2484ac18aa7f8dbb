use crate::campaign::CampaignId;
use crate::database::Database;
use crate::error::Error;
use crate::user::UserId;
use crate::variant::VariantId;

use super::{AnalyticsEvent, CampaignAnalytics, VariantAnalytics};

#[tracing::instrument(skip(db))]
pub async fn record_event(
    db: &dyn Database,
    user_id: UserId,
    campaign_id: CampaignId,
    variant_id: Option<VariantId>,
    event: AnalyticsEvent,
) -> Result<(), Error> {
    db.analytics()
        .increment(user_id, campaign_id, variant_id, event)
        .await
}

/// The campaign's counters; a campaign nothing has happened to yet reads as
/// all zeroes.
#[tracing::instrument(skip(db))]
pub async fn get_campaign_analytics(
    db: &dyn Database,
    user_id: UserId,
    campaign_id: CampaignId,
) -> Result<CampaignAnalytics, Error> {
    let analytics = db
        .analytics()
        .fetch_campaign_analytics(user_id, campaign_id)
        .await?
        .unwrap_or_else(|| CampaignAnalytics::empty(user_id, campaign_id));

    Ok(analytics)
}

#[tracing::instrument(skip(db))]
pub async fn get_variant_analytics(
    db: &dyn Database,
    user_id: UserId,
    campaign_id: CampaignId,
) -> Result<Vec<VariantAnalytics>, Error> {
    let analytics = db
        .analytics()
        .fetch_variant_analytics(user_id, campaign_id)
        .await?;

    Ok(analytics)
}

use actix_web::get;
use actix_web::web::{Data, Json, Path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::campaign::{self, CampaignId};
use crate::database::Database;
use crate::error::Error;
use crate::variant::VariantId;

use super::manager;
use super::{AnalyticsCounters, CampaignAnalytics, VariantAnalytics};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RatesBody {
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

impl RatesBody {
    pub fn render(counters: &AnalyticsCounters) -> RatesBody {
        RatesBody {
            delivery_rate: counters.delivery_rate(),
            open_rate: counters.open_rate(),
            click_rate: counters.click_rate(),
            conversion_rate: counters.conversion_rate(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariantAnalyticsBody {
    pub variant_id: VariantId,
    pub counters: AnalyticsCounters,
    pub rates: RatesBody,
    pub updated_at: DateTime<Utc>,
}

impl VariantAnalyticsBody {
    pub fn render(analytics: VariantAnalytics) -> VariantAnalyticsBody {
        VariantAnalyticsBody {
            variant_id: analytics.variant_id,
            rates: RatesBody::render(&analytics.counters),
            counters: analytics.counters,
            updated_at: analytics.updated_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignAnalyticsBody {
    pub campaign_id: CampaignId,
    pub counters: AnalyticsCounters,
    pub rates: RatesBody,
    pub variants: Vec<VariantAnalyticsBody>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignAnalyticsBody {
    pub fn render(
        analytics: CampaignAnalytics,
        variants: Vec<VariantAnalytics>,
    ) -> CampaignAnalyticsBody {
        CampaignAnalyticsBody {
            campaign_id: analytics.campaign_id,
            rates: RatesBody::render(&analytics.counters),
            counters: analytics.counters,
            variants: variants.into_iter().map(VariantAnalyticsBody::render).collect(),
            updated_at: analytics.updated_at,
        }
    }
}

#[get("/campaigns/{campaign_id}/analytics")]
#[tracing::instrument(skip(db))]
pub async fn get_campaign_analytics(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<CampaignAnalyticsBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign =
        campaign::manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let analytics = manager::get_campaign_analytics(&***db, tenant.user_id, campaign.id).await?;
    let variants = manager::get_variant_analytics(&***db, tenant.user_id, campaign.id).await?;

    Ok(Json(CampaignAnalyticsBody::render(analytics, variants)))
}

use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::campaign::{self, CampaignContent, CampaignId};
use crate::database::Database;
use crate::error::Error;

use super::manager::{self, NewVariant, VariantUpdate};
use super::{CampaignVariant, VariantId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariantBody {
    pub id: VariantId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub content: CampaignContent,
    pub traffic_percentage: u8,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl VariantBody {
    pub fn render(variant: CampaignVariant) -> VariantBody {
        VariantBody {
            id: variant.id,
            campaign_id: variant.campaign_id,
            name: variant.name,
            content: variant.content,
            traffic_percentage: variant.traffic_percentage,
            is_active: variant.is_active,
            created_at: variant.created_at,
            modified_at: variant.modified_at,
        }
    }
}

#[post("/campaigns/{campaign_id}/variants")]
#[tracing::instrument(skip(db))]
pub async fn create_variant(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
    body: Json<NewVariant>,
) -> Result<Json<VariantBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign =
        campaign::manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let variant = manager::create_variant(&***db, &campaign, body.into_inner()).await?;

    Ok(Json(VariantBody::render(variant)))
}

#[get("/campaigns/{campaign_id}/variants")]
#[tracing::instrument(skip(db))]
pub async fn get_variants(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<Vec<VariantBody>>, Error> {
    let campaign_id = params.into_inner();

    let campaign =
        campaign::manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let variants = manager::get_variants(&***db, &campaign).await?;

    Ok(Json(variants.into_iter().map(VariantBody::render).collect()))
}

#[get("/campaigns/{campaign_id}/variants/{variant_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_variant_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<(CampaignId, VariantId)>,
) -> Result<Json<VariantBody>, Error> {
    let (campaign_id, variant_id) = params.into_inner();

    let variant =
        manager::get_variant_by_id(&***db, tenant.user_id, campaign_id, variant_id).await?;

    Ok(Json(VariantBody::render(variant)))
}

#[put("/campaigns/{campaign_id}/variants/{variant_id}")]
#[tracing::instrument(skip(db))]
pub async fn update_variant(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<(CampaignId, VariantId)>,
    body: Json<VariantUpdate>,
) -> Result<Json<VariantBody>, Error> {
    let (campaign_id, variant_id) = params.into_inner();

    let campaign =
        campaign::manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let variant = manager::get_variant_by_id(&***db, tenant.user_id, campaign.id, variant_id).await?;
    let variant = manager::update_variant(&***db, &campaign, variant, body.into_inner()).await?;

    Ok(Json(VariantBody::render(variant)))
}

#[delete("/campaigns/{campaign_id}/variants/{variant_id}")]
#[tracing::instrument(skip(db))]
pub async fn delete_variant(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<(CampaignId, VariantId)>,
) -> Result<HttpResponse, Error> {
    let (campaign_id, variant_id) = params.into_inner();

    let campaign =
        campaign::manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let variant = manager::get_variant_by_id(&***db, tenant.user_id, campaign.id, variant_id).await?;
    manager::delete_variant(&***db, &campaign, variant).await?;

    Ok(HttpResponse::NoContent().finish())
}

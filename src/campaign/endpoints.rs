use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::channel::Channel;
use crate::database::Database;
use crate::error::Error;
use crate::variant::{self, VariantBody, VariantId};

use super::manager::{self, CampaignUpdate, NewCampaign};
use super::{
    Campaign, CampaignAudience, CampaignContent, CampaignId, CampaignSchedule, CampaignStatus,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignBody {
    pub id: CampaignId,
    pub name: String,
    pub description: Option<String>,
    pub channels: Vec<Channel>,
    pub status: CampaignStatus,
    pub content: Option<CampaignContent>,
    pub audience: Option<CampaignAudience>,
    pub schedule: Option<CampaignSchedule>,
    pub is_ab_test: bool,
    pub variants: Vec<VariantBody>,
    pub winning_variant_id: Option<VariantId>,
    pub failure_reason: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl CampaignBody {
    pub async fn render(db: &dyn Database, campaign: Campaign) -> Result<CampaignBody, Error> {
        let variants = if campaign.is_ab_test {
            variant::manager::get_variants(db, &campaign)
                .await?
                .into_iter()
                .map(VariantBody::render)
                .collect()
        } else {
            vec![]
        };

        Ok(CampaignBody {
            id: campaign.id,
            name: campaign.name,
            description: campaign.description,
            channels: campaign.channels,
            status: campaign.status,
            content: campaign.content,
            audience: campaign.audience,
            schedule: campaign.schedule,
            is_ab_test: campaign.is_ab_test,
            variants,
            winning_variant_id: campaign.winning_variant_id,
            failure_reason: campaign.failure_reason,
            scheduled_at: campaign.scheduled_at,
            started_at: campaign.started_at,
            completed_at: campaign.completed_at,
            created_at: campaign.created_at,
            modified_at: campaign.modified_at,
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScheduleCampaignBody {
    #[serde(default)]
    pub send_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailCampaignBody {
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeclareWinnerBody {
    pub variant_id: VariantId,
}

#[post("/campaigns")]
#[tracing::instrument(skip(db))]
pub async fn create_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    body: Json<NewCampaign>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign = manager::create_campaign(&***db, tenant.user_id, body.into_inner()).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[get("/campaigns")]
#[tracing::instrument(skip(db))]
pub async fn get_campaigns(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<Vec<CampaignBody>>, Error> {
    let campaigns = manager::get_campaigns(&***db, tenant.user_id).await?;

    let mut body = vec![];
    for campaign in campaigns {
        body.push(CampaignBody::render(&***db, campaign).await?);
    }

    Ok(Json(body))
}

#[get("/campaigns/{campaign_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_campaign_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[put("/campaigns/{campaign_id}")]
#[tracing::instrument(skip(db))]
pub async fn update_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
    body: Json<CampaignUpdate>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::update_campaign(&***db, campaign, body.into_inner()).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[delete("/campaigns/{campaign_id}")]
#[tracing::instrument(skip(db))]
pub async fn delete_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<HttpResponse, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    manager::delete_campaign(&***db, campaign).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[post("/campaigns/{campaign_id}/schedule")]
#[tracing::instrument(skip(db))]
pub async fn schedule_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
    body: Option<Json<ScheduleCampaignBody>>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();
    let body = body.map(Json::into_inner).unwrap_or_default();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::schedule_campaign(&***db, campaign, body.send_at).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[post("/campaigns/{campaign_id}/unschedule")]
#[tracing::instrument(skip(db))]
pub async fn unschedule_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::unschedule_campaign(&***db, campaign).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[post("/campaigns/{campaign_id}/start")]
#[tracing::instrument(skip(db))]
pub async fn start_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::start_campaign(&***db, campaign).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[post("/campaigns/{campaign_id}/pause")]
#[tracing::instrument(skip(db))]
pub async fn pause_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::pause_campaign(&***db, campaign).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[post("/campaigns/{campaign_id}/resume")]
#[tracing::instrument(skip(db))]
pub async fn resume_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::resume_campaign(&***db, campaign).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[post("/campaigns/{campaign_id}/complete")]
#[tracing::instrument(skip(db))]
pub async fn complete_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::complete_campaign(&***db, campaign).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[post("/campaigns/{campaign_id}/fail")]
#[tracing::instrument(skip(db))]
pub async fn fail_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
    body: Json<FailCampaignBody>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();
    let body = body.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::fail_campaign(&***db, campaign, body.reason).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[post("/campaigns/{campaign_id}/cancel")]
#[tracing::instrument(skip(db))]
pub async fn cancel_campaign(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::cancel_campaign(&***db, campaign).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

#[post("/campaigns/{campaign_id}/winner")]
#[tracing::instrument(skip(db))]
pub async fn declare_winner(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
    body: Json<DeclareWinnerBody>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();
    let body = body.into_inner();

    let campaign = manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let campaign = manager::declare_winner(&***db, campaign, body.variant_id).await?;

    Ok(Json(CampaignBody::render(&***db, campaign).await?))
}

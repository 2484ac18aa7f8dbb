use actix_web::web::{Data, Json, Path, Query};
use actix_web::{delete, get, post, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::channel::Channel;
use crate::contact::ContactId;
use crate::database::Database;
use crate::error::Error;

use super::manager::{self, NewSuppression};
use super::{SuppressionEntry, SuppressionId, SuppressionReason};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuppressionBody {
    pub id: SuppressionId,
    pub address: String,
    pub channel: Option<Channel>,
    pub contact_id: Option<ContactId>,
    pub reason: SuppressionReason,
    pub note: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SuppressionBody {
    pub fn render(entry: SuppressionEntry) -> SuppressionBody {
        SuppressionBody {
            id: entry.id,
            address: entry.address,
            channel: entry.channel,
            contact_id: entry.contact_id,
            reason: entry.reason,
            note: entry.note,
            expires_at: entry.expires_at,
            created_at: entry.created_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SuppressionCheckQuery {
    pub address: String,
    pub channel: Channel,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuppressionCheckBody {
    pub address: String,
    pub channel: Channel,
    pub suppressed: bool,
    pub entry: Option<SuppressionBody>,
}

#[post("/suppressions")]
#[tracing::instrument(skip(db))]
pub async fn add_suppression(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    body: Json<NewSuppression>,
) -> Result<Json<SuppressionBody>, Error> {
    let entry = manager::add_suppression(&***db, tenant.user_id, body.into_inner()).await?;

    Ok(Json(SuppressionBody::render(entry)))
}

#[get("/suppressions")]
#[tracing::instrument(skip(db))]
pub async fn get_suppressions(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<Vec<SuppressionBody>>, Error> {
    let entries = manager::get_suppressions(&***db, tenant.user_id).await?;

    Ok(Json(entries.into_iter().map(SuppressionBody::render).collect()))
}

#[get("/suppressions/check")]
#[tracing::instrument(skip(db))]
pub async fn check_suppression(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    query: Query<SuppressionCheckQuery>,
) -> Result<Json<SuppressionCheckBody>, Error> {
    let query = query.into_inner();
    let address = manager::normalize_address(&query.address, Some(query.channel))?;

    let entry = manager::find_active_suppression(
        &***db,
        tenant.user_id,
        &address,
        query.channel,
        Utc::now(),
    )
    .await?;

    Ok(Json(SuppressionCheckBody {
        address,
        channel: query.channel,
        suppressed: entry.is_some(),
        entry: entry.map(SuppressionBody::render),
    }))
}

#[get("/suppressions/{suppression_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_suppression_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<SuppressionId>,
) -> Result<Json<SuppressionBody>, Error> {
    let suppression_id = params.into_inner();

    let entry = manager::get_suppression_by_id(&***db, tenant.user_id, suppression_id).await?;

    Ok(Json(SuppressionBody::render(entry)))
}

#[delete("/suppressions/{suppression_id}")]
#[tracing::instrument(skip(db))]
pub async fn remove_suppression(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<SuppressionId>,
) -> Result<HttpResponse, Error> {
    let suppression_id = params.into_inner();

    let entry = manager::get_suppression_by_id(&***db, tenant.user_id, suppression_id).await?;
    manager::remove_suppression(&***db, entry).await?;

    Ok(HttpResponse::NoContent().finish())
}

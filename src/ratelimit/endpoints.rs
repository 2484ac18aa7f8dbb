use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::database::Database;
use crate::error::Error;

use super::manager::{self, NewRateLimit, RateLimitUpdate};
use super::{RateLimit, RateLimitId, RateLimitSubject, WindowState};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitBody {
    pub id: RateLimitId,
    pub subject: RateLimitSubject,
    pub max_requests: u32,
    pub time_window_seconds: i64,
    pub window: WindowState,
    pub modified_at: DateTime<Utc>,
}

impl RateLimitBody {
    pub fn render(limit: RateLimit) -> RateLimitBody {
        RateLimitBody {
            window: limit.window_at(Utc::now()),
            id: limit.id,
            subject: limit.subject,
            max_requests: limit.max_requests,
            time_window_seconds: limit.time_window_seconds,
            modified_at: limit.modified_at,
        }
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct AcquireBody {
    #[serde(default = "one")]
    pub permits: u32,
}

fn one() -> u32 {
    1
}

#[post("/rate-limits")]
#[tracing::instrument(skip(db))]
pub async fn create_rate_limit(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    body: Json<NewRateLimit>,
) -> Result<Json<RateLimitBody>, Error> {
    let limit = manager::create_rate_limit(&***db, tenant.user_id, body.into_inner()).await?;

    Ok(Json(RateLimitBody::render(limit)))
}

#[get("/rate-limits")]
#[tracing::instrument(skip(db))]
pub async fn get_rate_limits(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<Vec<RateLimitBody>>, Error> {
    let limits = manager::get_rate_limits(&***db, tenant.user_id).await?;

    Ok(Json(limits.into_iter().map(RateLimitBody::render).collect()))
}

#[get("/rate-limits/{rate_limit_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_rate_limit_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<RateLimitId>,
) -> Result<Json<RateLimitBody>, Error> {
    let rate_limit_id = params.into_inner();

    let limit = manager::get_rate_limit_by_id(&***db, tenant.user_id, rate_limit_id).await?;

    Ok(Json(RateLimitBody::render(limit)))
}

#[put("/rate-limits/{rate_limit_id}")]
#[tracing::instrument(skip(db))]
pub async fn update_rate_limit(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<RateLimitId>,
    body: Json<RateLimitUpdate>,
) -> Result<Json<RateLimitBody>, Error> {
    let rate_limit_id = params.into_inner();

    let limit = manager::get_rate_limit_by_id(&***db, tenant.user_id, rate_limit_id).await?;
    let limit = manager::update_rate_limit(&***db, limit, body.into_inner()).await?;

    Ok(Json(RateLimitBody::render(limit)))
}

#[delete("/rate-limits/{rate_limit_id}")]
#[tracing::instrument(skip(db))]
pub async fn delete_rate_limit(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<RateLimitId>,
) -> Result<HttpResponse, Error> {
    let rate_limit_id = params.into_inner();

    let limit = manager::get_rate_limit_by_id(&***db, tenant.user_id, rate_limit_id).await?;
    manager::delete_rate_limit(&***db, limit).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[post("/rate-limits/{rate_limit_id}/acquire")]
#[tracing::instrument(skip(db))]
pub async fn acquire(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<RateLimitId>,
    body: Option<Json<AcquireBody>>,
) -> Result<Json<WindowState>, Error> {
    let rate_limit_id = params.into_inner();
    let permits = body.map_or(1, |body| body.permits);

    let state =
        manager::acquire(&***db, tenant.user_id, rate_limit_id, permits, Utc::now()).await?;

    Ok(Json(state))
}

use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::channel::Channel;
use crate::database::Database;
use crate::error::Error;

use super::manager::{self, NewProvider, NewRoutingConfig, ProviderUpdate};
use super::{ChannelRoutingConfig, MessageProvider, ProviderId, RetryPolicy};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderBody {
    pub id: ProviderId,
    pub name: String,
    pub channel: Channel,
    pub provider_type: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ProviderBody {
    pub fn render(provider: MessageProvider) -> ProviderBody {
        ProviderBody {
            id: provider.id,
            name: provider.name,
            channel: provider.channel,
            provider_type: provider.provider_type,
            is_active: provider.is_active,
            created_at: provider.created_at,
            modified_at: provider.modified_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingConfigBody {
    pub channel: Channel,
    pub primary_provider_id: ProviderId,
    pub fallback_provider_ids: Vec<ProviderId>,
    pub retry: RetryPolicy,
    pub is_active: bool,
    pub modified_at: DateTime<Utc>,
}

impl RoutingConfigBody {
    pub fn render(config: ChannelRoutingConfig) -> RoutingConfigBody {
        RoutingConfigBody {
            retry: config.retry_policy(),
            channel: config.channel,
            primary_provider_id: config.primary_provider_id,
            fallback_provider_ids: config.fallback_provider_ids,
            is_active: config.is_active,
            modified_at: config.modified_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteBody {
    pub channel: Channel,
    pub providers: Vec<ProviderBody>,
}

#[post("/providers")]
#[tracing::instrument(skip(db))]
pub async fn create_provider(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    body: Json<NewProvider>,
) -> Result<Json<ProviderBody>, Error> {
    let provider = manager::create_provider(&***db, tenant.user_id, body.into_inner()).await?;

    Ok(Json(ProviderBody::render(provider)))
}

#[get("/providers")]
#[tracing::instrument(skip(db))]
pub async fn get_providers(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<Vec<ProviderBody>>, Error> {
    let providers = manager::get_providers(&***db, tenant.user_id).await?;

    Ok(Json(providers.into_iter().map(ProviderBody::render).collect()))
}

#[get("/providers/{provider_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_provider_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ProviderId>,
) -> Result<Json<ProviderBody>, Error> {
    let provider_id = params.into_inner();

    let provider = manager::get_provider_by_id(&***db, tenant.user_id, provider_id).await?;

    Ok(Json(ProviderBody::render(provider)))
}

#[put("/providers/{provider_id}")]
#[tracing::instrument(skip(db))]
pub async fn update_provider(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ProviderId>,
    body: Json<ProviderUpdate>,
) -> Result<Json<ProviderBody>, Error> {
    let provider_id = params.into_inner();

    let provider = manager::get_provider_by_id(&***db, tenant.user_id, provider_id).await?;
    let provider = manager::update_provider(&***db, provider, body.into_inner()).await?;

    Ok(Json(ProviderBody::render(provider)))
}

#[delete("/providers/{provider_id}")]
#[tracing::instrument(skip(db))]
pub async fn delete_provider(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ProviderId>,
) -> Result<HttpResponse, Error> {
    let provider_id = params.into_inner();

    let provider = manager::get_provider_by_id(&***db, tenant.user_id, provider_id).await?;
    manager::delete_provider(&***db, provider).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[get("/routing")]
#[tracing::instrument(skip(db))]
pub async fn get_routing_configs(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<Vec<RoutingConfigBody>>, Error> {
    let configs = manager::get_routing_configs(&***db, tenant.user_id).await?;

    Ok(Json(configs.into_iter().map(RoutingConfigBody::render).collect()))
}

#[get("/routing/{channel}")]
#[tracing::instrument(skip(db))]
pub async fn get_routing_config(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<Channel>,
) -> Result<Json<RoutingConfigBody>, Error> {
    let channel = params.into_inner();

    let config = manager::get_routing_config(&***db, tenant.user_id, channel).await?;

    Ok(Json(RoutingConfigBody::render(config)))
}

#[put("/routing/{channel}")]
#[tracing::instrument(skip(db))]
pub async fn set_routing_config(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<Channel>,
    body: Json<NewRoutingConfig>,
) -> Result<Json<RoutingConfigBody>, Error> {
    let channel = params.into_inner();

    let config =
        manager::set_routing_config(&***db, tenant.user_id, channel, body.into_inner()).await?;

    Ok(Json(RoutingConfigBody::render(config)))
}

#[delete("/routing/{channel}")]
#[tracing::instrument(skip(db))]
pub async fn delete_routing_config(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<Channel>,
) -> Result<HttpResponse, Error> {
    let channel = params.into_inner();

    let config = manager::get_routing_config(&***db, tenant.user_id, channel).await?;
    manager::delete_routing_config(&***db, config).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[get("/routing/{channel}/resolve")]
#[tracing::instrument(skip(db))]
pub async fn resolve_route(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<Channel>,
) -> Result<Json<RouteBody>, Error> {
    let channel = params.into_inner();

    let providers = manager::resolve_route(&***db, tenant.user_id, channel).await?;

    Ok(Json(RouteBody {
        channel,
        providers: providers.into_iter().map(ProviderBody::render).collect(),
    }))
}

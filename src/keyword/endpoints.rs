use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::database::Database;
use crate::error::Error;

use super::manager::{self, InboundMessage, InboundReply, KeywordUpdate, NewKeyword};
use super::{Keyword, KeywordAction, KeywordId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeywordBody {
    pub id: KeywordId,
    pub word: String,
    pub action: KeywordAction,
    pub response_message: Option<String>,
    pub is_active: bool,
    pub match_count: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl KeywordBody {
    pub fn render(keyword: Keyword) -> KeywordBody {
        KeywordBody {
            id: keyword.id,
            word: keyword.word,
            action: keyword.action,
            response_message: keyword.response_message,
            is_active: keyword.is_active,
            match_count: keyword.match_count,
            created_at: keyword.created_at,
            modified_at: keyword.modified_at,
        }
    }
}

#[post("/keywords")]
#[tracing::instrument(skip(db))]
pub async fn create_keyword(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    body: Json<NewKeyword>,
) -> Result<Json<KeywordBody>, Error> {
    let keyword = manager::create_keyword(&***db, tenant.user_id, body.into_inner()).await?;

    Ok(Json(KeywordBody::render(keyword)))
}

#[get("/keywords")]
#[tracing::instrument(skip(db))]
pub async fn get_keywords(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<Vec<KeywordBody>>, Error> {
    let keywords = manager::get_keywords(&***db, tenant.user_id).await?;

    Ok(Json(keywords.into_iter().map(KeywordBody::render).collect()))
}

#[post("/keywords/inbound")]
#[tracing::instrument(skip(db))]
pub async fn handle_inbound(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    body: Json<InboundMessage>,
) -> Result<Json<InboundReply>, Error> {
    let reply = manager::handle_inbound(&***db, tenant.user_id, body.into_inner()).await?;

    Ok(Json(reply))
}

#[get("/keywords/{keyword_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_keyword_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<KeywordId>,
) -> Result<Json<KeywordBody>, Error> {
    let keyword_id = params.into_inner();

    let keyword = manager::get_keyword_by_id(&***db, tenant.user_id, keyword_id).await?;

    Ok(Json(KeywordBody::render(keyword)))
}

#[put("/keywords/{keyword_id}")]
#[tracing::instrument(skip(db))]
pub async fn update_keyword(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<KeywordId>,
    body: Json<KeywordUpdate>,
) -> Result<Json<KeywordBody>, Error> {
    let keyword_id = params.into_inner();

    let keyword = manager::get_keyword_by_id(&***db, tenant.user_id, keyword_id).await?;
    let keyword = manager::update_keyword(&***db, keyword, body.into_inner()).await?;

    Ok(Json(KeywordBody::render(keyword)))
}

#[delete("/keywords/{keyword_id}")]
#[tracing::instrument(skip(db))]
pub async fn delete_keyword(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<KeywordId>,
) -> Result<HttpResponse, Error> {
    let keyword_id = params.into_inner();

    let keyword = manager::get_keyword_by_id(&***db, tenant.user_id, keyword_id).await?;
    manager::delete_keyword(&***db, keyword).await?;

    Ok(HttpResponse::NoContent().finish())
}

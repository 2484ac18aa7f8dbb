use actix_web::web::{Data, Json, Path};
use actix_web::{get, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::channel::Channel;
use crate::contact::{self, ContactId};
use crate::database::Database;
use crate::error::Error;

use super::{
    manager, ConsentHistory, ConsentId, ConsentSource, ConsentStatus, ConsentStatusKind,
    ContactConsent,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsentChangeBody {
    pub source: ConsentSource,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsentBody {
    pub id: ConsentId,
    pub channel: Channel,
    pub status: ConsentStatus,
    pub source: ConsentSource,
    pub granted_date: Option<DateTime<Utc>>,
    pub revoked_date: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
}

impl ConsentBody {
    pub fn render(consent: ContactConsent) -> ConsentBody {
        ConsentBody {
            id: consent.id,
            channel: consent.channel,
            granted_date: consent.status.granted_date(),
            revoked_date: consent.status.revoked_date(),
            status: consent.status,
            source: consent.source,
            modified_at: consent.modified_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsentHistoryBody {
    pub consent_id: ConsentId,
    pub channel: Channel,
    pub previous_status: Option<ConsentStatusKind>,
    pub new_status: ConsentStatusKind,
    pub source: ConsentSource,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ConsentHistoryBody {
    pub fn render(entry: ConsentHistory) -> ConsentHistoryBody {
        ConsentHistoryBody {
            consent_id: entry.consent_id,
            channel: entry.channel,
            previous_status: entry.previous_status,
            new_status: entry.new_status,
            source: entry.source,
            note: entry.note,
            occurred_at: entry.occurred_at,
        }
    }
}

#[get("/contacts/{contact_id}/consents")]
#[tracing::instrument(skip(db))]
pub async fn get_consents(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ContactId>,
) -> Result<Json<Vec<ConsentBody>>, Error> {
    let contact_id = params.into_inner();

    let contact = contact::manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let consents = manager::get_consents(&***db, &contact).await?;

    Ok(Json(consents.into_iter().map(ConsentBody::render).collect()))
}

#[get("/contacts/{contact_id}/consents/history")]
#[tracing::instrument(skip(db))]
pub async fn get_consent_history(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ContactId>,
) -> Result<Json<Vec<ConsentHistoryBody>>, Error> {
    let contact_id = params.into_inner();

    let contact = contact::manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let history = manager::get_consent_history(&***db, &contact).await?;

    Ok(Json(
        history.into_iter().map(ConsentHistoryBody::render).collect(),
    ))
}

#[post("/contacts/{contact_id}/consents/{channel}/grant")]
#[tracing::instrument(skip(db))]
pub async fn grant_consent(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<(ContactId, Channel)>,
    body: Json<ConsentChangeBody>,
) -> Result<Json<ConsentBody>, Error> {
    let (contact_id, channel) = params.into_inner();
    let body = body.into_inner();

    let contact = contact::manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let consent = manager::grant_consent(&***db, &contact, channel, body.source, body.note).await?;

    Ok(Json(ConsentBody::render(consent)))
}

#[post("/contacts/{contact_id}/consents/{channel}/revoke")]
#[tracing::instrument(skip(db))]
pub async fn revoke_consent(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<(ContactId, Channel)>,
    body: Json<ConsentChangeBody>,
) -> Result<Json<ConsentBody>, Error> {
    let (contact_id, channel) = params.into_inner();
    let body = body.into_inner();

    let contact = contact::manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let consent = manager::revoke_consent(&***db, &contact, channel, body.source, body.note).await?;

    Ok(Json(ConsentBody::render(consent)))
}

#[post("/contacts/{contact_id}/consents/{channel}/request")]
#[tracing::instrument(skip(db))]
pub async fn request_consent(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<(ContactId, Channel)>,
    body: Json<ConsentChangeBody>,
) -> Result<Json<ConsentBody>, Error> {
    let (contact_id, channel) = params.into_inner();
    let body = body.into_inner();

    let contact = contact::manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let consent =
        manager::request_consent(&***db, &contact, channel, body.source, body.note).await?;

    Ok(Json(ConsentBody::render(consent)))
}

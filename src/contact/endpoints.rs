use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::consent::{self, ConsentBody};
use crate::database::Database;
use crate::error::Error;

use super::frequency::FrequencyCounts;
use super::manager::{self, NewContact};
use super::{Contact, ContactId, FrequencyCaps, FrequencyControl};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactBody {
    pub id: ContactId,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub consents: Vec<ConsentBody>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ContactBody {
    pub async fn render(db: &dyn Database, contact: Contact) -> Result<ContactBody, Error> {
        let consents = consent::manager::get_consents(db, &contact).await?;

        Ok(ContactBody {
            id: contact.id,
            first_name: contact.first_name,
            last_name: contact.last_name,
            phone: contact.phone,
            email: contact.email,
            tags: contact.tags,
            consents: consents.into_iter().map(ConsentBody::render).collect(),
            created_at: contact.created_at,
            modified_at: contact.modified_at,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrequencyControlBody {
    pub contact_id: ContactId,
    pub caps: FrequencyCaps,
    pub counts: FrequencyCounts,
    pub last_sent_at: Option<DateTime<Utc>>,
}

impl FrequencyControlBody {
    pub fn render(control: FrequencyControl) -> FrequencyControlBody {
        FrequencyControlBody {
            contact_id: control.contact_id,
            caps: control.caps,
            counts: control.counts_at(Utc::now()),
            last_sent_at: control.last_sent_at,
        }
    }
}

#[post("/contacts")]
#[tracing::instrument(skip(db))]
pub async fn create_contact(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    body: Json<NewContact>,
) -> Result<Json<ContactBody>, Error> {
    let contact = manager::create_contact(&***db, tenant.user_id, body.into_inner()).await?;

    Ok(Json(ContactBody::render(&***db, contact).await?))
}

#[get("/contacts")]
#[tracing::instrument(skip(db))]
pub async fn get_contacts(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<Vec<ContactBody>>, Error> {
    let contacts = manager::get_contacts(&***db, tenant.user_id).await?;

    let body = stream::iter(contacts)
        .then(|contact| ContactBody::render(&***db, contact))
        .try_collect()
        .await?;

    Ok(Json(body))
}

#[get("/contacts/{contact_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_contact_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ContactId>,
) -> Result<Json<ContactBody>, Error> {
    let contact_id = params.into_inner();

    let contact = manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;

    Ok(Json(ContactBody::render(&***db, contact).await?))
}

#[put("/contacts/{contact_id}")]
#[tracing::instrument(skip(db))]
pub async fn update_contact(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ContactId>,
    body: Json<NewContact>,
) -> Result<Json<ContactBody>, Error> {
    let contact_id = params.into_inner();

    let contact = manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let contact = manager::update_contact(&***db, contact, body.into_inner()).await?;

    Ok(Json(ContactBody::render(&***db, contact).await?))
}

#[delete("/contacts/{contact_id}")]
#[tracing::instrument(skip(db))]
pub async fn delete_contact(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ContactId>,
) -> Result<HttpResponse, Error> {
    let contact_id = params.into_inner();

    let contact = manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    manager::delete_contact(&***db, contact).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[get("/contacts/{contact_id}/frequency")]
#[tracing::instrument(skip(db))]
pub async fn get_frequency_control(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ContactId>,
) -> Result<Json<FrequencyControlBody>, Error> {
    let contact_id = params.into_inner();

    let contact = manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let control = manager::get_frequency_control(&***db, &contact)
        .await?
        .unwrap_or_else(|| {
            FrequencyControl::new(contact.user_id, contact.id, FrequencyCaps::default())
        });

    Ok(Json(FrequencyControlBody::render(control)))
}

#[put("/contacts/{contact_id}/frequency")]
#[tracing::instrument(skip(db))]
pub async fn set_frequency_caps(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ContactId>,
    body: Json<FrequencyCaps>,
) -> Result<Json<FrequencyControlBody>, Error> {
    let contact_id = params.into_inner();

    let contact = manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let control = manager::set_frequency_caps(&***db, &contact, body.into_inner()).await?;

    Ok(Json(FrequencyControlBody::render(control)))
}

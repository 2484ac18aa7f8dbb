use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::address::{normalize_email, normalize_phone};
use crate::database::Database;
use crate::error::Error;
use crate::user::UserId;

use super::{Contact, ContactId, FrequencyCaps, FrequencyControl};

const RECORD_SEND_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewContact {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

struct Addresses {
    phone: Option<String>,
    email: Option<String>,
}

async fn validate_addresses(
    db: &dyn Database,
    user_id: UserId,
    contact_id: Option<ContactId>,
    phone: Option<&str>,
    email: Option<&str>,
) -> Result<Addresses, Error> {
    let phone = phone.map(normalize_phone).transpose()?;
    let email = email.map(normalize_email).transpose()?;

    if phone.is_none() && email.is_none() {
        return Err(Error::ContactHasNoAddress);
    }

    if let Some(phone) = &phone {
        let existing = db.contacts().fetch_contact_by_phone(user_id, phone).await?;
        if let Some(existing) = existing.filter(|c| Some(c.id) != contact_id) {
            return Err(Error::ContactAddressInUse {
                address: phone.clone(),
                contact_id: existing.id,
            });
        }
    }

    if let Some(email) = &email {
        let existing = db.contacts().fetch_contact_by_email(user_id, email).await?;
        if let Some(existing) = existing.filter(|c| Some(c.id) != contact_id) {
            return Err(Error::ContactAddressInUse {
                address: email.clone(),
                contact_id: existing.id,
            });
        }
    }

    Ok(Addresses { phone, email })
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

#[tracing::instrument(skip(db))]
pub async fn create_contact(
    db: &dyn Database,
    user_id: UserId,
    new_contact: NewContact,
) -> Result<Contact, Error> {
    let addresses = validate_addresses(
        db,
        user_id,
        None,
        new_contact.phone.as_deref(),
        new_contact.email.as_deref(),
    )
    .await?;

    let now = Utc::now();
    let contact = Contact {
        id: ContactId::new(),
        user_id,
        first_name: new_contact.first_name.trim().to_string(),
        last_name: new_contact.last_name.trim().to_string(),
        phone: addresses.phone,
        email: addresses.email,
        tags: clean_tags(new_contact.tags),
        created_at: now,
        modified_at: now,
    };

    db.contacts().insert_contact(&contact).await?;

    Ok(contact)
}

#[tracing::instrument(skip(db))]
pub async fn get_contacts(db: &dyn Database, user_id: UserId) -> Result<Vec<Contact>, Error> {
    let contacts = db.contacts().fetch_contacts_by_user(user_id).await?;

    Ok(contacts)
}

#[tracing::instrument(skip(db))]
pub async fn get_contact_by_id(
    db: &dyn Database,
    user_id: UserId,
    contact_id: ContactId,
) -> Result<Contact, Error> {
    let contact = db
        .contacts()
        .fetch_contact_by_id(user_id, contact_id)
        .await?
        .ok_or(Error::ContactNotFound { contact_id })?;

    Ok(contact)
}

#[tracing::instrument(skip(db))]
pub async fn update_contact(
    db: &dyn Database,
    mut contact: Contact,
    update: NewContact,
) -> Result<Contact, Error> {
    let addresses = validate_addresses(
        db,
        contact.user_id,
        Some(contact.id),
        update.phone.as_deref(),
        update.email.as_deref(),
    )
    .await?;

    contact.first_name = update.first_name.trim().to_string();
    contact.last_name = update.last_name.trim().to_string();
    contact.phone = addresses.phone;
    contact.email = addresses.email;
    contact.tags = clean_tags(update.tags);

    db.contacts().update_contact(contact).await
}

/// Deletes the contact with its consents, consent history and frequency
/// control. Suppression entries for its addresses are kept.
#[tracing::instrument(skip(db))]
pub async fn delete_contact(db: &dyn Database, contact: Contact) -> Result<(), Error> {
    db.consent_history()
        .delete_history_by_contact(contact.user_id, contact.id)
        .await?;
    db.consents()
        .delete_consents_by_contact(contact.user_id, contact.id)
        .await?;
    db.frequencies()
        .delete_frequency_control_by_contact(contact.user_id, contact.id)
        .await?;
    db.contacts()
        .delete_contact(contact.user_id, contact.id)
        .await?;

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn get_frequency_control(
    db: &dyn Database,
    contact: &Contact,
) -> Result<Option<FrequencyControl>, Error> {
    let control = db
        .frequencies()
        .fetch_frequency_control_by_contact(contact.user_id, contact.id)
        .await?;

    Ok(control)
}

#[tracing::instrument(skip(db))]
pub async fn set_frequency_caps(
    db: &dyn Database,
    contact: &Contact,
    caps: FrequencyCaps,
) -> Result<FrequencyControl, Error> {
    match get_frequency_control(db, contact).await? {
        Some(mut control) => {
            control.caps = caps;
            db.frequencies().update_frequency_control(control).await
        }
        None => {
            let control = FrequencyControl::new(contact.user_id, contact.id, caps);
            db.frequencies().insert_frequency_control(&control).await?;
            Ok(control)
        }
    }
}

/// Counts a send against the contact's frequency counters, creating an
/// uncapped control on the first send.
///
/// Sends of one contact may be recorded concurrently, so a write that loses
/// a race is retried against a fresh copy.
#[tracing::instrument(skip(db))]
pub async fn record_send(
    db: &dyn Database,
    user_id: UserId,
    contact_id: ContactId,
    now: DateTime<Utc>,
) -> Result<FrequencyControl, Error> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let existing = db
            .frequencies()
            .fetch_frequency_control_by_contact(user_id, contact_id)
            .await?;

        let result = match existing {
            Some(mut control) => {
                control.record_send(now);
                db.frequencies().update_frequency_control(control).await
            }
            None => {
                let mut control =
                    FrequencyControl::new(user_id, contact_id, FrequencyCaps::default());
                control.record_send(now);
                db.frequencies()
                    .insert_frequency_control(&control)
                    .await
                    .map(|_| control)
            }
        };

        match result {
            Ok(control) => return Ok(control),
            Err(Error::ConcurrentModificationDetected) if attempt < RECORD_SEND_ATTEMPTS => {
                warn!("frequency control of {} changed while recording, retrying", contact_id);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::consent::manager::{get_consent_history, get_consents, grant_consent};
    use crate::consent::ConsentSource;
    use crate::database::MemoryDatabase;
    use crate::suppression::manager::{add_suppression, is_suppressed, NewSuppression};
    use crate::suppression::SuppressionReason;
    use futures::future::join_all;

    fn ada() -> NewContact {
        NewContact {
            first_name: " Ada ".into(),
            last_name: "Lovelace".into(),
            phone: Some("+1 555 010 0000".into()),
            email: Some("Ada@Example.com".into()),
            tags: vec!["VIP".into(), " vip".into(), "".into()],
        }
    }

    #[tokio::test]
    async fn can_create_contact() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();

        let contact = create_contact(&db, user_id, ada()).await.unwrap();

        assert_eq!(contact.first_name, "Ada");
        assert_eq!(contact.phone.as_deref(), Some("+15550100000"));
        assert_eq!(contact.email.as_deref(), Some("ada@example.com"));
        assert_eq!(contact.tags, vec!["vip".to_string()]);
        assert_eq!(contact.created_at, contact.modified_at);
    }

    #[tokio::test]
    async fn create_contact_requires_an_address() {
        let db = MemoryDatabase::new();
        let mut contact = ada();
        contact.phone = None;
        contact.email = None;

        let result = create_contact(&db, UserId::new(), contact).await;

        assert_eq!(result.unwrap_err(), Error::ContactHasNoAddress);
    }

    #[tokio::test]
    async fn create_contact_rejects_address_used_by_another_contact() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let first = create_contact(&db, user_id, ada()).await.unwrap();
        let mut second = ada();
        second.email = None;

        let result = create_contact(&db, user_id, second).await;

        assert_eq!(
            result.unwrap_err(),
            Error::ContactAddressInUse {
                address: "+15550100000".into(),
                contact_id: first.id,
            }
        );
    }

    #[tokio::test]
    async fn same_address_is_allowed_for_other_tenants() {
        let db = MemoryDatabase::new();
        create_contact(&db, UserId::new(), ada()).await.unwrap();

        let result = create_contact(&db, UserId::new(), ada()).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn get_contact_by_id_is_scoped_to_tenant() {
        let db = MemoryDatabase::new();
        let contact = create_contact(&db, UserId::new(), ada()).await.unwrap();

        let result = get_contact_by_id(&db, UserId::new(), contact.id).await;

        assert_eq!(
            result.unwrap_err(),
            Error::ContactNotFound {
                contact_id: contact.id
            }
        );
    }

    #[tokio::test]
    async fn update_contact_keeps_own_addresses_and_bumps_modified_at() {
        let db = MemoryDatabase::new();
        let contact = create_contact(&db, UserId::new(), ada()).await.unwrap();
        let mut update = ada();
        update.last_name = "King".into();

        let updated = update_contact(&db, contact.clone(), update).await.unwrap();

        assert_eq!(updated.last_name, "King");
        assert!(updated.modified_at > contact.modified_at);
    }

    #[tokio::test]
    async fn update_contact_with_stale_copy_is_rejected() {
        let db = MemoryDatabase::new();
        let contact = create_contact(&db, UserId::new(), ada()).await.unwrap();
        update_contact(&db, contact.clone(), ada()).await.unwrap();

        let result = update_contact(&db, contact, ada()).await;

        assert_eq!(result.unwrap_err(), Error::ConcurrentModificationDetected);
    }

    #[tokio::test]
    async fn record_send_creates_and_then_updates_counters() {
        let db = MemoryDatabase::new();
        let contact = create_contact(&db, UserId::new(), ada()).await.unwrap();
        let now = Utc::now();

        record_send(&db, contact.user_id, contact.id, now).await.unwrap();
        let control = record_send(&db, contact.user_id, contact.id, now).await.unwrap();

        assert_eq!(control.counts_at(now).day, 2);
        assert_eq!(control.caps, FrequencyCaps::default());
    }

    #[tokio::test]
    async fn concurrent_first_sends_share_one_control() {
        let db = MemoryDatabase::new();
        let contact = create_contact(&db, UserId::new(), ada()).await.unwrap();
        let now = Utc::now();

        let results =
            join_all((0..3).map(|_| record_send(&db, contact.user_id, contact.id, now))).await;
        assert!(results.iter().all(Result::is_ok));

        let control = get_frequency_control(&db, &contact).await.unwrap().unwrap();
        assert_eq!(control.counts_at(now).day, 3);

        let duplicate = FrequencyControl::new(contact.user_id, contact.id, FrequencyCaps::default());
        let result = db.frequencies().insert_frequency_control(&duplicate).await;
        assert_eq!(result.unwrap_err(), Error::ConcurrentModificationDetected);

        let removed = db
            .frequencies()
            .delete_frequency_controls_by_user(contact.user_id)
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn delete_contact_removes_its_records_but_keeps_suppressions() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let contact = create_contact(&db, user_id, ada()).await.unwrap();
        grant_consent(&db, &contact, Channel::Sms, ConsentSource::WebForm, None)
            .await
            .unwrap();
        record_send(&db, user_id, contact.id, Utc::now()).await.unwrap();
        add_suppression(
            &db,
            user_id,
            NewSuppression {
                address: "+15550100000".into(),
                channel: Some(Channel::Sms),
                contact_id: Some(contact.id),
                reason: SuppressionReason::OptOut,
                note: None,
                expires_at: None,
            },
        )
        .await
        .unwrap();

        delete_contact(&db, contact.clone()).await.unwrap();

        assert!(get_consents(&db, &contact).await.unwrap().is_empty());
        assert!(get_consent_history(&db, &contact).await.unwrap().is_empty());
        assert!(get_frequency_control(&db, &contact).await.unwrap().is_none());
        assert_eq!(
            get_contact_by_id(&db, user_id, contact.id).await.unwrap_err(),
            Error::ContactNotFound {
                contact_id: contact.id
            }
        );
        let suppressed = is_suppressed(&db, user_id, "+15550100000", Channel::Sms, Utc::now())
            .await
            .unwrap();
        assert!(suppressed);
    }

    #[tokio::test]
    async fn set_frequency_caps_keeps_counters() {
        let db = MemoryDatabase::new();
        let contact = create_contact(&db, UserId::new(), ada()).await.unwrap();
        let now = Utc::now();
        record_send(&db, contact.user_id, contact.id, now).await.unwrap();

        let caps = FrequencyCaps {
            max_per_day: Some(1),
            ..FrequencyCaps::default()
        };
        let control = set_frequency_caps(&db, &contact, caps).await.unwrap();

        assert_eq!(control.caps, caps);
        assert!(control.reached_cap(now).is_some());
    }
}

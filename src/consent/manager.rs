use chrono::{DateTime, Utc};

use crate::channel::Channel;
use crate::contact::{Contact, ContactId};
use crate::database::Database;
use crate::error::Error;
use crate::user::UserId;

use super::{
    ConsentHistory, ConsentHistoryId, ConsentId, ConsentSource, ConsentStatus,
    ConsentStatusKind, ContactConsent,
};

#[tracing::instrument(skip(db))]
pub async fn get_consents(db: &dyn Database, contact: &Contact) -> Result<Vec<ContactConsent>, Error> {
    let consents = db
        .consents()
        .fetch_consents_by_contact(contact.user_id, contact.id)
        .await?;

    Ok(consents)
}

#[tracing::instrument(skip(db))]
pub async fn get_latest_consent(
    db: &dyn Database,
    user_id: UserId,
    contact_id: ContactId,
    channel: Channel,
) -> Result<Option<ContactConsent>, Error> {
    let consent = db
        .consents()
        .fetch_latest_consent(user_id, contact_id, channel)
        .await?;

    Ok(consent)
}

#[tracing::instrument(skip(db))]
pub async fn get_consent_history(
    db: &dyn Database,
    contact: &Contact,
) -> Result<Vec<ConsentHistory>, Error> {
    let history = db
        .consent_history()
        .fetch_history_by_contact(contact.user_id, contact.id)
        .await?;

    Ok(history)
}

/// Records that the contact opted in on `channel`. Granting an already
/// granted consent changes nothing.
#[tracing::instrument(skip(db))]
pub async fn grant_consent(
    db: &dyn Database,
    contact: &Contact,
    channel: Channel,
    source: ConsentSource,
    note: Option<String>,
) -> Result<ContactConsent, Error> {
    let now = Utc::now();
    change_consent(db, contact, channel, source, note, now, |_| {
        ConsentStatus::Granted { granted_at: now }
    })
    .await
}

/// Records that the contact opted out on `channel`, keeping the date it was
/// originally granted.
#[tracing::instrument(skip(db))]
pub async fn revoke_consent(
    db: &dyn Database,
    contact: &Contact,
    channel: Channel,
    source: ConsentSource,
    note: Option<String>,
) -> Result<ContactConsent, Error> {
    let now = Utc::now();
    change_consent(db, contact, channel, source, note, now, |previous| {
        ConsentStatus::Revoked {
            granted_at: previous.and_then(ConsentStatus::granted_date),
            revoked_at: now,
        }
    })
    .await
}

/// Marks consent on `channel` as awaiting confirmation. Only applies to a
/// contact with no consent record yet on that channel.
#[tracing::instrument(skip(db))]
pub async fn request_consent(
    db: &dyn Database,
    contact: &Contact,
    channel: Channel,
    source: ConsentSource,
    note: Option<String>,
) -> Result<ContactConsent, Error> {
    if let Some(existing) = get_latest_consent(db, contact.user_id, contact.id, channel).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    change_consent(db, contact, channel, source, note, now, |_| ConsentStatus::Pending).await
}

async fn change_consent<F>(
    db: &dyn Database,
    contact: &Contact,
    channel: Channel,
    source: ConsentSource,
    note: Option<String>,
    now: DateTime<Utc>,
    next_status: F,
) -> Result<ContactConsent, Error>
where
    F: FnOnce(Option<&ConsentStatus>) -> ConsentStatus,
{
    let existing = get_latest_consent(db, contact.user_id, contact.id, channel).await?;
    let previous_status = existing.as_ref().map(|consent| consent.status.kind());
    let status = next_status(existing.as_ref().map(|consent| &consent.status));

    if let Some(existing) = &existing {
        if existing.status.kind() == status.kind() {
            return Ok(existing.clone());
        }
    }

    let new_status = status.kind();
    let consent = match existing {
        Some(mut consent) => {
            consent.status = status;
            consent.source = source;
            db.consents().update_consent(consent).await?
        }
        None => {
            let consent = ContactConsent {
                id: ConsentId::new(),
                user_id: contact.user_id,
                contact_id: contact.id,
                channel,
                status,
                source,
                created_at: now,
                modified_at: now,
            };
            db.consents().insert_consent(&consent).await?;
            consent
        }
    };

    let entry = ConsentHistory {
        id: ConsentHistoryId::new(),
        user_id: contact.user_id,
        contact_id: contact.id,
        consent_id: consent.id,
        channel,
        previous_status,
        new_status,
        source,
        note,
        occurred_at: now,
    };
    db.consent_history().insert_history(&entry).await?;

    Ok(consent)
}

pub fn is_granted(consent: Option<&ContactConsent>) -> bool {
    consent.map_or(false, |consent| consent.status.kind() == ConsentStatusKind::Granted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::manager::{create_contact, NewContact};
    use crate::database::MemoryDatabase;

    async fn contact(db: &MemoryDatabase) -> Contact {
        let new_contact = NewContact {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            phone: Some("+15550100001".into()),
            email: Some("grace@example.com".into()),
            tags: vec![],
        };
        create_contact(db, UserId::new(), new_contact).await.unwrap()
    }

    #[tokio::test]
    async fn grant_creates_consent_and_history() {
        let db = MemoryDatabase::new();
        let contact = contact(&db).await;

        let consent = grant_consent(&db, &contact, Channel::Sms, ConsentSource::WebForm, None)
            .await
            .unwrap();

        assert!(consent.status.is_granted());
        assert_eq!(consent.status.revoked_date(), None);
        let history = get_consent_history(&db, &contact).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_status, None);
        assert_eq!(history[0].new_status, ConsentStatusKind::Granted);
    }

    #[tokio::test]
    async fn revoke_sets_revoked_date_and_keeps_grant_date() {
        let db = MemoryDatabase::new();
        let contact = contact(&db).await;
        let granted = grant_consent(&db, &contact, Channel::Sms, ConsentSource::Api, None)
            .await
            .unwrap();

        let revoked = revoke_consent(&db, &contact, Channel::Sms, ConsentSource::Keyword, None)
            .await
            .unwrap();

        assert_eq!(revoked.id, granted.id);
        assert!(revoked.status.revoked_date().is_some());
        assert_eq!(revoked.status.granted_date(), granted.status.granted_date());
        let history = get_consent_history(&db, &contact).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].previous_status, Some(ConsentStatusKind::Granted));
        assert_eq!(history[1].new_status, ConsentStatusKind::Revoked);
    }

    #[tokio::test]
    async fn repeated_grant_is_a_no_op() {
        let db = MemoryDatabase::new();
        let contact = contact(&db).await;
        let first = grant_consent(&db, &contact, Channel::Email, ConsentSource::Api, None)
            .await
            .unwrap();

        let second = grant_consent(&db, &contact, Channel::Email, ConsentSource::Api, None)
            .await
            .unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(get_consent_history(&db, &contact).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn consent_is_scoped_to_channel() {
        let db = MemoryDatabase::new();
        let contact = contact(&db).await;
        grant_consent(&db, &contact, Channel::Email, ConsentSource::Api, None)
            .await
            .unwrap();

        let sms = get_latest_consent(&db, contact.user_id, contact.id, Channel::Sms)
            .await
            .unwrap();
        let email = get_latest_consent(&db, contact.user_id, contact.id, Channel::Email)
            .await
            .unwrap();

        assert!(!is_granted(sms.as_ref()));
        assert!(is_granted(email.as_ref()));
    }

    #[tokio::test]
    async fn request_only_applies_without_existing_consent() {
        let db = MemoryDatabase::new();
        let contact = contact(&db).await;

        let pending = request_consent(&db, &contact, Channel::Sms, ConsentSource::WebForm, None)
            .await
            .unwrap();
        assert_eq!(pending.status, ConsentStatus::Pending);

        grant_consent(&db, &contact, Channel::Sms, ConsentSource::Keyword, None)
            .await
            .unwrap();
        let after = request_consent(&db, &contact, Channel::Sms, ConsentSource::WebForm, None)
            .await
            .unwrap();

        assert!(after.status.is_granted());
    }
}

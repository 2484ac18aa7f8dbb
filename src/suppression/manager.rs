use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::address::{normalize_email, normalize_for_channel, normalize_phone};
use crate::channel::Channel;
use crate::contact::ContactId;
use crate::database::Database;
use crate::error::Error;
use crate::user::UserId;

use super::{SuppressionEntry, SuppressionId, SuppressionReason};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewSuppression {
    pub address: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub contact_id: Option<ContactId>,
    pub reason: SuppressionReason,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Normalizes an address for lookup. Without a channel the address kind is
/// guessed from the presence of `@`.
pub fn normalize_address(address: &str, channel: Option<Channel>) -> Result<String, Error> {
    match channel {
        Some(channel) => normalize_for_channel(channel, address),
        None if address.contains('@') => normalize_email(address),
        None => normalize_phone(address),
    }
}

/// Adds an address to the suppression list. An expired entry for the same
/// address and channel is replaced; a live one is a conflict.
#[tracing::instrument(skip(db))]
pub async fn add_suppression(
    db: &dyn Database,
    user_id: UserId,
    new_suppression: NewSuppression,
) -> Result<SuppressionEntry, Error> {
    let address = normalize_address(&new_suppression.address, new_suppression.channel)?;
    let now = Utc::now();

    let existing = db
        .suppressions()
        .fetch_suppressions_by_address(user_id, &address)
        .await?
        .into_iter()
        .find(|entry| entry.channel == new_suppression.channel);

    if let Some(existing) = existing {
        if !existing.is_expired(now) {
            return Err(Error::AddressAlreadySuppressed {
                address,
                channel: existing.channel,
                suppression_id: existing.id,
            });
        }

        db.suppressions()
            .delete_suppression(user_id, existing.id)
            .await?;
    }

    let entry = SuppressionEntry {
        id: SuppressionId::new(),
        user_id,
        address,
        channel: new_suppression.channel,
        contact_id: new_suppression.contact_id,
        reason: new_suppression.reason,
        note: new_suppression.note,
        expires_at: new_suppression.expires_at,
        created_at: now,
        modified_at: now,
    };

    db.suppressions().insert_suppression(&entry).await?;

    info!(
        "suppressed {} on {}",
        entry.address,
        entry.channel.map_or("ALL", |c| c.as_str())
    );

    Ok(entry)
}

#[tracing::instrument(skip(db))]
pub async fn get_suppressions(
    db: &dyn Database,
    user_id: UserId,
) -> Result<Vec<SuppressionEntry>, Error> {
    let entries = db.suppressions().fetch_suppressions_by_user(user_id).await?;

    Ok(entries)
}

#[tracing::instrument(skip(db))]
pub async fn get_suppression_by_id(
    db: &dyn Database,
    user_id: UserId,
    suppression_id: SuppressionId,
) -> Result<SuppressionEntry, Error> {
    let entry = db
        .suppressions()
        .fetch_suppression_by_id(user_id, suppression_id)
        .await?
        .ok_or(Error::SuppressionNotFound { suppression_id })?;

    Ok(entry)
}

#[tracing::instrument(skip(db))]
pub async fn remove_suppression(db: &dyn Database, entry: SuppressionEntry) -> Result<(), Error> {
    db.suppressions()
        .delete_suppression(entry.user_id, entry.id)
        .await
}

/// The live entry that blocks `address` on `channel` at `now`, if any.
#[tracing::instrument(skip(db))]
pub async fn find_active_suppression(
    db: &dyn Database,
    user_id: UserId,
    address: &str,
    channel: Channel,
    now: DateTime<Utc>,
) -> Result<Option<SuppressionEntry>, Error> {
    let entry = db
        .suppressions()
        .fetch_suppressions_by_address(user_id, address)
        .await?
        .into_iter()
        .find(|entry| entry.suppresses(channel, now));

    Ok(entry)
}

pub async fn is_suppressed(
    db: &dyn Database,
    user_id: UserId,
    address: &str,
    channel: Channel,
    now: DateTime<Utc>,
) -> Result<bool, Error> {
    let entry = find_active_suppression(db, user_id, address, channel, now).await?;

    Ok(entry.is_some())
}

/// Removes the entries for `address` on exactly `channel` that were added
/// for `reason`. Entries covering all channels are left alone.
#[tracing::instrument(skip(db))]
pub async fn lift_suppressions(
    db: &dyn Database,
    user_id: UserId,
    address: &str,
    channel: Channel,
    reason: SuppressionReason,
) -> Result<u64, Error> {
    let entries = db
        .suppressions()
        .fetch_suppressions_by_address(user_id, address)
        .await?;

    let mut lifted = 0;
    for entry in entries {
        if entry.channel == Some(channel) && entry.reason == reason {
            db.suppressions()
                .delete_suppression(user_id, entry.id)
                .await?;
            lifted += 1;
        }
    }

    Ok(lifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use chrono::Duration;

    fn opt_out(address: &str, channel: Option<Channel>) -> NewSuppression {
        NewSuppression {
            address: address.into(),
            channel,
            contact_id: None,
            reason: SuppressionReason::OptOut,
            note: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn can_add_suppression_with_normalized_address() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();

        let entry = add_suppression(&db, user_id, opt_out("+1 (555) 010-0000", Some(Channel::Sms)))
            .await
            .unwrap();

        assert_eq!(entry.address, "+15550100000");
        assert!(is_suppressed(&db, user_id, "+15550100000", Channel::Sms, Utc::now())
            .await
            .unwrap());
        assert!(!is_suppressed(&db, user_id, "+15550100000", Channel::Email, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn duplicate_address_and_channel_is_rejected() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let first = add_suppression(&db, user_id, opt_out("ada@example.com", None))
            .await
            .unwrap();

        let result = add_suppression(&db, user_id, opt_out("ADA@example.com", None)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::AddressAlreadySuppressed {
                address: "ada@example.com".into(),
                channel: None,
                suppression_id: first.id,
            }
        );
    }

    #[tokio::test]
    async fn expired_entry_is_replaced() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let mut expired = opt_out("ada@example.com", Some(Channel::Email));
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        add_suppression(&db, user_id, expired).await.unwrap();
        assert!(!is_suppressed(&db, user_id, "ada@example.com", Channel::Email, Utc::now())
            .await
            .unwrap());

        add_suppression(&db, user_id, opt_out("ada@example.com", Some(Channel::Email)))
            .await
            .unwrap();

        assert_eq!(get_suppressions(&db, user_id).await.unwrap().len(), 1);
        assert!(is_suppressed(&db, user_id, "ada@example.com", Channel::Email, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn lift_only_removes_matching_channel_and_reason() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        add_suppression(&db, user_id, opt_out("+15550100000", Some(Channel::Sms)))
            .await
            .unwrap();
        add_suppression(&db, user_id, opt_out("+15550100000", None))
            .await
            .unwrap();

        let lifted = lift_suppressions(
            &db,
            user_id,
            "+15550100000",
            Channel::Sms,
            SuppressionReason::OptOut,
        )
        .await
        .unwrap();

        assert_eq!(lifted, 1);
        let remaining = get_suppressions(&db, user_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].channel, None);
    }

    #[tokio::test]
    async fn suppressions_are_scoped_to_tenant() {
        let db = MemoryDatabase::new();
        let entry = add_suppression(&db, UserId::new(), opt_out("ada@example.com", None))
            .await
            .unwrap();

        let result = get_suppression_by_id(&db, UserId::new(), entry.id).await;

        assert_eq!(
            result.unwrap_err(),
            Error::SuppressionNotFound {
                suppression_id: entry.id
            }
        );
    }
}

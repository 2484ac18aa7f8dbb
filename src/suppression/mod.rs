use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::contact::ContactId;
use crate::database::record;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type SuppressionId = TypedId<SuppressionEntry>;

/// An address that must not be contacted, on one channel or on all of them
/// when `channel` is absent.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SuppressionEntry {
    #[serde(rename = "_id")]
    pub id: SuppressionId,
    pub user_id: UserId,
    pub address: String,
    pub channel: Option<Channel>,
    pub contact_id: Option<ContactId>,
    pub reason: SuppressionReason,
    pub note: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum SuppressionReason {
    OptOut,
    HardBounce,
    Complaint,
    Manual,
    CarrierBlock,
}

impl SuppressionEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    pub fn applies_to(&self, channel: Channel) -> bool {
        self.channel.map_or(true, |c| c == channel)
    }

    pub fn suppresses(&self, channel: Channel, now: DateTime<Utc>) -> bool {
        self.applies_to(channel) && !self.is_expired(now)
    }
}

impl TypedIdMarker for SuppressionEntry {
    fn tag() -> &'static str {
        "SUP"
    }
}

record!(SuppressionEntry);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(channel: Option<Channel>, expires_at: Option<DateTime<Utc>>) -> SuppressionEntry {
        let now = Utc::now();
        SuppressionEntry {
            id: SuppressionId::new(),
            user_id: UserId::new(),
            address: "+15550100000".into(),
            channel,
            contact_id: None,
            reason: SuppressionReason::Manual,
            note: None,
            expires_at,
            created_at: now,
            modified_at: now,
        }
    }

    #[test]
    fn entry_without_channel_covers_every_channel() {
        let entry = entry(None, None);

        for channel in Channel::ALL {
            assert!(entry.suppresses(channel, Utc::now()));
        }
    }

    #[test]
    fn channel_entry_only_covers_its_channel() {
        let entry = entry(Some(Channel::Sms), None);

        assert!(entry.suppresses(Channel::Sms, Utc::now()));
        assert!(!entry.suppresses(Channel::Mms, Utc::now()));
    }

    #[test]
    fn expired_entry_does_not_suppress() {
        let now = Utc::now();
        let entry = entry(None, Some(now - Duration::minutes(1)));

        assert!(entry.is_expired(now));
        assert!(!entry.suppresses(Channel::Email, now));
    }

    #[test]
    fn reason_uses_kebab_names() {
        assert_eq!(
            serde_json::to_string(&SuppressionReason::CarrierBlock).unwrap(),
            "\"CARRIER-BLOCK\""
        );
    }
}

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

pub type ConsentId = TypedId<ContactConsent>;
pub type ConsentHistoryId = TypedId<ConsentHistory>;

/// The current opt-in state of one contact on one channel.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContactConsent {
    #[serde(rename = "_id")]
    pub id: ConsentId,
    pub user_id: UserId,
    pub contact_id: ContactId,
    pub channel: Channel,
    pub status: ConsentStatus,
    pub source: ConsentSource,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for ContactConsent {
    fn tag() -> &'static str {
        "CNS"
    }
}

record!(ContactConsent, versioned);

/// A revoked date only exists on `Revoked`, so a granted consent can never
/// carry one.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ConsentStatus {
    Pending,
    Granted {
        granted_at: DateTime<Utc>,
    },
    Revoked {
        granted_at: Option<DateTime<Utc>>,
        revoked_at: DateTime<Utc>,
    },
}

impl ConsentStatus {
    pub fn kind(&self) -> ConsentStatusKind {
        match self {
            ConsentStatus::Pending => ConsentStatusKind::Pending,
            ConsentStatus::Granted { .. } => ConsentStatusKind::Granted,
            ConsentStatus::Revoked { .. } => ConsentStatusKind::Revoked,
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, ConsentStatus::Granted { .. })
    }

    pub fn granted_date(&self) -> Option<DateTime<Utc>> {
        match self {
            ConsentStatus::Pending => None,
            ConsentStatus::Granted { granted_at } => Some(*granted_at),
            ConsentStatus::Revoked { granted_at, .. } => *granted_at,
        }
    }

    pub fn revoked_date(&self) -> Option<DateTime<Utc>> {
        match self {
            ConsentStatus::Revoked { revoked_at, .. } => Some(*revoked_at),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ConsentStatusKind {
    Pending,
    Granted,
    Revoked,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ConsentSource {
    Api,
    WebForm,
    Import,
    Keyword,
    Manual,
}

/// One change of a contact's consent, appended and never edited.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConsentHistory {
    #[serde(rename = "_id")]
    pub id: ConsentHistoryId,
    pub user_id: UserId,
    pub contact_id: ContactId,
    pub consent_id: ConsentId,
    pub channel: Channel,
    pub previous_status: Option<ConsentStatusKind>,
    pub new_status: ConsentStatusKind,
    pub source: ConsentSource,
    pub note: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub occurred_at: DateTime<Utc>,
}

impl TypedIdMarker for ConsentHistory {
    fn tag() -> &'static str {
        "CNH"
    }
}

record!(ConsentHistory);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granted_status_has_no_revoked_date() {
        let status = ConsentStatus::Granted {
            granted_at: Utc::now(),
        };

        assert!(status.is_granted());
        assert!(status.granted_date().is_some());
        assert_eq!(status.revoked_date(), None);
    }

    #[test]
    fn revoked_status_keeps_original_grant_date() {
        let granted_at = Utc::now();
        let revoked_at = granted_at + chrono::Duration::days(3);
        let status = ConsentStatus::Revoked {
            granted_at: Some(granted_at),
            revoked_at,
        };

        assert!(!status.is_granted());
        assert_eq!(status.granted_date(), Some(granted_at));
        assert_eq!(status.revoked_date(), Some(revoked_at));
    }

    #[test]
    fn status_serializes_with_type_tag() {
        let json = serde_json::to_value(&ConsentStatus::Pending).unwrap();

        assert_eq!(json, serde_json::json!({ "type": "PENDING" }));
    }
}

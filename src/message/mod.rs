use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsEvent;
use crate::campaign::CampaignId;
use crate::channel::Channel;
use crate::contact::ContactId;
use crate::database::record;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;
use crate::variant::VariantId;

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type MessageId = TypedId<CampaignMessage>;
pub type AttemptId = TypedId<DeliveryAttempt>;

/// One outbound message of a campaign to one contact on one channel.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CampaignMessage {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub user_id: UserId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub variant_id: Option<VariantId>,
    pub channel: Channel,
    pub address: String,
    pub status: MessageStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub provider_name: Option<String>,
    pub provider_message_id: Option<String>,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for CampaignMessage {
    fn tag() -> &'static str {
        "MSG"
    }
}

record!(CampaignMessage, versioned);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Queued => "QUEUED",
            MessageStatus::Sent => "SENT",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Failed => "FAILED",
        }
    }
}

impl Display for MessageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum EngagementKind {
    Opened,
    Clicked,
    Converted,
}

impl EngagementKind {
    pub fn event(self) -> AnalyticsEvent {
        match self {
            EngagementKind::Opened => AnalyticsEvent::Opened,
            EngagementKind::Clicked => AnalyticsEvent::Clicked,
            EngagementKind::Converted => AnalyticsEvent::Converted,
        }
    }
}

impl CampaignMessage {
    fn engagement_slot(&mut self, kind: EngagementKind) -> &mut Option<DateTime<Utc>> {
        match kind {
            EngagementKind::Opened => &mut self.opened_at,
            EngagementKind::Clicked => &mut self.clicked_at,
            EngagementKind::Converted => &mut self.converted_at,
        }
    }

    /// Stamps the engagement unless it was already seen. Returns whether
    /// this was the first occurrence.
    pub fn engage(&mut self, kind: EngagementKind, now: DateTime<Utc>) -> bool {
        let slot = self.engagement_slot(kind);
        if slot.is_some() {
            return false;
        }

        *slot = Some(now);
        true
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// One hand-off of a message to a provider.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeliveryAttempt {
    #[serde(rename = "_id")]
    pub id: AttemptId,
    pub user_id: UserId,
    pub campaign_id: CampaignId,
    pub message_id: MessageId,
    pub attempt_number: u32,
    pub provider_name: String,
    pub outcome: AttemptOutcome,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub fallback_reason: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub attempted_at: DateTime<Utc>,
}

impl TypedIdMarker for DeliveryAttempt {
    fn tag() -> &'static str {
        "ATT"
    }
}

record!(DeliveryAttempt);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_delivered_and_failed_are_terminal() {
        assert!(!MessageStatus::Queued.is_terminal());
        assert!(!MessageStatus::Sent.is_terminal());
        assert!(MessageStatus::Delivered.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_in_upper_case() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Delivered).unwrap(),
            "\"DELIVERED\""
        );
    }
}

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

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

pub type CampaignId = TypedId<Campaign>;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Campaign {
    #[serde(rename = "_id")]
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub channels: Vec<Channel>,
    pub status: CampaignStatus,
    pub content: Option<CampaignContent>,
    pub audience: Option<CampaignAudience>,
    pub schedule: Option<CampaignSchedule>,
    pub is_ab_test: bool,
    pub winning_variant_id: Option<VariantId>,
    pub failure_reason: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for Campaign {
    fn tag() -> &'static str {
        "CPN"
    }
}

record!(Campaign, versioned);

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct CampaignContent {
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// Who receives the campaign: the listed contacts plus every contact with
/// one of the tags.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct CampaignAudience {
    #[serde(default)]
    pub contact_ids: Vec<ContactId>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CampaignAudience {
    pub fn is_empty(&self) -> bool {
        self.contact_ids.is_empty() && self.tags.is_empty()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct CampaignSchedule {
    pub send_at: DateTime<Utc>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;

        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Running)
                | (Draft, Cancelled)
                | (Scheduled, Draft)
                | (Scheduled, Running)
                | (Scheduled, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Completed)
                | (Paused, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CampaignStatus::Completed | CampaignStatus::Failed | CampaignStatus::Cancelled
        )
    }

    /// Messages may be queued while the campaign is scheduled or running.
    pub fn accepts_messages(self) -> bool {
        matches!(self, CampaignStatus::Scheduled | CampaignStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Scheduled => "SCHEDULED",
            CampaignStatus::Running => "RUNNING",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Failed => "FAILED",
            CampaignStatus::Cancelled => "CANCELLED",
        }
    }
}

impl Display for CampaignStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CampaignStatus::*;

    const ALL: [CampaignStatus; 7] = [Draft, Scheduled, Running, Paused, Completed, Failed, Cancelled];

    #[test]
    fn terminal_states_have_no_way_out() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL.iter().copied() {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn running_and_paused_toggle() {
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(!Paused.can_transition_to(Cancelled));
    }

    #[test]
    fn draft_cannot_complete_directly() {
        assert!(!Draft.can_transition_to(Completed));
        assert!(!Draft.can_transition_to(Paused));
        assert!(Draft.can_transition_to(Running));
    }
}

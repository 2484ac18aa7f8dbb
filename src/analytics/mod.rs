use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignId;
use crate::database::Record;
use crate::user::UserId;
use crate::variant::VariantId;

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

/// Delivery and engagement counters. They only ever grow.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsCounters {
    pub queued: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub opened: u64,
    pub clicked: u64,
    pub converted: u64,
}

impl AnalyticsCounters {
    pub fn apply(&mut self, event: AnalyticsEvent) {
        let counter = match event {
            AnalyticsEvent::Queued => &mut self.queued,
            AnalyticsEvent::Sent => &mut self.sent,
            AnalyticsEvent::Delivered => &mut self.delivered,
            AnalyticsEvent::Failed => &mut self.failed,
            AnalyticsEvent::Opened => &mut self.opened,
            AnalyticsEvent::Clicked => &mut self.clicked,
            AnalyticsEvent::Converted => &mut self.converted,
        };
        *counter += 1;
    }

    /// delivered / sent
    pub fn delivery_rate(&self) -> f64 {
        ratio(self.delivered, self.sent)
    }

    /// opened / delivered
    pub fn open_rate(&self) -> f64 {
        ratio(self.opened, self.delivered)
    }

    /// clicked / delivered
    pub fn click_rate(&self) -> f64 {
        ratio(self.clicked, self.delivered)
    }

    /// converted / delivered
    pub fn conversion_rate(&self) -> f64 {
        ratio(self.converted, self.delivered)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum AnalyticsEvent {
    Queued,
    Sent,
    Delivered,
    Failed,
    Opened,
    Clicked,
    Converted,
}

impl AnalyticsEvent {
    /// The counter's path inside a stored analytics document.
    pub fn field(&self) -> &'static str {
        match self {
            AnalyticsEvent::Queued => "counters.queued",
            AnalyticsEvent::Sent => "counters.sent",
            AnalyticsEvent::Delivered => "counters.delivered",
            AnalyticsEvent::Failed => "counters.failed",
            AnalyticsEvent::Opened => "counters.opened",
            AnalyticsEvent::Clicked => "counters.clicked",
            AnalyticsEvent::Converted => "counters.converted",
        }
    }
}

/// Counters of one campaign, keyed by the campaign id.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CampaignAnalytics {
    #[serde(rename = "_id")]
    pub campaign_id: CampaignId,
    pub user_id: UserId,
    #[serde(default)]
    pub counters: AnalyticsCounters,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl CampaignAnalytics {
    pub fn empty(user_id: UserId, campaign_id: CampaignId) -> CampaignAnalytics {
        CampaignAnalytics {
            campaign_id,
            user_id,
            counters: AnalyticsCounters::default(),
            updated_at: Utc::now(),
        }
    }
}

impl Record for CampaignAnalytics {
    fn key(&self) -> String {
        self.campaign_id.to_string()
    }

    fn owner(&self) -> UserId {
        self.user_id
    }
}

/// Counters of one variant of an A/B campaign, keyed by the variant id.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VariantAnalytics {
    #[serde(rename = "_id")]
    pub variant_id: VariantId,
    pub user_id: UserId,
    pub campaign_id: CampaignId,
    #[serde(default)]
    pub counters: AnalyticsCounters,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Record for VariantAnalytics {
    fn key(&self) -> String {
        self.variant_id.to_string()
    }

    fn owner(&self) -> UserId {
        self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_with_zero_denominator_are_zero() {
        let counters = AnalyticsCounters::default();

        assert_eq!(counters.delivery_rate(), 0.0);
        assert_eq!(counters.conversion_rate(), 0.0);
    }

    #[test]
    fn rates_divide_by_the_right_counter() {
        let counters = AnalyticsCounters {
            sent: 10,
            delivered: 8,
            converted: 2,
            ..AnalyticsCounters::default()
        };

        assert_eq!(counters.delivery_rate(), 0.8);
        assert_eq!(counters.conversion_rate(), 0.25);
    }

    #[test]
    fn missing_counters_deserialize_as_zero() {
        let counters: AnalyticsCounters =
            serde_json::from_value(serde_json::json!({ "sent": 3 })).unwrap();

        assert_eq!(counters.sent, 3);
        assert_eq!(counters.delivered, 0);
    }
}

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::database::record;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;

use super::ContactId;

pub type FrequencyControlId = TypedId<FrequencyControl>;

/// Per-contact send caps and the counters they are checked against.
///
/// Counters belong to the period of `last_sent_at`; once the UTC day, ISO
/// week or calendar month changes the matching counter reads as zero.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FrequencyControl {
    #[serde(rename = "_id")]
    pub id: FrequencyControlId,
    pub user_id: UserId,
    pub contact_id: ContactId,
    pub caps: FrequencyCaps,
    pub sent_today: u32,
    pub sent_this_week: u32,
    pub sent_this_month: u32,
    pub last_sent_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct FrequencyCaps {
    pub max_per_day: Option<u32>,
    pub max_per_week: Option<u32>,
    pub max_per_month: Option<u32>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum FrequencyPeriod {
    Day,
    Week,
    Month,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct FrequencyCounts {
    pub day: u32,
    pub week: u32,
    pub month: u32,
}

impl FrequencyControl {
    pub fn new(user_id: UserId, contact_id: ContactId, caps: FrequencyCaps) -> FrequencyControl {
        let now = Utc::now();
        FrequencyControl {
            id: FrequencyControlId::new(),
            user_id,
            contact_id,
            caps,
            sent_today: 0,
            sent_this_week: 0,
            sent_this_month: 0,
            last_sent_at: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// The counters as seen at `now`, with elapsed periods reading zero.
    pub fn counts_at(&self, now: DateTime<Utc>) -> FrequencyCounts {
        let last = match self.last_sent_at {
            Some(last) => last,
            None => return FrequencyCounts::default(),
        };

        FrequencyCounts {
            day: if same_day(last, now) { self.sent_today } else { 0 },
            week: if same_week(last, now) { self.sent_this_week } else { 0 },
            month: if same_month(last, now) { self.sent_this_month } else { 0 },
        }
    }

    pub fn record_send(&mut self, now: DateTime<Utc>) {
        let counts = self.counts_at(now);
        self.sent_today = counts.day + 1;
        self.sent_this_week = counts.week + 1;
        self.sent_this_month = counts.month + 1;
        self.last_sent_at = Some(now);
    }

    /// The first cap that another send at `now` would exceed, as
    /// `(period, limit, current)`.
    pub fn reached_cap(&self, now: DateTime<Utc>) -> Option<(FrequencyPeriod, u32, u32)> {
        let counts = self.counts_at(now);
        let checks = [
            (FrequencyPeriod::Day, self.caps.max_per_day, counts.day),
            (FrequencyPeriod::Week, self.caps.max_per_week, counts.week),
            (FrequencyPeriod::Month, self.caps.max_per_month, counts.month),
        ];

        checks
            .iter()
            .find_map(|&(period, limit, current)| match limit {
                Some(limit) if current >= limit => Some((period, limit, current)),
                _ => None,
            })
    }
}

fn same_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}

fn same_week(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.iso_week() == b.iso_week()
}

fn same_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

impl TypedIdMarker for FrequencyControl {
    fn tag() -> &'static str {
        "FRQ"
    }
}

record!(FrequencyControl, versioned);

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::database::record;
use crate::provider::ProviderId;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type RateLimitId = TypedId<RateLimit>;

/// Longest window a limit may span: one leap year.
pub const MAX_WINDOW_SECONDS: i64 = 366 * 24 * 60 * 60;

/// What a rate limit counts requests against.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum RateLimitSubject {
    Provider { provider_id: ProviderId },
    Api { endpoint: String },
}

/// A fixed window counter: at most `max_requests` per
/// `time_window_seconds`, starting at `window_start_time`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RateLimit {
    #[serde(rename = "_id")]
    pub id: RateLimitId,
    pub user_id: UserId,
    pub subject: RateLimitSubject,
    pub max_requests: u32,
    pub time_window_seconds: i64,
    pub current_request_count: u32,
    pub window_start_time: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct WindowState {
    pub current_request_count: u32,
    pub remaining: u32,
    pub window_start_time: DateTime<Utc>,
    pub reset_at: DateTime<Utc>,
}

impl RateLimit {
    pub fn window_length(&self) -> Duration {
        Duration::seconds(self.time_window_seconds.clamp(0, MAX_WINDOW_SECONDS))
    }

    /// End of a window starting at `start`, pinned to the latest
    /// representable instant instead of overflowing.
    pub fn window_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_signed(self.window_length())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The window as seen at `now`; an elapsed window reads as a fresh one
    /// starting at `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> WindowState {
        let (count, start) = if now >= self.window_end(self.window_start_time) {
            (0, now)
        } else {
            (self.current_request_count, self.window_start_time)
        };

        WindowState {
            current_request_count: count,
            remaining: self.max_requests.saturating_sub(count),
            window_start_time: start,
            reset_at: self.window_end(start),
        }
    }

    /// Takes `permits` from the window at `now`, rolling the window over
    /// first if it elapsed. On refusal nothing is taken and the time the
    /// window resets is returned.
    pub fn try_acquire(
        &mut self,
        now: DateTime<Utc>,
        permits: u32,
    ) -> Result<WindowState, DateTime<Utc>> {
        let window = self.window_at(now);
        if permits > window.remaining {
            return Err(window.reset_at);
        }

        self.current_request_count = window.current_request_count + permits;
        self.window_start_time = window.window_start_time;

        Ok(self.window_at(now))
    }
}

impl TypedIdMarker for RateLimit {
    fn tag() -> &'static str {
        "RTL"
    }
}

record!(RateLimit, versioned);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limit(max_requests: u32, start: DateTime<Utc>) -> RateLimit {
        RateLimit {
            id: RateLimitId::new(),
            user_id: UserId::new(),
            subject: RateLimitSubject::Api {
                endpoint: "/campaigns".into(),
            },
            max_requests,
            time_window_seconds: 60,
            current_request_count: 0,
            window_start_time: start,
            created_at: start,
            modified_at: start,
        }
    }

    fn at(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap() + Duration::seconds(i64::from(seconds))
    }

    #[test]
    fn acquire_counts_within_window() {
        let mut limit = limit(2, at(0));

        let first = limit.try_acquire(at(1), 1).unwrap();
        let second = limit.try_acquire(at(2), 1).unwrap();

        assert_eq!(first.remaining, 1);
        assert_eq!(second.remaining, 0);
        assert_eq!(second.reset_at, at(60));
    }

    #[test]
    fn acquire_beyond_limit_is_refused_with_reset_time() {
        let mut limit = limit(1, at(0));
        limit.try_acquire(at(1), 1).unwrap();

        let result = limit.try_acquire(at(30), 1);

        assert_eq!(result, Err(at(60)));
        assert_eq!(limit.current_request_count, 1);
    }

    #[test]
    fn window_resets_exactly_at_its_end() {
        let mut limit = limit(1, at(0));
        limit.try_acquire(at(1), 1).unwrap();
        assert!(limit.try_acquire(at(59), 1).is_err());

        let state = limit.try_acquire(at(60), 1).unwrap();

        assert_eq!(state.window_start_time, at(60));
        assert_eq!(state.current_request_count, 1);
        assert_eq!(state.reset_at, at(120));
    }

    #[test]
    fn oversized_window_does_not_overflow() {
        let mut limit = limit(1, at(0));
        limit.time_window_seconds = 10_000_000_000_000;

        let state = limit.try_acquire(at(1), 1).unwrap();
        assert_eq!(state.reset_at, at(0) + Duration::seconds(MAX_WINDOW_SECONDS));

        limit.window_start_time = DateTime::<Utc>::MAX_UTC - Duration::seconds(10);
        let state = limit.window_at(DateTime::<Utc>::MAX_UTC - Duration::seconds(5));
        assert_eq!(state.reset_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn subject_serializes_with_type_tag() {
        let json = serde_json::to_value(&RateLimitSubject::Api {
            endpoint: "/contacts".into(),
        })
        .unwrap();

        assert_eq!(json, serde_json::json!({ "type": "API", "endpoint": "/contacts" }));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::database::Database;
use crate::error::Error;
use crate::provider;
use crate::user::UserId;

use super::{RateLimit, RateLimitId, RateLimitSubject, WindowState, MAX_WINDOW_SECONDS};

const ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewRateLimit {
    pub subject: RateLimitSubject,
    pub max_requests: u32,
    pub time_window_seconds: i64,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitUpdate {
    pub max_requests: u32,
    pub time_window_seconds: i64,
}

fn validate_window(max_requests: u32, time_window_seconds: i64) -> Result<(), Error> {
    if max_requests == 0
        || time_window_seconds <= 0
        || time_window_seconds > MAX_WINDOW_SECONDS
    {
        return Err(Error::InvalidRateLimitWindow {
            max_requests,
            time_window_seconds,
        });
    }

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn create_rate_limit(
    db: &dyn Database,
    user_id: UserId,
    new_limit: NewRateLimit,
) -> Result<RateLimit, Error> {
    validate_window(new_limit.max_requests, new_limit.time_window_seconds)?;

    if let RateLimitSubject::Provider { provider_id } = &new_limit.subject {
        provider::manager::get_provider_by_id(db, user_id, *provider_id).await?;
    }

    let existing = db
        .rate_limits()
        .fetch_rate_limit_by_subject(user_id, &new_limit.subject)
        .await?;
    if let Some(existing) = existing {
        return Err(Error::RateLimitAlreadyExists {
            rate_limit_id: existing.id,
        });
    }

    let now = Utc::now();
    let limit = RateLimit {
        id: RateLimitId::new(),
        user_id,
        subject: new_limit.subject,
        max_requests: new_limit.max_requests,
        time_window_seconds: new_limit.time_window_seconds,
        current_request_count: 0,
        window_start_time: now,
        created_at: now,
        modified_at: now,
    };

    db.rate_limits().insert_rate_limit(&limit).await?;

    Ok(limit)
}

#[tracing::instrument(skip(db))]
pub async fn get_rate_limits(db: &dyn Database, user_id: UserId) -> Result<Vec<RateLimit>, Error> {
    let limits = db.rate_limits().fetch_rate_limits_by_user(user_id).await?;

    Ok(limits)
}

#[tracing::instrument(skip(db))]
pub async fn get_rate_limit_by_id(
    db: &dyn Database,
    user_id: UserId,
    rate_limit_id: RateLimitId,
) -> Result<RateLimit, Error> {
    let limit = db
        .rate_limits()
        .fetch_rate_limit_by_id(user_id, rate_limit_id)
        .await?
        .ok_or(Error::RateLimitNotFound { rate_limit_id })?;

    Ok(limit)
}

/// Changes the window size. The current window and its count are kept.
#[tracing::instrument(skip(db))]
pub async fn update_rate_limit(
    db: &dyn Database,
    mut limit: RateLimit,
    update: RateLimitUpdate,
) -> Result<RateLimit, Error> {
    validate_window(update.max_requests, update.time_window_seconds)?;

    limit.max_requests = update.max_requests;
    limit.time_window_seconds = update.time_window_seconds;

    db.rate_limits().update_rate_limit(limit).await
}

#[tracing::instrument(skip(db))]
pub async fn delete_rate_limit(db: &dyn Database, limit: RateLimit) -> Result<(), Error> {
    db.rate_limits()
        .delete_rate_limit(limit.user_id, limit.id)
        .await
}

/// Reserves `permits` requests in the current window of the limit.
///
/// The counter is written back with the optimistic `modified_at` check; a
/// write that loses a race is retried against a fresh copy.
#[tracing::instrument(skip(db))]
pub async fn acquire(
    db: &dyn Database,
    user_id: UserId,
    rate_limit_id: RateLimitId,
    permits: u32,
    now: DateTime<Utc>,
) -> Result<WindowState, Error> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut limit = get_rate_limit_by_id(db, user_id, rate_limit_id).await?;

        let state = limit
            .try_acquire(now, permits)
            .map_err(|reset_at| Error::RateLimitExceeded {
                rate_limit_id,
                max_requests: limit.max_requests,
                reset_at,
            })?;

        match db.rate_limits().update_rate_limit(limit).await {
            Ok(_) => return Ok(state),
            Err(Error::ConcurrentModificationDetected) if attempt < ACQUIRE_ATTEMPTS => {
                warn!("rate limit {} changed while acquiring, retrying", rate_limit_id);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Removes the limit counting requests to a provider, if there is one.
#[tracing::instrument(skip(db))]
pub async fn delete_provider_rate_limit(
    db: &dyn Database,
    user_id: UserId,
    provider_id: provider::ProviderId,
) -> Result<(), Error> {
    let subject = RateLimitSubject::Provider { provider_id };
    let existing = db
        .rate_limits()
        .fetch_rate_limit_by_subject(user_id, &subject)
        .await?;

    if let Some(limit) = existing {
        delete_rate_limit(db, limit).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::database::MemoryDatabase;
    use crate::provider::manager::{create_provider, NewProvider};
    use chrono::Duration;

    fn api(endpoint: &str, max_requests: u32) -> NewRateLimit {
        NewRateLimit {
            subject: RateLimitSubject::Api {
                endpoint: endpoint.into(),
            },
            max_requests,
            time_window_seconds: 60,
        }
    }

    #[tokio::test]
    async fn acquire_is_refused_once_window_is_full() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let limit = create_rate_limit(&db, user_id, api("/campaigns", 2)).await.unwrap();
        let now = Utc::now();

        acquire(&db, user_id, limit.id, 1, now).await.unwrap();
        let state = acquire(&db, user_id, limit.id, 1, now).await.unwrap();
        assert_eq!(state.remaining, 0);

        let result = acquire(&db, user_id, limit.id, 1, now).await;

        assert_eq!(
            result.unwrap_err(),
            Error::RateLimitExceeded {
                rate_limit_id: limit.id,
                max_requests: 2,
                reset_at: limit.window_start_time + Duration::seconds(60),
            }
        );
    }

    #[tokio::test]
    async fn acquire_after_window_starts_new_window() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let limit = create_rate_limit(&db, user_id, api("/campaigns", 1)).await.unwrap();
        acquire(&db, user_id, limit.id, 1, Utc::now()).await.unwrap();

        let later = limit.window_start_time + Duration::seconds(61);
        let state = acquire(&db, user_id, limit.id, 1, later).await.unwrap();

        assert_eq!(state.window_start_time, later);
        assert_eq!(state.current_request_count, 1);
    }

    #[tokio::test]
    async fn one_limit_per_subject() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let first = create_rate_limit(&db, user_id, api("/contacts", 5)).await.unwrap();

        let result = create_rate_limit(&db, user_id, api("/contacts", 10)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::RateLimitAlreadyExists {
                rate_limit_id: first.id
            }
        );
    }

    #[tokio::test]
    async fn empty_window_is_rejected() {
        let db = MemoryDatabase::new();

        let result = create_rate_limit(&db, UserId::new(), api("/contacts", 0)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::InvalidRateLimitWindow {
                max_requests: 0,
                time_window_seconds: 60
            }
        );
    }

    #[tokio::test]
    async fn window_longer_than_a_year_is_rejected() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let mut new_limit = api("/contacts", 5);
        new_limit.time_window_seconds = 10_000_000_000_000;

        let result = create_rate_limit(&db, user_id, new_limit).await;

        assert_eq!(
            result.unwrap_err(),
            Error::InvalidRateLimitWindow {
                max_requests: 5,
                time_window_seconds: 10_000_000_000_000
            }
        );

        let limit = create_rate_limit(&db, user_id, api("/contacts", 5)).await.unwrap();
        let result = update_rate_limit(
            &db,
            limit.clone(),
            RateLimitUpdate {
                max_requests: 5,
                time_window_seconds: MAX_WINDOW_SECONDS + 1,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidRateLimitWindow { .. })));

        let state = acquire(&db, user_id, limit.id, 1, Utc::now()).await.unwrap();
        assert_eq!(state.remaining, 4);
    }

    #[tokio::test]
    async fn provider_limit_requires_existing_provider() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let provider = create_provider(
            &db,
            user_id,
            NewProvider {
                name: "twilio".into(),
                channel: Channel::Sms,
                provider_type: "HTTP".into(),
                is_active: true,
            },
        )
        .await
        .unwrap();
        let missing = provider::ProviderId::new();

        let ok = create_rate_limit(
            &db,
            user_id,
            NewRateLimit {
                subject: RateLimitSubject::Provider {
                    provider_id: provider.id,
                },
                max_requests: 100,
                time_window_seconds: 1,
            },
        )
        .await;
        let missing = create_rate_limit(
            &db,
            user_id,
            NewRateLimit {
                subject: RateLimitSubject::Provider {
                    provider_id: missing,
                },
                max_requests: 100,
                time_window_seconds: 1,
            },
        )
        .await;

        assert!(ok.is_ok());
        assert!(matches!(missing, Err(Error::ProviderNotFound { .. })));
    }
}

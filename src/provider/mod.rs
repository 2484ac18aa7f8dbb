use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::database::record;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;

pub mod db;
pub mod endpoints;
pub mod manager;
pub mod retry;
pub use endpoints::*;
pub use retry::{RetryPolicy, RetryStrategy};

pub type ProviderId = TypedId<MessageProvider>;
pub type RoutingConfigId = TypedId<ChannelRoutingConfig>;

/// An upstream gateway able to deliver messages on one channel.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessageProvider {
    #[serde(rename = "_id")]
    pub id: ProviderId,
    pub user_id: UserId,
    pub name: String,
    pub channel: Channel,
    pub provider_type: String,
    pub is_active: bool,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for MessageProvider {
    fn tag() -> &'static str {
        "PRV"
    }
}

record!(MessageProvider, versioned);

/// How a tenant routes one channel: the primary provider, the fallbacks
/// tried after it, and the retry policy for failed attempts.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChannelRoutingConfig {
    #[serde(rename = "_id")]
    pub id: RoutingConfigId,
    pub user_id: UserId,
    pub channel: Channel,
    pub primary_provider_id: ProviderId,
    pub fallback_provider_ids: Vec<ProviderId>,
    pub retry_strategy: RetryStrategy,
    pub max_retries: u32,
    pub initial_backoff_ms: i64,
    pub max_backoff_ms: i64,
    pub backoff_multiplier: f64,
    pub is_active: bool,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl ChannelRoutingConfig {
    /// Primary first, then fallbacks in their configured order.
    pub fn provider_ids(&self) -> impl Iterator<Item = ProviderId> + '_ {
        std::iter::once(self.primary_provider_id).chain(self.fallback_provider_ids.iter().copied())
    }

    pub fn references(&self, provider_id: ProviderId) -> bool {
        self.provider_ids().any(|id| id == provider_id)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            strategy: self.retry_strategy,
            max_retries: self.max_retries,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl TypedIdMarker for ChannelRoutingConfig {
    fn tag() -> &'static str {
        "RTE"
    }
}

record!(ChannelRoutingConfig, versioned);

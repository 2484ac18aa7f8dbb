use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channel::Channel;
use crate::database::Database;
use crate::error::Error;
use crate::ratelimit;
use crate::user::UserId;

use super::{
    ChannelRoutingConfig, MessageProvider, ProviderId, RetryPolicy, RetryStrategy,
    RoutingConfigId,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewProvider {
    pub name: String,
    pub channel: Channel,
    pub provider_type: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderUpdate {
    pub name: String,
    pub provider_type: String,
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[tracing::instrument(skip(db))]
pub async fn create_provider(
    db: &dyn Database,
    user_id: UserId,
    new_provider: NewProvider,
) -> Result<MessageProvider, Error> {
    let name = new_provider.name.trim().to_string();
    ensure_name_available(db, user_id, &name, None).await?;

    let now = Utc::now();
    let provider = MessageProvider {
        id: ProviderId::new(),
        user_id,
        name,
        channel: new_provider.channel,
        provider_type: new_provider.provider_type.trim().to_string(),
        is_active: new_provider.is_active,
        created_at: now,
        modified_at: now,
    };

    db.providers().insert_provider(&provider).await?;

    info!("created {} provider {}", provider.channel, provider.name);

    Ok(provider)
}

async fn ensure_name_available(
    db: &dyn Database,
    user_id: UserId,
    name: &str,
    provider_id: Option<ProviderId>,
) -> Result<(), Error> {
    let existing = db.providers().fetch_provider_by_name(user_id, name).await?;

    match existing {
        Some(existing) if Some(existing.id) != provider_id => Err(Error::ProviderNameInUse {
            name: name.to_string(),
            provider_id: existing.id,
        }),
        _ => Ok(()),
    }
}

#[tracing::instrument(skip(db))]
pub async fn get_providers(db: &dyn Database, user_id: UserId) -> Result<Vec<MessageProvider>, Error> {
    let providers = db.providers().fetch_providers_by_user(user_id).await?;

    Ok(providers)
}

#[tracing::instrument(skip(db))]
pub async fn get_provider_by_id(
    db: &dyn Database,
    user_id: UserId,
    provider_id: ProviderId,
) -> Result<MessageProvider, Error> {
    let provider = db
        .providers()
        .fetch_provider_by_id(user_id, provider_id)
        .await?
        .ok_or(Error::ProviderNotFound { provider_id })?;

    Ok(provider)
}

#[tracing::instrument(skip(db))]
pub async fn update_provider(
    db: &dyn Database,
    mut provider: MessageProvider,
    update: ProviderUpdate,
) -> Result<MessageProvider, Error> {
    let name = update.name.trim().to_string();
    ensure_name_available(db, provider.user_id, &name, Some(provider.id)).await?;

    provider.name = name;
    provider.provider_type = update.provider_type.trim().to_string();
    provider.is_active = update.is_active;

    db.providers().update_provider(provider).await
}

/// Deletes a provider that no routing config refers to, along with its
/// rate limit.
#[tracing::instrument(skip(db))]
pub async fn delete_provider(db: &dyn Database, provider: MessageProvider) -> Result<(), Error> {
    let configs = db
        .routing()
        .fetch_routing_configs_by_user(provider.user_id)
        .await?;

    if let Some(config) = configs.iter().find(|c| c.references(provider.id)) {
        return Err(Error::ProviderInUse {
            provider_id: provider.id,
            channel: config.channel,
        });
    }

    db.providers()
        .delete_provider(provider.user_id, provider.id)
        .await?;
    ratelimit::manager::delete_provider_rate_limit(db, provider.user_id, provider.id).await?;

    Ok(())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewRoutingConfig {
    pub primary_provider_id: ProviderId,
    #[serde(default)]
    pub fallback_provider_ids: Vec<ProviderId>,
    #[serde(default)]
    pub retry_strategy: Option<RetryStrategy>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub initial_backoff_ms: Option<i64>,
    #[serde(default)]
    pub max_backoff_ms: Option<i64>,
    #[serde(default)]
    pub backoff_multiplier: Option<f64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl NewRoutingConfig {
    fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            strategy: self.retry_strategy.unwrap_or(defaults.strategy),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_backoff_ms: self.initial_backoff_ms.unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: self.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(defaults.backoff_multiplier),
        }
    }
}

async fn validate_routing(
    db: &dyn Database,
    user_id: UserId,
    channel: Channel,
    new_config: &NewRoutingConfig,
) -> Result<RetryPolicy, Error> {
    let mut seen = HashSet::new();
    let ids = std::iter::once(new_config.primary_provider_id)
        .chain(new_config.fallback_provider_ids.iter().copied());

    for provider_id in ids {
        if !seen.insert(provider_id) {
            return Err(Error::DuplicateRoutingProvider { provider_id });
        }

        let provider = get_provider_by_id(db, user_id, provider_id).await?;
        if provider.channel != channel {
            return Err(Error::ProviderChannelMismatch {
                provider_id,
                provider_channel: provider.channel,
                channel,
            });
        }
    }

    let policy = new_config.retry_policy();
    if !policy.is_valid() {
        return Err(Error::InvalidRetryPolicy {
            initial_backoff_ms: policy.initial_backoff_ms,
            max_backoff_ms: policy.max_backoff_ms,
            backoff_multiplier: policy.backoff_multiplier,
        });
    }

    Ok(policy)
}

/// Creates or replaces the routing config for `channel`.
#[tracing::instrument(skip(db))]
pub async fn set_routing_config(
    db: &dyn Database,
    user_id: UserId,
    channel: Channel,
    new_config: NewRoutingConfig,
) -> Result<ChannelRoutingConfig, Error> {
    let policy = validate_routing(db, user_id, channel, &new_config).await?;

    let existing = db.routing().fetch_routing_config(user_id, channel).await?;
    let now = Utc::now();

    let mut config = existing.clone().unwrap_or_else(|| ChannelRoutingConfig {
        id: RoutingConfigId::new(),
        user_id,
        channel,
        primary_provider_id: new_config.primary_provider_id,
        fallback_provider_ids: Vec::new(),
        retry_strategy: policy.strategy,
        max_retries: policy.max_retries,
        initial_backoff_ms: policy.initial_backoff_ms,
        max_backoff_ms: policy.max_backoff_ms,
        backoff_multiplier: policy.backoff_multiplier,
        is_active: new_config.is_active,
        created_at: now,
        modified_at: now,
    });

    config.primary_provider_id = new_config.primary_provider_id;
    config.fallback_provider_ids = new_config.fallback_provider_ids;
    config.retry_strategy = policy.strategy;
    config.max_retries = policy.max_retries;
    config.initial_backoff_ms = policy.initial_backoff_ms;
    config.max_backoff_ms = policy.max_backoff_ms;
    config.backoff_multiplier = policy.backoff_multiplier;
    config.is_active = new_config.is_active;

    match existing {
        Some(_) => db.routing().update_routing_config(config).await,
        None => {
            db.routing().insert_routing_config(&config).await?;
            Ok(config)
        }
    }
}

#[tracing::instrument(skip(db))]
pub async fn get_routing_configs(
    db: &dyn Database,
    user_id: UserId,
) -> Result<Vec<ChannelRoutingConfig>, Error> {
    let configs = db.routing().fetch_routing_configs_by_user(user_id).await?;

    Ok(configs)
}

#[tracing::instrument(skip(db))]
pub async fn get_routing_config(
    db: &dyn Database,
    user_id: UserId,
    channel: Channel,
) -> Result<ChannelRoutingConfig, Error> {
    let config = db
        .routing()
        .fetch_routing_config(user_id, channel)
        .await?
        .ok_or(Error::RoutingConfigNotFound { channel })?;

    Ok(config)
}

#[tracing::instrument(skip(db))]
pub async fn delete_routing_config(
    db: &dyn Database,
    config: ChannelRoutingConfig,
) -> Result<(), Error> {
    db.routing()
        .delete_routing_config(config.user_id, config.channel)
        .await
}

/// The active providers for `channel` in the order they should be tried.
#[tracing::instrument(skip(db))]
pub async fn resolve_route(
    db: &dyn Database,
    user_id: UserId,
    channel: Channel,
) -> Result<Vec<MessageProvider>, Error> {
    let config = get_routing_config(db, user_id, channel).await?;
    if !config.is_active {
        return Err(Error::NoActiveRoute { channel });
    }

    let mut providers = Vec::new();
    for provider_id in config.provider_ids() {
        let provider = db.providers().fetch_provider_by_id(user_id, provider_id).await?;
        if let Some(provider) = provider.filter(|p| p.is_active && p.channel == channel) {
            providers.push(provider);
        }
    }

    if providers.is_empty() {
        return Err(Error::NoActiveRoute { channel });
    }

    Ok(providers)
}

/// The retry policy of the channel's active routing config, or the default
/// policy when the channel has none.
#[tracing::instrument(skip(db))]
pub async fn retry_policy_for(
    db: &dyn Database,
    user_id: UserId,
    channel: Channel,
) -> Result<RetryPolicy, Error> {
    let config = db.routing().fetch_routing_config(user_id, channel).await?;

    Ok(config
        .filter(|c| c.is_active)
        .map(|c| c.retry_policy())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;

    async fn provider(db: &MemoryDatabase, user_id: UserId, name: &str, channel: Channel) -> MessageProvider {
        let new_provider = NewProvider {
            name: name.into(),
            channel,
            provider_type: "HTTP".into(),
            is_active: true,
        };
        create_provider(db, user_id, new_provider).await.unwrap()
    }

    fn routing(primary: ProviderId, fallbacks: Vec<ProviderId>) -> NewRoutingConfig {
        NewRoutingConfig {
            primary_provider_id: primary,
            fallback_provider_ids: fallbacks,
            retry_strategy: None,
            max_retries: None,
            initial_backoff_ms: None,
            max_backoff_ms: None,
            backoff_multiplier: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn provider_names_are_unique_per_tenant() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let first = provider(&db, user_id, "twilio", Channel::Sms).await;

        let result = create_provider(
            &db,
            user_id,
            NewProvider {
                name: "twilio".into(),
                channel: Channel::Mms,
                provider_type: "HTTP".into(),
                is_active: true,
            },
        )
        .await;

        assert_eq!(
            result.unwrap_err(),
            Error::ProviderNameInUse {
                name: "twilio".into(),
                provider_id: first.id,
            }
        );
    }

    #[tokio::test]
    async fn routing_defaults_to_exponential_policy() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let primary = provider(&db, user_id, "twilio", Channel::Sms).await;

        let config = set_routing_config(&db, user_id, Channel::Sms, routing(primary.id, vec![]))
            .await
            .unwrap();

        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(
            retry_policy_for(&db, user_id, Channel::Sms).await.unwrap(),
            RetryPolicy::default()
        );
    }

    #[tokio::test]
    async fn routing_rejects_backoff_beyond_a_day() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let primary = provider(&db, user_id, "twilio", Channel::Sms).await;
        let mut config = routing(primary.id, vec![]);
        config.retry_strategy = Some(RetryStrategy::Fixed);
        config.initial_backoff_ms = Some(i64::MAX / 2);
        config.max_backoff_ms = Some(i64::MAX);

        let result = set_routing_config(&db, user_id, Channel::Sms, config).await;

        assert_eq!(
            result.unwrap_err(),
            Error::InvalidRetryPolicy {
                initial_backoff_ms: i64::MAX / 2,
                max_backoff_ms: i64::MAX,
                backoff_multiplier: 2.0,
            }
        );
        assert_eq!(
            retry_policy_for(&db, user_id, Channel::Sms).await.unwrap(),
            RetryPolicy::default()
        );
    }

    #[tokio::test]
    async fn routing_rejects_provider_of_other_channel() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let sms = provider(&db, user_id, "twilio", Channel::Sms).await;
        let email = provider(&db, user_id, "sendgrid", Channel::Email).await;

        let result =
            set_routing_config(&db, user_id, Channel::Sms, routing(sms.id, vec![email.id])).await;

        assert_eq!(
            result.unwrap_err(),
            Error::ProviderChannelMismatch {
                provider_id: email.id,
                provider_channel: Channel::Email,
                channel: Channel::Sms,
            }
        );
    }

    #[tokio::test]
    async fn routing_rejects_primary_listed_as_fallback() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let sms = provider(&db, user_id, "twilio", Channel::Sms).await;

        let result =
            set_routing_config(&db, user_id, Channel::Sms, routing(sms.id, vec![sms.id])).await;

        assert_eq!(
            result.unwrap_err(),
            Error::DuplicateRoutingProvider {
                provider_id: sms.id
            }
        );
    }

    #[tokio::test]
    async fn routing_rejects_unknown_provider() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let missing = ProviderId::new();

        let result = set_routing_config(&db, user_id, Channel::Sms, routing(missing, vec![])).await;

        assert_eq!(
            result.unwrap_err(),
            Error::ProviderNotFound {
                provider_id: missing
            }
        );
    }

    #[tokio::test]
    async fn resolve_route_skips_inactive_providers() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let primary = provider(&db, user_id, "twilio", Channel::Sms).await;
        let backup = provider(&db, user_id, "vonage", Channel::Sms).await;
        let last = provider(&db, user_id, "plivo", Channel::Sms).await;
        set_routing_config(
            &db,
            user_id,
            Channel::Sms,
            routing(primary.id, vec![backup.id, last.id]),
        )
        .await
        .unwrap();
        update_provider(
            &db,
            primary,
            ProviderUpdate {
                name: "twilio".into(),
                provider_type: "HTTP".into(),
                is_active: false,
            },
        )
        .await
        .unwrap();

        let route = resolve_route(&db, user_id, Channel::Sms).await.unwrap();

        let names: Vec<_> = route.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["vonage", "plivo"]);
    }

    #[tokio::test]
    async fn referenced_provider_cannot_be_deleted() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let primary = provider(&db, user_id, "twilio", Channel::Sms).await;
        let config = set_routing_config(&db, user_id, Channel::Sms, routing(primary.id, vec![]))
            .await
            .unwrap();

        let result = delete_provider(&db, primary.clone()).await;
        assert_eq!(
            result.unwrap_err(),
            Error::ProviderInUse {
                provider_id: primary.id,
                channel: Channel::Sms,
            }
        );

        delete_routing_config(&db, config).await.unwrap();
        delete_provider(&db, primary).await.unwrap();
        assert!(get_providers(&db, user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn routing_config_is_replaced_in_place() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let primary = provider(&db, user_id, "twilio", Channel::Sms).await;
        let backup = provider(&db, user_id, "vonage", Channel::Sms).await;
        let first = set_routing_config(&db, user_id, Channel::Sms, routing(primary.id, vec![]))
            .await
            .unwrap();

        let mut update = routing(backup.id, vec![primary.id]);
        update.retry_strategy = Some(RetryStrategy::Linear);
        update.max_retries = Some(5);
        let second = set_routing_config(&db, user_id, Channel::Sms, update)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.primary_provider_id, backup.id);
        assert_eq!(second.retry_strategy, RetryStrategy::Linear);
        assert_eq!(get_routing_configs(&db, user_id).await.unwrap().len(), 1);
    }
}

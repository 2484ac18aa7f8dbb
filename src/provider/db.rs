use async_trait::async_trait;
use mongodb::{bson, Database};

use crate::channel::Channel;
use crate::database::mongo::{
    create_indexes, find_sorted, replace_versioned, to_bson, MongoProviderStore,
    MongoRoutingStore,
};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{ChannelRoutingConfig, MessageProvider, ProviderId};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "message_providers",
        vec![bson::doc! {
            "key": { "user_id": 1, "name": 1 },
            "name": "by_name",
            "unique": true,
        }],
    )
    .await?;

    create_indexes(
        db,
        "channel_routing_configs",
        vec![bson::doc! {
            "key": { "user_id": 1, "channel": 1 },
            "name": "by_channel",
            "unique": true,
        }],
    )
    .await
}

#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn insert_provider(&self, provider: &MessageProvider) -> Result<(), Error>;

    async fn fetch_providers_by_user(&self, user_id: UserId)
        -> Result<Vec<MessageProvider>, Error>;

    async fn fetch_provider_by_id(
        &self,
        user_id: UserId,
        provider_id: ProviderId,
    ) -> Result<Option<MessageProvider>, Error>;

    async fn fetch_provider_by_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<Option<MessageProvider>, Error>;

    async fn update_provider(&self, provider: MessageProvider) -> Result<MessageProvider, Error>;

    async fn delete_provider(&self, user_id: UserId, provider_id: ProviderId)
        -> Result<(), Error>;

    async fn delete_providers_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl ProviderStore for MongoProviderStore {
    #[tracing::instrument(skip(self))]
    async fn insert_provider(&self, provider: &MessageProvider) -> Result<(), Error> {
        self.insert_one(provider, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_providers_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MessageProvider>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id },
            bson::doc! { "created_at": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_provider_by_id(
        &self,
        user_id: UserId,
        provider_id: ProviderId,
    ) -> Result<Option<MessageProvider>, Error> {
        let provider = self
            .find_one(bson::doc! { "_id": provider_id, "user_id": user_id }, None)
            .await?;

        Ok(provider)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_provider_by_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<Option<MessageProvider>, Error> {
        let provider = self
            .find_one(bson::doc! { "user_id": user_id, "name": name }, None)
            .await?;

        Ok(provider)
    }

    #[tracing::instrument(skip(self))]
    async fn update_provider(&self, provider: MessageProvider) -> Result<MessageProvider, Error> {
        replace_versioned(self, provider).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_provider(
        &self,
        user_id: UserId,
        provider_id: ProviderId,
    ) -> Result<(), Error> {
        self.delete_one(bson::doc! { "_id": provider_id, "user_id": user_id }, None)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_providers_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl ProviderStore for MemoryCollection<MessageProvider> {
    async fn insert_provider(&self, provider: &MessageProvider) -> Result<(), Error> {
        self.insert(provider);
        Ok(())
    }

    async fn fetch_providers_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MessageProvider>, Error> {
        let mut providers = self.find(|p| p.user_id == user_id);
        providers.sort_by_key(|p| p.created_at);
        Ok(providers)
    }

    async fn fetch_provider_by_id(
        &self,
        user_id: UserId,
        provider_id: ProviderId,
    ) -> Result<Option<MessageProvider>, Error> {
        Ok(self.find_one(|p| p.id == provider_id && p.user_id == user_id))
    }

    async fn fetch_provider_by_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<Option<MessageProvider>, Error> {
        Ok(self.find_one(|p| p.user_id == user_id && p.name == name))
    }

    async fn update_provider(&self, provider: MessageProvider) -> Result<MessageProvider, Error> {
        self.replace_versioned(provider)
    }

    async fn delete_provider(
        &self,
        user_id: UserId,
        provider_id: ProviderId,
    ) -> Result<(), Error> {
        self.delete_where(|p| p.id == provider_id && p.user_id == user_id);
        Ok(())
    }

    async fn delete_providers_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn insert_routing_config(&self, config: &ChannelRoutingConfig) -> Result<(), Error>;

    async fn fetch_routing_configs_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ChannelRoutingConfig>, Error>;

    async fn fetch_routing_config(
        &self,
        user_id: UserId,
        channel: Channel,
    ) -> Result<Option<ChannelRoutingConfig>, Error>;

    async fn update_routing_config(
        &self,
        config: ChannelRoutingConfig,
    ) -> Result<ChannelRoutingConfig, Error>;

    async fn delete_routing_config(&self, user_id: UserId, channel: Channel) -> Result<(), Error>;

    async fn delete_routing_configs_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl RoutingStore for MongoRoutingStore {
    #[tracing::instrument(skip(self))]
    async fn insert_routing_config(&self, config: &ChannelRoutingConfig) -> Result<(), Error> {
        self.insert_one(config, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_routing_configs_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ChannelRoutingConfig>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id },
            bson::doc! { "channel": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_routing_config(
        &self,
        user_id: UserId,
        channel: Channel,
    ) -> Result<Option<ChannelRoutingConfig>, Error> {
        let config = self
            .find_one(
                bson::doc! { "user_id": user_id, "channel": to_bson(&channel)? },
                None,
            )
            .await?;

        Ok(config)
    }

    #[tracing::instrument(skip(self))]
    async fn update_routing_config(
        &self,
        config: ChannelRoutingConfig,
    ) -> Result<ChannelRoutingConfig, Error> {
        replace_versioned(self, config).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_routing_config(&self, user_id: UserId, channel: Channel) -> Result<(), Error> {
        self.delete_one(
            bson::doc! { "user_id": user_id, "channel": to_bson(&channel)? },
            None,
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_routing_configs_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl RoutingStore for MemoryCollection<ChannelRoutingConfig> {
    async fn insert_routing_config(&self, config: &ChannelRoutingConfig) -> Result<(), Error> {
        self.insert(config);
        Ok(())
    }

    async fn fetch_routing_configs_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ChannelRoutingConfig>, Error> {
        let mut configs = self.find(|c| c.user_id == user_id);
        configs.sort_by_key(|c| c.channel.as_str());
        Ok(configs)
    }

    async fn fetch_routing_config(
        &self,
        user_id: UserId,
        channel: Channel,
    ) -> Result<Option<ChannelRoutingConfig>, Error> {
        Ok(self.find_one(|c| c.user_id == user_id && c.channel == channel))
    }

    async fn update_routing_config(
        &self,
        config: ChannelRoutingConfig,
    ) -> Result<ChannelRoutingConfig, Error> {
        self.replace_versioned(config)
    }

    async fn delete_routing_config(&self, user_id: UserId, channel: Channel) -> Result<(), Error> {
        self.delete_where(|c| c.user_id == user_id && c.channel == channel);
        Ok(())
    }

    async fn delete_routing_configs_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

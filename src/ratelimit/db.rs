use async_trait::async_trait;
use mongodb::{bson, Database};

use crate::database::mongo::{
    create_indexes, find_sorted, replace_versioned, to_bson, MongoRateLimitStore,
};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{RateLimit, RateLimitId, RateLimitSubject};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "rate_limits",
        vec![bson::doc! {
            "key": { "user_id": 1, "subject": 1 },
            "name": "by_subject",
            "unique": true,
        }],
    )
    .await
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn insert_rate_limit(&self, limit: &RateLimit) -> Result<(), Error>;

    async fn fetch_rate_limits_by_user(&self, user_id: UserId) -> Result<Vec<RateLimit>, Error>;

    async fn fetch_rate_limit_by_id(
        &self,
        user_id: UserId,
        rate_limit_id: RateLimitId,
    ) -> Result<Option<RateLimit>, Error>;

    async fn fetch_rate_limit_by_subject(
        &self,
        user_id: UserId,
        subject: &RateLimitSubject,
    ) -> Result<Option<RateLimit>, Error>;

    async fn update_rate_limit(&self, limit: RateLimit) -> Result<RateLimit, Error>;

    async fn delete_rate_limit(
        &self,
        user_id: UserId,
        rate_limit_id: RateLimitId,
    ) -> Result<(), Error>;

    async fn delete_rate_limits_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl RateLimitStore for MongoRateLimitStore {
    #[tracing::instrument(skip(self))]
    async fn insert_rate_limit(&self, limit: &RateLimit) -> Result<(), Error> {
        self.insert_one(limit, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_rate_limits_by_user(&self, user_id: UserId) -> Result<Vec<RateLimit>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id },
            bson::doc! { "created_at": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_rate_limit_by_id(
        &self,
        user_id: UserId,
        rate_limit_id: RateLimitId,
    ) -> Result<Option<RateLimit>, Error> {
        let limit = self
            .find_one(
                bson::doc! { "_id": rate_limit_id, "user_id": user_id },
                None,
            )
            .await?;

        Ok(limit)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_rate_limit_by_subject(
        &self,
        user_id: UserId,
        subject: &RateLimitSubject,
    ) -> Result<Option<RateLimit>, Error> {
        let limit = self
            .find_one(
                bson::doc! { "user_id": user_id, "subject": to_bson(subject)? },
                None,
            )
            .await?;

        Ok(limit)
    }

    #[tracing::instrument(skip(self))]
    async fn update_rate_limit(&self, limit: RateLimit) -> Result<RateLimit, Error> {
        replace_versioned(self, limit).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_rate_limit(
        &self,
        user_id: UserId,
        rate_limit_id: RateLimitId,
    ) -> Result<(), Error> {
        self.delete_one(
            bson::doc! { "_id": rate_limit_id, "user_id": user_id },
            None,
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_rate_limits_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl RateLimitStore for MemoryCollection<RateLimit> {
    async fn insert_rate_limit(&self, limit: &RateLimit) -> Result<(), Error> {
        self.insert(limit);
        Ok(())
    }

    async fn fetch_rate_limits_by_user(&self, user_id: UserId) -> Result<Vec<RateLimit>, Error> {
        let mut limits = self.find(|l| l.user_id == user_id);
        limits.sort_by_key(|l| l.created_at);
        Ok(limits)
    }

    async fn fetch_rate_limit_by_id(
        &self,
        user_id: UserId,
        rate_limit_id: RateLimitId,
    ) -> Result<Option<RateLimit>, Error> {
        Ok(self.find_one(|l| l.id == rate_limit_id && l.user_id == user_id))
    }

    async fn fetch_rate_limit_by_subject(
        &self,
        user_id: UserId,
        subject: &RateLimitSubject,
    ) -> Result<Option<RateLimit>, Error> {
        Ok(self.find_one(|l| l.user_id == user_id && &l.subject == subject))
    }

    async fn update_rate_limit(&self, limit: RateLimit) -> Result<RateLimit, Error> {
        self.replace_versioned(limit)
    }

    async fn delete_rate_limit(
        &self,
        user_id: UserId,
        rate_limit_id: RateLimitId,
    ) -> Result<(), Error> {
        self.delete_where(|l| l.id == rate_limit_id && l.user_id == user_id);
        Ok(())
    }

    async fn delete_rate_limits_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

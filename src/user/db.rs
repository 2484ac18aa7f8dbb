use async_trait::async_trait;
use mongodb::{bson, Database};

use crate::database::mongo::{create_indexes, MongoUserStore};
use crate::database::MemoryCollection;
use crate::error::Error;

use super::{User, UserId};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "users",
        vec![bson::doc! { "key": { "email": 1 }, "name": "by_email", "unique": true }],
    )
    .await
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), Error>;

    async fn fetch_user_by_id(&self, user_id: UserId) -> Result<Option<User>, Error>;

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    async fn delete_user(&self, user_id: UserId) -> Result<(), Error>;
}

#[async_trait]
impl UserStore for MongoUserStore {
    #[tracing::instrument(skip(self))]
    async fn insert_user(&self, user: &User) -> Result<(), Error> {
        self.insert_one(user, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_user_by_id(&self, user_id: UserId) -> Result<Option<User>, Error> {
        let user = self.find_one(bson::doc! { "_id": user_id }, None).await?;

        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let user = self.find_one(bson::doc! { "email": email }, None).await?;

        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_user(&self, user_id: UserId) -> Result<(), Error> {
        self.delete_one(bson::doc! { "_id": user_id }, None).await?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryCollection<User> {
    async fn insert_user(&self, user: &User) -> Result<(), Error> {
        self.insert(user);
        Ok(())
    }

    async fn fetch_user_by_id(&self, user_id: UserId) -> Result<Option<User>, Error> {
        Ok(self.get(&user_id.to_string()))
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self.find_one(|user| user.email == email))
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), Error> {
        self.delete_by_owner(user_id);
        Ok(())
    }
}

use async_trait::async_trait;
use mongodb::{bson, Database};

use crate::database::mongo::{create_indexes, find_sorted, replace_versioned, MongoKeywordStore};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{Keyword, KeywordId};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "keywords",
        vec![bson::doc! { "key": { "user_id": 1, "word": 1 }, "name": "by_word", "unique": true }],
    )
    .await
}

#[async_trait]
pub trait KeywordStore: Send + Sync {
    async fn insert_keyword(&self, keyword: &Keyword) -> Result<(), Error>;

    async fn fetch_keywords_by_user(&self, user_id: UserId) -> Result<Vec<Keyword>, Error>;

    async fn fetch_keyword_by_id(
        &self,
        user_id: UserId,
        keyword_id: KeywordId,
    ) -> Result<Option<Keyword>, Error>;

    async fn fetch_keyword_by_word(
        &self,
        user_id: UserId,
        word: &str,
    ) -> Result<Option<Keyword>, Error>;

    async fn update_keyword(&self, keyword: Keyword) -> Result<Keyword, Error>;

    async fn delete_keyword(&self, user_id: UserId, keyword_id: KeywordId) -> Result<(), Error>;

    async fn delete_keywords_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl KeywordStore for MongoKeywordStore {
    #[tracing::instrument(skip(self))]
    async fn insert_keyword(&self, keyword: &Keyword) -> Result<(), Error> {
        self.insert_one(keyword, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_keywords_by_user(&self, user_id: UserId) -> Result<Vec<Keyword>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id },
            bson::doc! { "word": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_keyword_by_id(
        &self,
        user_id: UserId,
        keyword_id: KeywordId,
    ) -> Result<Option<Keyword>, Error> {
        let keyword = self
            .find_one(bson::doc! { "_id": keyword_id, "user_id": user_id }, None)
            .await?;

        Ok(keyword)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_keyword_by_word(
        &self,
        user_id: UserId,
        word: &str,
    ) -> Result<Option<Keyword>, Error> {
        let keyword = self
            .find_one(bson::doc! { "user_id": user_id, "word": word }, None)
            .await?;

        Ok(keyword)
    }

    #[tracing::instrument(skip(self))]
    async fn update_keyword(&self, keyword: Keyword) -> Result<Keyword, Error> {
        replace_versioned(self, keyword).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_keyword(&self, user_id: UserId, keyword_id: KeywordId) -> Result<(), Error> {
        self.delete_one(bson::doc! { "_id": keyword_id, "user_id": user_id }, None)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_keywords_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl KeywordStore for MemoryCollection<Keyword> {
    async fn insert_keyword(&self, keyword: &Keyword) -> Result<(), Error> {
        self.insert(keyword);
        Ok(())
    }

    async fn fetch_keywords_by_user(&self, user_id: UserId) -> Result<Vec<Keyword>, Error> {
        let mut keywords = self.find(|k| k.user_id == user_id);
        keywords.sort_by(|a, b| a.word.cmp(&b.word));
        Ok(keywords)
    }

    async fn fetch_keyword_by_id(
        &self,
        user_id: UserId,
        keyword_id: KeywordId,
    ) -> Result<Option<Keyword>, Error> {
        Ok(self.find_one(|k| k.id == keyword_id && k.user_id == user_id))
    }

    async fn fetch_keyword_by_word(
        &self,
        user_id: UserId,
        word: &str,
    ) -> Result<Option<Keyword>, Error> {
        Ok(self.find_one(|k| k.user_id == user_id && k.word == word))
    }

    async fn update_keyword(&self, keyword: Keyword) -> Result<Keyword, Error> {
        self.replace_versioned(keyword)
    }

    async fn delete_keyword(&self, user_id: UserId, keyword_id: KeywordId) -> Result<(), Error> {
        self.delete_where(|k| k.id == keyword_id && k.user_id == user_id);
        Ok(())
    }

    async fn delete_keywords_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

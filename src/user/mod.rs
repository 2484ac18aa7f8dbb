use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::typedid::{TypedId, TypedIdMarker};

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type UserId = TypedId<User>;

/// The tenant. Every other record is owned by exactly one user.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub email: String,
    pub company_name: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for User {
    fn tag() -> &'static str {
        "USR"
    }
}

// a user owns itself
impl crate::database::Record for User {
    fn key(&self) -> String {
        self.id.to_string()
    }

    fn owner(&self) -> UserId {
        self.id
    }
}

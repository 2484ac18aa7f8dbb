use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::database::record;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;

pub mod db;
pub mod endpoints;
pub mod frequency;
pub mod manager;
pub use endpoints::*;
pub use frequency::{FrequencyCaps, FrequencyControl, FrequencyControlId, FrequencyPeriod};

pub type ContactId = TypedId<Contact>;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: ContactId,
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl Contact {
    /// The address a message on `channel` is delivered to, if the contact
    /// has one.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        if channel.uses_phone() {
            self.phone.as_deref()
        } else {
            self.email.as_deref()
        }
    }
}

impl TypedIdMarker for Contact {
    fn tag() -> &'static str {
        "CNT"
    }
}

record!(Contact, versioned);

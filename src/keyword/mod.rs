use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::record;
use crate::error::Error;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type KeywordId = TypedId<Keyword>;

/// Words that always unsubscribe the sender from SMS.
pub const STOP_WORDS: [&str; 6] = ["STOP", "STOPALL", "UNSUBSCRIBE", "CANCEL", "END", "QUIT"];

/// Words that always answer with the help reply.
pub const HELP_WORDS: [&str; 2] = ["HELP", "INFO"];

/// An inbound SMS trigger word and what it does.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Keyword {
    #[serde(rename = "_id")]
    pub id: KeywordId,
    pub user_id: UserId,
    pub word: String,
    pub action: KeywordAction,
    pub response_message: Option<String>,
    pub is_active: bool,
    pub match_count: u64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for Keyword {
    fn tag() -> &'static str {
        "KWD"
    }
}

record!(Keyword, versioned);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum KeywordAction {
    OptIn,
    OptOut,
    AutoReply,
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

pub fn is_help_word(word: &str) -> bool {
    HELP_WORDS.contains(&word)
}

/// Uppercases a keyword and checks it is a single alphanumeric word that
/// is not reserved.
pub fn normalize_word(word: &str) -> Result<String, Error> {
    let normalized = word.trim().to_uppercase();

    if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidKeyword {
            word: word.to_string(),
        });
    }

    if is_stop_word(&normalized) || is_help_word(&normalized) {
        return Err(Error::KeywordReserved { word: normalized });
    }

    Ok(normalized)
}

/// The first word of an inbound message, uppercased and stripped of
/// trailing punctuation.
pub fn first_word(body: &str) -> Option<String> {
    let word = body
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_uppercase();

    if word.is_empty() {
        None
    } else {
        Some(word)
    }
}

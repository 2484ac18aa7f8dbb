use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::normalize_phone;
use crate::channel::Channel;
use crate::consent::{self, ConsentSource};
use crate::contact::{self, Contact, ContactId};
use crate::database::Database;
use crate::error::Error;
use crate::suppression::manager::NewSuppression;
use crate::suppression::{self, SuppressionReason};
use crate::user::UserId;

use super::{first_word, is_help_word, is_stop_word, normalize_word, Keyword, KeywordAction, KeywordId};

const MATCH_ATTEMPTS: u32 = 3;

const DEFAULT_OPT_OUT_REPLY: &str =
    "You have been unsubscribed and will not receive further messages.";
const DEFAULT_OPT_IN_REPLY: &str = "You are now subscribed. Reply STOP to unsubscribe.";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewKeyword {
    pub word: String,
    pub action: KeywordAction,
    #[serde(default)]
    pub response_message: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeywordUpdate {
    pub word: String,
    pub action: KeywordAction,
    #[serde(default)]
    pub response_message: Option<String>,
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

async fn ensure_word_available(
    db: &dyn Database,
    user_id: UserId,
    word: &str,
    keyword_id: Option<KeywordId>,
) -> Result<(), Error> {
    let existing = db.keywords().fetch_keyword_by_word(user_id, word).await?;

    match existing {
        Some(existing) if Some(existing.id) != keyword_id => Err(Error::KeywordAlreadyExists {
            word: word.to_string(),
            keyword_id: existing.id,
        }),
        _ => Ok(()),
    }
}

#[tracing::instrument(skip(db))]
pub async fn create_keyword(
    db: &dyn Database,
    user_id: UserId,
    new_keyword: NewKeyword,
) -> Result<Keyword, Error> {
    let word = normalize_word(&new_keyword.word)?;
    ensure_word_available(db, user_id, &word, None).await?;

    let now = Utc::now();
    let keyword = Keyword {
        id: KeywordId::new(),
        user_id,
        word,
        action: new_keyword.action,
        response_message: new_keyword.response_message,
        is_active: new_keyword.is_active,
        match_count: 0,
        created_at: now,
        modified_at: now,
    };

    db.keywords().insert_keyword(&keyword).await?;

    Ok(keyword)
}

#[tracing::instrument(skip(db))]
pub async fn get_keywords(db: &dyn Database, user_id: UserId) -> Result<Vec<Keyword>, Error> {
    let keywords = db.keywords().fetch_keywords_by_user(user_id).await?;

    Ok(keywords)
}

#[tracing::instrument(skip(db))]
pub async fn get_keyword_by_id(
    db: &dyn Database,
    user_id: UserId,
    keyword_id: KeywordId,
) -> Result<Keyword, Error> {
    let keyword = db
        .keywords()
        .fetch_keyword_by_id(user_id, keyword_id)
        .await?
        .ok_or(Error::KeywordNotFound { keyword_id })?;

    Ok(keyword)
}

#[tracing::instrument(skip(db))]
pub async fn update_keyword(
    db: &dyn Database,
    mut keyword: Keyword,
    update: KeywordUpdate,
) -> Result<Keyword, Error> {
    let word = normalize_word(&update.word)?;
    ensure_word_available(db, keyword.user_id, &word, Some(keyword.id)).await?;

    keyword.word = word;
    keyword.action = update.action;
    keyword.response_message = update.response_message;
    keyword.is_active = update.is_active;

    db.keywords().update_keyword(keyword).await
}

#[tracing::instrument(skip(db))]
pub async fn delete_keyword(db: &dyn Database, keyword: Keyword) -> Result<(), Error> {
    db.keywords()
        .delete_keyword(keyword.user_id, keyword.id)
        .await
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum InboundAction {
    OptIn,
    OptOut,
    Help,
    AutoReply,
}

/// What an inbound message triggered and the text to answer with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundReply {
    pub word: Option<String>,
    pub action: Option<InboundAction>,
    pub contact_id: Option<ContactId>,
    pub reply: Option<String>,
}

/// Handles an inbound SMS from `from`.
///
/// The reserved stop and help words always apply. Otherwise the first word
/// is looked up among the tenant's active keywords and its action is
/// carried out. Messages that match nothing get no reply.
#[tracing::instrument(skip(db))]
pub async fn handle_inbound(
    db: &dyn Database,
    user_id: UserId,
    inbound: InboundMessage,
) -> Result<InboundReply, Error> {
    let phone = normalize_phone(&inbound.from)?;
    let word = match first_word(&inbound.body) {
        Some(word) => word,
        None => {
            return Ok(InboundReply {
                word: None,
                action: None,
                contact_id: None,
                reply: None,
            })
        }
    };

    if is_stop_word(&word) {
        let contact = opt_out(db, user_id, &phone).await?;
        info!("{} opted out with {}", phone, word);

        return Ok(InboundReply {
            word: Some(word),
            action: Some(InboundAction::OptOut),
            contact_id: contact.map(|c| c.id),
            reply: Some(DEFAULT_OPT_OUT_REPLY.to_string()),
        });
    }

    if is_help_word(&word) {
        let contact = db.contacts().fetch_contact_by_phone(user_id, &phone).await?;

        return Ok(InboundReply {
            word: Some(word),
            action: Some(InboundAction::Help),
            contact_id: contact.map(|c| c.id),
            reply: Some(help_reply(db, user_id).await?),
        });
    }

    let keyword = match db.keywords().fetch_keyword_by_word(user_id, &word).await? {
        Some(keyword) if keyword.is_active => keyword,
        _ => {
            return Ok(InboundReply {
                word: Some(word),
                action: None,
                contact_id: None,
                reply: None,
            })
        }
    };

    let keyword = count_match(db, keyword).await?;

    let (action, contact, default_reply) = match keyword.action {
        KeywordAction::OptIn => {
            let contact = opt_in(db, user_id, &phone).await?;
            (InboundAction::OptIn, Some(contact), Some(DEFAULT_OPT_IN_REPLY))
        }
        KeywordAction::OptOut => {
            let contact = opt_out(db, user_id, &phone).await?;
            (InboundAction::OptOut, contact, Some(DEFAULT_OPT_OUT_REPLY))
        }
        KeywordAction::AutoReply => {
            let contact = db.contacts().fetch_contact_by_phone(user_id, &phone).await?;
            (InboundAction::AutoReply, contact, None)
        }
    };

    let reply = keyword
        .response_message
        .clone()
        .or_else(|| default_reply.map(str::to_string));

    Ok(InboundReply {
        word: Some(keyword.word),
        action: Some(action),
        contact_id: contact.map(|c| c.id),
        reply,
    })
}

async fn count_match(db: &dyn Database, keyword: Keyword) -> Result<Keyword, Error> {
    let mut attempt = 0;
    let mut keyword = keyword;
    loop {
        attempt += 1;
        keyword.match_count += 1;

        match db.keywords().update_keyword(keyword.clone()).await {
            Ok(updated) => return Ok(updated),
            Err(Error::ConcurrentModificationDetected) if attempt < MATCH_ATTEMPTS => {
                warn!("keyword {} changed while counting a match, retrying", keyword.id);
                keyword = get_keyword_by_id(db, keyword.user_id, keyword.id).await?;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn help_reply(db: &dyn Database, user_id: UserId) -> Result<String, Error> {
    let user = db.users().fetch_user_by_id(user_id).await?;
    let sender = user
        .and_then(|u| u.company_name)
        .unwrap_or_else(|| "This number".to_string());

    Ok(format!(
        "{}: reply STOP to unsubscribe. Msg & data rates may apply.",
        sender
    ))
}

/// Grants SMS consent to the sender, creating a contact for an unknown
/// number, and lifts the sender's SMS opt-out.
async fn opt_in(db: &dyn Database, user_id: UserId, phone: &str) -> Result<Contact, Error> {
    let contact = match db.contacts().fetch_contact_by_phone(user_id, phone).await? {
        Some(contact) => contact,
        None => {
            let new_contact = contact::manager::NewContact {
                first_name: String::new(),
                last_name: String::new(),
                phone: Some(phone.to_string()),
                email: None,
                tags: vec![],
            };
            contact::manager::create_contact(db, user_id, new_contact).await?
        }
    };

    consent::manager::grant_consent(
        db,
        &contact,
        Channel::Sms,
        ConsentSource::Keyword,
        None,
    )
    .await?;
    suppression::manager::lift_suppressions(
        db,
        user_id,
        phone,
        Channel::Sms,
        SuppressionReason::OptOut,
    )
    .await?;

    Ok(contact)
}

/// Revokes the sender's SMS consent, if the sender is a known contact, and
/// puts the number on the SMS suppression list.
async fn opt_out(db: &dyn Database, user_id: UserId, phone: &str) -> Result<Option<Contact>, Error> {
    let contact = db.contacts().fetch_contact_by_phone(user_id, phone).await?;

    if let Some(contact) = &contact {
        consent::manager::revoke_consent(
            db,
            contact,
            Channel::Sms,
            ConsentSource::Keyword,
            None,
        )
        .await?;
    }

    let active =
        suppression::manager::find_active_suppression(db, user_id, phone, Channel::Sms, Utc::now())
            .await?;
    if active.is_none() {
        let new_suppression = NewSuppression {
            address: phone.to_string(),
            channel: Some(Channel::Sms),
            contact_id: contact.as_ref().map(|c| c.id),
            reason: SuppressionReason::OptOut,
            note: Some("inbound keyword".to_string()),
            expires_at: None,
        };
        suppression::manager::add_suppression(db, user_id, new_suppression).await?;
    }

    Ok(contact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use crate::user::manager::register_user;

    fn inbound(body: &str) -> InboundMessage {
        InboundMessage {
            from: "+1 (555) 010-0000".into(),
            body: body.into(),
        }
    }

    fn keyword(word: &str, action: KeywordAction) -> NewKeyword {
        NewKeyword {
            word: word.into(),
            action,
            response_message: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn keywords_are_unique_per_tenant() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let first = create_keyword(&db, user_id, keyword("join", KeywordAction::OptIn))
            .await
            .unwrap();

        let result = create_keyword(&db, user_id, keyword("JOIN", KeywordAction::AutoReply)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::KeywordAlreadyExists {
                word: "JOIN".into(),
                keyword_id: first.id,
            }
        );
    }

    #[tokio::test]
    async fn opt_in_keyword_creates_contact_with_consent() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        create_keyword(&db, user_id, keyword("join", KeywordAction::OptIn))
            .await
            .unwrap();

        let reply = handle_inbound(&db, user_id, inbound("Join now")).await.unwrap();

        assert_eq!(reply.action, Some(InboundAction::OptIn));
        assert_eq!(reply.reply.as_deref(), Some(DEFAULT_OPT_IN_REPLY));
        let contact = db
            .contacts()
            .fetch_contact_by_phone(user_id, "+15550100000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.contact_id, Some(contact.id));
        let consent = consent::manager::get_latest_consent(&db, user_id, contact.id, Channel::Sms)
            .await
            .unwrap();
        assert!(consent::manager::is_granted(consent.as_ref()));

        let keywords = get_keywords(&db, user_id).await.unwrap();
        assert_eq!(keywords[0].match_count, 1);
    }

    #[tokio::test]
    async fn stop_suppresses_and_opt_in_lifts() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        create_keyword(&db, user_id, keyword("start", KeywordAction::OptIn))
            .await
            .unwrap();
        handle_inbound(&db, user_id, inbound("START")).await.unwrap();

        let reply = handle_inbound(&db, user_id, inbound("stop")).await.unwrap();
        assert_eq!(reply.action, Some(InboundAction::OptOut));
        assert!(suppression::manager::is_suppressed(
            &db,
            user_id,
            "+15550100000",
            Channel::Sms,
            Utc::now()
        )
        .await
        .unwrap());

        handle_inbound(&db, user_id, inbound("stop")).await.unwrap();
        let entries = suppression::manager::get_suppressions(&db, user_id).await.unwrap();
        assert_eq!(entries.len(), 1);

        handle_inbound(&db, user_id, inbound("start")).await.unwrap();
        assert!(!suppression::manager::is_suppressed(
            &db,
            user_id,
            "+15550100000",
            Channel::Sms,
            Utc::now()
        )
        .await
        .unwrap());
    }

    #[tokio::test]
    async fn help_names_the_sender() {
        let db = MemoryDatabase::new();
        let user = register_user(&db, "owner@acme.io".into(), Some("Acme".into()))
            .await
            .unwrap();

        let reply = handle_inbound(&db, user.id, inbound("help")).await.unwrap();

        assert_eq!(reply.action, Some(InboundAction::Help));
        assert!(reply.reply.unwrap().starts_with("Acme:"));
    }

    #[tokio::test]
    async fn inactive_or_unknown_keywords_do_nothing() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let mut auto = keyword("hours", KeywordAction::AutoReply);
        auto.response_message = Some("9 to 5".into());
        auto.is_active = false;
        create_keyword(&db, user_id, auto).await.unwrap();

        let inactive = handle_inbound(&db, user_id, inbound("hours?")).await.unwrap();
        let unknown = handle_inbound(&db, user_id, inbound("hello")).await.unwrap();

        assert_eq!(inactive.action, None);
        assert_eq!(inactive.reply, None);
        assert_eq!(unknown.word.as_deref(), Some("HELLO"));
        assert_eq!(unknown.action, None);
    }

    #[tokio::test]
    async fn auto_reply_answers_with_response_message() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let mut auto = keyword("hours", KeywordAction::AutoReply);
        auto.response_message = Some("9 to 5".into());
        create_keyword(&db, user_id, auto).await.unwrap();

        let reply = handle_inbound(&db, user_id, inbound("HOURS")).await.unwrap();

        assert_eq!(reply.action, Some(InboundAction::AutoReply));
        assert_eq!(reply.reply.as_deref(), Some("9 to 5"));
    }
}

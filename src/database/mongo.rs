use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document};
use mongodb::error::{Error as DatabaseError, ErrorKind, WriteError, WriteFailure};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database as MongoDb};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::analytics::db::{AnalyticsStore, MongoAnalyticsStore};
use crate::campaign::db::CampaignStore;
use crate::campaign::Campaign;
use crate::compliance::db::{AuditLogStore, ComplianceRuleStore, RuleAuditStore};
use crate::compliance::{ComplianceAuditLog, ComplianceRule, ComplianceRuleAudit};
use crate::consent::db::{ConsentHistoryStore, ConsentStore};
use crate::consent::{ConsentHistory, ContactConsent};
use crate::contact::db::{ContactStore, FrequencyStore};
use crate::contact::{Contact, FrequencyControl};
use crate::error::Error;
use crate::keyword::db::KeywordStore;
use crate::keyword::Keyword;
use crate::message::db::{AttemptStore, MessageStore};
use crate::message::{CampaignMessage, DeliveryAttempt};
use crate::provider::db::{ProviderStore, RoutingStore};
use crate::provider::{ChannelRoutingConfig, MessageProvider};
use crate::ratelimit::db::RateLimitStore;
use crate::ratelimit::RateLimit;
use crate::suppression::db::SuppressionStore;
use crate::suppression::SuppressionEntry;
use crate::user::db::UserStore;
use crate::user::User;
use crate::variant::db::VariantStore;
use crate::variant::CampaignVariant;

use super::{Database, Versioned};

pub type MongoUserStore = Collection<User>;
pub type MongoCampaignStore = Collection<Campaign>;
pub type MongoVariantStore = Collection<CampaignVariant>;
pub type MongoMessageStore = Collection<CampaignMessage>;
pub type MongoAttemptStore = Collection<DeliveryAttempt>;
pub type MongoContactStore = Collection<Contact>;
pub type MongoFrequencyStore = Collection<FrequencyControl>;
pub type MongoConsentStore = Collection<ContactConsent>;
pub type MongoConsentHistoryStore = Collection<ConsentHistory>;
pub type MongoSuppressionStore = Collection<SuppressionEntry>;
pub type MongoComplianceRuleStore = Collection<ComplianceRule>;
pub type MongoRuleAuditStore = Collection<ComplianceRuleAudit>;
pub type MongoAuditLogStore = Collection<ComplianceAuditLog>;
pub type MongoProviderStore = Collection<MessageProvider>;
pub type MongoRoutingStore = Collection<ChannelRoutingConfig>;
pub type MongoRateLimitStore = Collection<RateLimit>;
pub type MongoKeywordStore = Collection<Keyword>;

#[derive(Debug, Clone)]
pub struct MongoDatabase {
    users: MongoUserStore,
    campaigns: MongoCampaignStore,
    variants: MongoVariantStore,
    analytics: MongoAnalyticsStore,
    messages: MongoMessageStore,
    attempts: MongoAttemptStore,
    contacts: MongoContactStore,
    frequencies: MongoFrequencyStore,
    consents: MongoConsentStore,
    consent_history: MongoConsentHistoryStore,
    suppressions: MongoSuppressionStore,
    compliance_rules: MongoComplianceRuleStore,
    rule_audits: MongoRuleAuditStore,
    audit_log: MongoAuditLogStore,
    providers: MongoProviderStore,
    routing: MongoRoutingStore,
    rate_limits: MongoRateLimitStore,
    keywords: MongoKeywordStore,
    db: MongoDb,
}

impl MongoDatabase {
    pub fn new(db: MongoDb) -> MongoDatabase {
        MongoDatabase {
            users: db.collection("users"),
            campaigns: db.collection("campaigns"),
            variants: db.collection("campaign_variants"),
            analytics: MongoAnalyticsStore {
                campaigns: db.collection("campaign_analytics"),
                variants: db.collection("campaign_variant_analytics"),
            },
            messages: db.collection("campaign_messages"),
            attempts: db.collection("message_delivery_attempts"),
            contacts: db.collection("contacts"),
            frequencies: db.collection("frequency_controls"),
            consents: db.collection("contact_consents"),
            consent_history: db.collection("consent_history"),
            suppressions: db.collection("suppression_list"),
            compliance_rules: db.collection("compliance_rules"),
            rule_audits: db.collection("compliance_rule_audits"),
            audit_log: db.collection("compliance_audit_log"),
            providers: db.collection("message_providers"),
            routing: db.collection("channel_routing_configs"),
            rate_limits: db.collection("rate_limits"),
            keywords: db.collection("keywords"),
            db,
        }
    }

    pub async fn initialize(db: MongoDb) -> Result<MongoDatabase, Error> {
        crate::user::db::initialize(&db).await?;
        crate::campaign::db::initialize(&db).await?;
        crate::variant::db::initialize(&db).await?;
        crate::message::db::initialize(&db).await?;
        crate::contact::db::initialize(&db).await?;
        crate::consent::db::initialize(&db).await?;
        crate::suppression::db::initialize(&db).await?;
        crate::compliance::db::initialize(&db).await?;
        crate::provider::db::initialize(&db).await?;
        crate::ratelimit::db::initialize(&db).await?;
        crate::keyword::db::initialize(&db).await?;

        Ok(MongoDatabase::new(db))
    }
}

#[async_trait]
impl Database for MongoDatabase {
    fn users(&self) -> &dyn UserStore {
        &self.users
    }

    fn campaigns(&self) -> &dyn CampaignStore {
        &self.campaigns
    }

    fn variants(&self) -> &dyn VariantStore {
        &self.variants
    }

    fn analytics(&self) -> &dyn AnalyticsStore {
        &self.analytics
    }

    fn messages(&self) -> &dyn MessageStore {
        &self.messages
    }

    fn attempts(&self) -> &dyn AttemptStore {
        &self.attempts
    }

    fn contacts(&self) -> &dyn ContactStore {
        &self.contacts
    }

    fn frequencies(&self) -> &dyn FrequencyStore {
        &self.frequencies
    }

    fn consents(&self) -> &dyn ConsentStore {
        &self.consents
    }

    fn consent_history(&self) -> &dyn ConsentHistoryStore {
        &self.consent_history
    }

    fn suppressions(&self) -> &dyn SuppressionStore {
        &self.suppressions
    }

    fn compliance_rules(&self) -> &dyn ComplianceRuleStore {
        &self.compliance_rules
    }

    fn rule_audits(&self) -> &dyn RuleAuditStore {
        &self.rule_audits
    }

    fn audit_log(&self) -> &dyn AuditLogStore {
        &self.audit_log
    }

    fn providers(&self) -> &dyn ProviderStore {
        &self.providers
    }

    fn routing(&self) -> &dyn RoutingStore {
        &self.routing
    }

    fn rate_limits(&self) -> &dyn RateLimitStore {
        &self.rate_limits
    }

    fn keywords(&self) -> &dyn KeywordStore {
        &self.keywords
    }

    async fn drop(&self) -> Result<(), Error> {
        self.db.drop(None).await?;
        Ok(())
    }
}

pub async fn create_indexes(
    db: &MongoDb,
    collection: &str,
    indexes: Vec<Document>,
) -> Result<(), Error> {
    db.run_command(
        bson::doc! {
            "createIndexes": collection,
            "indexes": indexes,
        },
        None,
    )
    .await?;

    Ok(())
}

pub async fn find_sorted<T>(
    collection: &Collection<T>,
    filter: Document,
    sort: Document,
) -> Result<Vec<T>, Error>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = FindOptions::builder().sort(sort).build();
    let records = collection
        .find(filter, options)
        .await?
        .try_collect()
        .await?;

    Ok(records)
}

/// Replaces `record` only if the stored copy still has the `modified_at`
/// the caller read; bumps `modified_at` on success.
pub async fn replace_versioned<T>(collection: &Collection<T>, mut record: T) -> Result<T, Error>
where
    T: Versioned + Serialize,
{
    let now = Utc::now();
    let old_modified_at = bson::DateTime::from_chrono(record.modified_at());
    record.set_modified_at(now);

    let result = collection
        .replace_one(
            bson::doc! { "_id": record.key(), "modified_at": old_modified_at },
            &record,
            None,
        )
        .await?;

    if result.matched_count == 0 {
        return Err(Error::ConcurrentModificationDetected);
    }

    Ok(record)
}

/// Inserts `record`, reporting a unique index violation as a lost race.
pub async fn insert_unique<T>(collection: &Collection<T>, record: &T) -> Result<(), Error>
where
    T: Serialize,
{
    match collection.insert_one(record, None).await {
        Ok(_) => Ok(()),
        Err(err) if is_duplicate_key(&err) => Err(Error::ConcurrentModificationDetected),
        Err(err) => Err(err.into()),
    }
}

fn is_duplicate_key(err: &DatabaseError) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(WriteError { code: 11000, .. }))
    )
}

pub fn to_bson<T: Serialize>(value: &T) -> Result<Bson, Error> {
    Ok(bson::to_bson(value)?)
}

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::analytics::db::{AnalyticsStore, MemoryAnalyticsStore};
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
use crate::user::{User, UserId};
use crate::variant::db::VariantStore;
use crate::variant::CampaignVariant;

use super::{Database, Record, Versioned};

/// A process-local table of records keyed by their `_id`.
#[derive(Debug)]
pub struct MemoryCollection<T> {
    records: DashMap<String, T>,
    unique_inserts: Mutex<()>,
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> MemoryCollection<T> {
        MemoryCollection {
            records: DashMap::new(),
            unique_inserts: Mutex::new(()),
        }
    }
}

impl<T: Record> MemoryCollection<T> {
    pub fn new() -> MemoryCollection<T> {
        MemoryCollection::default()
    }

    pub fn insert(&self, record: &T) {
        self.records.insert(record.key(), record.clone());
    }

    /// Inserts `record` unless a stored record `conflicts` with it, which
    /// reads as a lost race like a unique index violation would.
    pub fn insert_unique<F>(&self, record: &T, conflicts: F) -> Result<(), Error>
    where
        F: Fn(&T) -> bool,
    {
        let _guard = self
            .unique_inserts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.find_one(conflicts).is_some() {
            return Err(Error::ConcurrentModificationDetected);
        }

        self.insert(record);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    pub fn find<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn find_one<F>(&self, predicate: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        self.records
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }

    /// Applies `update` to the record stored under `key`, inserting
    /// `default()` first if it is missing.
    pub fn upsert_with<D, F>(&self, key: String, default: D, update: F) -> T
    where
        D: FnOnce() -> T,
        F: FnOnce(&mut T),
    {
        let mut entry = self.records.entry(key).or_insert_with(default);
        update(entry.value_mut());
        entry.value().clone()
    }

    pub fn delete_where<F>(&self, predicate: F) -> u64
    where
        F: Fn(&T) -> bool,
    {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let matched = predicate(record);
            if matched {
                removed += 1;
            }
            !matched
        });
        removed
    }

    pub fn delete_by_owner(&self, user_id: UserId) -> u64 {
        self.delete_where(|record| record.owner() == user_id)
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

impl<T: Versioned> MemoryCollection<T> {
    pub fn replace_versioned(&self, mut record: T) -> Result<T, Error> {
        let mut entry = self
            .records
            .get_mut(&record.key())
            .ok_or(Error::ConcurrentModificationDetected)?;

        if entry.modified_at() != record.modified_at() {
            return Err(Error::ConcurrentModificationDetected);
        }

        record.set_modified_at(Utc::now());
        *entry = record.clone();

        Ok(record)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    users: MemoryCollection<User>,
    campaigns: MemoryCollection<Campaign>,
    variants: MemoryCollection<CampaignVariant>,
    analytics: MemoryAnalyticsStore,
    messages: MemoryCollection<CampaignMessage>,
    attempts: MemoryCollection<DeliveryAttempt>,
    contacts: MemoryCollection<Contact>,
    frequencies: MemoryCollection<FrequencyControl>,
    consents: MemoryCollection<ContactConsent>,
    consent_history: MemoryCollection<ConsentHistory>,
    suppressions: MemoryCollection<SuppressionEntry>,
    compliance_rules: MemoryCollection<ComplianceRule>,
    rule_audits: MemoryCollection<ComplianceRuleAudit>,
    audit_log: MemoryCollection<ComplianceAuditLog>,
    providers: MemoryCollection<MessageProvider>,
    routing: MemoryCollection<ChannelRoutingConfig>,
    rate_limits: MemoryCollection<RateLimit>,
    keywords: MemoryCollection<Keyword>,
}

impl MemoryDatabase {
    pub fn new() -> MemoryDatabase {
        MemoryDatabase::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
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
        self.users.clear();
        self.campaigns.clear();
        self.variants.clear();
        self.analytics.clear();
        self.messages.clear();
        self.attempts.clear();
        self.contacts.clear();
        self.frequencies.clear();
        self.consents.clear();
        self.consent_history.clear();
        self.suppressions.clear();
        self.compliance_rules.clear();
        self.rule_audits.clear();
        self.audit_log.clear();
        self.providers.clear();
        self.routing.clear();
        self.rate_limits.clear();
        self.keywords.clear();
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analytics::db::AnalyticsStore;
use crate::campaign::db::CampaignStore;
use crate::compliance::db::{AuditLogStore, ComplianceRuleStore, RuleAuditStore};
use crate::consent::db::{ConsentHistoryStore, ConsentStore};
use crate::contact::db::{ContactStore, FrequencyStore};
use crate::error::Error;
use crate::keyword::db::KeywordStore;
use crate::message::db::{AttemptStore, MessageStore};
use crate::provider::db::{ProviderStore, RoutingStore};
use crate::ratelimit::db::RateLimitStore;
use crate::suppression::db::SuppressionStore;
use crate::user::db::UserStore;
use crate::user::UserId;
use crate::variant::db::VariantStore;

pub mod memory;
pub mod mongo;

pub use memory::{MemoryCollection, MemoryDatabase};
pub use mongo::MongoDatabase;

#[async_trait]
pub trait Database: Send + Sync {
    fn users(&self) -> &dyn UserStore;
    fn campaigns(&self) -> &dyn CampaignStore;
    fn variants(&self) -> &dyn VariantStore;
    fn analytics(&self) -> &dyn AnalyticsStore;
    fn messages(&self) -> &dyn MessageStore;
    fn attempts(&self) -> &dyn AttemptStore;
    fn contacts(&self) -> &dyn ContactStore;
    fn frequencies(&self) -> &dyn FrequencyStore;
    fn consents(&self) -> &dyn ConsentStore;
    fn consent_history(&self) -> &dyn ConsentHistoryStore;
    fn suppressions(&self) -> &dyn SuppressionStore;
    fn compliance_rules(&self) -> &dyn ComplianceRuleStore;
    fn rule_audits(&self) -> &dyn RuleAuditStore;
    fn audit_log(&self) -> &dyn AuditLogStore;
    fn providers(&self) -> &dyn ProviderStore;
    fn routing(&self) -> &dyn RoutingStore;
    fn rate_limits(&self) -> &dyn RateLimitStore;
    fn keywords(&self) -> &dyn KeywordStore;

    async fn drop(&self) -> Result<(), Error>;
}

/// A stored row: keyed by its `_id` and owned by a tenant.
pub trait Record: Clone + Send + Sync + 'static {
    fn key(&self) -> String;
    fn owner(&self) -> UserId;
}

/// A row updated in place, guarded by its `modified_at` stamp.
pub trait Versioned: Record {
    fn modified_at(&self) -> DateTime<Utc>;
    fn set_modified_at(&mut self, modified_at: DateTime<Utc>);
}

macro_rules! record {
    ($ty:ty) => {
        impl $crate::database::Record for $ty {
            fn key(&self) -> String {
                self.id.to_string()
            }

            fn owner(&self) -> $crate::user::UserId {
                self.user_id
            }
        }
    };
    ($ty:ty, versioned) => {
        $crate::database::record!($ty);

        impl $crate::database::Versioned for $ty {
            fn modified_at(&self) -> chrono::DateTime<chrono::Utc> {
                self.modified_at
            }

            fn set_modified_at(&mut self, modified_at: chrono::DateTime<chrono::Utc>) {
                self.modified_at = modified_at;
            }
        }
    };
}

pub(crate) use record;

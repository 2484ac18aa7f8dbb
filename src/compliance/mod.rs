use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::campaign::CampaignId;
use crate::channel::Channel;
use crate::contact::ContactId;
use crate::database::record;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;
use crate::violations::Violation;

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type ComplianceRuleId = TypedId<ComplianceRule>;
pub type ComplianceRuleAuditId = TypedId<ComplianceRuleAudit>;
pub type ComplianceAuditLogId = TypedId<ComplianceAuditLog>;

/// Tenant policy configuration. The service stores and versions rules but
/// does not evaluate them.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ComplianceRule {
    #[serde(rename = "_id")]
    pub id: ComplianceRuleId,
    pub user_id: UserId,
    pub name: String,
    pub rule_type: String,
    pub config: Value,
    pub is_active: bool,
    pub version: u32,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl ComplianceRule {
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "rule_type": self.rule_type,
            "config": self.config,
            "is_active": self.is_active,
            "version": self.version,
        })
    }
}

impl TypedIdMarker for ComplianceRule {
    fn tag() -> &'static str {
        "CRL"
    }
}

record!(ComplianceRule, versioned);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum RuleAuditAction {
    Created,
    Updated,
    Activated,
    Deactivated,
    Deleted,
}

/// One change to a compliance rule with the state before and after it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ComplianceRuleAudit {
    #[serde(rename = "_id")]
    pub id: ComplianceRuleAuditId,
    pub user_id: UserId,
    pub rule_id: ComplianceRuleId,
    pub version: u32,
    pub action: RuleAuditAction,
    pub before: Option<Value>,
    pub after: Option<Value>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub changed_at: DateTime<Utc>,
}

impl TypedIdMarker for ComplianceRuleAudit {
    fn tag() -> &'static str {
        "CRA"
    }
}

record!(ComplianceRuleAudit);

/// The outcome of one eligibility evaluation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ComplianceAuditLog {
    #[serde(rename = "_id")]
    pub id: ComplianceAuditLogId,
    pub user_id: UserId,
    pub contact_id: ContactId,
    pub campaign_id: Option<CampaignId>,
    pub channel: Channel,
    pub eligible: bool,
    pub violations: Vec<Violation>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub occurred_at: DateTime<Utc>,
}

impl TypedIdMarker for ComplianceAuditLog {
    fn tag() -> &'static str {
        "CAL"
    }
}

record!(ComplianceAuditLog);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Eligibility {
    pub contact_id: ContactId,
    pub channel: Channel,
    pub address: Option<String>,
    pub violations: Vec<Violation>,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        self.violations.is_empty()
    }
}

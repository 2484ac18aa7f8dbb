use actix_web::web::{Data, Json, Path, Query};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Tenant;
use crate::campaign::CampaignId;
use crate::channel::Channel;
use crate::contact::{self, ContactId};
use crate::database::Database;
use crate::error::Error;
use crate::violations::Violation;

use super::manager::{self, ComplianceRuleUpdate, NewComplianceRule};
use super::{
    ComplianceAuditLog, ComplianceRule, ComplianceRuleAudit, ComplianceRuleId, Eligibility,
    RuleAuditAction,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceRuleBody {
    pub id: ComplianceRuleId,
    pub name: String,
    pub rule_type: String,
    pub config: Value,
    pub is_active: bool,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ComplianceRuleBody {
    pub fn render(rule: ComplianceRule) -> ComplianceRuleBody {
        ComplianceRuleBody {
            id: rule.id,
            name: rule.name,
            rule_type: rule.rule_type,
            config: rule.config,
            is_active: rule.is_active,
            version: rule.version,
            created_at: rule.created_at,
            modified_at: rule.modified_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceRuleAuditBody {
    pub version: u32,
    pub action: RuleAuditAction,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub changed_at: DateTime<Utc>,
}

impl ComplianceRuleAuditBody {
    pub fn render(audit: ComplianceRuleAudit) -> ComplianceRuleAuditBody {
        ComplianceRuleAuditBody {
            version: audit.version,
            action: audit.action,
            before: audit.before,
            after: audit.after,
            changed_at: audit.changed_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLogBody {
    pub contact_id: ContactId,
    pub campaign_id: Option<CampaignId>,
    pub channel: Channel,
    pub eligible: bool,
    pub violations: Vec<Violation>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditLogBody {
    pub fn render(entry: ComplianceAuditLog) -> AuditLogBody {
        AuditLogBody {
            contact_id: entry.contact_id,
            campaign_id: entry.campaign_id,
            channel: entry.channel,
            eligible: entry.eligible,
            violations: entry.violations,
            occurred_at: entry.occurred_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EligibilityBody {
    pub contact_id: ContactId,
    pub channel: Channel,
    pub address: Option<String>,
    pub eligible: bool,
    pub violations: Vec<Violation>,
}

impl EligibilityBody {
    pub fn render(eligibility: Eligibility) -> EligibilityBody {
        EligibilityBody {
            eligible: eligibility.is_eligible(),
            contact_id: eligibility.contact_id,
            channel: eligibility.channel,
            address: eligibility.address,
            violations: eligibility.violations,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuditLogQuery {
    pub contact_id: Option<ContactId>,
    pub campaign_id: Option<CampaignId>,
}

#[get("/contacts/{contact_id}/eligibility/{channel}")]
#[tracing::instrument(skip(db))]
pub async fn check_eligibility(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<(ContactId, Channel)>,
) -> Result<Json<EligibilityBody>, Error> {
    let (contact_id, channel) = params.into_inner();

    let contact = contact::manager::get_contact_by_id(&***db, tenant.user_id, contact_id).await?;
    let eligibility = manager::check_eligibility(&***db, &contact, channel, None).await?;

    Ok(Json(EligibilityBody::render(eligibility)))
}

#[get("/compliance/audit-log")]
#[tracing::instrument(skip(db))]
pub async fn get_audit_log(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    query: Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditLogBody>>, Error> {
    let query = query.into_inner();

    let entries =
        manager::get_audit_log(&***db, tenant.user_id, query.contact_id, query.campaign_id)
            .await?;

    Ok(Json(entries.into_iter().map(AuditLogBody::render).collect()))
}

#[post("/compliance/rules")]
#[tracing::instrument(skip(db))]
pub async fn create_rule(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    body: Json<NewComplianceRule>,
) -> Result<Json<ComplianceRuleBody>, Error> {
    let rule = manager::create_rule(&***db, tenant.user_id, body.into_inner()).await?;

    Ok(Json(ComplianceRuleBody::render(rule)))
}

#[get("/compliance/rules")]
#[tracing::instrument(skip(db))]
pub async fn get_rules(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
) -> Result<Json<Vec<ComplianceRuleBody>>, Error> {
    let rules = manager::get_rules(&***db, tenant.user_id).await?;

    Ok(Json(rules.into_iter().map(ComplianceRuleBody::render).collect()))
}

#[get("/compliance/rules/{rule_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_rule_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ComplianceRuleId>,
) -> Result<Json<ComplianceRuleBody>, Error> {
    let rule_id = params.into_inner();

    let rule = manager::get_rule_by_id(&***db, tenant.user_id, rule_id).await?;

    Ok(Json(ComplianceRuleBody::render(rule)))
}

#[put("/compliance/rules/{rule_id}")]
#[tracing::instrument(skip(db))]
pub async fn update_rule(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ComplianceRuleId>,
    body: Json<ComplianceRuleUpdate>,
) -> Result<Json<ComplianceRuleBody>, Error> {
    let rule_id = params.into_inner();

    let rule = manager::get_rule_by_id(&***db, tenant.user_id, rule_id).await?;
    let rule = manager::update_rule(&***db, rule, body.into_inner()).await?;

    Ok(Json(ComplianceRuleBody::render(rule)))
}

#[post("/compliance/rules/{rule_id}/activate")]
#[tracing::instrument(skip(db))]
pub async fn activate_rule(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ComplianceRuleId>,
) -> Result<Json<ComplianceRuleBody>, Error> {
    let rule_id = params.into_inner();

    let rule = manager::get_rule_by_id(&***db, tenant.user_id, rule_id).await?;
    let rule = manager::set_rule_active(&***db, rule, true).await?;

    Ok(Json(ComplianceRuleBody::render(rule)))
}

#[post("/compliance/rules/{rule_id}/deactivate")]
#[tracing::instrument(skip(db))]
pub async fn deactivate_rule(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ComplianceRuleId>,
) -> Result<Json<ComplianceRuleBody>, Error> {
    let rule_id = params.into_inner();

    let rule = manager::get_rule_by_id(&***db, tenant.user_id, rule_id).await?;
    let rule = manager::set_rule_active(&***db, rule, false).await?;

    Ok(Json(ComplianceRuleBody::render(rule)))
}

#[delete("/compliance/rules/{rule_id}")]
#[tracing::instrument(skip(db))]
pub async fn delete_rule(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ComplianceRuleId>,
) -> Result<HttpResponse, Error> {
    let rule_id = params.into_inner();

    let rule = manager::get_rule_by_id(&***db, tenant.user_id, rule_id).await?;
    manager::delete_rule(&***db, rule).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[get("/compliance/rules/{rule_id}/audits")]
#[tracing::instrument(skip(db))]
pub async fn get_rule_audits(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<ComplianceRuleId>,
) -> Result<Json<Vec<ComplianceRuleAuditBody>>, Error> {
    let rule_id = params.into_inner();

    let audits = manager::get_rule_audits(&***db, tenant.user_id, rule_id).await?;

    Ok(Json(
        audits
            .into_iter()
            .map(ComplianceRuleAuditBody::render)
            .collect(),
    ))
}

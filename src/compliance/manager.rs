use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::campaign::CampaignId;
use crate::channel::Channel;
use crate::consent;
use crate::contact::{Contact, ContactId};
use crate::database::Database;
use crate::error::Error;
use crate::suppression;
use crate::user::UserId;
use crate::violations::Violation;

use super::{
    ComplianceAuditLog, ComplianceAuditLogId, ComplianceRule, ComplianceRuleAudit,
    ComplianceRuleAuditId, ComplianceRuleId, Eligibility, RuleAuditAction,
};

/// Checks whether `contact` may be messaged on `channel` at `now` without
/// recording the result.
///
/// A contact is eligible when it has an address for the channel, its latest
/// consent on the channel is granted, the address is not suppressed and no
/// frequency cap is reached.
#[tracing::instrument(skip(db))]
pub async fn evaluate_eligibility(
    db: &dyn Database,
    contact: &Contact,
    channel: Channel,
    now: DateTime<Utc>,
) -> Result<Eligibility, Error> {
    let mut violations = Vec::new();
    let address = contact.address_for(channel).map(str::to_string);

    if address.is_none() {
        violations.push(Violation::NoAddressForChannel { channel });
    }

    let latest = consent::manager::get_latest_consent(db, contact.user_id, contact.id, channel)
        .await?;
    if !consent::manager::is_granted(latest.as_ref()) {
        violations.push(Violation::ConsentNotGranted {
            channel,
            status: latest.map(|consent| consent.status.kind()),
        });
    }

    if let Some(address) = &address {
        let entry = suppression::manager::find_active_suppression(
            db,
            contact.user_id,
            address,
            channel,
            now,
        )
        .await?;

        if let Some(entry) = entry {
            violations.push(Violation::AddressSuppressed {
                address: address.clone(),
                suppression_id: entry.id,
                reason: entry.reason,
            });
        }
    }

    let control = db
        .frequencies()
        .fetch_frequency_control_by_contact(contact.user_id, contact.id)
        .await?;
    if let Some((period, limit, current)) = control.and_then(|c| c.reached_cap(now)) {
        violations.push(Violation::FrequencyCapReached {
            period,
            limit,
            current,
        });
    }

    Ok(Eligibility {
        contact_id: contact.id,
        channel,
        address,
        violations,
    })
}

/// Evaluates eligibility and appends the result to the compliance audit log.
#[tracing::instrument(skip(db))]
pub async fn check_eligibility(
    db: &dyn Database,
    contact: &Contact,
    channel: Channel,
    campaign_id: Option<CampaignId>,
) -> Result<Eligibility, Error> {
    let now = Utc::now();
    let eligibility = evaluate_eligibility(db, contact, channel, now).await?;

    let entry = ComplianceAuditLog {
        id: ComplianceAuditLogId::new(),
        user_id: contact.user_id,
        contact_id: contact.id,
        campaign_id,
        channel,
        eligible: eligibility.is_eligible(),
        violations: eligibility.violations.clone(),
        occurred_at: now,
    };
    db.audit_log().insert_audit_entry(&entry).await?;

    if !entry.eligible {
        debug!(
            "contact {} is not eligible for {}: {:?}",
            contact.id, channel, entry.violations
        );
    }

    Ok(eligibility)
}

#[tracing::instrument(skip(db))]
pub async fn get_audit_log(
    db: &dyn Database,
    user_id: UserId,
    contact_id: Option<ContactId>,
    campaign_id: Option<CampaignId>,
) -> Result<Vec<ComplianceAuditLog>, Error> {
    let entries = db
        .audit_log()
        .fetch_audit_log(user_id, contact_id, campaign_id)
        .await?;

    Ok(entries)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewComplianceRule {
    pub name: String,
    pub rule_type: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceRuleUpdate {
    pub name: String,
    pub rule_type: String,
    pub config: Value,
}

async fn write_rule_audit(
    db: &dyn Database,
    rule: &ComplianceRule,
    action: RuleAuditAction,
    before: Option<Value>,
    after: Option<Value>,
) -> Result<(), Error> {
    let audit = ComplianceRuleAudit {
        id: ComplianceRuleAuditId::new(),
        user_id: rule.user_id,
        rule_id: rule.id,
        version: rule.version,
        action,
        before,
        after,
        changed_at: Utc::now(),
    };

    db.rule_audits().insert_rule_audit(&audit).await
}

#[tracing::instrument(skip(db))]
pub async fn create_rule(
    db: &dyn Database,
    user_id: UserId,
    new_rule: NewComplianceRule,
) -> Result<ComplianceRule, Error> {
    let now = Utc::now();
    let rule = ComplianceRule {
        id: ComplianceRuleId::new(),
        user_id,
        name: new_rule.name.trim().to_string(),
        rule_type: new_rule.rule_type.trim().to_string(),
        config: new_rule.config,
        is_active: new_rule.is_active,
        version: 1,
        created_at: now,
        modified_at: now,
    };

    db.compliance_rules().insert_rule(&rule).await?;
    write_rule_audit(db, &rule, RuleAuditAction::Created, None, Some(rule.snapshot())).await?;

    info!("created compliance rule {} ({})", rule.id, rule.rule_type);

    Ok(rule)
}

#[tracing::instrument(skip(db))]
pub async fn get_rules(db: &dyn Database, user_id: UserId) -> Result<Vec<ComplianceRule>, Error> {
    let rules = db.compliance_rules().fetch_rules_by_user(user_id).await?;

    Ok(rules)
}

#[tracing::instrument(skip(db))]
pub async fn get_rule_by_id(
    db: &dyn Database,
    user_id: UserId,
    rule_id: ComplianceRuleId,
) -> Result<ComplianceRule, Error> {
    let rule = db
        .compliance_rules()
        .fetch_rule_by_id(user_id, rule_id)
        .await?
        .ok_or(Error::ComplianceRuleNotFound { rule_id })?;

    Ok(rule)
}

#[tracing::instrument(skip(db))]
pub async fn update_rule(
    db: &dyn Database,
    mut rule: ComplianceRule,
    update: ComplianceRuleUpdate,
) -> Result<ComplianceRule, Error> {
    let before = rule.snapshot();

    rule.name = update.name.trim().to_string();
    rule.rule_type = update.rule_type.trim().to_string();
    rule.config = update.config;
    rule.version += 1;

    let rule = db.compliance_rules().update_rule(rule).await?;
    write_rule_audit(
        db,
        &rule,
        RuleAuditAction::Updated,
        Some(before),
        Some(rule.snapshot()),
    )
    .await?;

    Ok(rule)
}

/// Activates or deactivates a rule. Setting the current state again is a
/// no-op and is not audited.
#[tracing::instrument(skip(db))]
pub async fn set_rule_active(
    db: &dyn Database,
    mut rule: ComplianceRule,
    is_active: bool,
) -> Result<ComplianceRule, Error> {
    if rule.is_active == is_active {
        return Ok(rule);
    }

    let before = rule.snapshot();
    rule.is_active = is_active;
    rule.version += 1;

    let rule = db.compliance_rules().update_rule(rule).await?;
    let action = if is_active {
        RuleAuditAction::Activated
    } else {
        RuleAuditAction::Deactivated
    };
    write_rule_audit(db, &rule, action, Some(before), Some(rule.snapshot())).await?;

    Ok(rule)
}

/// Deletes the rule. Its audit trail is kept.
#[tracing::instrument(skip(db))]
pub async fn delete_rule(db: &dyn Database, rule: ComplianceRule) -> Result<(), Error> {
    db.compliance_rules()
        .delete_rule(rule.user_id, rule.id)
        .await?;
    write_rule_audit(db, &rule, RuleAuditAction::Deleted, Some(rule.snapshot()), None).await?;

    info!("deleted compliance rule {}", rule.id);

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn get_rule_audits(
    db: &dyn Database,
    user_id: UserId,
    rule_id: ComplianceRuleId,
) -> Result<Vec<ComplianceRuleAudit>, Error> {
    let audits = db.rule_audits().fetch_audits_by_rule(user_id, rule_id).await?;

    Ok(audits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::ConsentSource;
    use crate::contact::manager::{create_contact, set_frequency_caps, record_send, NewContact};
    use crate::contact::FrequencyCaps;
    use crate::database::MemoryDatabase;
    use crate::suppression::manager::{add_suppression, NewSuppression};
    use crate::suppression::SuppressionReason;
    use serde_json::json;

    async fn contact(db: &MemoryDatabase, email: Option<&str>) -> Contact {
        let new_contact = NewContact {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: Some("+15550100000".into()),
            email: email.map(str::to_string),
            tags: vec![],
        };
        create_contact(db, UserId::new(), new_contact).await.unwrap()
    }

    async fn grant(db: &MemoryDatabase, contact: &Contact, channel: Channel) {
        consent::manager::grant_consent(db, contact, channel, ConsentSource::Api, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn contact_with_consent_is_eligible() {
        let db = MemoryDatabase::new();
        let contact = contact(&db, None).await;
        grant(&db, &contact, Channel::Sms).await;

        let eligibility = check_eligibility(&db, &contact, Channel::Sms, None)
            .await
            .unwrap();

        assert!(eligibility.is_eligible());
        assert_eq!(eligibility.address.as_deref(), Some("+15550100000"));
    }

    #[tokio::test]
    async fn missing_address_and_consent_are_both_reported() {
        let db = MemoryDatabase::new();
        let contact = contact(&db, None).await;

        let eligibility = check_eligibility(&db, &contact, Channel::Email, None)
            .await
            .unwrap();

        assert_eq!(
            eligibility.violations,
            vec![
                Violation::NoAddressForChannel {
                    channel: Channel::Email
                },
                Violation::ConsentNotGranted {
                    channel: Channel::Email,
                    status: None
                },
            ]
        );
    }

    #[tokio::test]
    async fn suppressed_address_is_not_eligible() {
        let db = MemoryDatabase::new();
        let contact = contact(&db, None).await;
        grant(&db, &contact, Channel::Sms).await;
        let entry = add_suppression(
            &db,
            contact.user_id,
            NewSuppression {
                address: "+15550100000".into(),
                channel: None,
                contact_id: None,
                reason: SuppressionReason::HardBounce,
                note: None,
                expires_at: None,
            },
        )
        .await
        .unwrap();

        let eligibility = check_eligibility(&db, &contact, Channel::Sms, None)
            .await
            .unwrap();

        assert_eq!(
            eligibility.violations,
            vec![Violation::AddressSuppressed {
                address: "+15550100000".into(),
                suppression_id: entry.id,
                reason: SuppressionReason::HardBounce,
            }]
        );
    }

    #[tokio::test]
    async fn reached_frequency_cap_is_not_eligible() {
        let db = MemoryDatabase::new();
        let contact = contact(&db, None).await;
        grant(&db, &contact, Channel::Sms).await;
        record_send(&db, contact.user_id, contact.id, Utc::now())
            .await
            .unwrap();
        let caps = FrequencyCaps {
            max_per_day: Some(1),
            ..FrequencyCaps::default()
        };
        set_frequency_caps(&db, &contact, caps).await.unwrap();

        let eligibility = check_eligibility(&db, &contact, Channel::Sms, None)
            .await
            .unwrap();

        assert!(!eligibility.is_eligible());
        assert!(matches!(
            eligibility.violations[0],
            Violation::FrequencyCapReached { limit: 1, .. }
        ));
    }

    #[tokio::test]
    async fn every_check_is_written_to_the_audit_log() {
        let db = MemoryDatabase::new();
        let contact = contact(&db, Some("ada@example.com")).await;
        grant(&db, &contact, Channel::Email).await;

        check_eligibility(&db, &contact, Channel::Email, None).await.unwrap();
        check_eligibility(&db, &contact, Channel::Sms, None).await.unwrap();

        let log = get_audit_log(&db, contact.user_id, Some(contact.id), None)
            .await
            .unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.iter().filter(|e| e.eligible).count(), 1);
    }

    #[tokio::test]
    async fn rule_changes_bump_version_and_are_audited() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let rule = create_rule(
            &db,
            user_id,
            NewComplianceRule {
                name: "Quiet hours".into(),
                rule_type: "QUIET_HOURS".into(),
                config: json!({ "start": "21:00", "end": "08:00" }),
                is_active: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(rule.version, 1);

        let rule = update_rule(
            &db,
            rule,
            ComplianceRuleUpdate {
                name: "Quiet hours".into(),
                rule_type: "QUIET_HOURS".into(),
                config: json!({ "start": "20:00", "end": "08:00" }),
            },
        )
        .await
        .unwrap();
        let rule = set_rule_active(&db, rule, false).await.unwrap();
        assert_eq!(rule.version, 3);
        delete_rule(&db, rule.clone()).await.unwrap();

        let audits = get_rule_audits(&db, user_id, rule.id).await.unwrap();
        let actions: Vec<_> = audits.iter().map(|a| a.action).collect();
        assert_eq!(
            actions,
            vec![
                RuleAuditAction::Created,
                RuleAuditAction::Updated,
                RuleAuditAction::Deactivated,
                RuleAuditAction::Deleted,
            ]
        );
        assert_eq!(audits[1].before.as_ref().unwrap()["config"]["start"], "21:00");
        assert_eq!(audits[1].after.as_ref().unwrap()["config"]["start"], "20:00");
        assert_eq!(audits[3].version, 3);
        assert!(audits[3].after.is_none());
    }

    #[tokio::test]
    async fn setting_same_active_state_is_not_audited() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let rule = create_rule(
            &db,
            user_id,
            NewComplianceRule {
                name: "Opt-out footer".into(),
                rule_type: "FOOTER".into(),
                config: json!({}),
                is_active: true,
            },
        )
        .await
        .unwrap();

        let rule = set_rule_active(&db, rule, true).await.unwrap();

        assert_eq!(rule.version, 1);
        assert_eq!(get_rule_audits(&db, user_id, rule.id).await.unwrap().len(), 1);
    }
}

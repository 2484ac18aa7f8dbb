use async_trait::async_trait;
use mongodb::bson::{self, Document};
use mongodb::Database;

use crate::campaign::CampaignId;
use crate::contact::ContactId;
use crate::database::mongo::{
    create_indexes, find_sorted, replace_versioned, MongoAuditLogStore, MongoComplianceRuleStore,
    MongoRuleAuditStore,
};
use crate::database::MemoryCollection;
use crate::error::Error;
use crate::user::UserId;

use super::{ComplianceAuditLog, ComplianceRule, ComplianceRuleAudit, ComplianceRuleId};

pub async fn initialize(db: &Database) -> Result<(), Error> {
    create_indexes(
        db,
        "compliance_rules",
        vec![bson::doc! { "key": { "user_id": 1, "created_at": 1 }, "name": "by_user_id" }],
    )
    .await?;

    create_indexes(
        db,
        "compliance_rule_audits",
        vec![bson::doc! { "key": { "rule_id": 1, "version": 1 }, "name": "by_rule_id" }],
    )
    .await?;

    create_indexes(
        db,
        "compliance_audit_log",
        vec![
            bson::doc! { "key": { "user_id": 1, "contact_id": 1, "occurred_at": -1 }, "name": "by_contact_id" },
            bson::doc! { "key": { "user_id": 1, "campaign_id": 1, "occurred_at": -1 }, "name": "by_campaign_id" },
        ],
    )
    .await
}

#[async_trait]
pub trait ComplianceRuleStore: Send + Sync {
    async fn insert_rule(&self, rule: &ComplianceRule) -> Result<(), Error>;

    async fn fetch_rules_by_user(&self, user_id: UserId) -> Result<Vec<ComplianceRule>, Error>;

    async fn fetch_rule_by_id(
        &self,
        user_id: UserId,
        rule_id: ComplianceRuleId,
    ) -> Result<Option<ComplianceRule>, Error>;

    async fn update_rule(&self, rule: ComplianceRule) -> Result<ComplianceRule, Error>;

    async fn delete_rule(&self, user_id: UserId, rule_id: ComplianceRuleId) -> Result<(), Error>;

    async fn delete_rules_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl ComplianceRuleStore for MongoComplianceRuleStore {
    #[tracing::instrument(skip(self))]
    async fn insert_rule(&self, rule: &ComplianceRule) -> Result<(), Error> {
        self.insert_one(rule, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_rules_by_user(&self, user_id: UserId) -> Result<Vec<ComplianceRule>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id },
            bson::doc! { "created_at": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_rule_by_id(
        &self,
        user_id: UserId,
        rule_id: ComplianceRuleId,
    ) -> Result<Option<ComplianceRule>, Error> {
        let rule = self
            .find_one(bson::doc! { "_id": rule_id, "user_id": user_id }, None)
            .await?;

        Ok(rule)
    }

    #[tracing::instrument(skip(self))]
    async fn update_rule(&self, rule: ComplianceRule) -> Result<ComplianceRule, Error> {
        replace_versioned(self, rule).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_rule(&self, user_id: UserId, rule_id: ComplianceRuleId) -> Result<(), Error> {
        self.delete_one(bson::doc! { "_id": rule_id, "user_id": user_id }, None)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_rules_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl ComplianceRuleStore for MemoryCollection<ComplianceRule> {
    async fn insert_rule(&self, rule: &ComplianceRule) -> Result<(), Error> {
        self.insert(rule);
        Ok(())
    }

    async fn fetch_rules_by_user(&self, user_id: UserId) -> Result<Vec<ComplianceRule>, Error> {
        let mut rules = self.find(|r| r.user_id == user_id);
        rules.sort_by_key(|r| r.created_at);
        Ok(rules)
    }

    async fn fetch_rule_by_id(
        &self,
        user_id: UserId,
        rule_id: ComplianceRuleId,
    ) -> Result<Option<ComplianceRule>, Error> {
        Ok(self.find_one(|r| r.id == rule_id && r.user_id == user_id))
    }

    async fn update_rule(&self, rule: ComplianceRule) -> Result<ComplianceRule, Error> {
        self.replace_versioned(rule)
    }

    async fn delete_rule(&self, user_id: UserId, rule_id: ComplianceRuleId) -> Result<(), Error> {
        self.delete_where(|r| r.id == rule_id && r.user_id == user_id);
        Ok(())
    }

    async fn delete_rules_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

#[async_trait]
pub trait RuleAuditStore: Send + Sync {
    async fn insert_rule_audit(&self, audit: &ComplianceRuleAudit) -> Result<(), Error>;

    async fn fetch_audits_by_rule(
        &self,
        user_id: UserId,
        rule_id: ComplianceRuleId,
    ) -> Result<Vec<ComplianceRuleAudit>, Error>;

    async fn delete_rule_audits_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl RuleAuditStore for MongoRuleAuditStore {
    #[tracing::instrument(skip(self))]
    async fn insert_rule_audit(&self, audit: &ComplianceRuleAudit) -> Result<(), Error> {
        self.insert_one(audit, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_audits_by_rule(
        &self,
        user_id: UserId,
        rule_id: ComplianceRuleId,
    ) -> Result<Vec<ComplianceRuleAudit>, Error> {
        find_sorted(
            self,
            bson::doc! { "user_id": user_id, "rule_id": rule_id },
            bson::doc! { "changed_at": 1 },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_rule_audits_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl RuleAuditStore for MemoryCollection<ComplianceRuleAudit> {
    async fn insert_rule_audit(&self, audit: &ComplianceRuleAudit) -> Result<(), Error> {
        self.insert(audit);
        Ok(())
    }

    async fn fetch_audits_by_rule(
        &self,
        user_id: UserId,
        rule_id: ComplianceRuleId,
    ) -> Result<Vec<ComplianceRuleAudit>, Error> {
        let mut audits = self.find(|a| a.user_id == user_id && a.rule_id == rule_id);
        audits.sort_by_key(|a| (a.changed_at, a.version));
        Ok(audits)
    }

    async fn delete_rule_audits_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn insert_audit_entry(&self, entry: &ComplianceAuditLog) -> Result<(), Error>;

    /// Newest first, optionally narrowed to one contact and/or campaign.
    async fn fetch_audit_log(
        &self,
        user_id: UserId,
        contact_id: Option<ContactId>,
        campaign_id: Option<CampaignId>,
    ) -> Result<Vec<ComplianceAuditLog>, Error>;

    async fn delete_audit_log_by_user(&self, user_id: UserId) -> Result<u64, Error>;
}

#[async_trait]
impl AuditLogStore for MongoAuditLogStore {
    #[tracing::instrument(skip(self))]
    async fn insert_audit_entry(&self, entry: &ComplianceAuditLog) -> Result<(), Error> {
        self.insert_one(entry, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_audit_log(
        &self,
        user_id: UserId,
        contact_id: Option<ContactId>,
        campaign_id: Option<CampaignId>,
    ) -> Result<Vec<ComplianceAuditLog>, Error> {
        let mut filter = Document::new();
        filter.insert("user_id", user_id);
        if let Some(contact_id) = contact_id {
            filter.insert("contact_id", contact_id);
        }
        if let Some(campaign_id) = campaign_id {
            filter.insert("campaign_id", campaign_id);
        }

        find_sorted(self, filter, bson::doc! { "occurred_at": -1 }).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_audit_log_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        let result = self
            .delete_many(bson::doc! { "user_id": user_id }, None)
            .await?;

        Ok(result.deleted_count)
    }
}

#[async_trait]
impl AuditLogStore for MemoryCollection<ComplianceAuditLog> {
    async fn insert_audit_entry(&self, entry: &ComplianceAuditLog) -> Result<(), Error> {
        self.insert(entry);
        Ok(())
    }

    async fn fetch_audit_log(
        &self,
        user_id: UserId,
        contact_id: Option<ContactId>,
        campaign_id: Option<CampaignId>,
    ) -> Result<Vec<ComplianceAuditLog>, Error> {
        let mut entries = self.find(|e| {
            e.user_id == user_id
                && contact_id.map_or(true, |id| e.contact_id == id)
                && campaign_id.map_or(true, |id| e.campaign_id == Some(id))
        });
        entries.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(entries)
    }

    async fn delete_audit_log_by_user(&self, user_id: UserId) -> Result<u64, Error> {
        Ok(self.delete_by_owner(user_id))
    }
}

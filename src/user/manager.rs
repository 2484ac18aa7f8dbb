use chrono::Utc;
use tracing::info;

use crate::address::normalize_email;
use crate::database::Database;
use crate::error::Error;

use super::{User, UserId};

#[tracing::instrument(skip(db))]
pub async fn register_user(
    db: &dyn Database,
    email: String,
    company_name: Option<String>,
) -> Result<User, Error> {
    let email = normalize_email(&email)?;

    if db.users().fetch_user_by_email(&email).await?.is_some() {
        return Err(Error::EmailAlreadyRegistered { email });
    }

    let now = Utc::now();
    let user = User {
        id: UserId::new(),
        email,
        company_name,
        created_at: now,
        modified_at: now,
    };

    db.users().insert_user(&user).await?;

    Ok(user)
}

#[tracing::instrument(skip(db))]
pub async fn get_user_by_id(db: &dyn Database, user_id: UserId) -> Result<User, Error> {
    let user = db
        .users()
        .fetch_user_by_id(user_id)
        .await?
        .ok_or(Error::UserNotFound { user_id })?;

    Ok(user)
}

/// Removes the user and everything the user owns.
#[tracing::instrument(skip(db))]
pub async fn delete_user(db: &dyn Database, user_id: UserId) -> Result<(), Error> {
    let user = get_user_by_id(db, user_id).await?;

    let mut removed = 0;
    removed += db.attempts().delete_attempts_by_user(user.id).await?;
    removed += db.messages().delete_messages_by_user(user.id).await?;
    removed += db.analytics().delete_analytics_by_user(user.id).await?;
    removed += db.variants().delete_variants_by_user(user.id).await?;
    removed += db.campaigns().delete_campaigns_by_user(user.id).await?;
    removed += db.consent_history().delete_history_by_user(user.id).await?;
    removed += db.consents().delete_consents_by_user(user.id).await?;
    removed += db.frequencies().delete_frequency_controls_by_user(user.id).await?;
    removed += db.suppressions().delete_suppressions_by_user(user.id).await?;
    removed += db.contacts().delete_contacts_by_user(user.id).await?;
    removed += db.audit_log().delete_audit_log_by_user(user.id).await?;
    removed += db.rule_audits().delete_rule_audits_by_user(user.id).await?;
    removed += db.compliance_rules().delete_rules_by_user(user.id).await?;
    removed += db.rate_limits().delete_rate_limits_by_user(user.id).await?;
    removed += db.routing().delete_routing_configs_by_user(user.id).await?;
    removed += db.providers().delete_providers_by_user(user.id).await?;
    removed += db.keywords().delete_keywords_by_user(user.id).await?;
    db.users().delete_user(user.id).await?;

    info!("deleted user {} and {} owned records", user.id, removed);

    Ok(())
}

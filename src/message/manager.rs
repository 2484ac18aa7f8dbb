use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analytics::{self, AnalyticsEvent};
use crate::campaign::{self, Campaign};
use crate::channel::Channel;
use crate::compliance;
use crate::contact::{self, Contact, ContactId};
use crate::database::Database;
use crate::error::Error;
use crate::provider::{self, RetryPolicy};
use crate::user::UserId;
use crate::variant;
use crate::violations::Violation;

use super::{
    AttemptId, AttemptOutcome, CampaignMessage, DeliveryAttempt, EngagementKind, MessageId,
    MessageStatus,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Recipients to queue; the campaign audience when absent.
    #[serde(default)]
    pub contact_ids: Option<Vec<ContactId>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum SkipReason {
    AlreadyQueued { message_id: MessageId },
    Ineligible { violations: Vec<Violation> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecipient {
    pub contact_id: ContactId,
    pub channel: Channel,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnqueueSummary {
    pub queued: Vec<CampaignMessage>,
    pub skipped: Vec<SkippedRecipient>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewAttempt {
    pub provider_name: String,
    pub outcome: AttemptOutcome,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub fallback_reason: Option<String>,
}

async fn resolve_recipients(
    db: &dyn Database,
    campaign: &Campaign,
    contact_ids: Option<Vec<ContactId>>,
) -> Result<Vec<Contact>, Error> {
    match contact_ids {
        Some(mut contact_ids) => {
            contact_ids.sort_by_key(|id| id.uuid());
            contact_ids.dedup();

            let mut contacts = Vec::with_capacity(contact_ids.len());
            for contact_id in contact_ids {
                let contact =
                    contact::manager::get_contact_by_id(db, campaign.user_id, contact_id).await?;
                contacts.push(contact);
            }

            Ok(contacts)
        }
        None => campaign::manager::resolve_audience(db, campaign).await,
    }
}

/// Queues one message per recipient and campaign channel.
///
/// Recipients that already have a message on the channel are skipped, as
/// are those that fail the eligibility check; every check is written to the
/// compliance audit log. A/B campaigns assign each recipient a single
/// variant for all of its channels.
#[tracing::instrument(skip(db))]
pub async fn enqueue(
    db: &dyn Database,
    campaign: &Campaign,
    request: EnqueueRequest,
) -> Result<EnqueueSummary, Error> {
    if !campaign.status.accepts_messages() {
        return Err(Error::CampaignNotSendable {
            campaign_id: campaign.id,
            status: campaign.status,
        });
    }

    let recipients = resolve_recipients(db, campaign, request.contact_ids).await?;

    let variants = if campaign.is_ab_test {
        variant::manager::get_variants(db, campaign).await?
    } else {
        vec![]
    };

    let mut policies: HashMap<Channel, RetryPolicy> = HashMap::new();
    for channel in campaign.channels.iter().copied() {
        let policy = provider::manager::retry_policy_for(db, campaign.user_id, channel).await?;
        policies.insert(channel, policy);
    }

    let mut summary = EnqueueSummary {
        queued: vec![],
        skipped: vec![],
    };

    for contact in &recipients {
        let variant_id = if campaign.is_ab_test {
            variant::allocate(&variants, &mut rand::thread_rng())
        } else {
            None
        };

        for channel in campaign.channels.iter().copied() {
            let existing = db
                .messages()
                .fetch_message_by_recipient(campaign.user_id, campaign.id, contact.id, channel)
                .await?;
            if let Some(existing) = existing {
                summary.skipped.push(SkippedRecipient {
                    contact_id: contact.id,
                    channel,
                    reason: SkipReason::AlreadyQueued {
                        message_id: existing.id,
                    },
                });
                continue;
            }

            let eligibility =
                compliance::manager::check_eligibility(db, contact, channel, Some(campaign.id))
                    .await?;
            let address = match eligibility.address {
                Some(address) if eligibility.violations.is_empty() => address,
                _ => {
                    summary.skipped.push(SkippedRecipient {
                        contact_id: contact.id,
                        channel,
                        reason: SkipReason::Ineligible {
                            violations: eligibility.violations,
                        },
                    });
                    continue;
                }
            };

            let max_retries = policies
                .get(&channel)
                .map(|p| p.max_retries)
                .unwrap_or_else(|| RetryPolicy::default().max_retries);

            let now = Utc::now();
            let message = CampaignMessage {
                id: MessageId::new(),
                user_id: campaign.user_id,
                campaign_id: campaign.id,
                contact_id: contact.id,
                variant_id,
                channel,
                address,
                status: MessageStatus::Queued,
                retry_count: 0,
                max_retries,
                provider_name: None,
                provider_message_id: None,
                last_error: None,
                next_attempt_at: Some(now),
                queued_at: now,
                sent_at: None,
                delivered_at: None,
                failed_at: None,
                opened_at: None,
                clicked_at: None,
                converted_at: None,
                created_at: now,
                modified_at: now,
            };

            db.messages().insert_message(&message).await?;
            count(db, &message, AnalyticsEvent::Queued).await?;

            summary.queued.push(message);
        }
    }

    info!(
        "queued {} messages for campaign {}, skipped {}",
        summary.queued.len(),
        campaign.id,
        summary.skipped.len()
    );

    Ok(summary)
}

async fn count(db: &dyn Database, message: &CampaignMessage, event: AnalyticsEvent) -> Result<(), Error> {
    analytics::manager::record_event(
        db,
        message.user_id,
        message.campaign_id,
        message.variant_id,
        event,
    )
    .await
}

fn ensure_status(
    message: &CampaignMessage,
    allowed: &[MessageStatus],
    to: MessageStatus,
) -> Result<(), Error> {
    if !allowed.contains(&message.status) {
        return Err(Error::InvalidMessageTransition {
            message_id: message.id,
            from: message.status,
            to,
        });
    }

    Ok(())
}

/// Records one delivery attempt of a queued message.
///
/// A successful attempt moves the message to SENT and counts the send
/// against the contact's frequency caps. A failed attempt schedules a retry
/// with the channel's backoff while retries remain, otherwise the message
/// becomes FAILED.
#[tracing::instrument(skip(db))]
pub async fn record_attempt(
    db: &dyn Database,
    mut message: CampaignMessage,
    new_attempt: NewAttempt,
) -> Result<(CampaignMessage, DeliveryAttempt), Error> {
    let succeeded = new_attempt.outcome == AttemptOutcome::Succeeded;
    let target = if succeeded {
        MessageStatus::Sent
    } else {
        MessageStatus::Failed
    };
    ensure_status(&message, &[MessageStatus::Queued], target)?;

    let now = Utc::now();
    let attempt = DeliveryAttempt {
        id: AttemptId::new(),
        user_id: message.user_id,
        campaign_id: message.campaign_id,
        message_id: message.id,
        attempt_number: message.retry_count + 1,
        provider_name: new_attempt.provider_name.clone(),
        outcome: new_attempt.outcome,
        provider_message_id: new_attempt.provider_message_id.clone(),
        error: new_attempt.error.clone(),
        fallback_reason: new_attempt.fallback_reason,
        attempted_at: now,
    };

    message.provider_name = Some(new_attempt.provider_name);
    let event = if succeeded {
        message.status = MessageStatus::Sent;
        message.sent_at = Some(now);
        message.provider_message_id = new_attempt.provider_message_id;
        message.last_error = None;
        message.next_attempt_at = None;
        Some(AnalyticsEvent::Sent)
    } else if message.retry_count < message.max_retries {
        let policy =
            provider::manager::retry_policy_for(db, message.user_id, message.channel).await?;
        message.retry_count += 1;
        message.last_error = new_attempt.error;
        let next_attempt_at = now
            .checked_add_signed(policy.delay_for(message.retry_count))
            .ok_or(Error::InvalidRetryPolicy {
                initial_backoff_ms: policy.initial_backoff_ms,
                max_backoff_ms: policy.max_backoff_ms,
                backoff_multiplier: policy.backoff_multiplier,
            })?;
        message.next_attempt_at = Some(next_attempt_at);
        None
    } else {
        message.status = MessageStatus::Failed;
        message.failed_at = Some(now);
        message.last_error = new_attempt.error;
        message.next_attempt_at = None;
        Some(AnalyticsEvent::Failed)
    };

    let message = db.messages().update_message(message).await?;
    db.attempts().insert_attempt(&attempt).await?;

    if let Some(event) = event {
        count(db, &message, event).await?;
    }

    if succeeded {
        contact::manager::record_send(db, message.user_id, message.contact_id, now).await?;
    }

    debug!(
        "attempt {} of message {} is {:?}, message is {}",
        attempt.attempt_number, message.id, attempt.outcome, message.status
    );

    Ok((message, attempt))
}

#[tracing::instrument(skip(db))]
pub async fn mark_delivered(
    db: &dyn Database,
    mut message: CampaignMessage,
) -> Result<CampaignMessage, Error> {
    ensure_status(&message, &[MessageStatus::Sent], MessageStatus::Delivered)?;

    message.status = MessageStatus::Delivered;
    message.delivered_at = Some(Utc::now());

    let message = db.messages().update_message(message).await?;
    count(db, &message, AnalyticsEvent::Delivered).await?;

    Ok(message)
}

#[tracing::instrument(skip(db))]
pub async fn mark_failed(
    db: &dyn Database,
    mut message: CampaignMessage,
    error: Option<String>,
) -> Result<CampaignMessage, Error> {
    ensure_status(
        &message,
        &[MessageStatus::Queued, MessageStatus::Sent],
        MessageStatus::Failed,
    )?;

    message.status = MessageStatus::Failed;
    message.failed_at = Some(Utc::now());
    message.next_attempt_at = None;
    if error.is_some() {
        message.last_error = error;
    }

    let message = db.messages().update_message(message).await?;
    count(db, &message, AnalyticsEvent::Failed).await?;

    Ok(message)
}

/// Records an open, click or conversion of a delivered message. Only the
/// first occurrence of each kind is counted.
#[tracing::instrument(skip(db))]
pub async fn record_engagement(
    db: &dyn Database,
    mut message: CampaignMessage,
    kind: EngagementKind,
    occurred_at: Option<DateTime<Utc>>,
) -> Result<CampaignMessage, Error> {
    if message.status != MessageStatus::Delivered {
        return Err(Error::MessageNotDelivered {
            message_id: message.id,
            status: message.status,
        });
    }

    if !message.engage(kind, occurred_at.unwrap_or_else(Utc::now)) {
        return Ok(message);
    }

    let message = db.messages().update_message(message).await?;
    count(db, &message, kind.event()).await?;

    Ok(message)
}

#[tracing::instrument(skip(db))]
pub async fn get_messages(
    db: &dyn Database,
    campaign: &Campaign,
    status: Option<MessageStatus>,
) -> Result<Vec<CampaignMessage>, Error> {
    let messages = db
        .messages()
        .fetch_messages_by_campaign(campaign.user_id, campaign.id, status)
        .await?;

    Ok(messages)
}

#[tracing::instrument(skip(db))]
pub async fn get_message_by_id(
    db: &dyn Database,
    user_id: UserId,
    message_id: MessageId,
) -> Result<CampaignMessage, Error> {
    let message = db
        .messages()
        .fetch_message_by_id(user_id, message_id)
        .await?
        .ok_or(Error::MessageNotFound { message_id })?;

    Ok(message)
}

#[tracing::instrument(skip(db))]
pub async fn get_attempts(
    db: &dyn Database,
    message: &CampaignMessage,
) -> Result<Vec<DeliveryAttempt>, Error> {
    let attempts = db
        .attempts()
        .fetch_attempts_by_message(message.user_id, message.id)
        .await?;

    Ok(attempts)
}

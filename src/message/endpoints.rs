use actix_web::web::{Data, Json, Path, Query};
use actix_web::{get, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Tenant;
use crate::campaign::{self, CampaignId};
use crate::channel::Channel;
use crate::contact::ContactId;
use crate::database::Database;
use crate::error::Error;
use crate::variant::VariantId;

use super::manager::{self, EnqueueRequest, NewAttempt, SkippedRecipient};
use super::{
    AttemptId, AttemptOutcome, CampaignMessage, DeliveryAttempt, EngagementKind, MessageId,
    MessageStatus,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageBody {
    pub id: MessageId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub variant_id: Option<VariantId>,
    pub channel: Channel,
    pub address: String,
    pub status: MessageStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub provider_name: Option<String>,
    pub provider_message_id: Option<String>,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
}

impl MessageBody {
    pub fn render(message: CampaignMessage) -> MessageBody {
        MessageBody {
            id: message.id,
            campaign_id: message.campaign_id,
            contact_id: message.contact_id,
            variant_id: message.variant_id,
            channel: message.channel,
            address: message.address,
            status: message.status,
            retry_count: message.retry_count,
            max_retries: message.max_retries,
            provider_name: message.provider_name,
            provider_message_id: message.provider_message_id,
            last_error: message.last_error,
            next_attempt_at: message.next_attempt_at,
            queued_at: message.queued_at,
            sent_at: message.sent_at,
            delivered_at: message.delivered_at,
            failed_at: message.failed_at,
            opened_at: message.opened_at,
            clicked_at: message.clicked_at,
            converted_at: message.converted_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptBody {
    pub id: AttemptId,
    pub message_id: MessageId,
    pub attempt_number: u32,
    pub provider_name: String,
    pub outcome: AttemptOutcome,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub fallback_reason: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl AttemptBody {
    pub fn render(attempt: DeliveryAttempt) -> AttemptBody {
        AttemptBody {
            id: attempt.id,
            message_id: attempt.message_id,
            attempt_number: attempt.attempt_number,
            provider_name: attempt.provider_name,
            outcome: attempt.outcome,
            provider_message_id: attempt.provider_message_id,
            error: attempt.error,
            fallback_reason: attempt.fallback_reason,
            attempted_at: attempt.attempted_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnqueueSummaryBody {
    pub queued: Vec<MessageBody>,
    pub skipped: Vec<SkippedRecipient>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptResultBody {
    pub message: MessageBody,
    pub attempt: AttemptBody,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageQuery {
    pub status: Option<MessageStatus>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarkFailedBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngagementBody {
    pub kind: EngagementKind,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[post("/campaigns/{campaign_id}/messages")]
#[tracing::instrument(skip(db))]
pub async fn enqueue_messages(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
    body: Option<Json<EnqueueRequest>>,
) -> Result<Json<EnqueueSummaryBody>, Error> {
    let campaign_id = params.into_inner();
    let request = body.map(Json::into_inner).unwrap_or_default();

    let campaign =
        campaign::manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let summary = manager::enqueue(&***db, &campaign, request).await?;

    Ok(Json(EnqueueSummaryBody {
        queued: summary.queued.into_iter().map(MessageBody::render).collect(),
        skipped: summary.skipped,
    }))
}

#[get("/campaigns/{campaign_id}/messages")]
#[tracing::instrument(skip(db))]
pub async fn get_messages(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<CampaignId>,
    query: Query<MessageQuery>,
) -> Result<Json<Vec<MessageBody>>, Error> {
    let campaign_id = params.into_inner();
    let query = query.into_inner();

    let campaign =
        campaign::manager::get_campaign_by_id(&***db, tenant.user_id, campaign_id).await?;
    let messages = manager::get_messages(&***db, &campaign, query.status).await?;

    Ok(Json(messages.into_iter().map(MessageBody::render).collect()))
}

#[get("/messages/{message_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_message_by_id(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<MessageId>,
) -> Result<Json<MessageBody>, Error> {
    let message_id = params.into_inner();

    let message = manager::get_message_by_id(&***db, tenant.user_id, message_id).await?;

    Ok(Json(MessageBody::render(message)))
}

#[post("/messages/{message_id}/attempts")]
#[tracing::instrument(skip(db))]
pub async fn record_attempt(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<MessageId>,
    body: Json<NewAttempt>,
) -> Result<Json<AttemptResultBody>, Error> {
    let message_id = params.into_inner();

    let message = manager::get_message_by_id(&***db, tenant.user_id, message_id).await?;
    let (message, attempt) = manager::record_attempt(&***db, message, body.into_inner()).await?;

    Ok(Json(AttemptResultBody {
        message: MessageBody::render(message),
        attempt: AttemptBody::render(attempt),
    }))
}

#[get("/messages/{message_id}/attempts")]
#[tracing::instrument(skip(db))]
pub async fn get_attempts(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<MessageId>,
) -> Result<Json<Vec<AttemptBody>>, Error> {
    let message_id = params.into_inner();

    let message = manager::get_message_by_id(&***db, tenant.user_id, message_id).await?;
    let attempts = manager::get_attempts(&***db, &message).await?;

    Ok(Json(attempts.into_iter().map(AttemptBody::render).collect()))
}

#[post("/messages/{message_id}/delivered")]
#[tracing::instrument(skip(db))]
pub async fn mark_delivered(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<MessageId>,
) -> Result<Json<MessageBody>, Error> {
    let message_id = params.into_inner();

    let message = manager::get_message_by_id(&***db, tenant.user_id, message_id).await?;
    let message = manager::mark_delivered(&***db, message).await?;

    Ok(Json(MessageBody::render(message)))
}

#[post("/messages/{message_id}/failed")]
#[tracing::instrument(skip(db))]
pub async fn mark_failed(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<MessageId>,
    body: Option<Json<MarkFailedBody>>,
) -> Result<Json<MessageBody>, Error> {
    let message_id = params.into_inner();
    let body = body.map(Json::into_inner).unwrap_or_default();

    let message = manager::get_message_by_id(&***db, tenant.user_id, message_id).await?;
    let message = manager::mark_failed(&***db, message, body.error).await?;

    Ok(Json(MessageBody::render(message)))
}

#[post("/messages/{message_id}/events")]
#[tracing::instrument(skip(db))]
pub async fn record_engagement(
    db: Data<Box<dyn Database>>,
    tenant: Tenant,
    params: Path<MessageId>,
    body: Json<EngagementBody>,
) -> Result<Json<MessageBody>, Error> {
    let message_id = params.into_inner();
    let body = body.into_inner();

    let message = manager::get_message_by_id(&***db, tenant.user_id, message_id).await?;
    let message =
        manager::record_engagement(&***db, message, body.kind, body.occurred_at).await?;

    Ok(Json(MessageBody::render(message)))
}

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics;
use crate::channel::Channel;
use crate::contact::Contact;
use crate::database::Database;
use crate::error::Error;
use crate::user::UserId;
use crate::variant::{self, VariantId};

use super::{
    Campaign, CampaignAudience, CampaignContent, CampaignId, CampaignSchedule, CampaignStatus,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub content: Option<CampaignContent>,
    #[serde(default)]
    pub audience: Option<CampaignAudience>,
    #[serde(default)]
    pub schedule: Option<CampaignSchedule>,
    #[serde(default)]
    pub is_ab_test: bool,
}

/// Replaces every editable field of a draft campaign.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignUpdate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub content: Option<CampaignContent>,
    #[serde(default)]
    pub audience: Option<CampaignAudience>,
    #[serde(default)]
    pub schedule: Option<CampaignSchedule>,
    #[serde(default)]
    pub is_ab_test: bool,
}

fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::MissingCampaignName);
    }

    Ok(name.to_string())
}

fn validate_channels(channels: &[Channel]) -> Result<(), Error> {
    let unique: HashSet<&Channel> = channels.iter().collect();
    if channels.is_empty() || unique.len() != channels.len() {
        return Err(Error::InvalidChannels {
            channels: channels.to_vec(),
        });
    }

    Ok(())
}

fn clean_audience(audience: Option<CampaignAudience>) -> Option<CampaignAudience> {
    audience.map(|mut audience| {
        audience.tags = audience
            .tags
            .into_iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        audience.tags.sort();
        audience.tags.dedup();
        let mut seen = HashSet::new();
        audience.contact_ids.retain(|contact_id| seen.insert(*contact_id));
        audience
    })
}

#[tracing::instrument(skip(db))]
pub async fn create_campaign(
    db: &dyn Database,
    user_id: UserId,
    new_campaign: NewCampaign,
) -> Result<Campaign, Error> {
    let name = validate_name(&new_campaign.name)?;
    validate_channels(&new_campaign.channels)?;

    let now = Utc::now();
    let campaign = Campaign {
        id: CampaignId::new(),
        user_id,
        name,
        description: new_campaign.description,
        channels: new_campaign.channels,
        status: CampaignStatus::Draft,
        content: new_campaign.content,
        audience: clean_audience(new_campaign.audience),
        schedule: new_campaign.schedule,
        is_ab_test: new_campaign.is_ab_test,
        winning_variant_id: None,
        failure_reason: None,
        scheduled_at: None,
        started_at: None,
        completed_at: None,
        created_at: now,
        modified_at: now,
    };

    db.campaigns().insert_campaign(&campaign).await?;

    info!("created campaign {}", campaign.id);

    Ok(campaign)
}

#[tracing::instrument(skip(db))]
pub async fn get_campaigns(db: &dyn Database, user_id: UserId) -> Result<Vec<Campaign>, Error> {
    let campaigns = db.campaigns().fetch_campaigns_by_user(user_id).await?;

    Ok(campaigns)
}

#[tracing::instrument(skip(db))]
pub async fn get_campaign_by_id(
    db: &dyn Database,
    user_id: UserId,
    campaign_id: CampaignId,
) -> Result<Campaign, Error> {
    let campaign = db
        .campaigns()
        .fetch_campaign_by_id(user_id, campaign_id)
        .await?
        .ok_or(Error::CampaignNotFound { campaign_id })?;

    Ok(campaign)
}

pub fn ensure_editable(campaign: &Campaign) -> Result<(), Error> {
    if campaign.status != CampaignStatus::Draft {
        return Err(Error::CampaignNotEditable {
            campaign_id: campaign.id,
            status: campaign.status,
        });
    }

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn update_campaign(
    db: &dyn Database,
    mut campaign: Campaign,
    update: CampaignUpdate,
) -> Result<Campaign, Error> {
    ensure_editable(&campaign)?;
    let name = validate_name(&update.name)?;
    validate_channels(&update.channels)?;

    campaign.name = name;
    campaign.description = update.description;
    campaign.channels = update.channels;
    campaign.content = update.content;
    campaign.audience = clean_audience(update.audience);
    campaign.schedule = update.schedule;
    campaign.is_ab_test = update.is_ab_test;

    db.campaigns().update_campaign(campaign).await
}

/// Deletes a campaign that is not in flight, along with its variants,
/// messages, delivery attempts and analytics.
#[tracing::instrument(skip(db))]
pub async fn delete_campaign(db: &dyn Database, campaign: Campaign) -> Result<(), Error> {
    if matches!(
        campaign.status,
        CampaignStatus::Running | CampaignStatus::Paused
    ) {
        return Err(Error::CampaignIsActive {
            campaign_id: campaign.id,
            status: campaign.status,
        });
    }

    let user_id = campaign.user_id;
    let mut removed = 0;
    removed += db.attempts().delete_attempts_by_campaign(user_id, campaign.id).await?;
    removed += db.messages().delete_messages_by_campaign(user_id, campaign.id).await?;
    removed += db.analytics().delete_analytics_by_campaign(user_id, campaign.id).await?;
    removed += db.variants().delete_variants_by_campaign(user_id, campaign.id).await?;
    db.campaigns().delete_campaign(user_id, campaign.id).await?;

    info!("deleted campaign {} and {} related records", campaign.id, removed);

    Ok(())
}

fn transition(campaign: &mut Campaign, to: CampaignStatus) -> Result<(), Error> {
    if !campaign.status.can_transition_to(to) {
        return Err(Error::InvalidCampaignTransition {
            campaign_id: campaign.id,
            from: campaign.status,
            to,
        });
    }

    campaign.status = to;
    Ok(())
}

/// Checks that the campaign has everything it needs to go out: content, a
/// non-empty audience and, for A/B tests, active variants that split the
/// traffic completely.
async fn ensure_ready(db: &dyn Database, campaign: &Campaign) -> Result<(), Error> {
    if campaign.content.is_none() {
        return Err(Error::CampaignContentMissing {
            campaign_id: campaign.id,
        });
    }

    if campaign.audience.as_ref().map_or(true, |a| a.is_empty()) {
        return Err(Error::CampaignAudienceMissing {
            campaign_id: campaign.id,
        });
    }

    if campaign.is_ab_test {
        let variants = db
            .variants()
            .fetch_variants_by_campaign(campaign.user_id, campaign.id)
            .await?;

        let total = variant::active_traffic(&variants);
        if total != 100 {
            return Err(Error::VariantTrafficIncomplete {
                campaign_id: campaign.id,
                total,
            });
        }
    }

    Ok(())
}

/// Moves a draft to SCHEDULED. Uses `send_at` when given, otherwise the
/// campaign's own schedule; the time must be in the future.
#[tracing::instrument(skip(db))]
pub async fn schedule_campaign(
    db: &dyn Database,
    mut campaign: Campaign,
    send_at: Option<DateTime<Utc>>,
) -> Result<Campaign, Error> {
    let send_at = send_at
        .or_else(|| campaign.schedule.as_ref().map(|s| s.send_at))
        .ok_or(Error::CampaignScheduleMissing {
            campaign_id: campaign.id,
        })?;

    if send_at <= Utc::now() {
        return Err(Error::ScheduleInPast {
            campaign_id: campaign.id,
            send_at,
        });
    }

    ensure_ready(db, &campaign).await?;
    transition(&mut campaign, CampaignStatus::Scheduled)?;

    let timezone = campaign.schedule.take().and_then(|s| s.timezone);
    campaign.schedule = Some(CampaignSchedule { send_at, timezone });
    campaign.scheduled_at = Some(send_at);

    db.campaigns().update_campaign(campaign).await
}

#[tracing::instrument(skip(db))]
pub async fn unschedule_campaign(db: &dyn Database, mut campaign: Campaign) -> Result<Campaign, Error> {
    if campaign.status != CampaignStatus::Scheduled {
        return Err(Error::InvalidCampaignTransition {
            campaign_id: campaign.id,
            from: campaign.status,
            to: CampaignStatus::Draft,
        });
    }

    transition(&mut campaign, CampaignStatus::Draft)?;
    campaign.scheduled_at = None;

    db.campaigns().update_campaign(campaign).await
}

#[tracing::instrument(skip(db))]
pub async fn start_campaign(db: &dyn Database, mut campaign: Campaign) -> Result<Campaign, Error> {
    if !matches!(
        campaign.status,
        CampaignStatus::Draft | CampaignStatus::Scheduled
    ) {
        return Err(Error::InvalidCampaignTransition {
            campaign_id: campaign.id,
            from: campaign.status,
            to: CampaignStatus::Running,
        });
    }

    ensure_ready(db, &campaign).await?;
    transition(&mut campaign, CampaignStatus::Running)?;
    campaign.started_at = Some(Utc::now());

    let campaign = db.campaigns().update_campaign(campaign).await?;

    info!("started campaign {}", campaign.id);

    Ok(campaign)
}

#[tracing::instrument(skip(db))]
pub async fn pause_campaign(db: &dyn Database, mut campaign: Campaign) -> Result<Campaign, Error> {
    transition(&mut campaign, CampaignStatus::Paused)?;

    db.campaigns().update_campaign(campaign).await
}

#[tracing::instrument(skip(db))]
pub async fn resume_campaign(db: &dyn Database, mut campaign: Campaign) -> Result<Campaign, Error> {
    if campaign.status != CampaignStatus::Paused {
        return Err(Error::InvalidCampaignTransition {
            campaign_id: campaign.id,
            from: campaign.status,
            to: CampaignStatus::Running,
        });
    }

    transition(&mut campaign, CampaignStatus::Running)?;

    db.campaigns().update_campaign(campaign).await
}

/// Completes the campaign. An A/B campaign without a declared winner gets
/// the active variant with the best conversion rate.
#[tracing::instrument(skip(db))]
pub async fn complete_campaign(db: &dyn Database, mut campaign: Campaign) -> Result<Campaign, Error> {
    transition(&mut campaign, CampaignStatus::Completed)?;
    campaign.completed_at = Some(Utc::now());

    if campaign.is_ab_test && campaign.winning_variant_id.is_none() {
        campaign.winning_variant_id = pick_winner(db, &campaign).await?;
    }

    let campaign = db.campaigns().update_campaign(campaign).await?;

    info!("completed campaign {}", campaign.id);

    Ok(campaign)
}

#[tracing::instrument(skip(db))]
pub async fn fail_campaign(
    db: &dyn Database,
    mut campaign: Campaign,
    reason: String,
) -> Result<Campaign, Error> {
    transition(&mut campaign, CampaignStatus::Failed)?;
    campaign.completed_at = Some(Utc::now());
    campaign.failure_reason = Some(reason);

    db.campaigns().update_campaign(campaign).await
}

#[tracing::instrument(skip(db))]
pub async fn cancel_campaign(db: &dyn Database, mut campaign: Campaign) -> Result<Campaign, Error> {
    transition(&mut campaign, CampaignStatus::Cancelled)?;
    campaign.completed_at = Some(Utc::now());

    db.campaigns().update_campaign(campaign).await
}

async fn pick_winner(db: &dyn Database, campaign: &Campaign) -> Result<Option<VariantId>, Error> {
    let variants = db
        .variants()
        .fetch_variants_by_campaign(campaign.user_id, campaign.id)
        .await?;
    let analytics =
        analytics::manager::get_variant_analytics(db, campaign.user_id, campaign.id).await?;

    let winner = variants
        .iter()
        .filter(|v| v.is_active)
        .map(|v| {
            let counters = analytics
                .iter()
                .find(|a| a.variant_id == v.id)
                .map(|a| a.counters)
                .unwrap_or_default();
            (v.id, counters)
        })
        .max_by(|(_, a), (_, b)| {
            a.conversion_rate()
                .partial_cmp(&b.conversion_rate())
                .unwrap_or(Ordering::Equal)
                .then(a.delivered.cmp(&b.delivered))
        })
        .map(|(id, _)| id);

    Ok(winner)
}

#[tracing::instrument(skip(db))]
pub async fn declare_winner(
    db: &dyn Database,
    mut campaign: Campaign,
    variant_id: VariantId,
) -> Result<Campaign, Error> {
    if !campaign.is_ab_test {
        return Err(Error::CampaignNotAbTest {
            campaign_id: campaign.id,
        });
    }

    if !matches!(
        campaign.status,
        CampaignStatus::Running | CampaignStatus::Paused | CampaignStatus::Completed
    ) {
        return Err(Error::CannotDeclareWinner {
            campaign_id: campaign.id,
            status: campaign.status,
        });
    }

    let variant =
        variant::manager::get_variant_by_id(db, campaign.user_id, campaign.id, variant_id).await?;
    campaign.winning_variant_id = Some(variant.id);

    db.campaigns().update_campaign(campaign).await
}

/// The contacts the campaign targets: every listed contact plus every
/// contact carrying one of the audience tags. Listed ids that no longer
/// exist are skipped.
#[tracing::instrument(skip(db))]
pub async fn resolve_audience(db: &dyn Database, campaign: &Campaign) -> Result<Vec<Contact>, Error> {
    let audience = match &campaign.audience {
        Some(audience) => audience,
        None => return Ok(Vec::new()),
    };

    let contacts = db.contacts().fetch_contacts_by_user(campaign.user_id).await?;

    Ok(contacts
        .into_iter()
        .filter(|c| {
            audience.contact_ids.contains(&c.id) || c.tags.iter().any(|t| audience.tags.contains(t))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::AnalyticsEvent;
    use crate::contact::manager::{create_contact, NewContact};
    use crate::contact::ContactId;
    use crate::database::MemoryDatabase;
    use crate::variant::manager::{create_variant, NewVariant};
    use chrono::Duration;

    fn content() -> CampaignContent {
        CampaignContent {
            subject: None,
            body: "Spring sale!".into(),
            media_urls: vec![],
        }
    }

    fn new_campaign(is_ab_test: bool) -> NewCampaign {
        NewCampaign {
            name: "Spring".into(),
            description: None,
            channels: vec![Channel::Sms],
            content: Some(content()),
            audience: Some(CampaignAudience {
                contact_ids: vec![],
                tags: vec!["VIP".into()],
            }),
            schedule: None,
            is_ab_test,
        }
    }

    fn new_variant(name: &str, traffic_percentage: u8) -> NewVariant {
        NewVariant {
            name: name.into(),
            content: content(),
            traffic_percentage,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn campaign_starts_as_draft() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();

        let campaign = create_campaign(&db, user_id, new_campaign(false)).await.unwrap();

        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.audience.unwrap().tags, vec!["vip".to_string()]);
        assert_eq!(get_campaigns(&db, user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn audience_ids_are_deduplicated_in_order() {
        let db = MemoryDatabase::new();
        let first = ContactId::new();
        let second = ContactId::new();
        let mut campaign = new_campaign(false);
        campaign.audience = Some(CampaignAudience {
            contact_ids: vec![first, second, first, second, first],
            tags: vec!["vip".into(), " VIP ".into()],
        });

        let campaign = create_campaign(&db, UserId::new(), campaign).await.unwrap();

        let audience = campaign.audience.unwrap();
        assert_eq!(audience.contact_ids, vec![first, second]);
        assert_eq!(audience.tags, vec!["vip".to_string()]);
    }

    #[tokio::test]
    async fn channels_must_be_non_empty_and_unique() {
        let db = MemoryDatabase::new();
        let mut campaign = new_campaign(false);
        campaign.channels = vec![Channel::Sms, Channel::Sms];

        let result = create_campaign(&db, UserId::new(), campaign.clone()).await;
        assert_eq!(
            result.unwrap_err(),
            Error::InvalidChannels {
                channels: vec![Channel::Sms, Channel::Sms]
            }
        );

        campaign.channels = vec![];
        let result = create_campaign(&db, UserId::new(), campaign).await;
        assert_eq!(result.unwrap_err(), Error::InvalidChannels { channels: vec![] });
    }

    #[tokio::test]
    async fn schedule_sets_scheduled_at_and_unschedule_clears_it() {
        let db = MemoryDatabase::new();
        let campaign = create_campaign(&db, UserId::new(), new_campaign(false)).await.unwrap();
        let send_at = Utc::now() + Duration::hours(1);

        let campaign = schedule_campaign(&db, campaign, Some(send_at)).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);
        assert_eq!(campaign.scheduled_at, Some(send_at));

        let campaign = unschedule_campaign(&db, campaign).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.scheduled_at, None);
    }

    #[tokio::test]
    async fn schedule_in_the_past_is_rejected() {
        let db = MemoryDatabase::new();
        let campaign = create_campaign(&db, UserId::new(), new_campaign(false)).await.unwrap();
        let send_at = Utc::now() - Duration::minutes(1);

        let result = schedule_campaign(&db, campaign.clone(), Some(send_at)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::ScheduleInPast {
                campaign_id: campaign.id,
                send_at,
            }
        );
    }

    #[tokio::test]
    async fn schedule_without_time_is_rejected() {
        let db = MemoryDatabase::new();
        let campaign = create_campaign(&db, UserId::new(), new_campaign(false)).await.unwrap();

        let result = schedule_campaign(&db, campaign.clone(), None).await;

        assert_eq!(
            result.unwrap_err(),
            Error::CampaignScheduleMissing {
                campaign_id: campaign.id
            }
        );
    }

    #[tokio::test]
    async fn start_requires_content_and_audience() {
        let db = MemoryDatabase::new();
        let mut new = new_campaign(false);
        new.content = None;
        let campaign = create_campaign(&db, UserId::new(), new).await.unwrap();

        let result = start_campaign(&db, campaign.clone()).await;
        assert_eq!(
            result.unwrap_err(),
            Error::CampaignContentMissing {
                campaign_id: campaign.id
            }
        );

        let mut new = new_campaign(false);
        new.audience = Some(CampaignAudience::default());
        let campaign = create_campaign(&db, UserId::new(), new).await.unwrap();

        let result = start_campaign(&db, campaign.clone()).await;
        assert_eq!(
            result.unwrap_err(),
            Error::CampaignAudienceMissing {
                campaign_id: campaign.id
            }
        );
    }

    #[tokio::test]
    async fn ab_campaign_needs_full_traffic_to_start() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let campaign = create_campaign(&db, user_id, new_campaign(true)).await.unwrap();
        create_variant(&db, &campaign, new_variant("A", 50)).await.unwrap();

        let result = start_campaign(&db, campaign.clone()).await;
        assert_eq!(
            result.unwrap_err(),
            Error::VariantTrafficIncomplete {
                campaign_id: campaign.id,
                total: 50,
            }
        );

        create_variant(&db, &campaign, new_variant("B", 50)).await.unwrap();
        let campaign = start_campaign(&db, campaign).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Running);
        assert!(campaign.started_at.is_some());
    }

    #[tokio::test]
    async fn lifecycle_runs_through_pause_to_completion() {
        let db = MemoryDatabase::new();
        let campaign = create_campaign(&db, UserId::new(), new_campaign(false)).await.unwrap();

        let campaign = start_campaign(&db, campaign).await.unwrap();
        let campaign = pause_campaign(&db, campaign).await.unwrap();
        let campaign = resume_campaign(&db, campaign).await.unwrap();
        let campaign = complete_campaign(&db, campaign).await.unwrap();

        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert!(campaign.completed_at.is_some());

        let result = cancel_campaign(&db, campaign.clone()).await;
        assert_eq!(
            result.unwrap_err(),
            Error::InvalidCampaignTransition {
                campaign_id: campaign.id,
                from: CampaignStatus::Completed,
                to: CampaignStatus::Cancelled,
            }
        );
    }

    #[tokio::test]
    async fn failure_records_the_reason() {
        let db = MemoryDatabase::new();
        let campaign = create_campaign(&db, UserId::new(), new_campaign(false)).await.unwrap();
        let campaign = start_campaign(&db, campaign).await.unwrap();

        let campaign = fail_campaign(&db, campaign, "provider outage".into())
            .await
            .unwrap();

        assert_eq!(campaign.status, CampaignStatus::Failed);
        assert_eq!(campaign.failure_reason.as_deref(), Some("provider outage"));
        assert!(campaign.completed_at.is_some());
    }

    #[tokio::test]
    async fn only_drafts_are_editable() {
        let db = MemoryDatabase::new();
        let campaign = create_campaign(&db, UserId::new(), new_campaign(false)).await.unwrap();
        let campaign = start_campaign(&db, campaign).await.unwrap();
        let update = CampaignUpdate {
            name: "Renamed".into(),
            description: None,
            channels: vec![Channel::Email],
            content: Some(content()),
            audience: None,
            schedule: None,
            is_ab_test: false,
        };

        let result = update_campaign(&db, campaign.clone(), update).await;

        assert_eq!(
            result.unwrap_err(),
            Error::CampaignNotEditable {
                campaign_id: campaign.id,
                status: CampaignStatus::Running,
            }
        );
    }

    #[tokio::test]
    async fn running_campaign_cannot_be_deleted() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let campaign = create_campaign(&db, user_id, new_campaign(false)).await.unwrap();
        let campaign = start_campaign(&db, campaign).await.unwrap();

        let result = delete_campaign(&db, campaign.clone()).await;
        assert_eq!(
            result.unwrap_err(),
            Error::CampaignIsActive {
                campaign_id: campaign.id,
                status: CampaignStatus::Running,
            }
        );

        let campaign = complete_campaign(&db, campaign).await.unwrap();
        delete_campaign(&db, campaign).await.unwrap();
        assert!(get_campaigns(&db, user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_variants_and_analytics() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let campaign = create_campaign(&db, user_id, new_campaign(true)).await.unwrap();
        let variant = create_variant(&db, &campaign, new_variant("A", 100)).await.unwrap();
        analytics::manager::record_event(
            &db,
            user_id,
            campaign.id,
            Some(variant.id),
            AnalyticsEvent::Queued,
        )
        .await
        .unwrap();

        delete_campaign(&db, campaign.clone()).await.unwrap();

        let variants = db
            .variants()
            .fetch_variants_by_campaign(user_id, campaign.id)
            .await
            .unwrap();
        assert!(variants.is_empty());
        let analytics = analytics::manager::get_variant_analytics(&db, user_id, campaign.id)
            .await
            .unwrap();
        assert!(analytics.is_empty());
    }

    #[tokio::test]
    async fn completion_picks_best_converting_variant() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let campaign = create_campaign(&db, user_id, new_campaign(true)).await.unwrap();
        let a = create_variant(&db, &campaign, new_variant("A", 50)).await.unwrap();
        let b = create_variant(&db, &campaign, new_variant("B", 50)).await.unwrap();
        let campaign = start_campaign(&db, campaign).await.unwrap();

        let events = [
            (a.id, AnalyticsEvent::Delivered),
            (a.id, AnalyticsEvent::Delivered),
            (a.id, AnalyticsEvent::Converted),
            (b.id, AnalyticsEvent::Delivered),
            (b.id, AnalyticsEvent::Converted),
        ];
        for (variant_id, event) in events.iter().copied() {
            analytics::manager::record_event(&db, user_id, campaign.id, Some(variant_id), event)
                .await
                .unwrap();
        }

        let campaign = complete_campaign(&db, campaign).await.unwrap();

        assert_eq!(campaign.winning_variant_id, Some(b.id));
    }

    #[tokio::test]
    async fn winner_must_belong_to_the_campaign() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let campaign = create_campaign(&db, user_id, new_campaign(true)).await.unwrap();
        let other = create_campaign(&db, user_id, new_campaign(true)).await.unwrap();
        create_variant(&db, &campaign, new_variant("A", 100)).await.unwrap();
        let foreign = create_variant(&db, &other, new_variant("X", 100)).await.unwrap();
        let campaign = start_campaign(&db, campaign).await.unwrap();

        let result = declare_winner(&db, campaign.clone(), foreign.id).await;

        assert_eq!(
            result.unwrap_err(),
            Error::VariantNotFound {
                campaign_id: campaign.id,
                variant_id: foreign.id,
            }
        );
    }

    #[tokio::test]
    async fn winner_cannot_be_declared_on_a_draft() {
        let db = MemoryDatabase::new();
        let campaign = create_campaign(&db, UserId::new(), new_campaign(true)).await.unwrap();
        let variant = create_variant(&db, &campaign, new_variant("A", 100)).await.unwrap();

        let result = declare_winner(&db, campaign.clone(), variant.id).await;

        assert_eq!(
            result.unwrap_err(),
            Error::CannotDeclareWinner {
                campaign_id: campaign.id,
                status: CampaignStatus::Draft,
            }
        );
    }

    #[tokio::test]
    async fn audience_combines_ids_and_tags() {
        let db = MemoryDatabase::new();
        let user_id = UserId::new();
        let contact = |first: &str, phone: &str, tags: Vec<&str>| NewContact {
            first_name: first.into(),
            last_name: "Doe".into(),
            phone: Some(phone.into()),
            email: None,
            tags: tags.into_iter().map(String::from).collect(),
        };
        let listed = create_contact(&db, user_id, contact("Ann", "+15550100001", vec![]))
            .await
            .unwrap();
        let tagged = create_contact(&db, user_id, contact("Bob", "+15550100002", vec!["vip"]))
            .await
            .unwrap();
        create_contact(&db, user_id, contact("Cy", "+15550100003", vec!["other"]))
            .await
            .unwrap();
        let mut new = new_campaign(false);
        new.audience = Some(CampaignAudience {
            contact_ids: vec![listed.id],
            tags: vec!["VIP".into()],
        });
        let campaign = create_campaign(&db, user_id, new).await.unwrap();

        let audience = resolve_audience(&db, &campaign).await.unwrap();

        let mut ids: Vec<_> = audience.iter().map(|c| c.id).collect();
        ids.sort_by_key(|id| id.to_string());
        let mut expected = vec![listed.id, tagged.id];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(ids, expected);
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::campaign::manager::ensure_editable;
use crate::campaign::{Campaign, CampaignContent, CampaignId};
use crate::database::Database;
use crate::error::Error;
use crate::user::UserId;

use super::{active_traffic, CampaignVariant, VariantId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    pub content: CampaignContent,
    pub traffic_percentage: u8,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariantUpdate {
    pub name: String,
    pub content: CampaignContent,
    pub traffic_percentage: u8,
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn ensure_variants_editable(campaign: &Campaign) -> Result<(), Error> {
    if !campaign.is_ab_test {
        return Err(Error::CampaignNotAbTest {
            campaign_id: campaign.id,
        });
    }

    ensure_editable(campaign)
}

/// Rejects a variant whose share would push the campaign's active traffic
/// over 100.
async fn check_traffic(
    db: &dyn Database,
    campaign: &Campaign,
    variant_id: VariantId,
    traffic_percentage: u8,
    is_active: bool,
) -> Result<(), Error> {
    if traffic_percentage > 100 {
        return Err(Error::InvalidTrafficPercentage { traffic_percentage });
    }

    let others: Vec<CampaignVariant> = db
        .variants()
        .fetch_variants_by_campaign(campaign.user_id, campaign.id)
        .await?
        .into_iter()
        .filter(|v| v.id != variant_id)
        .collect();

    let mut total = active_traffic(&others);
    if is_active {
        total += u32::from(traffic_percentage);
    }

    if total > 100 {
        return Err(Error::VariantTrafficExceeded {
            campaign_id: campaign.id,
            total,
        });
    }

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn create_variant(
    db: &dyn Database,
    campaign: &Campaign,
    new_variant: NewVariant,
) -> Result<CampaignVariant, Error> {
    ensure_variants_editable(campaign)?;

    let id = VariantId::new();
    check_traffic(
        db,
        campaign,
        id,
        new_variant.traffic_percentage,
        new_variant.is_active,
    )
    .await?;

    let now = Utc::now();
    let variant = CampaignVariant {
        id,
        user_id: campaign.user_id,
        campaign_id: campaign.id,
        name: new_variant.name.trim().to_string(),
        content: new_variant.content,
        traffic_percentage: new_variant.traffic_percentage,
        is_active: new_variant.is_active,
        created_at: now,
        modified_at: now,
    };

    db.variants().insert_variant(&variant).await?;

    Ok(variant)
}

#[tracing::instrument(skip(db))]
pub async fn get_variants(
    db: &dyn Database,
    campaign: &Campaign,
) -> Result<Vec<CampaignVariant>, Error> {
    let variants = db
        .variants()
        .fetch_variants_by_campaign(campaign.user_id, campaign.id)
        .await?;

    Ok(variants)
}

#[tracing::instrument(skip(db))]
pub async fn get_variant_by_id(
    db: &dyn Database,
    user_id: UserId,
    campaign_id: CampaignId,
    variant_id: VariantId,
) -> Result<CampaignVariant, Error> {
    let variant = db
        .variants()
        .fetch_variant_by_id(user_id, campaign_id, variant_id)
        .await?
        .ok_or(Error::VariantNotFound {
            campaign_id,
            variant_id,
        })?;

    Ok(variant)
}

#[tracing::instrument(skip(db))]
pub async fn update_variant(
    db: &dyn Database,
    campaign: &Campaign,
    mut variant: CampaignVariant,
    update: VariantUpdate,
) -> Result<CampaignVariant, Error> {
    ensure_variants_editable(campaign)?;
    check_traffic(
        db,
        campaign,
        variant.id,
        update.traffic_percentage,
        update.is_active,
    )
    .await?;

    variant.name = update.name.trim().to_string();
    variant.content = update.content;
    variant.traffic_percentage = update.traffic_percentage;
    variant.is_active = update.is_active;

    db.variants().update_variant(variant).await
}

#[tracing::instrument(skip(db))]
pub async fn delete_variant(
    db: &dyn Database,
    campaign: &Campaign,
    variant: CampaignVariant,
) -> Result<(), Error> {
    ensure_variants_editable(campaign)?;

    db.variants()
        .delete_variant(variant.user_id, variant.id)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::manager::{create_campaign, start_campaign, NewCampaign};
    use crate::campaign::{CampaignAudience, CampaignStatus};
    use crate::channel::Channel;
    use crate::database::MemoryDatabase;

    fn content(body: &str) -> CampaignContent {
        CampaignContent {
            subject: None,
            body: body.into(),
            media_urls: vec![],
        }
    }

    async fn ab_campaign(db: &MemoryDatabase, is_ab_test: bool) -> Campaign {
        let new_campaign = NewCampaign {
            name: "Launch".into(),
            description: None,
            channels: vec![Channel::Email],
            content: Some(content("Hello")),
            audience: Some(CampaignAudience {
                contact_ids: vec![],
                tags: vec!["all".into()],
            }),
            schedule: None,
            is_ab_test,
        };
        create_campaign(db, UserId::new(), new_campaign).await.unwrap()
    }

    fn variant(name: &str, traffic_percentage: u8, is_active: bool) -> NewVariant {
        NewVariant {
            name: name.into(),
            content: content(name),
            traffic_percentage,
            is_active,
        }
    }

    #[tokio::test]
    async fn variants_need_an_ab_campaign() {
        let db = MemoryDatabase::new();
        let campaign = ab_campaign(&db, false).await;

        let result = create_variant(&db, &campaign, variant("A", 50, true)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::CampaignNotAbTest {
                campaign_id: campaign.id
            }
        );
    }

    #[tokio::test]
    async fn active_traffic_cannot_exceed_100() {
        let db = MemoryDatabase::new();
        let campaign = ab_campaign(&db, true).await;
        create_variant(&db, &campaign, variant("A", 70, true)).await.unwrap();

        let result = create_variant(&db, &campaign, variant("B", 40, true)).await;
        assert_eq!(
            result.unwrap_err(),
            Error::VariantTrafficExceeded {
                campaign_id: campaign.id,
                total: 110,
            }
        );

        create_variant(&db, &campaign, variant("C", 40, false)).await.unwrap();
        assert_eq!(get_variants(&db, &campaign).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn traffic_over_100_is_invalid_on_its_own() {
        let db = MemoryDatabase::new();
        let campaign = ab_campaign(&db, true).await;

        let result = create_variant(&db, &campaign, variant("A", 101, false)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::InvalidTrafficPercentage {
                traffic_percentage: 101
            }
        );
    }

    #[tokio::test]
    async fn update_does_not_count_the_variant_twice() {
        let db = MemoryDatabase::new();
        let campaign = ab_campaign(&db, true).await;
        let a = create_variant(&db, &campaign, variant("A", 60, true)).await.unwrap();
        create_variant(&db, &campaign, variant("B", 40, true)).await.unwrap();

        let update = VariantUpdate {
            name: "A2".into(),
            content: content("A2"),
            traffic_percentage: 60,
            is_active: true,
        };
        let updated = update_variant(&db, &campaign, a, update).await.unwrap();

        assert_eq!(updated.name, "A2");
    }

    #[tokio::test]
    async fn variants_are_frozen_once_the_campaign_runs() {
        let db = MemoryDatabase::new();
        let campaign = ab_campaign(&db, true).await;
        let a = create_variant(&db, &campaign, variant("A", 100, true)).await.unwrap();
        let campaign = start_campaign(&db, campaign).await.unwrap();

        let result = delete_variant(&db, &campaign, a).await;

        assert_eq!(
            result.unwrap_err(),
            Error::CampaignNotEditable {
                campaign_id: campaign.id,
                status: CampaignStatus::Running,
            }
        );
    }

    #[tokio::test]
    async fn variant_lookup_is_scoped_to_campaign() {
        let db = MemoryDatabase::new();
        let campaign = ab_campaign(&db, true).await;
        let a = create_variant(&db, &campaign, variant("A", 100, true)).await.unwrap();
        let other = CampaignId::new();

        let result = get_variant_by_id(&db, campaign.user_id, other, a.id).await;

        assert_eq!(
            result.unwrap_err(),
            Error::VariantNotFound {
                campaign_id: other,
                variant_id: a.id,
            }
        );
    }
}

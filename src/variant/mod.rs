use chrono::{DateTime, Utc};
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::campaign::{CampaignContent, CampaignId};
use crate::database::record;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type VariantId = TypedId<CampaignVariant>;

/// One arm of an A/B campaign with its own content and share of traffic.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CampaignVariant {
    #[serde(rename = "_id")]
    pub id: VariantId,
    pub user_id: UserId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub content: CampaignContent,
    pub traffic_percentage: u8,
    pub is_active: bool,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for CampaignVariant {
    fn tag() -> &'static str {
        "VAR"
    }
}

record!(CampaignVariant, versioned);

/// Sum of the traffic shares of the active variants.
pub fn active_traffic(variants: &[CampaignVariant]) -> u32 {
    variants
        .iter()
        .filter(|v| v.is_active)
        .map(|v| u32::from(v.traffic_percentage))
        .sum()
}

/// Picks an active variant with probability proportional to its traffic
/// share. Returns `None` when no active variant has any traffic.
pub fn allocate<R: Rng + ?Sized>(variants: &[CampaignVariant], rng: &mut R) -> Option<VariantId> {
    let active: Vec<&CampaignVariant> = variants.iter().filter(|v| v.is_active).collect();
    let weights = active.iter().map(|v| u32::from(v.traffic_percentage));
    let index = WeightedIndex::new(weights).ok()?;

    Some(active[index.sample(rng)].id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn variant(traffic_percentage: u8, is_active: bool) -> CampaignVariant {
        let now = Utc::now();
        CampaignVariant {
            id: VariantId::new(),
            user_id: UserId::new(),
            campaign_id: CampaignId::new(),
            name: "A".into(),
            content: CampaignContent {
                subject: None,
                body: "Hello".into(),
                media_urls: vec![],
            },
            traffic_percentage,
            is_active,
            created_at: now,
            modified_at: now,
        }
    }

    #[test]
    fn inactive_variants_do_not_count_towards_traffic() {
        let variants = vec![variant(60, true), variant(40, false), variant(30, true)];

        assert_eq!(active_traffic(&variants), 90);
    }

    #[test]
    fn allocation_never_picks_inactive_or_zero_traffic_variants() {
        let variants = vec![variant(0, true), variant(100, false), variant(100, true)];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            assert_eq!(allocate(&variants, &mut rng), Some(variants[2].id));
        }
    }

    #[test]
    fn allocation_follows_traffic_shares() {
        let variants = vec![variant(80, true), variant(20, true)];
        let mut rng = StdRng::seed_from_u64(42);

        let picks = (0..10_000)
            .filter(|_| allocate(&variants, &mut rng) == Some(variants[0].id))
            .count();

        assert!((7_500..8_500).contains(&picks), "picked A {} times", picks);
    }

    #[test]
    fn allocation_without_traffic_is_none() {
        let variants = vec![variant(0, true)];

        assert_eq!(allocate(&variants, &mut rand::thread_rng()), None);
    }
}

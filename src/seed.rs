use chrono::{Duration, Utc};
use tracing::info;

use crate::campaign::manager::NewCampaign;
use crate::campaign::{self, CampaignAudience, CampaignContent, CampaignSchedule};
use crate::channel::Channel;
use crate::consent::{self, ConsentSource};
use crate::contact::manager::NewContact;
use crate::contact::{self, Contact};
use crate::database::Database;
use crate::error::Error;
use crate::keyword::manager::NewKeyword;
use crate::keyword::{self, KeywordAction};
use crate::provider::manager::{NewProvider, NewRoutingConfig};
use crate::provider::{self, RetryStrategy};
use crate::ratelimit::manager::NewRateLimit;
use crate::ratelimit::{self, RateLimitSubject};
use crate::user::{self, User};
use crate::variant;
use crate::variant::manager::NewVariant;

pub const DEMO_EMAIL: &str = "demo@outreach.dev";

/// Wipes the database and loads a demo tenant with a few contacts, an SMS
/// route, a keyword, and two campaigns (one of them an A/B test).
pub async fn seed(db: &dyn Database) -> Result<User, Error> {
    db.drop().await?;

    let user = user::manager::register_user(
        db,
        DEMO_EMAIL.to_string(),
        Some("Green Bean Coffee".to_string()),
    )
    .await?;

    let people = [
        ("Ada", "Lovelace", "+15550100001", "ada@example.com", "vip"),
        ("Grace", "Hopper", "+15550100002", "grace@example.com", "vip"),
        ("Alan", "Turing", "+15550100003", "alan@example.com", "newsletter"),
    ];

    let mut contacts: Vec<Contact> = Vec::new();
    for (first_name, last_name, phone, email, tag) in people.iter() {
        let contact = contact::manager::create_contact(
            db,
            user.id,
            NewContact {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                phone: Some(phone.to_string()),
                email: Some(email.to_string()),
                tags: vec![tag.to_string()],
            },
        )
        .await?;

        for channel in [Channel::Sms, Channel::Email].iter() {
            consent::manager::grant_consent(db, &contact, *channel, ConsentSource::Import, None)
                .await?;
        }

        contacts.push(contact);
    }

    let primary = provider::manager::create_provider(
        db,
        user.id,
        NewProvider {
            name: "twilio".to_string(),
            channel: Channel::Sms,
            provider_type: "TWILIO".to_string(),
            is_active: true,
        },
    )
    .await?;

    let fallback = provider::manager::create_provider(
        db,
        user.id,
        NewProvider {
            name: "vonage".to_string(),
            channel: Channel::Sms,
            provider_type: "VONAGE".to_string(),
            is_active: true,
        },
    )
    .await?;

    provider::manager::set_routing_config(
        db,
        user.id,
        Channel::Sms,
        NewRoutingConfig {
            primary_provider_id: primary.id,
            fallback_provider_ids: vec![fallback.id],
            retry_strategy: Some(RetryStrategy::Exponential),
            max_retries: Some(3),
            initial_backoff_ms: Some(1_000),
            max_backoff_ms: Some(60_000),
            backoff_multiplier: Some(2.0),
            is_active: true,
        },
    )
    .await?;

    ratelimit::manager::create_rate_limit(
        db,
        user.id,
        NewRateLimit {
            subject: RateLimitSubject::Provider {
                provider_id: primary.id,
            },
            max_requests: 100,
            time_window_seconds: 60,
        },
    )
    .await?;

    keyword::manager::create_keyword(
        db,
        user.id,
        NewKeyword {
            word: "beans".to_string(),
            action: KeywordAction::OptIn,
            response_message: Some("Welcome to Green Bean Coffee deals!".to_string()),
            is_active: true,
        },
    )
    .await?;

    campaign::manager::create_campaign(
        db,
        user.id,
        NewCampaign {
            name: "Weekly roast".to_string(),
            description: Some("Newsletter for the weekly roast".to_string()),
            channels: vec![Channel::Email],
            content: Some(CampaignContent {
                subject: Some("This week's roast".to_string()),
                body: "Our Ethiopian Yirgacheffe is back.".to_string(),
                media_urls: vec![],
            }),
            audience: Some(CampaignAudience {
                contact_ids: vec![],
                tags: vec!["newsletter".to_string()],
            }),
            schedule: Some(CampaignSchedule {
                send_at: Utc::now() + Duration::days(7),
                timezone: Some("America/New_York".to_string()),
            }),
            is_ab_test: false,
        },
    )
    .await?;

    let ab_test = campaign::manager::create_campaign(
        db,
        user.id,
        NewCampaign {
            name: "VIP flash sale".to_string(),
            description: None,
            channels: vec![Channel::Sms],
            content: Some(CampaignContent {
                subject: None,
                body: "20% off all beans today only.".to_string(),
                media_urls: vec![],
            }),
            audience: Some(CampaignAudience {
                contact_ids: contacts.iter().map(|c| c.id).collect(),
                tags: vec![],
            }),
            schedule: None,
            is_ab_test: true,
        },
    )
    .await?;

    for (name, body) in [
        ("Percent off", "20% off all beans today only."),
        ("Free shipping", "Free shipping on every bag today only."),
    ]
    .iter()
    {
        variant::manager::create_variant(
            db,
            &ab_test,
            NewVariant {
                name: name.to_string(),
                content: CampaignContent {
                    subject: None,
                    body: body.to_string(),
                    media_urls: vec![],
                },
                traffic_percentage: 50,
                is_active: true,
            },
        )
        .await?;
    }

    info!(user_id = %user.id, contacts = contacts.len(), "seeded demo data");

    Ok(user)
}

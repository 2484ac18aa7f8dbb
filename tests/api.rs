use actix_web::http::header::AUTHORIZATION;
use actix_web::http::StatusCode;
use actix_web::web::{self, Data};
use actix_web::{test, App};
use chrono::Duration;
use serde_json::Value;

use outreach::analytics::CampaignAnalyticsBody;
use outreach::auth::TokenService;
use outreach::campaign::manager::NewCampaign;
use outreach::campaign::{CampaignAudience, CampaignBody, CampaignContent, CampaignStatus};
use outreach::channel::Channel;
use outreach::consent::{ConsentChangeBody, ConsentSource};
use outreach::contact::manager::NewContact;
use outreach::contact::ContactBody;
use outreach::database::{Database, MemoryDatabase};
use outreach::keyword::manager::{InboundAction, InboundMessage, InboundReply};
use outreach::message::manager::{EnqueueRequest, NewAttempt, SkipReason};
use outreach::message::{
    AttemptOutcome, AttemptResultBody, EngagementBody, EngagementKind, EnqueueSummaryBody,
    MessageBody, MessageStatus,
};
use outreach::suppression::SuppressionCheckBody;
use outreach::user::{RegisterUserBody, RegisteredUserBody};

fn state() -> (Data<Box<dyn Database>>, Data<TokenService>) {
    let db: Box<dyn Database> = Box::new(MemoryDatabase::new());
    let tokens = TokenService::new("integration-secret", Duration::minutes(5));

    (Data::new(db), Data::new(tokens))
}

macro_rules! init_app {
    () => {{
        let (db, tokens) = state();
        test::init_service(
            App::new()
                .app_data(db)
                .app_data(tokens)
                .configure(outreach::configure)
                .default_service(web::to(outreach::path_not_found)),
        )
        .await
    }};
}

fn bearer(token: &str) -> (actix_web::http::header::HeaderName, String) {
    (AUTHORIZATION, format!("Bearer {}", token))
}

fn new_contact(phone: &str) -> NewContact {
    NewContact {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        phone: Some(phone.into()),
        email: None,
        tags: vec!["vip".into()],
    }
}

fn sms_campaign(contact: &ContactBody) -> NewCampaign {
    NewCampaign {
        name: "Flash sale".into(),
        description: None,
        channels: vec![Channel::Sms],
        content: Some(CampaignContent {
            subject: None,
            body: "20% off today".into(),
            media_urls: vec![],
        }),
        audience: Some(CampaignAudience {
            contact_ids: vec![contact.id],
            tags: vec![],
        }),
        schedule: None,
        is_ab_test: false,
    }
}

#[actix_rt::test]
async fn health_and_unknown_paths() {
    let app = init_app!();

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/nowhere").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "E4041000");
}

#[actix_rt::test]
async fn resource_routes_require_a_bearer_token() {
    let app = init_app!();

    let req = test::TestRequest::get().uri("/campaigns").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/campaigns")
        .insert_header(bearer("not-a-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "E4011001");
}

#[actix_rt::test]
async fn malformed_json_uses_the_error_format() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/users")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"email\":")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "E4001000");
}

#[actix_rt::test]
async fn campaign_delivery_flow() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/users")
        .set_json(&RegisterUserBody {
            email: "Owner@Shop.com".into(),
            company_name: Some("Shop".into()),
        })
        .to_request();
    let registered: RegisteredUserBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(registered.user.email, "owner@shop.com");
    let token = registered.token;

    let req = test::TestRequest::post()
        .uri("/contacts")
        .insert_header(bearer(&token))
        .set_json(&new_contact("+15550100001"))
        .to_request();
    let contact: ContactBody = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/contacts/{}/consents/SMS/grant", contact.id))
        .insert_header(bearer(&token))
        .set_json(&ConsentChangeBody {
            source: ConsentSource::WebForm,
            note: None,
        })
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/campaigns")
        .insert_header(bearer(&token))
        .set_json(&sms_campaign(&contact))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(campaign.status, CampaignStatus::Draft);

    let req = test::TestRequest::post()
        .uri(&format!("/campaigns/{}/start", campaign.id))
        .insert_header(bearer(&token))
        .to_request();
    let started: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(started.status, CampaignStatus::Running);
    assert!(started.started_at.is_some());

    let req = test::TestRequest::post()
        .uri(&format!("/campaigns/{}/messages", campaign.id))
        .insert_header(bearer(&token))
        .set_json(&EnqueueRequest::default())
        .to_request();
    let summary: EnqueueSummaryBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(summary.queued.len(), 1);
    assert!(summary.skipped.is_empty());
    let message = &summary.queued[0];
    assert_eq!(message.address, "+15550100001");
    assert_eq!(message.status, MessageStatus::Queued);

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/attempts", message.id))
        .insert_header(bearer(&token))
        .set_json(&NewAttempt {
            provider_name: "twilio".into(),
            outcome: AttemptOutcome::Succeeded,
            provider_message_id: Some("SM123".into()),
            error: None,
            fallback_reason: None,
        })
        .to_request();
    let result: AttemptResultBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(result.message.status, MessageStatus::Sent);
    assert_eq!(result.attempt.attempt_number, 1);

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/delivered", message.id))
        .insert_header(bearer(&token))
        .to_request();
    let delivered: MessageBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(delivered.status, MessageStatus::Delivered);

    let req = test::TestRequest::post()
        .uri(&format!("/messages/{}/events", message.id))
        .insert_header(bearer(&token))
        .set_json(&EngagementBody {
            kind: EngagementKind::Opened,
            occurred_at: None,
        })
        .to_request();
    let opened: MessageBody = test::call_and_read_body_json(&app, req).await;
    assert!(opened.opened_at.is_some());

    let req = test::TestRequest::get()
        .uri(&format!("/campaigns/{}/analytics", campaign.id))
        .insert_header(bearer(&token))
        .to_request();
    let analytics: CampaignAnalyticsBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(analytics.counters.queued, 1);
    assert_eq!(analytics.counters.sent, 1);
    assert_eq!(analytics.counters.delivered, 1);
    assert_eq!(analytics.counters.opened, 1);

    // a running campaign cannot be deleted
    let req = test::TestRequest::delete()
        .uri(&format!("/campaigns/{}", campaign.id))
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_rt::test]
async fn inbound_stop_suppresses_the_sender() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/users")
        .set_json(&RegisterUserBody {
            email: "owner@shop.com".into(),
            company_name: None,
        })
        .to_request();
    let registered: RegisteredUserBody = test::call_and_read_body_json(&app, req).await;
    let token = registered.token;

    let req = test::TestRequest::post()
        .uri("/contacts")
        .insert_header(bearer(&token))
        .set_json(&new_contact("+15550100002"))
        .to_request();
    let contact: ContactBody = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/contacts/{}/consents/SMS/grant", contact.id))
        .insert_header(bearer(&token))
        .set_json(&ConsentChangeBody {
            source: ConsentSource::Api,
            note: None,
        })
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/keywords/inbound")
        .insert_header(bearer(&token))
        .set_json(&InboundMessage {
            from: "+15550100002".into(),
            body: "stop please".into(),
        })
        .to_request();
    let reply: InboundReply = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reply.action, Some(InboundAction::OptOut));
    assert_eq!(reply.contact_id, Some(contact.id));

    let req = test::TestRequest::get()
        .uri("/suppressions/check?address=%2B15550100002&channel=SMS")
        .insert_header(bearer(&token))
        .to_request();
    let check: SuppressionCheckBody = test::call_and_read_body_json(&app, req).await;
    assert!(check.suppressed);

    let req = test::TestRequest::post()
        .uri("/campaigns")
        .insert_header(bearer(&token))
        .set_json(&sms_campaign(&contact))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/campaigns/{}/start", campaign.id))
        .insert_header(bearer(&token))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/campaigns/{}/messages", campaign.id))
        .insert_header(bearer(&token))
        .set_json(&EnqueueRequest::default())
        .to_request();
    let summary: EnqueueSummaryBody = test::call_and_read_body_json(&app, req).await;
    assert!(summary.queued.is_empty());
    assert_eq!(summary.skipped.len(), 1);
    assert!(matches!(
        summary.skipped[0].reason,
        SkipReason::Ineligible { .. }
    ));
}

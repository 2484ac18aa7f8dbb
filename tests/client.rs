use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};
use chrono::Duration;

use outreach::auth::TokenService;
use outreach::campaign::manager::NewCampaign;
use outreach::campaign::{CampaignContent, CampaignStatus};
use outreach::channel::Channel;
use outreach::client::{ApiClient, AuthenticationService, CampaignApiService};
use outreach::database::{Database, MemoryDatabase};

/// Starts the service on an ephemeral port and returns its base url.
fn spawn_server() -> String {
    let db: Box<dyn Database> = Box::new(MemoryDatabase::new());
    let db = Data::new(db);
    let tokens = Data::new(TokenService::new("client-secret", Duration::minutes(5)));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db.clone())
            .app_data(tokens.clone())
            .configure(outreach::configure)
            .default_service(web::to(outreach::path_not_found))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());

    format!("http://{}", addr)
}

#[actix_rt::test]
async fn register_then_manage_campaigns() {
    let mut client = ApiClient::new(spawn_server());

    let mut auth = AuthenticationService::new(&mut client);
    let registered = auth.register("owner@shop.com", Some("Shop")).await;
    assert!(registered.success, "{:?}", registered.message);
    assert!(auth.is_authenticated());

    let me = auth.current_user().await;
    assert_eq!(me.data.unwrap().email, "owner@shop.com");

    let campaigns = CampaignApiService::new(&client);
    let created = campaigns
        .create_campaign(&NewCampaign {
            name: "Weekly roast".into(),
            description: None,
            channels: vec![Channel::Email],
            content: Some(CampaignContent {
                subject: Some("Roast".into()),
                body: "Fresh beans".into(),
                media_urls: vec![],
            }),
            audience: None,
            schedule: None,
            is_ab_test: false,
        })
        .await;
    let campaign = created.data.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Draft);

    let listed = campaigns.get_campaigns().await;
    assert_eq!(listed.data.unwrap().len(), 1);

    let started = campaigns.start_campaign(campaign.id).await;
    assert!(!started.success);
    assert!(started.data.is_none());
    assert!(started.message.unwrap().starts_with("E4091012"));

    let cancelled = campaigns.cancel_campaign(campaign.id).await;
    assert_eq!(cancelled.data.unwrap().status, CampaignStatus::Cancelled);

    let deleted = campaigns.delete_campaign(campaign.id).await;
    assert!(deleted.success);
    assert!(campaigns.get_campaigns().await.data.unwrap().is_empty());
}

#[actix_rt::test]
async fn failures_come_back_as_envelopes() {
    let client = ApiClient::new(spawn_server());

    let campaigns = CampaignApiService::new(&client);
    let unauthenticated = campaigns.get_campaigns().await;
    assert!(!unauthenticated.success);
    assert!(unauthenticated.message.unwrap().starts_with("E4011000"));

    let unreachable = ApiClient::new("http://127.0.0.1:1");
    let response = CampaignApiService::new(&unreachable).get_campaigns().await;
    assert!(!response.success);
    assert!(response.message.is_some());
}

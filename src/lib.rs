use actix_web::web::{FormConfig, JsonConfig, PathConfig, QueryConfig, ServiceConfig};
use actix_web::{get, HttpResponse, ResponseError};
use mongodb::Client;
use tracing::info;

pub mod address;
pub mod analytics;
pub mod auth;
pub mod campaign;
pub mod channel;
pub mod client;
pub mod compliance;
pub mod consent;
pub mod contact;
pub mod database;
pub mod error;
pub mod keyword;
pub mod logging;
pub mod message;
pub mod provider;
pub mod ratelimit;
pub mod seed;
pub mod settings;
pub mod suppression;
pub mod typedid;
pub mod user;
pub mod variant;
pub mod violations;

use crate::database::{Database, MemoryDatabase, MongoDatabase};
use crate::error::Error;
use crate::settings::{DatabaseBackend, DatabaseSettings};

/// Opens the configured backend. MongoDB is pinged and its indexes created
/// before it is handed out.
pub async fn connect(settings: &DatabaseSettings) -> Result<Box<dyn Database>, Error> {
    match settings.backend {
        DatabaseBackend::Memory => {
            info!("using in-memory database");
            Ok(Box::new(MemoryDatabase::new()))
        }
        DatabaseBackend::Mongodb => {
            info!("connecting to db: {}", settings.uri);
            let db = Client::with_uri_str(&settings.uri)
                .await?
                .database(&settings.name);

            db.run_command(mongodb::bson::doc! { "ping": 1 }, None)
                .await?;

            Ok(Box::new(MongoDatabase::initialize(db).await?))
        }
    }
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub async fn path_not_found() -> HttpResponse {
    Error::PathNotFound.error_response()
}

/// Registers the extractor error formats and every route. Literal segments
/// are registered ahead of the `{id}` routes they share a prefix with.
pub fn configure(cfg: &mut ServiceConfig) {
    cfg.app_data(JsonConfig::default().error_handler(|err, _req| {
        // format json errors with custom format
        Error::InvalidJson(err).into()
    }))
    .app_data(PathConfig::default().error_handler(|err, _req| {
        // format path errors with custom format
        Error::InvalidPath(err).into()
    }))
    .app_data(FormConfig::default().error_handler(|err, _req| {
        // format form errors with custom format
        Error::InvalidForm(err).into()
    }))
    .app_data(QueryConfig::default().error_handler(|err, _req| {
        // format query errors with custom format
        Error::InvalidQuery(err).into()
    }))
    .service(health)
    .service(user::endpoints::register_user)
    .service(user::endpoints::get_current_user)
    .service(user::endpoints::refresh_token)
    .service(user::endpoints::delete_current_user)
    .service(campaign::endpoints::create_campaign)
    .service(campaign::endpoints::get_campaigns)
    .service(campaign::endpoints::get_campaign_by_id)
    .service(campaign::endpoints::update_campaign)
    .service(campaign::endpoints::delete_campaign)
    .service(campaign::endpoints::schedule_campaign)
    .service(campaign::endpoints::unschedule_campaign)
    .service(campaign::endpoints::start_campaign)
    .service(campaign::endpoints::pause_campaign)
    .service(campaign::endpoints::resume_campaign)
    .service(campaign::endpoints::complete_campaign)
    .service(campaign::endpoints::fail_campaign)
    .service(campaign::endpoints::cancel_campaign)
    .service(campaign::endpoints::declare_winner)
    .service(analytics::endpoints::get_campaign_analytics)
    .service(variant::endpoints::create_variant)
    .service(variant::endpoints::get_variants)
    .service(variant::endpoints::get_variant_by_id)
    .service(variant::endpoints::update_variant)
    .service(variant::endpoints::delete_variant)
    .service(message::endpoints::enqueue_messages)
    .service(message::endpoints::get_messages)
    .service(message::endpoints::get_message_by_id)
    .service(message::endpoints::record_attempt)
    .service(message::endpoints::get_attempts)
    .service(message::endpoints::mark_delivered)
    .service(message::endpoints::mark_failed)
    .service(message::endpoints::record_engagement)
    .service(contact::endpoints::create_contact)
    .service(contact::endpoints::get_contacts)
    .service(contact::endpoints::get_contact_by_id)
    .service(contact::endpoints::update_contact)
    .service(contact::endpoints::delete_contact)
    .service(contact::endpoints::get_frequency_control)
    .service(contact::endpoints::set_frequency_caps)
    .service(consent::endpoints::get_consents)
    .service(consent::endpoints::get_consent_history)
    .service(consent::endpoints::grant_consent)
    .service(consent::endpoints::revoke_consent)
    .service(consent::endpoints::request_consent)
    .service(compliance::endpoints::check_eligibility)
    .service(compliance::endpoints::get_audit_log)
    .service(compliance::endpoints::create_rule)
    .service(compliance::endpoints::get_rules)
    .service(compliance::endpoints::get_rule_by_id)
    .service(compliance::endpoints::update_rule)
    .service(compliance::endpoints::activate_rule)
    .service(compliance::endpoints::deactivate_rule)
    .service(compliance::endpoints::delete_rule)
    .service(compliance::endpoints::get_rule_audits)
    .service(suppression::endpoints::add_suppression)
    .service(suppression::endpoints::get_suppressions)
    .service(suppression::endpoints::check_suppression)
    .service(suppression::endpoints::get_suppression_by_id)
    .service(suppression::endpoints::remove_suppression)
    .service(provider::endpoints::create_provider)
    .service(provider::endpoints::get_providers)
    .service(provider::endpoints::get_provider_by_id)
    .service(provider::endpoints::update_provider)
    .service(provider::endpoints::delete_provider)
    .service(provider::endpoints::get_routing_configs)
    .service(provider::endpoints::get_routing_config)
    .service(provider::endpoints::set_routing_config)
    .service(provider::endpoints::delete_routing_config)
    .service(provider::endpoints::resolve_route)
    .service(ratelimit::endpoints::create_rate_limit)
    .service(ratelimit::endpoints::get_rate_limits)
    .service(ratelimit::endpoints::get_rate_limit_by_id)
    .service(ratelimit::endpoints::update_rate_limit)
    .service(ratelimit::endpoints::delete_rate_limit)
    .service(ratelimit::endpoints::acquire)
    .service(keyword::endpoints::create_keyword)
    .service(keyword::endpoints::get_keywords)
    .service(keyword::endpoints::handle_inbound)
    .service(keyword::endpoints::get_keyword_by_id)
    .service(keyword::endpoints::update_keyword)
    .service(keyword::endpoints::delete_keyword);
}

use std::io::{Error as IoError, ErrorKind};

use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

use outreach::auth::TokenService;
use outreach::settings::Settings;
use outreach::{logging, seed};

#[actix_web::main]
async fn main() -> Result<(), IoError> {
    let settings = Settings::load().map_err(|err| IoError::new(ErrorKind::InvalidInput, err))?;
    logging::init(&settings.logging);

    let db = outreach::connect(&settings.database)
        .await
        .map_err(|err| IoError::new(ErrorKind::Other, err.to_string()))?;

    let tokens = TokenService::from_settings(&settings.auth);

    if settings.seed.enabled {
        warn!("seeding replaces all stored data");
        let user = seed::seed(&*db)
            .await
            .map_err(|err| IoError::new(ErrorKind::Other, err.to_string()))?;
        let token = tokens
            .issue(user.id)
            .map_err(|err| IoError::new(ErrorKind::Other, err.to_string()))?;
        info!(user_id = %user.id, %token, "demo tenant ready");
    }

    let db = Data::new(db);
    let tokens = Data::new(tokens);
    let bind_address = settings.bind_address();
    info!("listening on {}:{}", bind_address.0, bind_address.1);

    HttpServer::new(move || {
        App::new()
            .app_data(db.clone())
            .app_data(tokens.clone())
            .wrap(TracingLogger::default())
            .configure(outreach::configure)
            .default_service(web::to(outreach::path_not_found))
    })
    .bind(bind_address)?
    .run()
    .await
}

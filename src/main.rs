pub mod config;
pub mod db;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod service;

use std::{io, sync::Arc};

use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use sqlx::{postgres::Postgres, Pool};

use config::Config;
use db::{init_db_pool, PgStore};
use service::{
    auth::{jwt::JwtIdentity, AuthMiddleware},
    log::{init_logger, LoggerMiddleware},
    notify::OutboxNotifier,
    stripe::StripeClient,
    AppState,
};

type PGPool = Pool<Postgres>;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, err);
    io::Error::new(io::ErrorKind::Other, format!("{context}: {err}"))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    init_logger();

    let config = Config::from_env().map_err(|e| startup_error("invalid configuration", e))?;
    let pool: PGPool = init_db_pool(&config)
        .await
        .map_err(|e| startup_error("failed to connect to postgresql", e))?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| startup_error("failed to run migrations", e))?;

    let processor =
        StripeClient::new(&config).map_err(|e| startup_error("failed to build http client", e))?;
    let state = AppState {
        store: Arc::new(PgStore::new(pool.clone())),
        processor: Arc::new(processor),
        identity: Arc::new(JwtIdentity::new(
            &config.jwt_secret,
            config.jwt_audience.as_deref(),
        )),
        notifier: Arc::new(OutboxNotifier::new(pool)),
    };

    info!("listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .app_data(web::Data::new(state.clone()))
            .service(web::scope("/api/webhooks").configure(handlers::payment::init_webhook_routes))
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware {
                        identity: state.identity.clone(),
                    })
                    .configure(handlers::init_api_routes),
            )
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await
}

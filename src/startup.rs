use actix_web::dev::Server;
use actix_web::error::JsonPayloadError;
use actix_web::{middleware::Logger, web, App, HttpRequest, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, RefreshTokenLedger, TokenCodec};
use crate::configuration::{Settings, StorageBackend};
use crate::database::{
    InMemoryLedgerStore, InMemoryUserStore, LedgerStore, PgLedgerStore, PgUserStore, UserStore,
};
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::routes::{health_check, index, login, profile, refresh, signup};

/// Wire up the auth flows against the configured storage backend.
///
/// # Errors
/// Returns error if the JWT settings are unusable or the database pool
/// cannot be created
pub async fn build_auth_service(settings: &Settings) -> Result<AuthService, AppError> {
    let tokens = TokenCodec::new(&settings.jwt)?;

    let (users, ledger_store): (Arc<dyn UserStore>, Arc<dyn LedgerStore>) =
        match settings.application.storage {
            StorageBackend::Postgres => {
                tracing::info!("Attempting to connect to database");
                let pool = PgPoolOptions::new()
                    .max_connections(settings.database.max_connections)
                    .connect(&settings.database.connection_string())
                    .await?;
                tracing::info!("Database connection pool created successfully");

                (
                    Arc::new(PgUserStore::new(pool.clone())),
                    Arc::new(PgLedgerStore::new(pool)),
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; accounts and sessions are lost on restart");
                (
                    Arc::new(InMemoryUserStore::default()),
                    Arc::new(InMemoryLedgerStore::default()),
                )
            }
        };

    Ok(AuthService::new(
        users,
        RefreshTokenLedger::new(ledger_store),
        tokens,
    ))
}

/// Undecodable JSON bodies get the same structured error as any other
/// validation failure; the serde message is only logged.
fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(path = %req.path(), error = %err, "Rejected request body");
    AppError::from(ValidationError::MalformedBody).into()
}

pub fn run(listener: TcpListener, service: AuthService) -> Result<Server, std::io::Error> {
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .wrap(Logger::default())
            .app_data(service.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .route("/", web::get().to(index))
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::get().to(refresh))
                    .route("/refresh", web::post().to(refresh))
                    .route("/profile", web::get().to(profile)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

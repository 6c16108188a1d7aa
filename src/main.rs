use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;

use attendance_tracker::config::Config;
use attendance_tracker::docs::ApiDoc;
use attendance_tracker::gateway::MySqlGateway;
use attendance_tracker::routes;
use attendance_tracker::utils::email_index::EmailIndex;

use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance Tracker"
}

/// Pretty DEBUG logs to a daily rolling `logs/app.log`. Keep the guard alive
/// for the life of the process or buffered lines are lost.
fn init_tracing() -> WorkerGuard {
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    guard
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env();
    let _guard = init_tracing();

    info!(addr = %config.server_addr, "Attendance tracker starting");

    let gateway = MySqlGateway::connect(&config.database_url, config.gateway_auth_per_min).await?;
    let email_index = Data::new(EmailIndex::new());

    // until this finishes, sign-up checks that miss the cache ask the database
    let gateway_for_warmup = gateway.clone();
    let index_for_warmup = email_index.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = index_for_warmup.warmup(&gateway_for_warmup, 250).await {
            error!(error = %e, "Failed to warm up email index");
        }
    });

    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(gateway.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(email_index.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}

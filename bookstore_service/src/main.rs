use std::sync::Arc;

use actix_web::{App, HttpServer};
use anyhow::Context;
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use bookstore_service::app_config::{config_app, json_config, path_config, query_config};
use bookstore_service::auth::AccessPolicy;
use bookstore_service::identity::{
    IdentityProvider, InMemoryIdentityProvider, RemoteIdentityProvider,
};
use bookstore_service::repository::{
    InMemoryRepository, ItemsRepository, NotificationsRepository, PostgresRepository,
    PostgresRepositoryConfig, SalesRepository, SqliteRepository,
};
use bookstore_service::settings::{IdentitySettings, Settings, StoreSettings};

// Based on https://github.com/LukeMathWalker/tracing-actix-web/blob/main/examples/opentelemetry/src/main.rs#L15
fn init_telemetry() -> anyhow::Result<()> {
    let app_name = "bookstore_service";

    // Spans are exported to Jaeger in batches
    global::set_text_map_propagator(TraceContextPropagator::new());
    #[allow(deprecated)]
    let tracer = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(app_name)
        .install_batch(TokioCurrentThread)
        .context("Failed to install OpenTelemetry tracer.")?;

    // Tunable via `RUST_LOG` env variable
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
    let formatting_layer = BunyanFormattingLayer::new(app_name.into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(telemetry)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install `tracing` subscriber.")
}

/// One backend seen through each repository trait
#[derive(Clone)]
struct Stores {
    items: Arc<dyn ItemsRepository>,
    sales: Arc<dyn SalesRepository>,
    notifications: Arc<dyn NotificationsRepository>,
}

fn shared<R>(repository: R) -> Stores
where
    R: ItemsRepository + SalesRepository + NotificationsRepository + 'static,
{
    let repository = Arc::new(repository);
    Stores {
        items: repository.clone(),
        sales: repository.clone(),
        notifications: repository,
    }
}

async fn init_store(store: &StoreSettings) -> anyhow::Result<Stores> {
    Ok(match store {
        StoreSettings::InMemory => {
            tracing::info!("Using in-memory store");
            shared(InMemoryRepository::default())
        }
        StoreSettings::Sqlite { path } => {
            tracing::info!("Using sqlite store at {}", path);
            shared(SqliteRepository::init(path)?)
        }
        StoreSettings::Postgres {
            hostname,
            username,
            password,
        } => shared(
            PostgresRepository::init(PostgresRepositoryConfig {
                hostname: hostname.clone(),
                username: username.clone(),
                password: password.clone(),
            })
            .await?,
        ),
    })
}

fn init_identity(identity: &IdentitySettings) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    let provider: Arc<dyn IdentityProvider> = match identity {
        IdentitySettings::InMemory { seed_admin: None } => {
            Arc::new(InMemoryIdentityProvider::default())
        }
        IdentitySettings::InMemory {
            seed_admin: Some(seed),
        } => Arc::new(InMemoryIdentityProvider::with_admin(seed.clone())),
        IdentitySettings::Remote { url } => {
            tracing::info!("Using identity provider at {}", url);
            Arc::new(RemoteIdentityProvider::new(url)?)
        }
    };
    Ok(provider)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry()?;
    let settings = Settings::load()?;

    let stores = init_store(&settings.store).await?;
    let identity = init_identity(&settings.auth.identity)?;
    let policy = AccessPolicy {
        item_writes: settings.auth.item_writes,
    };
    let base_path = settings.server.base_path.clone();

    tracing::info!(
        "Starting HTTP server at http://{}:{}{}",
        settings.server.host,
        settings.server.port,
        base_path
    );

    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(web::Data::new(stores.items.clone()))
            .app_data(web::Data::new(stores.sales.clone()))
            .app_data(web::Data::new(stores.notifications.clone()))
            .app_data(web::Data::new(identity.clone()))
            .app_data(web::Data::new(policy))
            .app_data(json_config())
            .app_data(path_config())
            .app_data(query_config())
            .wrap(TracingLogger::default())
            .configure(config_app(&base_path))
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await?;
    Ok(())
}

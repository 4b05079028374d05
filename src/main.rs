use std::{process, sync::Arc};

use pricebook::{
    application::{cache::ItemCache, error::AppError, items::ItemService, store::ItemStore},
    config,
    infra::{
        cache::RedisCache,
        db::PostgresStore,
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    serve(settings).await
}

async fn serve(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresStore::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresStore::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let store = PostgresStore::new(pool);

    let cache = RedisCache::connect(&settings.redis.url, settings.redis.pool_size.get() as usize)
        .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?;

    // A missing Redis must not block startup; reads fall back to the store
    // until the reconnect policy re-establishes the pool.
    match cache.init().await {
        Ok(()) => info!(target = "pricebook::serve", "Connected to redis"),
        Err(err) => warn!(
            target = "pricebook::serve",
            error = %err,
            "Redis unavailable at startup; item cache degraded to pass-through"
        ),
    }

    let item_store: Arc<dyn ItemStore> = Arc::new(store.clone());
    let item_cache: Arc<dyn ItemCache> = Arc::new(cache);
    let items = Arc::new(ItemService::new(item_store, item_cache).with_ttl(settings.cache.ttl));

    let router = http::build_router(AppState { items, db: store });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "pricebook::serve",
        addr = %settings.server.addr,
        "Serving HTTP"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

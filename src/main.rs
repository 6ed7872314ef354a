use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;

use translation_service::cache::{CacheStore, MemoryCacheStore, RedisCacheStore, TranslationCache};
use translation_service::services::{
    artifacts::{ArtifactStore, PgArtifactStore},
    distributor::Distributor,
    membership::PgParticipantDirectory,
    orchestrator::TranslationOrchestrator,
    resolver::LanguageResolver,
    translator::HttpTranslationClient,
};
use translation_service::websocket::{pubsub, ConnectionRegistry};
use translation_service::{config, db, error, handlers, logging, metrics, migrations, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Run embedded migrations (idempotent). Schema drift is fatal: the
    // uniqueness constraint on artifacts is a correctness mechanism.
    migrations::run_all(&db)
        .await
        .map_err(|e| error::AppError::StartServer(format!("database migrations failed: {e}")))?;

    // Redis is optional: without it the cache degrades to the in-memory
    // store and fan-out is local-only; the pull path still works.
    let redis_client = match redis::Client::open(cfg.redis_url.as_str()) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, "invalid REDIS_URL; running without redis");
            None
        }
    };

    let cache_store: Arc<dyn CacheStore> = match &redis_client {
        Some(client) => match RedisCacheStore::connect(client).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "redis unreachable; falling back to in-memory cache");
                Arc::new(MemoryCacheStore::new())
            }
        },
        None => Arc::new(MemoryCacheStore::new()),
    };
    let cache = TranslationCache::new(cache_store, cfg.cache_ttl_secs);

    let registry = ConnectionRegistry::new();
    let directory = Arc::new(PgParticipantDirectory::new(db.clone()));
    let resolver = Arc::new(LanguageResolver::new(directory, &cfg.default_language));
    let distributor = Arc::new(Distributor::new(
        registry.clone(),
        resolver.clone(),
        redis_client.clone(),
    ));

    let backend = Arc::new(
        HttpTranslationClient::new(&cfg.translator)
            .map_err(|e| error::AppError::StartServer(format!("translator client: {e}")))?,
    );
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(PgArtifactStore::new(db.clone()));

    let orchestrator = Arc::new(TranslationOrchestrator::new(
        resolver.clone(),
        cache,
        backend,
        artifacts.clone(),
        distributor.clone(),
        cfg.max_concurrent_translations,
        cfg.translator.preferred_tier,
        cfg.similarity_threshold,
    ));

    // Cross-instance fan-out listener; skips envelopes this instance
    // published itself.
    if let Some(client) = redis_client.clone() {
        let listener_registry = registry.clone();
        let instance_id = distributor.instance_id();
        tokio::spawn(async move {
            if let Err(e) = pubsub::start_psub_listener(client, listener_registry, instance_id).await
            {
                tracing::error!(error = %e, "redis pub/sub listener failed");
            }
        });
    }

    let state = AppState {
        db: db.clone(),
        registry,
        redis: redis_client,
        config: cfg.clone(),
        resolver,
        artifacts,
        orchestrator,
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting translation-service");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .wrap(actix_cors::Cors::permissive())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::messages::register_routes)
            .configure(handlers::websocket::register_routes)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}

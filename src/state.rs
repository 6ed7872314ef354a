use crate::{
    config::Config,
    services::{artifacts::ArtifactStore, orchestrator::TranslationOrchestrator, resolver::LanguageResolver},
    websocket::ConnectionRegistry,
};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: ConnectionRegistry,
    pub redis: Option<redis::Client>,
    pub config: Arc<Config>,
    pub resolver: Arc<LanguageResolver>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub orchestrator: Arc<TranslationOrchestrator>,
}

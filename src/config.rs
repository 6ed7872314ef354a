use dotenvy::dotenv;
use std::env;

use crate::models::ModelTier;

/// Connection details for the external translation inference capability.
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub preferred_tier: ModelTier,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub translator: TranslatorConfig,
    /// Lifetime of cached translations, in seconds.
    pub cache_ttl_secs: u64,
    /// Jaccard threshold for near-duplicate cache lookups.
    pub similarity_threshold: f32,
    /// Upper bound on concurrently running per-language translation units.
    pub max_concurrent_translations: usize,
    /// Assigned when a participant profile carries no system language.
    pub default_language: String,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let translator_base_url = env::var("TRANSLATOR_BASE_URL")
            .map_err(|_| crate::error::AppError::Config("TRANSLATOR_BASE_URL missing".into()))?;
        let translator_api_key = env::var("TRANSLATOR_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let translator_timeout_secs = env::var("TRANSLATOR_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let preferred_tier = env::var("TRANSLATOR_PREFERRED_TIER")
            .ok()
            .map(|v| ModelTier::parse(&v))
            .unwrap_or(ModelTier::Medium);

        let cache_ttl_secs = env::var("TRANSLATION_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);
        let similarity_threshold = env::var("TRANSLATION_SIMILARITY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.8);
        let max_concurrent_translations = env::var("MAX_CONCURRENT_TRANSLATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);
        let default_language =
            env::var("DEFAULT_LANGUAGE").unwrap_or_else(|_| "en".into());

        Ok(Self {
            database_url,
            redis_url,
            port,
            translator: TranslatorConfig {
                base_url: translator_base_url,
                api_key: translator_api_key,
                timeout_secs: translator_timeout_secs,
                preferred_tier,
            },
            cache_ttl_secs,
            similarity_threshold,
            max_concurrent_translations,
            default_language,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://127.0.0.1:6379/0".into(),
            port: 8080,
            translator: TranslatorConfig {
                base_url: "http://localhost:9090".into(),
                api_key: None,
                timeout_secs: 5,
                preferred_tier: ModelTier::Medium,
            },
            cache_ttl_secs: 3600,
            similarity_threshold: 0.8,
            max_concurrent_translations: 4,
            default_language: "en".into(),
        }
    }
}

use std::sync::Arc;
use std::time::Instant;

use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde_json::Value;

use crate::ballot::session::SessionStore;
use crate::config::{CacheConfig, CensusConfig};
use crate::tally::ResultsMode;

#[derive(Clone)]
pub struct AppState {
    pub database: Arc<DatabaseConnection>,
    pub cache: Arc<ApiCache>,
    pub sessions: Arc<SessionStore>,
    pub census: Arc<CensusConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        database: DatabaseConnection,
        cache: Arc<ApiCache>,
        sessions: Arc<SessionStore>,
        census: CensusConfig,
    ) -> Self {
        assert!(
            cache.results_capacity >= 10,
            "Results cache capacity must be configured"
        );
        Self {
            database: Arc::new(database),
            cache,
            sessions,
            census: Arc::new(census),
            start_time: Instant::now(),
        }
    }
}

pub struct ApiCache {
    /// Serialized results payloads keyed by (mode, election id)
    pub results: Cache<(ResultsMode, i64), Value>,
    pub results_capacity: u64,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.results_max_capacity >= 10,
            "Results cache capacity threshold"
        );

        let results = Cache::builder()
            .max_capacity(config.results_max_capacity)
            .time_to_live(config.results_ttl())
            .build();

        Self {
            results,
            results_capacity: config.results_max_capacity,
        }
    }

    /// Drops every cached payload of the election after a ballot lands.
    pub async fn invalidate_election(&self, election_id: i64) {
        for mode in [
            ResultsMode::ByTypeAndWeight,
            ResultsMode::SumOfWeights,
            ResultsMode::Totals,
            ResultsMode::PublicSumOfWeights,
        ] {
            self.results.invalidate(&(mode, election_id)).await;
        }
    }
}

pub fn session_store(config: &CacheConfig) -> SessionStore {
    SessionStore::new(config.sessions_max_capacity, config.sessions_ttl())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache_config() -> CacheConfig {
        CacheConfig {
            results_max_capacity: 100,
            results_ttl_seconds: 5,
            sessions_max_capacity: 100,
            sessions_ttl_seconds: 600,
        }
    }

    #[tokio::test]
    async fn invalidation_is_scoped_to_the_election() {
        let cache = ApiCache::new(&cache_config());
        cache.results.insert((ResultsMode::Totals, 1), json!({"id": 1})).await;
        cache.results.insert((ResultsMode::SumOfWeights, 1), json!({"id": 1})).await;
        cache.results.insert((ResultsMode::Totals, 2), json!({"id": 2})).await;

        cache.invalidate_election(1).await;

        assert!(cache.results.get(&(ResultsMode::Totals, 1)).await.is_none());
        assert!(cache.results.get(&(ResultsMode::SumOfWeights, 1)).await.is_none());
        assert!(cache.results.get(&(ResultsMode::Totals, 2)).await.is_some());
    }
}

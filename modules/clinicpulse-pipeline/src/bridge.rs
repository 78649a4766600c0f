// Wrapper to make the Postgres Store implement the engine's ScoreStore trait.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use clinicpulse_common::{EnrichedReview, EstablishmentScore};
use clinicpulse_engine::ScoreStore;
use clinicpulse_store::Store;

pub struct EngineStore {
    store: Store,
}

impl EngineStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ScoreStore for EngineStore {
    async fn enriched_establishments(&self) -> Result<Vec<Uuid>> {
        Ok(self.store.enriched_establishments().await?)
    }

    async fn corpus_enriched(
        &self,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<EnrichedReview>> {
        Ok(self.store.corpus_enriched(published_after).await?)
    }

    async fn enriched_for_establishment(
        &self,
        establishment_id: Uuid,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<EnrichedReview>> {
        Ok(self
            .store
            .enriched_for_establishment(establishment_id, published_after)
            .await?)
    }

    async fn upsert_score(&self, score: &EstablishmentScore) -> Result<()> {
        Ok(self.store.upsert_score(score).await?)
    }
}

use clinicpulse_common::EstablishmentScore;

use crate::error::StoreError;
use crate::{Result, Store};

/// Collection counts for the `stats` command.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub establishments: i64,
    pub raw_reviews: i64,
    pub unified_reviews: i64,
    pub enriched_reviews: i64,
    pub failed_enrichments: i64,
    pub scored_establishments: i64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Store Stats ===")?;
        writeln!(f, "Establishments:      {}", self.establishments)?;
        writeln!(f, "Raw reviews:         {}", self.raw_reviews)?;
        writeln!(f, "Unified reviews:     {}", self.unified_reviews)?;
        writeln!(f, "Enriched reviews:    {}", self.enriched_reviews)?;
        writeln!(f, "Failed enrichments:  {}", self.failed_enrichments)?;
        writeln!(f, "Scored:              {}", self.scored_establishments)?;
        let coverage = if self.unified_reviews > 0 {
            self.enriched_reviews as f64 / self.unified_reviews as f64 * 100.0
        } else {
            0.0
        };
        writeln!(f, "Enrichment coverage: {coverage:.1}%")
    }
}

impl Store {
    /// Atomically replace one establishment's score record. A single-row
    /// upsert, so a run failure leaves other establishments' scores valid.
    pub async fn upsert_score(&self, score: &EstablishmentScore) -> Result<()> {
        let attributes = serde_json::to_value(&score.attributes)
            .map_err(|e| StoreError::Other(e.into()))?;

        sqlx::query(
            r#"
            INSERT INTO establishment_scores
                (establishment_id, attributes, service_quality, communication,
                 total_reviews, computed_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (establishment_id) DO UPDATE SET
                attributes = EXCLUDED.attributes,
                service_quality = EXCLUDED.service_quality,
                communication = EXCLUDED.communication,
                total_reviews = EXCLUDED.total_reviews,
                computed_at = now()
            "#,
        )
        .bind(score.establishment_id)
        .bind(&attributes)
        .bind(score.service_quality)
        .bind(score.communication)
        .bind(score.total_reviews as i32)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let (establishments,): (i64,) = sqlx::query_as("SELECT count(*) FROM establishments")
            .fetch_one(self.pool())
            .await?;
        let (raw_reviews,): (i64,) = sqlx::query_as("SELECT count(*) FROM raw_reviews")
            .fetch_one(self.pool())
            .await?;
        let (unified_reviews,): (i64,) = sqlx::query_as("SELECT count(*) FROM unified_reviews")
            .fetch_one(self.pool())
            .await?;
        let (enriched_reviews,): (i64,) =
            sqlx::query_as("SELECT count(*) FROM enriched_reviews WHERE status = 'enriched'")
                .fetch_one(self.pool())
                .await?;
        let (failed_enrichments,): (i64,) =
            sqlx::query_as("SELECT count(*) FROM enriched_reviews WHERE status = 'failed'")
                .fetch_one(self.pool())
                .await?;
        let (scored_establishments,): (i64,) =
            sqlx::query_as("SELECT count(*) FROM establishment_scores")
                .fetch_one(self.pool())
                .await?;

        Ok(StoreStats {
            establishments,
            raw_reviews,
            unified_reviews,
            enriched_reviews,
            failed_enrichments,
            scored_establishments,
        })
    }
}

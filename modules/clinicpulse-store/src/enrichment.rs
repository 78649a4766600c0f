use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

use clinicpulse_common::{Attribute, EnrichedReview, EnrichmentStatus, ResponseQuality};

use crate::error::StoreError;
use crate::{Result, Store};

#[derive(Debug, FromRow)]
struct EnrichedReviewRow {
    review_id: Uuid,
    establishment_id: Uuid,
    attributes: serde_json::Value,
    is_complaint: bool,
    has_response: bool,
    response_quality: Option<String>,
    oracle_model: String,
    status: String,
    failure: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

impl TryFrom<EnrichedReviewRow> for EnrichedReview {
    type Error = StoreError;

    fn try_from(row: EnrichedReviewRow) -> Result<EnrichedReview> {
        let attributes: BTreeMap<Attribute, u8> = serde_json::from_value(row.attributes)
            .map_err(|e| StoreError::MalformedRow {
                review_id: row.review_id,
                reason: format!("bad attribute map: {e}"),
            })?;
        let response_quality = match row.response_quality.as_deref() {
            Some("constructive") => Some(ResponseQuality::Constructive),
            Some("not_constructive") => Some(ResponseQuality::NotConstructive),
            Some(other) => {
                return Err(StoreError::MalformedRow {
                    review_id: row.review_id,
                    reason: format!("bad response quality: {other}"),
                })
            }
            None => None,
        };
        let status: EnrichmentStatus =
            row.status.parse().map_err(|reason| StoreError::MalformedRow {
                review_id: row.review_id,
                reason,
            })?;

        Ok(EnrichedReview {
            review_id: row.review_id,
            establishment_id: row.establishment_id,
            attributes,
            is_complaint: row.is_complaint,
            has_response: row.has_response,
            response_quality,
            oracle_model: row.oracle_model,
            status,
            failure: row.failure,
            published_at: row.published_at,
        })
    }
}

const ENRICHED_COLUMNS: &str = r#"
    review_id, establishment_id, attributes, is_complaint, has_response,
    response_quality, oracle_model, status, failure, published_at
"#;

impl Store {
    /// Insert or replace one review's enrichment. A forced re-run with a
    /// newer oracle overwrites the previous annotation.
    pub async fn upsert_enriched(&self, enriched: &EnrichedReview) -> Result<()> {
        let attributes = serde_json::to_value(&enriched.attributes)
            .map_err(|e| StoreError::Other(e.into()))?;
        let response_quality = enriched
            .response_quality
            .map(|q| match q {
                ResponseQuality::Constructive => "constructive",
                ResponseQuality::NotConstructive => "not_constructive",
            });

        sqlx::query(
            r#"
            INSERT INTO enriched_reviews
                (review_id, establishment_id, attributes, is_complaint, has_response,
                 response_quality, oracle_model, status, failure, published_at, enriched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
            ON CONFLICT (review_id) DO UPDATE SET
                attributes = EXCLUDED.attributes,
                is_complaint = EXCLUDED.is_complaint,
                has_response = EXCLUDED.has_response,
                response_quality = EXCLUDED.response_quality,
                oracle_model = EXCLUDED.oracle_model,
                status = EXCLUDED.status,
                failure = EXCLUDED.failure,
                published_at = EXCLUDED.published_at,
                enriched_at = now()
            "#,
        )
        .bind(enriched.review_id)
        .bind(enriched.establishment_id)
        .bind(&attributes)
        .bind(enriched.is_complaint)
        .bind(enriched.has_response)
        .bind(response_quality)
        .bind(&enriched.oracle_model)
        .bind(enriched.status.as_str())
        .bind(&enriched.failure)
        .bind(enriched.published_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Ids already enriched (or marked failed; those stay excluded from
    /// selection until explicitly forced).
    pub async fn enriched_ids(&self) -> Result<HashSet<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT review_id FROM enriched_reviews")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Establishments with at least one successful enrichment.
    pub async fn enriched_establishments(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT establishment_id FROM enriched_reviews
            WHERE status = 'enriched'
            ORDER BY establishment_id
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// One establishment's successful enrichments. A malformed row fails the
    /// read; the scoring orchestrator turns that into a per-establishment skip.
    pub async fn enriched_for_establishment(
        &self,
        establishment_id: Uuid,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<EnrichedReview>> {
        let query = format!(
            r#"
            SELECT {ENRICHED_COLUMNS} FROM enriched_reviews
            WHERE establishment_id = $1 AND status = 'enriched'
              AND ($2::timestamptz IS NULL OR published_at >= $2)
            ORDER BY review_id
            "#
        );
        let rows = sqlx::query_as::<_, EnrichedReviewRow>(&query)
            .bind(establishment_id)
            .bind(published_after)
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(EnrichedReview::try_from).collect()
    }

    /// The full successful-enrichment corpus, for the prior-mean pass.
    /// Malformed rows are skipped with a warning; the prior is a corpus
    /// statistic and one bad row shouldn't sink the whole run.
    pub async fn corpus_enriched(
        &self,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<EnrichedReview>> {
        let query = format!(
            r#"
            SELECT {ENRICHED_COLUMNS} FROM enriched_reviews
            WHERE status = 'enriched'
              AND ($1::timestamptz IS NULL OR published_at >= $1)
            ORDER BY review_id
            "#
        );
        let rows = sqlx::query_as::<_, EnrichedReviewRow>(&query)
            .bind(published_after)
            .fetch_all(self.pool())
            .await?;

        let mut enriched = Vec::with_capacity(rows.len());
        for row in rows {
            let review_id = row.review_id;
            match EnrichedReview::try_from(row) {
                Ok(e) => enriched.push(e),
                Err(e) => warn!(review_id = %review_id, error = %e, "Skipping malformed enriched row in prior pass"),
            }
        }
        Ok(enriched)
    }
}

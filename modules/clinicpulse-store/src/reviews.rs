use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

use clinicpulse_common::{Platform, RawReview, UnifiedReview};

use crate::error::StoreError;
use crate::{Result, Store};

#[derive(Debug, FromRow)]
struct RawReviewRow {
    id: Uuid,
    establishment_id: Uuid,
    platform: String,
    native_id: String,
    rating: Option<f64>,
    title: Option<String>,
    body: Option<String>,
    language: Option<String>,
    published_at: Option<DateTime<Utc>>,
    owner_response: Option<String>,
    owner_responded_at: Option<DateTime<Utc>>,
    is_local_guide: bool,
    verification_level: Option<String>,
    payload: serde_json::Value,
    scraped_at: DateTime<Utc>,
}

impl TryFrom<RawReviewRow> for RawReview {
    type Error = StoreError;

    fn try_from(row: RawReviewRow) -> Result<RawReview> {
        let platform: Platform = row.platform.parse().map_err(|reason| {
            StoreError::MalformedRow {
                review_id: row.id,
                reason,
            }
        })?;
        Ok(RawReview {
            id: row.id,
            establishment_id: row.establishment_id,
            platform,
            native_id: row.native_id,
            rating: row.rating,
            title: row.title,
            body: row.body,
            language: row.language,
            published_at: row.published_at,
            owner_response: row.owner_response,
            owner_responded_at: row.owner_responded_at,
            is_local_guide: row.is_local_guide,
            verification_level: row.verification_level,
            payload: row.payload,
            scraped_at: row.scraped_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UnifiedReviewRow {
    review_id: Uuid,
    establishment_id: Uuid,
    platform: String,
    rating: Option<f64>,
    content: String,
    language: Option<String>,
    published_at: Option<DateTime<Utc>>,
    owner_response: Option<String>,
}

impl TryFrom<UnifiedReviewRow> for UnifiedReview {
    type Error = StoreError;

    fn try_from(row: UnifiedReviewRow) -> Result<UnifiedReview> {
        let platform: Platform = row.platform.parse().map_err(|reason| {
            StoreError::MalformedRow {
                review_id: row.review_id,
                reason,
            }
        })?;
        Ok(UnifiedReview {
            review_id: row.review_id,
            establishment_id: row.establishment_id,
            platform,
            rating: row.rating,
            content: row.content,
            language: row.language,
            published_at: row.published_at,
            owner_response: row.owner_response,
        })
    }
}

impl Store {
    /// Insert scraped reviews, ignoring ones already present under their
    /// stable (platform, native_id) key. Returns the number actually inserted.
    pub async fn insert_raw_reviews(&self, reviews: &[RawReview]) -> Result<u64> {
        let mut inserted = 0u64;
        for review in reviews {
            let result = sqlx::query(
                r#"
                INSERT INTO raw_reviews
                    (id, establishment_id, platform, native_id, rating, title, body,
                     language, published_at, owner_response, owner_responded_at,
                     is_local_guide, verification_level, payload, scraped_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (platform, native_id) DO NOTHING
                "#,
            )
            .bind(review.id)
            .bind(review.establishment_id)
            .bind(review.platform.as_str())
            .bind(&review.native_id)
            .bind(review.rating)
            .bind(&review.title)
            .bind(&review.body)
            .bind(&review.language)
            .bind(review.published_at)
            .bind(&review.owner_response)
            .bind(review.owner_responded_at)
            .bind(review.is_local_guide)
            .bind(&review.verification_level)
            .bind(&review.payload)
            .bind(review.scraped_at)
            .execute(self.pool())
            .await;

            match result {
                Ok(r) => inserted += r.rows_affected(),
                Err(e) => {
                    warn!(review_id = %review.id, error = %e, "Failed to insert raw review");
                }
            }
        }
        Ok(inserted)
    }

    /// (id, published_at) pairs for every raw review, optionally restricted to
    /// an establishment allow-list. Feeds the incremental selector.
    pub async fn raw_review_keys(
        &self,
        establishments: Option<&[Uuid]>,
    ) -> Result<Vec<(Uuid, Option<DateTime<Utc>>)>> {
        let rows: Vec<(Uuid, Option<DateTime<Utc>>)> = match establishments {
            Some(ids) => {
                sqlx::query_as(
                    "SELECT id, published_at FROM raw_reviews WHERE establishment_id = ANY($1)",
                )
                .bind(ids)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as("SELECT id, published_at FROM raw_reviews")
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn raw_reviews_by_ids(&self, ids: &[Uuid]) -> Result<Vec<RawReview>> {
        let rows = sqlx::query_as::<_, RawReviewRow>(
            r#"
            SELECT id, establishment_id, platform, native_id, rating, title, body,
                   language, published_at, owner_response, owner_responded_at,
                   is_local_guide, verification_level, payload, scraped_at
            FROM raw_reviews
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(RawReview::try_from).collect()
    }

    /// Ids already present downstream of the unifier.
    pub async fn unified_ids(&self) -> Result<HashSet<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT review_id FROM unified_reviews")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Upsert a batch of unified reviews. The unifier is deterministic, so
    /// replaying it over the same raw rows rewrites identical values.
    pub async fn upsert_unified(&self, reviews: &[UnifiedReview]) -> Result<u64> {
        let mut written = 0u64;
        for review in reviews {
            sqlx::query(
                r#"
                INSERT INTO unified_reviews
                    (review_id, establishment_id, platform, rating, content,
                     language, published_at, owner_response)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (review_id) DO UPDATE SET
                    rating = EXCLUDED.rating,
                    content = EXCLUDED.content,
                    language = EXCLUDED.language,
                    published_at = EXCLUDED.published_at,
                    owner_response = EXCLUDED.owner_response
                "#,
            )
            .bind(review.review_id)
            .bind(review.establishment_id)
            .bind(review.platform.as_str())
            .bind(review.rating)
            .bind(&review.content)
            .bind(&review.language)
            .bind(review.published_at)
            .bind(&review.owner_response)
            .execute(self.pool())
            .await?;
            written += 1;
        }
        Ok(written)
    }

    /// (id, published_at) pairs for unified reviews, with the optional
    /// allow-list and publication lower bound the selector supports.
    pub async fn unified_keys(
        &self,
        establishments: Option<&[Uuid]>,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Uuid, Option<DateTime<Utc>>)>> {
        let rows: Vec<(Uuid, Option<DateTime<Utc>>)> = match (establishments, published_after) {
            (Some(ids), Some(after)) => {
                sqlx::query_as(
                    r#"
                    SELECT review_id, published_at FROM unified_reviews
                    WHERE establishment_id = ANY($1) AND published_at >= $2
                    "#,
                )
                .bind(ids)
                .bind(after)
                .fetch_all(self.pool())
                .await?
            }
            (Some(ids), None) => {
                sqlx::query_as(
                    "SELECT review_id, published_at FROM unified_reviews WHERE establishment_id = ANY($1)",
                )
                .bind(ids)
                .fetch_all(self.pool())
                .await?
            }
            (None, Some(after)) => {
                sqlx::query_as(
                    "SELECT review_id, published_at FROM unified_reviews WHERE published_at >= $1",
                )
                .bind(after)
                .fetch_all(self.pool())
                .await?
            }
            (None, None) => {
                sqlx::query_as("SELECT review_id, published_at FROM unified_reviews")
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn unified_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UnifiedReview>> {
        let rows = sqlx::query_as::<_, UnifiedReviewRow>(
            r#"
            SELECT review_id, establishment_id, platform, rating, content,
                   language, published_at, owner_response
            FROM unified_reviews
            WHERE review_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(UnifiedReview::try_from).collect()
    }
}

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use clinicpulse_common::{Establishment, Platform};

use crate::{Result, Store};

#[derive(Debug, FromRow)]
struct EstablishmentRow {
    id: Uuid,
    display_name: String,
    google_url: String,
    website: String,
    trustpilot_domain: String,
    google_last_scraped: Option<DateTime<Utc>>,
    trustpilot_last_scraped: Option<DateTime<Utc>>,
}

impl From<EstablishmentRow> for Establishment {
    fn from(row: EstablishmentRow) -> Self {
        Establishment {
            id: row.id,
            display_name: row.display_name,
            google_url: row.google_url,
            website: row.website,
            trustpilot_domain: row.trustpilot_domain,
            google_last_scraped: row.google_last_scraped,
            trustpilot_last_scraped: row.trustpilot_last_scraped,
        }
    }
}

impl Store {
    /// Insert or refresh an establishment, keyed by its Google URL.
    /// Returns the persisted id (the existing one on conflict).
    pub async fn upsert_establishment(&self, est: &Establishment) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO establishments
                (id, display_name, google_url, website, trustpilot_domain)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (google_url) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                website = EXCLUDED.website,
                trustpilot_domain = EXCLUDED.trustpilot_domain,
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(est.id)
        .bind(&est.display_name)
        .bind(&est.google_url)
        .bind(&est.website)
        .bind(&est.trustpilot_domain)
        .fetch_one(self.pool())
        .await?;

        Ok(id)
    }

    /// All establishments, optionally restricted to an allow-list.
    pub async fn establishments(&self, ids: Option<&[Uuid]>) -> Result<Vec<Establishment>> {
        let rows = match ids {
            Some(ids) => {
                sqlx::query_as::<_, EstablishmentRow>(
                    r#"
                    SELECT id, display_name, google_url, website, trustpilot_domain,
                           google_last_scraped, trustpilot_last_scraped
                    FROM establishments
                    WHERE id = ANY($1)
                    ORDER BY display_name
                    "#,
                )
                .bind(ids)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, EstablishmentRow>(
                    r#"
                    SELECT id, display_name, google_url, website, trustpilot_domain,
                           google_last_scraped, trustpilot_last_scraped
                    FROM establishments
                    ORDER BY display_name
                    "#,
                )
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows.into_iter().map(Establishment::from).collect())
    }

    /// Record a completed scrape for one platform.
    pub async fn mark_scraped(
        &self,
        establishment_id: Uuid,
        platform: Platform,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let query = match platform {
            Platform::Maps => {
                "UPDATE establishments SET google_last_scraped = $2, updated_at = now() WHERE id = $1"
            }
            Platform::Trustpilot => {
                "UPDATE establishments SET trustpilot_last_scraped = $2, updated_at = now() WHERE id = $1"
            }
        };

        sqlx::query(query)
            .bind(establishment_id)
            .bind(at)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}

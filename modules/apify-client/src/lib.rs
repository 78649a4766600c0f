pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    ApiResponse, GoogleReview, GoogleReviewsInput, RunData, StartUrl, TrustpilotInput,
    TrustpilotReview,
};

use serde::de::DeserializeOwned;
use serde::Serialize;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for the Google Maps reviews scraper.
const GOOGLE_REVIEWS_SCRAPER: &str = "Xb8osYTtOjlsgI6k9";

/// Actor ID for the Trustpilot reviews scraper.
const TRUSTPILOT_SCRAPER: &str = "fLXimoyuhE1UQgDbM";

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    /// Start an actor run. Returns immediately with run metadata.
    async fn start_run<I: Serialize>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", BASE_URL, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for efficient long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        loop {
            let url = format!("{}/actor-runs/{}?waitForFinish=60", BASE_URL, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ApifyError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let api_resp: ApiResponse<RunData> = resp.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed(api_resp.data.status));
                }
                _ => {
                    tracing::debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                    continue;
                }
            }
        }
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", BASE_URL, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let items: Vec<T> = resp.json().await?;
        Ok(items)
    }

    /// Scrape Google Maps reviews end-to-end: start run, poll, fetch results.
    pub async fn scrape_google_reviews(
        &self,
        place_url: &str,
        max_reviews: u32,
    ) -> Result<Vec<GoogleReview>> {
        tracing::info!(place_url, max_reviews, "Starting Google Maps reviews scrape");

        let input = GoogleReviewsInput {
            start_urls: vec![StartUrl {
                url: place_url.to_string(),
            }],
            language: "en".to_string(),
            max_reviews,
            personal_data: false,
            reviews_sort: "newest".to_string(),
            reviews_origin: "all".to_string(),
        };

        let run = self.start_run(GOOGLE_REVIEWS_SCRAPER, &input).await?;
        tracing::info!(run_id = %run.id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        let reviews: Vec<GoogleReview> = self
            .get_dataset_items(&completed.default_dataset_id)
            .await?;
        tracing::info!(count = reviews.len(), "Fetched Google Maps reviews");

        Ok(reviews)
    }

    /// Scrape Trustpilot reviews end-to-end: start run, poll, fetch results.
    /// `company_domain` is the bare domain Trustpilot indexes the company under.
    pub async fn scrape_trustpilot_reviews(
        &self,
        company_domain: &str,
        count: u32,
    ) -> Result<Vec<TrustpilotReview>> {
        tracing::info!(company_domain, count, "Starting Trustpilot reviews scrape");

        let input = TrustpilotInput {
            company_domain: format!("{company_domain}?languages=all"),
            count,
            replies: false,
            start_page: 1,
            verified: false,
        };

        let run = self.start_run(TRUSTPILOT_SCRAPER, &input).await?;
        tracing::info!(run_id = %run.id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        let reviews: Vec<TrustpilotReview> = self
            .get_dataset_items(&completed.default_dataset_id)
            .await?;
        tracing::info!(count = reviews.len(), "Fetched Trustpilot reviews");

        Ok(reviews)
    }
}

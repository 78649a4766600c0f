use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Google Maps reviews scraper types ---

/// Input for the Google Maps reviews scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct GoogleReviewsInput {
    #[serde(rename = "startUrls")]
    pub start_urls: Vec<StartUrl>,
    pub language: String,
    #[serde(rename = "maxReviews")]
    pub max_reviews: u32,
    #[serde(rename = "personalData")]
    pub personal_data: bool,
    #[serde(rename = "reviewsSort")]
    pub reviews_sort: String,
    #[serde(rename = "reviewsOrigin")]
    pub reviews_origin: String,
}

/// A start URL entry for actor inputs.
#[derive(Debug, Clone, Serialize)]
pub struct StartUrl {
    pub url: String,
}

/// A single Google Maps review from the Apify dataset. Serialize is kept so
/// callers can persist the raw item alongside the mapped record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleReview {
    #[serde(rename = "reviewId")]
    pub review_id: Option<String>,
    pub stars: Option<f64>,
    pub text: Option<String>,
    #[serde(rename = "textTranslated")]
    pub text_translated: Option<String>,
    pub language: Option<String>,
    #[serde(rename = "originalLanguage")]
    pub original_language: Option<String>,
    #[serde(rename = "publishedAtDate")]
    pub published_at_date: Option<DateTime<Utc>>,
    pub name: Option<String>,
    #[serde(rename = "reviewerId")]
    pub reviewer_id: Option<String>,
    #[serde(rename = "reviewerNumberOfReviews")]
    pub reviewer_number_of_reviews: Option<i64>,
    #[serde(rename = "isLocalGuide")]
    pub is_local_guide: Option<bool>,
    #[serde(rename = "likesCount")]
    pub likes_count: Option<i64>,
    #[serde(rename = "responseFromOwnerText")]
    pub response_from_owner_text: Option<String>,
    #[serde(rename = "responseFromOwnerDate")]
    pub response_from_owner_date: Option<DateTime<Utc>>,
    #[serde(rename = "placeId")]
    pub place_id: Option<String>,
}

// --- Trustpilot reviews scraper types ---

/// Input for the Trustpilot reviews scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct TrustpilotInput {
    #[serde(rename = "companyDomain")]
    pub company_domain: String,
    pub count: u32,
    pub replies: bool,
    #[serde(rename = "startPage")]
    pub start_page: u32,
    pub verified: bool,
}

/// A single Trustpilot review from the Apify dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustpilotReview {
    #[serde(rename = "reviewUrl")]
    pub review_url: Option<String>,
    #[serde(rename = "ratingValue")]
    pub rating_value: Option<f64>,
    #[serde(rename = "reviewHeadline")]
    pub review_headline: Option<String>,
    #[serde(rename = "reviewBody")]
    pub review_body: Option<String>,
    #[serde(rename = "reviewLanguage")]
    pub review_language: Option<String>,
    #[serde(rename = "datePublished")]
    pub date_published: Option<DateTime<Utc>>,
    #[serde(rename = "experienceDate")]
    pub experience_date: Option<String>,
    #[serde(rename = "numberOfReviews")]
    pub number_of_reviews: Option<i64>,
    #[serde(rename = "verificationLevel")]
    pub verification_level: Option<String>,
    pub likes: Option<i64>,
    #[serde(rename = "consumerCountryCode")]
    pub consumer_country_code: Option<String>,
}

impl TrustpilotReview {
    /// Trustpilot has no dedicated review id field; the review URL is the
    /// stable per-review identifier.
    pub fn native_id(&self) -> Option<&str> {
        self.review_url.as_deref()
    }
}

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

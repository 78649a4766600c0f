use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Enums ---

/// Review source platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Maps,
    Trustpilot,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Maps => "maps",
            Platform::Trustpilot => "trustpilot",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maps" => Ok(Platform::Maps),
            "trustpilot" => Ok(Platform::Trustpilot),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// The nine sentiment dimensions a review can be scored on.
///
/// Eight are scored directly by the oracle. `OnlineCommunication` is derived
/// from the complaint/response assessment and never asked of the oracle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    StaffSatisfaction,
    Scheduling,
    TreatmentSatisfaction,
    OnsiteCommunication,
    Facility,
    PostOp,
    Affordability,
    Recommendation,
    OnlineCommunication,
}

impl Attribute {
    /// The attributes scored directly by the enrichment oracle.
    pub const SENTIMENT: [Attribute; 8] = [
        Attribute::StaffSatisfaction,
        Attribute::Scheduling,
        Attribute::TreatmentSatisfaction,
        Attribute::OnsiteCommunication,
        Attribute::Facility,
        Attribute::PostOp,
        Attribute::Affordability,
        Attribute::Recommendation,
    ];

    /// All nine attributes, derived ones included.
    pub const ALL: [Attribute; 9] = [
        Attribute::StaffSatisfaction,
        Attribute::Scheduling,
        Attribute::TreatmentSatisfaction,
        Attribute::OnsiteCommunication,
        Attribute::Facility,
        Attribute::PostOp,
        Attribute::Affordability,
        Attribute::Recommendation,
        Attribute::OnlineCommunication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::StaffSatisfaction => "staff_satisfaction",
            Attribute::Scheduling => "scheduling",
            Attribute::TreatmentSatisfaction => "treatment_satisfaction",
            Attribute::OnsiteCommunication => "onsite_communication",
            Attribute::Facility => "facility",
            Attribute::PostOp => "post_op",
            Attribute::Affordability => "affordability",
            Attribute::Recommendation => "recommendation",
            Attribute::OnlineCommunication => "online_communication",
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oracle assessment of an owner response to a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseQuality {
    Constructive,
    NotConstructive,
}

/// Enrichment outcome for a review. `Failed` rows are excluded from selection
/// until explicitly reprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Enriched,
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Enriched => "enriched",
            EnrichmentStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enriched" => Ok(EnrichmentStatus::Enriched),
            "failed" => Ok(EnrichmentStatus::Failed),
            other => Err(format!("unknown enrichment status: {other}")),
        }
    }
}

// --- Records ---

/// A clinic under observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Establishment {
    pub id: Uuid,
    pub display_name: String,
    pub google_url: String,
    pub website: String,
    /// Bare domain Trustpilot indexes the company under, derived from `website`.
    pub trustpilot_domain: String,
    pub google_last_scraped: Option<DateTime<Utc>>,
    pub trustpilot_last_scraped: Option<DateTime<Utc>>,
}

/// A raw per-platform review, immutable once scraped.
#[derive(Debug, Clone)]
pub struct RawReview {
    pub id: Uuid,
    pub establishment_id: Uuid,
    pub platform: Platform,
    /// Stable platform-native identifier (review id for Maps, review URL for Trustpilot).
    pub native_id: String,
    /// Platform-native rating scale.
    pub rating: Option<f64>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub language: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub owner_response: Option<String>,
    pub owner_responded_at: Option<DateTime<Utc>>,
    pub is_local_guide: bool,
    pub verification_level: Option<String>,
    pub payload: serde_json::Value,
    pub scraped_at: DateTime<Utc>,
}

/// One review mapped onto the common schema. Derived deterministically from
/// exactly one RawReview and keyed by the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedReview {
    pub review_id: Uuid,
    pub establishment_id: Uuid,
    pub platform: Platform,
    /// Rating normalized to the common 0-5 scale.
    pub rating: Option<f64>,
    /// Title and body merged into one analyzable text.
    pub content: String,
    pub language: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub owner_response: Option<String>,
}

impl UnifiedReview {
    pub fn has_owner_response(&self) -> bool {
        self.owner_response
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}

/// AI-derived attributes for one review. The attribute map holds only the
/// dimensions the oracle judged applicable; absence means "not mentioned",
/// never zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedReview {
    pub review_id: Uuid,
    pub establishment_id: Uuid,
    pub attributes: BTreeMap<Attribute, u8>,
    pub is_complaint: bool,
    pub has_response: bool,
    pub response_quality: Option<ResponseQuality>,
    pub oracle_model: String,
    pub status: EnrichmentStatus,
    pub failure: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Per-attribute aggregate statistics for one establishment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeStats {
    pub raw_mean: f64,
    pub adjusted: f64,
    pub nps: f64,
    pub sample_size: u32,
}

/// The externally consumed scoring artifact: one record per establishment,
/// replaced atomically on every scoring run.
///
/// Deliberately carries no wall-clock fields: re-running over unchanged data
/// must serialize byte-identically. BTreeMap keeps attribute order stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishmentScore {
    pub establishment_id: Uuid,
    pub attributes: BTreeMap<Attribute, AttributeStats>,
    pub service_quality: Option<f64>,
    pub communication: Option<f64>,
    pub total_reviews: u32,
}

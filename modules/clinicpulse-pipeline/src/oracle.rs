//! The enrichment oracle boundary.
//!
//! The oracle is an opaque annotator: given review text and an attribute
//! group, it returns structured attribute values or a typed failure. The
//! production implementation calls the Anthropic Messages API with a forced
//! structured-output tool; everything downstream depends only on the trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use clinicpulse_common::{Attribute, ResponseQuality};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Reviews longer than this are truncated before the oracle call.
const MAX_CONTENT_CHARS: usize = 30_000;

pub type OracleResult<T> = std::result::Result<T, OracleError>;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle rate limited")]
    RateLimited,

    #[error("Oracle request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Oracle declined the content: {0}")]
    ContentFiltered(String),

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Oracle API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl OracleError {
    /// Transient failures are retried with bounded backoff; permanent ones
    /// mark the review failed-enrichment.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::RateLimited | OracleError::Timeout | OracleError::Network(_) => true,
            OracleError::Api { status, .. } => *status >= 500,
            OracleError::ContentFiltered(_) | OracleError::MalformedResponse(_) => false,
        }
    }
}

#[async_trait]
pub trait SentimentOracle: Send + Sync {
    /// Score the eight oracle-facing sentiment dimensions. Attributes the
    /// review does not mention are absent from the map, never zero.
    async fn sentiment(&self, content: &str) -> OracleResult<BTreeMap<Attribute, u8>>;

    /// Classify whether the review is a complaint.
    async fn complaint(&self, content: &str) -> OracleResult<bool>;

    /// Assess the owner's response to a complaint.
    async fn response_quality(
        &self,
        content: &str,
        owner_response: &str,
    ) -> OracleResult<ResponseQuality>;

    /// Model identifier recorded on each enriched review.
    fn model(&self) -> &str;
}

// --- Structured outputs the oracle is forced to produce ---

/// Per-attribute ordinal scores. Omit any dimension the review does not mention.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct SentimentAnnotation {
    /// Friendliness and competence of clinic staff: 0=very negative, 1=negative, 2=neutral/mixed, 3=positive
    staff_satisfaction: Option<u8>,
    /// Ease of booking and waiting times
    scheduling: Option<u8>,
    /// Satisfaction with the treatment itself and its outcome
    treatment_satisfaction: Option<u8>,
    /// Clarity and helpfulness of in-person communication
    onsite_communication: Option<u8>,
    /// Cleanliness, comfort and equipment of the facility
    facility: Option<u8>,
    /// Aftercare and post-operative follow-up
    post_op: Option<u8>,
    /// Perceived fairness of pricing
    affordability: Option<u8>,
    /// Whether the reviewer would recommend the clinic
    recommendation: Option<u8>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct ComplaintAnnotation {
    /// True if the review voices a complaint about the clinic
    is_complaint: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct ResponseAnnotation {
    /// True if the owner response concretely addresses the complaint rather than deflecting
    constructive: bool,
}

impl SentimentAnnotation {
    /// Validate ordinals and drop absent dimensions. Any value outside 0..=3
    /// is a malformed response, not a legal observation.
    fn into_map(self) -> OracleResult<BTreeMap<Attribute, u8>> {
        let pairs = [
            (Attribute::StaffSatisfaction, self.staff_satisfaction),
            (Attribute::Scheduling, self.scheduling),
            (Attribute::TreatmentSatisfaction, self.treatment_satisfaction),
            (Attribute::OnsiteCommunication, self.onsite_communication),
            (Attribute::Facility, self.facility),
            (Attribute::PostOp, self.post_op),
            (Attribute::Affordability, self.affordability),
            (Attribute::Recommendation, self.recommendation),
        ];

        let mut map = BTreeMap::new();
        for (attribute, value) in pairs {
            if let Some(value) = value {
                if value > 3 {
                    return Err(OracleError::MalformedResponse(format!(
                        "{attribute} score {value} outside ordinal range 0..=3"
                    )));
                }
                map.insert(attribute, value);
            }
        }
        Ok(map)
    }
}

// --- Prompts ---

const SENTIMENT_SYSTEM_PROMPT: &str = r#"You score healthcare clinic reviews on fixed sentiment dimensions.

Score ONLY the dimensions the review actually talks about; omit the rest entirely. Never infer a dimension from silence.

Scale per dimension: 0 = very negative, 1 = negative, 2 = neutral or mixed, 3 = positive.

Reviews may be in any language; score them as written, do not translate."#;

const COMPLAINT_SYSTEM_PROMPT: &str = r#"You classify healthcare clinic reviews.

A complaint is a review whose main purpose is to report a negative experience or grievance with the clinic. Mild criticism inside an overall positive review is not a complaint."#;

const RESPONSE_SYSTEM_PROMPT: &str = r#"You assess how a clinic responded to a complaint.

A response is constructive when it concretely engages with the complaint: acknowledges the problem, explains, apologises meaningfully, or offers a remedy. Boilerplate, deflection or blaming the reviewer is not constructive."#;

// --- Anthropic Messages wire types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    tools: Vec<ToolDefinitionWire>,
    tool_choice: serde_json::Value,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ToolDefinitionWire {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse { input: serde_json::Value },
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Claude-backed oracle.
pub struct ClaudeOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeOracle {
    pub fn new(api_key: &str, model: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// One forced-tool call: the model must answer through the structured
    /// tool, and the tool input deserializes straight into `T`.
    async fn extract<T: DeserializeOwned + JsonSchema>(
        &self,
        system: &str,
        user: &str,
    ) -> OracleResult<T> {
        let schema = serde_json::to_value(schema_for!(T))
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

        let tool_name = "structured_response";
        let request = ChatRequest {
            model: &self.model,
            max_tokens: 1024,
            system,
            messages: vec![WireMessage {
                role: "user",
                content: user,
            }],
            tools: vec![ToolDefinitionWire {
                name: tool_name.to_string(),
                description: "Record the structured annotation for the input.".to_string(),
                input_schema: schema,
            }],
            tool_choice: serde_json::json!({ "type": "tool", "name": tool_name }),
        };

        debug!(model = %self.model, "Oracle request");

        let response = self
            .http
            .post(format!("{ANTHROPIC_API_URL}/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout
                } else {
                    OracleError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => OracleError::RateLimited,
                code => OracleError::Api {
                    status: code,
                    message,
                },
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

        let mut refusal_text = None;
        for block in chat.content {
            match block {
                ContentBlock::ToolUse { input } => {
                    return serde_json::from_value(input)
                        .map_err(|e| OracleError::MalformedResponse(e.to_string()));
                }
                ContentBlock::Text { text } => refusal_text = Some(text),
                ContentBlock::Other => {}
            }
        }

        // A forced tool choice that still came back without a tool call means
        // the model declined the content.
        match refusal_text {
            Some(text) => Err(OracleError::ContentFiltered(text.trim().to_string())),
            None => Err(OracleError::MalformedResponse(
                "no structured output in response".to_string(),
            )),
        }
    }
}

#[async_trait]
impl SentimentOracle for ClaudeOracle {
    async fn sentiment(&self, content: &str) -> OracleResult<BTreeMap<Attribute, u8>> {
        let content = truncate(content);
        let annotation: SentimentAnnotation = self
            .extract(SENTIMENT_SYSTEM_PROMPT, &format!("Review:\n{content}"))
            .await?;
        annotation.into_map()
    }

    async fn complaint(&self, content: &str) -> OracleResult<bool> {
        let content = truncate(content);
        let annotation: ComplaintAnnotation = self
            .extract(COMPLAINT_SYSTEM_PROMPT, &format!("Review:\n{content}"))
            .await?;
        Ok(annotation.is_complaint)
    }

    async fn response_quality(
        &self,
        content: &str,
        owner_response: &str,
    ) -> OracleResult<ResponseQuality> {
        let content = truncate(content);
        let owner_response = truncate(owner_response);
        let annotation: ResponseAnnotation = self
            .extract(
                RESPONSE_SYSTEM_PROMPT,
                &format!("Complaint:\n{content}\n\nClinic response:\n{owner_response}"),
            )
            .await?;
        Ok(if annotation.constructive {
            ResponseQuality::Constructive
        } else {
            ResponseQuality::NotConstructive
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn truncate(content: &str) -> &str {
    if content.len() <= MAX_CONTENT_CHARS {
        return content;
    }
    let mut end = MAX_CONTENT_CHARS;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_map_drops_absent_and_keeps_scored() {
        let annotation = SentimentAnnotation {
            staff_satisfaction: Some(3),
            scheduling: None,
            treatment_satisfaction: Some(0),
            onsite_communication: None,
            facility: Some(2),
            post_op: None,
            affordability: None,
            recommendation: None,
        };
        let map = annotation.into_map().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map[&Attribute::StaffSatisfaction], 3);
        assert_eq!(map[&Attribute::TreatmentSatisfaction], 0);
        assert!(!map.contains_key(&Attribute::Scheduling));
    }

    #[test]
    fn out_of_range_ordinal_is_malformed() {
        let annotation = SentimentAnnotation {
            staff_satisfaction: Some(4),
            scheduling: None,
            treatment_satisfaction: None,
            onsite_communication: None,
            facility: None,
            post_op: None,
            affordability: None,
            recommendation: None,
        };
        let err = annotation.into_map().unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_classification() {
        assert!(OracleError::RateLimited.is_transient());
        assert!(OracleError::Timeout.is_transient());
        assert!(OracleError::Network("reset".into()).is_transient());
        assert!(OracleError::Api { status: 529, message: String::new() }.is_transient());
        assert!(!OracleError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!OracleError::ContentFiltered("no".into()).is_transient());
        assert!(!OracleError::MalformedResponse("bad".into()).is_transient());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let short = "ok";
        assert_eq!(truncate(short), "ok");

        let long = "é".repeat(MAX_CONTENT_CHARS); // 2 bytes per char
        let truncated = truncate(&long);
        assert!(truncated.len() <= MAX_CONTENT_CHARS);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}

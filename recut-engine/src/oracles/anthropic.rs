//! Anthropic Messages API oracles
//!
//! Network-backed quality scorer and reorderer. Both share one
//! [`AnthropicClient`] and both ask the model for a bare JSON object, then
//! pull the outermost `{...}` out of the reply since models sometimes wrap it
//! in prose.
//!
//! Retries, rate limiting and cancellation are the scoring pipeline's job;
//! these types make exactly one request per call.

use crate::config::{resolve_api_key, AnthropicSettings};
use crate::error::OracleError;
use crate::types::{QualityOracle, ReorderingOracle, ScoringRequest};
use async_trait::async_trait;
use recut_common::{ProposedOrder, ScoredSegment, SegmentScore};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

/// Thin Messages API client shared by the Anthropic oracles
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Build a client with an explicit API key
    pub fn new(api_key: impl Into<String>, settings: &AnthropicSettings) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OracleError::NotConfigured(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_tokens: settings.max_tokens,
        })
    }

    /// Build a client, resolving the API key from environment or settings
    pub fn from_settings(settings: &AnthropicSettings) -> Result<Self, OracleError> {
        let api_key =
            resolve_api_key(settings).map_err(|e| OracleError::NotConfigured(e.to_string()))?;
        Self::new(api_key, settings)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single-turn prompt and return the first text block of the reply
    pub async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => OracleError::RateLimited(body),
                401 | 403 => OracleError::NotConfigured(format!("API key rejected ({})", status)),
                code => OracleError::Api { status: code, body },
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(format!("Failed to parse API response: {}", e)))?;

        parsed
            .content
            .into_iter()
            .find_map(|c| c.text)
            .ok_or_else(|| OracleError::Parse("No text in API response".to_string()))
    }
}

/// Outermost JSON object embedded in a model reply
pub(crate) fn extract_json_object(reply: &str) -> Result<&str, OracleError> {
    match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(&reply[start..=end]),
        _ => Err(OracleError::Parse(format!(
            "No JSON object found in reply: {}",
            reply.chars().take(200).collect::<String>()
        ))),
    }
}

/// Analysis as the model writes it; every field may be missing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawAnalysis {
    topic: Option<String>,
    interest_score: Option<f64>,
    clarity_score: Option<f64>,
    is_tangent: bool,
    is_repetition: bool,
    standalone: Option<bool>,
    depends_on: Vec<String>,
    key_insight: Option<String>,
    has_factual_error: bool,
    factual_error_detail: Option<String>,
    has_contradiction: bool,
    contradiction_detail: Option<String>,
    is_confusing: bool,
    confusing_detail: Option<String>,
    is_incomplete: bool,
    incomplete_detail: Option<String>,
    needs_rerecord: serde_json::Value,
}

impl RawAnalysis {
    fn into_score(self) -> Result<SegmentScore, OracleError> {
        let topic = self
            .topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OracleError::Parse("Analysis is missing a topic".to_string()))?;

        let (interest_score, clarity_score) = match (self.interest_score, self.clarity_score) {
            (Some(interest), Some(clarity)) => (interest, clarity),
            _ => {
                return Err(OracleError::Parse(format!(
                    "Analysis for topic {} is missing interestScore or clarityScore",
                    topic
                )))
            }
        };

        let needs_rerecord = match self.needs_rerecord {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            serde_json::Value::Bool(true) => Some("Re-record suggested".to_string()),
            _ => None,
        };

        Ok(SegmentScore {
            topic,
            interest_score,
            clarity_score,
            is_tangent: self.is_tangent,
            is_repetition: self.is_repetition,
            standalone: self.standalone.unwrap_or(true),
            depends_on: self.depends_on,
            key_insight: self.key_insight.unwrap_or_default(),
            has_factual_error: self.has_factual_error,
            factual_error_detail: self.factual_error_detail,
            has_contradiction: self.has_contradiction,
            contradiction_detail: self.contradiction_detail,
            is_confusing: self.is_confusing,
            confusing_detail: self.confusing_detail,
            is_incomplete: self.is_incomplete,
            incomplete_detail: self.incomplete_detail,
            needs_rerecord,
        }
        .clamped())
    }
}

/// Parse a model reply into a clamped [`SegmentScore`]
pub(crate) fn parse_analysis(reply: &str) -> Result<SegmentScore, OracleError> {
    let json_str = extract_json_object(reply)?;
    let raw: RawAnalysis = serde_json::from_str(json_str)
        .map_err(|e| OracleError::Parse(format!("Failed to parse analysis JSON: {}", e)))?;
    raw.into_score()
}

pub(crate) fn build_scoring_prompt(request: &ScoringRequest<'_>) -> String {
    let mut prompt = String::from(
        "You are an experienced podcast editor reviewing a long-form transcript one segment at a time. \
         Judge how engaging and how clearly delivered the current segment is, and whether it relies on \
         something said earlier.\n\n",
    );

    if request.prior_context.is_empty() {
        prompt.push_str("PREVIOUS SEGMENTS: none (this is the opening segment)\n\n");
    } else {
        prompt.push_str("PREVIOUS SEGMENTS (oldest first):\n");
        for (i, prior) in request.prior_context.iter().enumerate() {
            let _ = writeln!(prompt, "[{}] topic: {}\n    text: {}", i + 1, prior.topic, prior.text);
        }
        prompt.push('\n');
    }

    let segment = request.segment;
    let _ = write!(
        prompt,
        "CURRENT SEGMENT ({:.1}s - {:.1}s):\n\"{}\"\n",
        segment.start_time, segment.end_time, segment.text
    );

    prompt.push_str(
        r#"
Respond with ONLY valid JSON in this exact format (no markdown, no explanation outside JSON):
{
  "topic": "short label, reuse an earlier topic label verbatim if it is the same subject",
  "interestScore": 0-100,
  "clarityScore": 0-100,
  "isTangent": false,
  "isRepetition": false,
  "standalone": true,
  "dependsOn": ["earlier topic labels this segment needs the listener to have heard"],
  "keyInsight": "one sentence",
  "hasFactualError": false,
  "factualErrorDetail": null,
  "hasContradiction": false,
  "contradictionDetail": null,
  "isConfusing": false,
  "confusingDetail": null,
  "isIncomplete": false,
  "incompleteDetail": null,
  "needsRerecord": null
}"#,
    );
    prompt
}

pub(crate) fn build_reordering_prompt(segments: &[ScoredSegment]) -> String {
    let summary: Vec<serde_json::Value> = segments
        .iter()
        .map(|s| {
            json!({
                "id": s.id(),
                "topic": s.topic(),
                "durationSec": s.duration(),
                "standalone": s.analysis.standalone,
                "dependsOn": s.analysis.depends_on,
                "interestScore": s.analysis.interest_score,
                "clarityScore": s.analysis.clarity_score,
                "keyInsight": s.analysis.key_insight,
            })
        })
        .collect();
    let segments_json = serde_json::to_string_pretty(&summary).unwrap_or_default();

    format!(
        r#"You are restructuring an edited audio program. Reorder the segments below into the most compelling narrative.

SEGMENTS:
{}

RULES:
- Use every id exactly once and no other ids
- A segment listing a topic in dependsOn must come after a segment with that topic
- Open strong; suggest an intro if the opener needs context
- Suggest short spoken transitions where the topic changes

Respond with ONLY valid JSON in this exact format (no markdown, no explanation outside JSON):
{{
  "order": ["segment ids in playback order"],
  "transitions": [
    {{"beforeId": "id", "afterId": "id", "transitionText": "spoken bridge", "reasoning": "why"}}
  ],
  "needsIntro": false,
  "introSuggestion": null,
  "needsOutro": true,
  "outroSuggestion": "closing line",
  "reasoning": "overall rationale"
}}"#,
        segments_json
    )
}

/// Parse a model reply into a [`ProposedOrder`]
///
/// Only the shape is checked here; permutation validity is left to the
/// validator so invalid proposals are rejected, never coerced.
pub(crate) fn parse_proposed_order(reply: &str) -> Result<ProposedOrder, OracleError> {
    let json_str = extract_json_object(reply)?;
    let proposed: ProposedOrder = serde_json::from_str(json_str)
        .map_err(|e| OracleError::Parse(format!("Failed to parse order JSON: {}", e)))?;
    if proposed.order.is_empty() {
        return Err(OracleError::Parse("Proposed order is empty".to_string()));
    }
    Ok(proposed)
}

/// Network-backed [`QualityOracle`]
pub struct AnthropicQualityOracle {
    client: Arc<AnthropicClient>,
}

impl AnthropicQualityOracle {
    pub fn new(client: Arc<AnthropicClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QualityOracle for AnthropicQualityOracle {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn score(&self, request: &ScoringRequest<'_>) -> Result<SegmentScore, OracleError> {
        let prompt = build_scoring_prompt(request);
        debug!(
            segment_id = %request.segment.id,
            context = request.prior_context.len(),
            model = %self.client.model(),
            "Requesting segment analysis"
        );
        let reply = self.client.complete(&prompt).await?;
        parse_analysis(&reply)
    }
}

/// Network-backed [`ReorderingOracle`]
pub struct AnthropicReorderingOracle {
    client: Arc<AnthropicClient>,
}

impl AnthropicReorderingOracle {
    pub fn new(client: Arc<AnthropicClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReorderingOracle for AnthropicReorderingOracle {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn propose(&self, segments: &[ScoredSegment]) -> Result<ProposedOrder, OracleError> {
        if segments.is_empty() {
            return Ok(ProposedOrder::default());
        }
        let prompt = build_reordering_prompt(segments);
        debug!(segments = segments.len(), model = %self.client.model(), "Requesting reorder");
        let reply = self.client.complete(&prompt).await?;
        parse_proposed_order(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriorContext;
    use recut_common::Segment;

    #[test]
    fn test_parse_analysis_with_surrounding_text() {
        let reply = r#"Here is my analysis:
{
  "topic": "Churn model",
  "interestScore": 120,
  "clarityScore": 64.5,
  "isTangent": false,
  "standalone": false,
  "dependsOn": ["Retention", "retention"],
  "keyInsight": "Churn is predictable",
  "needsRerecord": "Mic clipping at 0:42"
}
Hope this helps."#;

        let score = parse_analysis(reply).unwrap();
        assert_eq!(score.topic, "Churn model");
        assert_eq!(score.interest_score, 100.0);
        assert_eq!(score.clarity_score, 64.5);
        assert!(!score.standalone);
        assert_eq!(score.depends_on, vec!["Retention".to_string()]);
        assert_eq!(score.needs_rerecord.as_deref(), Some("Mic clipping at 0:42"));
    }

    #[test]
    fn test_parse_analysis_defaults_and_flags() {
        let score = parse_analysis(
            r#"{"topic": "Intro", "interestScore": 70, "clarityScore": 65, "needsRerecord": false}"#,
        )
        .unwrap();
        assert_eq!(score.interest_score, 70.0);
        assert_eq!(score.clarity_score, 65.0);
        assert!(score.standalone);
        assert!(score.depends_on.is_empty());
        assert!(score.needs_rerecord.is_none());

        let score = parse_analysis(
            r#"{"topic": "Intro", "interestScore": 70, "clarityScore": 65, "needsRerecord": true}"#,
        )
        .unwrap();
        assert!(score.needs_rerecord.is_some());
    }

    #[test]
    fn test_parse_analysis_rejects_missing_scores() {
        let err = parse_analysis(r#"{"topic": "X"}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));

        let err = parse_analysis(r#"{"topic": "X", "interestScore": 90}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(ref msg) if msg.contains("clarityScore")));

        let err = parse_analysis(r#"{"topic": "X", "clarityScore": 90}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
    }

    #[test]
    fn test_parse_analysis_requires_topic() {
        let err = parse_analysis(r#"{"interestScore": 80, "clarityScore": 80}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));

        let err = parse_analysis("no json here").unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
    }

    #[test]
    fn test_scoring_prompt_embeds_context() {
        let segment = Segment::with_id("s4", 12.0, 18.5, "And that is why pricing matters.");
        let prior = vec![
            PriorContext {
                text: "We doubled prices last spring.".to_string(),
                topic: "Price increase".to_string(),
            },
            PriorContext {
                text: "Nobody churned.".to_string(),
                topic: "Churn".to_string(),
            },
        ];
        let prompt = build_scoring_prompt(&ScoringRequest {
            segment: &segment,
            prior_context: &prior,
        });

        assert!(prompt.contains("[1] topic: Price increase"));
        assert!(prompt.contains("[2] topic: Churn"));
        assert!(prompt.contains("CURRENT SEGMENT (12.0s - 18.5s)"));
        assert!(prompt.contains("And that is why pricing matters."));
    }

    #[test]
    fn test_parse_proposed_order() {
        let reply = r#"{
            "order": ["b", "a"],
            "transitions": [{"beforeId": "b", "afterId": "a", "transitionText": "Meanwhile", "reasoning": "shift"}],
            "needsIntro": true,
            "introSuggestion": "Welcome back",
            "reasoning": "Stronger opener"
        }"#;
        let proposed = parse_proposed_order(reply).unwrap();
        assert_eq!(proposed.order, vec!["b", "a"]);
        assert_eq!(proposed.transitions.len(), 1);
        assert!(proposed.needs_intro);
        assert!(!proposed.needs_outro);

        assert!(parse_proposed_order(r#"{"order": []}"#).is_err());
    }

    #[test]
    fn test_reordering_prompt_lists_segments() {
        let segments = vec![ScoredSegment::new(
            Segment::with_id("seg-9", 0.0, 4.0, "text"),
            SegmentScore {
                topic: "Launch".to_string(),
                depends_on: vec!["Roadmap".to_string()],
                ..Default::default()
            },
        )];
        let prompt = build_reordering_prompt(&segments);
        assert!(prompt.contains("\"id\": \"seg-9\""));
        assert!(prompt.contains("Roadmap"));
    }
}

//! Free-text rule classification
//!
//! An admin types a rule in plain language; the assistant decides whether it
//! is a zone formula (`NeuralRule`) or a trading principle (`LogicRule`) and
//! answers with JSON. The reply is validated here before anything is stored.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::assistant::Assistant;
use crate::types::{LogicRule, NeuralRule, RuleBase, RuleDirection, RuleUnit};

const DEFAULT_RULE_NAME: &str = "AI";
const DEFAULT_RULE_COLOR: &str = "#000";

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Nothing to classify")]
    EmptyInput,
    #[error("Assistant call failed: {0}")]
    Assistant(String),
    #[error("Classifier reply is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unknown classification {0:?}")]
    UnknownKind(String),
    #[error("Zone rule has no numeric value")]
    MissingValue,
    #[error("Logic rule has no content")]
    MissingContent,
}

/// A classified rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleUnion {
    Neural(NeuralRule),
    Logic(LogicRule),
}

#[async_trait]
pub trait RuleClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<RuleUnion, ClassifyError>;
}

/// Classifier backed by the conversational assistant
pub struct AssistantClassifier<A> {
    assistant: A,
}

impl<A: Assistant> AssistantClassifier<A> {
    pub fn new(assistant: A) -> Self {
        Self { assistant }
    }
}

#[async_trait]
impl<A: Assistant> RuleClassifier for AssistantClassifier<A> {
    async fn classify(&self, text: &str) -> Result<RuleUnion, ClassifyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClassifyError::EmptyInput);
        }

        let reply = self
            .assistant
            .generate(&classification_prompt(text))
            .await
            .map_err(|e| ClassifyError::Assistant(format!("{:#}", e)))?;
        debug!("Classifier reply: {}", reply);

        let rule = parse_classification(&reply)?;
        match &rule {
            RuleUnion::Neural(r) => info!("Classified as zone rule {:?} ({})", r.name, r.id),
            RuleUnion::Logic(r) => info!("Classified as logic rule ({})", r.id),
        }
        Ok(rule)
    }
}

pub fn classification_prompt(text: &str) -> String {
    format!(
        "Classify the trading rule below. Answer with JSON only: \
         {{ \"type\": \"ZONE\" | \"LOGIC\", \
         \"zoneData\": {{ \"name\": string, \"base\": \"pivot1\" | \"pivot2\" | \"average\", \
         \"value\": number, \"unit\": \"percent\" | \"points\", \"direction\": \"add\" | \"subtract\" }}, \
         \"logicContent\": string }}. Input: {}",
        text
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Classification {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    zone_data: Option<ZoneData>,
    #[serde(default)]
    logic_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ZoneData {
    name: Option<String>,
    base: Option<RuleBase>,
    value: Option<Value>,
    unit: Option<RuleUnit>,
    direction: Option<RuleDirection>,
}

/// Validate an assistant reply into a rule.
///
/// Accepts the JSON bare or inside a markdown code fence. Missing zone
/// fields take the defaults name "AI", base pivot2, unit percent, direction
/// add; the value must be a finite number.
pub fn parse_classification(reply: &str) -> Result<RuleUnion, ClassifyError> {
    let parsed: Classification = serde_json::from_str(strip_code_fence(reply))?;

    match parsed.kind.trim().to_uppercase().as_str() {
        "ZONE" => {
            let zone = parsed.zone_data.unwrap_or_default();
            let value = zone.value.as_ref().and_then(number_value).ok_or(ClassifyError::MissingValue)?;
            let name = zone
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RULE_NAME.to_string());

            Ok(RuleUnion::Neural(NeuralRule::new(
                name,
                zone.base.unwrap_or_default(),
                value,
                zone.unit.unwrap_or_default(),
                zone.direction.unwrap_or_default(),
                DEFAULT_RULE_COLOR,
            )))
        }
        "LOGIC" => {
            let content = parsed
                .logic_content
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .ok_or(ClassifyError::MissingContent)?;
            Ok(RuleUnion::Logic(LogicRule::new(content)))
        }
        other => Err(ClassifyError::UnknownKind(other.to_string())),
    }
}

// Models often answer with numbers as strings
fn number_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

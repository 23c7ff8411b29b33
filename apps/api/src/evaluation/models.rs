use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_GOAL: &str = "General";
pub const DEFAULT_SUB_TYPE: &str = "Interview";

/// A recorded audio (or audio/video) clip submitted with the response.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAttachment {
    pub bytes: Bytes,
    pub mime_type: String,
    pub filename: Option<String>,
}

/// Everything one evaluation call needs. Built once per request, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub goal: String,
    pub sub_type: String,
    pub user_response_text: String,
    pub context_notes: String,
    pub resume_document: Option<Bytes>,
    pub audio_attachment: Option<AudioAttachment>,
    pub image_attachment: Option<Bytes>,
}

impl Default for EvaluationRequest {
    fn default() -> Self {
        Self {
            goal: DEFAULT_GOAL.to_string(),
            sub_type: DEFAULT_SUB_TYPE.to_string(),
            user_response_text: String::new(),
            context_notes: String::new(),
            resume_document: None,
            audio_attachment: None,
            image_attachment: None,
        }
    }
}

/// Binary artifacts forwarded to the model alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    Audio(AudioAttachment),
    Image(Bytes),
}

impl EvaluationRequest {
    /// Attachments in the order they are sent: audio first, then the snapshot.
    pub fn attachments(&self) -> Vec<Attachment> {
        let mut attachments = Vec::new();
        if let Some(audio) = &self.audio_attachment {
            attachments.push(Attachment::Audio(audio.clone()));
        }
        if let Some(image) = &self.image_attachment {
            attachments.push(Attachment::Image(image.clone()));
        }
        attachments
    }
}

/// The model's evaluation, and the only shape the HTTP layer ever returns.
///
/// Fields the model omits stay omitted; extra top-level fields pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Whatever the model produced: usually a number, sometimes a quoted one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "metrics_as_text"
    )]
    pub metrics: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvaluationResult {
    /// Zeroed result carrying a diagnostic, used for every failed evaluation.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            score: Some(Value::from(0)),
            evaluation: Some(message.into()),
            ..Default::default()
        }
    }

    /// False only for a numeric score outside 0..=100. Non-numeric scores are not checked.
    pub fn score_in_range(&self) -> bool {
        match &self.score {
            Some(Value::Number(n)) => n.as_u64().is_some_and(|s| s <= 100),
            _ => true,
        }
    }
}

/// Metric values are free text; scalar numbers and booleans are kept as their JSON text.
/// Null metrics are left out.
fn metrics_as_text<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|metrics| {
        metrics
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((name, s)),
                other => Some((name, other.to_string())),
            })
            .collect()
    }))
}

// Prompt constants for the evaluation pipeline.
// JSON-only enforcement is sent separately as the system instruction (llm_client::prompts).

/// Evaluation prompt template.
/// Placeholders: {goal}, {sub_type}, {resume}, {context_notes}, {user_response}, {materials}
pub const EVALUATION_PROMPT_TEMPLATE: &str = r#"You are an expert interview coach for {goal} ({sub_type}).

RESUME:
{resume}

CONTEXT/NOTES:
{context_notes}

USER RESPONSE: "{user_response}"

MATERIALS RECEIVED:
{materials}

TASK:
1. Analyze the response based on the position requested.
2. Evaluate speech patterns: pacing, tone, filler words, stutters.
3. Assess other soft qualities: confidence, clarity, engagement, professionalism.
4. Assess other additional qualities based on the context and role provided.
5. Provide a total score (0-100) and detailed evaluation.

Return ONLY a JSON object with this structure:
{
  "score": 0-100,
  "evaluation": "string",
  "metrics": {
    "filler_word_count": "string",
    "tone_analysis": "string",
    "pacing": "string",
    "confidence": "string",
    "clarity": "string",
    "stutters": "string",
    "engagement": "string",
    "professionalism": "string",
    "additional_qualities": "string"
  }
}"#;

pub const MATERIALS_TEXT_ONLY: &str = "- TEXT: the written response above only. \
    No recording was provided; judge delivery-related metrics from the writing \
    and say so where a metric cannot be observed.";

pub const MATERIALS_AUDIO: &str = "- AUDIO: a recording of the candidate answering. \
    Listen to it for pacing, tone, filler words (\"um\", \"uh\", \"like\", \"you know\"), \
    stutters and pauses. If typed text was also provided, note whether it matches the recording.";

pub const MATERIALS_CAMERA: &str = "- VIDEO: a snapshot of the candidate's face while answering. \
    Assess non-verbal presence (eye contact, facial expression, composure, signs of stress) \
    and fold those observations into the engagement and professionalism metrics.";

//! Prompt Builder: deterministic rendering of the evaluation instruction.

use crate::evaluation::models::EvaluationRequest;
use crate::evaluation::prompts::{
    EVALUATION_PROMPT_TEMPLATE, MATERIALS_AUDIO, MATERIALS_CAMERA, MATERIALS_TEXT_ONLY,
};

/// Renders the prompt for one request. Same inputs, same output.
pub fn build(request: &EvaluationRequest, resume_text: &str) -> String {
    let materials = materials_section(request);

    render(
        EVALUATION_PROMPT_TEMPLATE,
        &[
            ("goal", request.goal.as_str()),
            ("sub_type", request.sub_type.as_str()),
            ("resume", resume_text),
            ("context_notes", request.context_notes.as_str()),
            ("user_response", request.user_response_text.as_str()),
            ("materials", materials.as_str()),
        ],
    )
}

fn materials_section(request: &EvaluationRequest) -> String {
    let mut lines = Vec::new();
    if request.audio_attachment.is_some() {
        lines.push(MATERIALS_AUDIO);
    }
    if request.image_attachment.is_some() {
        lines.push(MATERIALS_CAMERA);
    }
    if lines.is_empty() {
        lines.push(MATERIALS_TEXT_ONLY);
    }
    lines.join("\n")
}

/// Single pass over `template`: each `{name}` with a known name is replaced once,
/// and substituted values are never scanned again. Unknown braces are copied as-is.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

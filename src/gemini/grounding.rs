use tracing::warn;

use super::types::{GenerateContentResponse, GroundedResult, Source};

/// Text of the first part of the first candidate, if non-empty.
pub fn extract_answer(response: &GenerateContentResponse) -> Option<String> {
    response
        .first_candidate()
        .and_then(|c| c.content.as_ref())
        .and_then(|content| content.parts.first())
        .map(|part| part.text.clone())
        .filter(|text| !text.trim().is_empty())
}

pub fn extract_grounded_result(response: &GenerateContentResponse) -> GroundedResult {
    let answer = extract_answer(response);
    if answer.is_none() {
        warn!("Gemini returned empty answer (safety filter or empty response)");
    }

    let chunks = response
        .first_candidate()
        .and_then(|c| c.grounding_metadata.as_ref())
        .map_or(&[][..], |m| m.grounding_chunks.as_slice());
    let sources = chunks
        .iter()
        .filter_map(|chunk| {
            let web = chunk.web.as_ref()?;
            let url = web.uri.as_ref().filter(|u| !u.is_empty())?.clone();
            Some(Source { url })
        })
        .collect();

    GroundedResult { answer, sources }
}

/// Flatten a grounded result into the single text recorded per search query.
pub fn render_search_text(result: &GroundedResult) -> Option<String> {
    let answer = result.answer.as_deref()?.trim();
    if result.sources.is_empty() {
        return Some(answer.to_string());
    }
    let urls: Vec<&str> = result.sources.iter().map(|s| s.url.as_str()).collect();
    Some(format!("{answer}\nSources: {}", urls.join(", ")))
}

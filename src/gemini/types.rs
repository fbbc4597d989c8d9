//! Wire format of `models/{model}:generateContent`, plus the prompt and result types
//! the rest of the crate works with.

use serde::{Deserialize, Serialize};

/// A chat-style prompt: one system instruction followed by ordered user messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Deterministic generation: the system text as `systemInstruction`, each message
    /// as one part of a single user turn.
    pub fn from_prompt(prompt: &Prompt) -> Self {
        Self {
            system_instruction: Some(Content::new(None, [prompt.system.as_str()])),
            contents: vec![Content::new(Some("user"), prompt.messages.iter().map(String::as_str))],
            tools: Vec::new(),
            generation_config: GenerationConfig::DETERMINISTIC,
        }
    }

    /// One query answered with Google Search grounding enabled.
    pub fn grounded_search(query: &str) -> Self {
        Self {
            system_instruction: None,
            contents: vec![Content::new(Some("user"), [query])],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
            generation_config: GenerationConfig::DETERMINISTIC,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Content {
    fn new<'a>(role: Option<&str>, texts: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            parts: texts
                .into_iter()
                .map(|text| Part {
                    text: text.to_string(),
                })
                .collect(),
            role: role.map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Part {
    // Non-text parts (inline data, function calls) arrive without `text`.
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct Tool {
    pub google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
pub struct GoogleSearch {}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    pub temperature: f32,
}

impl GenerationConfig {
    pub const DETERMINISTIC: Self = Self { temperature: 0.0 };
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub error: Option<ApiError>,
}

impl GenerateContentResponse {
    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
pub struct GroundingChunk {
    pub web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
pub struct WebChunk {
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: Option<u16>,
    pub message: Option<String>,
}

/// A search answer with the web pages it was grounded on.
#[derive(Debug)]
pub struct GroundedResult {
    pub answer: Option<String>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub url: String,
}

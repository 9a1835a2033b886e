use crate::config::LlmConfig;
use crate::models::{StoryDraft, StoryParams};
use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::instrument;

const SYSTEM_PROMPT: &str = "You are a children's author. Output valid JSON only. \
MANDATORY JSON STRUCTURE:
{
  \"title\": \"Story Title\",
  \"moral\": \"A short moral message\",
  \"main_character_visual\": \"One sentence describing the main character's fixed appearance: species, colours, clothing\",
  \"chapters\": [
    { \"title\": \"...\", \"content\": \"...\", \"image_action_prompt\": \"...\" }
  ]
}
Each image_action_prompt describes only the scene and the action in that chapter. \
Never describe the main character's appearance in it. \
Do not include any text outside this JSON structure. \
Ensure 'chapters' is always an array of objects.";

static CODE_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").ok());

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request to language model failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("language model returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model returned no message content")]
    EmptyCompletion,
    #[error("story JSON could not be parsed: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("story JSON has no chapters list")]
    MissingChapters,
    #[error("chapter {0} has an empty title or content")]
    BlankChapter(usize),
    #[error("asked for {expected} chapters, got {actual}")]
    ChapterCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct LLMClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl LLMClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(LLMClient {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Asks the model for a complete story skeleton. One call, no retry.
    #[instrument(skip(self), fields(model = %self.model))]
    pub async fn generate_draft(&self, params: &StoryParams) -> Result<StoryDraft, GenerationError> {
        let user_prompt = format!(
            "Write a {} story with {} chapters.",
            params.genre, params.chapters
        );

        let mut request_builder = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&json!({
                "model": self.model,
                "temperature": self.temperature,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": user_prompt }
                ],
                "response_format": { "type": "json_object" }
            }));

        if let Some(api_key) = &self.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request_builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyCompletion)?;

        let draft = parse_story_draft(&content, params.chapters)?;
        tracing::info!(title = %draft.title, chapters = draft.chapters.len(), "story text generated");
        Ok(draft)
    }
}

/// Parses the model's message body into a draft and checks its shape.
pub fn parse_story_draft(raw: &str, expected_chapters: usize) -> Result<StoryDraft, GenerationError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))?;

    match value.get("chapters") {
        Some(Value::Array(chapters)) if !chapters.is_empty() => {}
        _ => return Err(GenerationError::MissingChapters),
    }

    let draft: StoryDraft = serde_json::from_value(value)?;

    if let Some(index) = draft
        .chapters
        .iter()
        .position(|c| c.title.trim().is_empty() || c.content.trim().is_empty())
    {
        return Err(GenerationError::BlankChapter(index + 1));
    }

    if draft.chapters.len() != expected_chapters {
        return Err(GenerationError::ChapterCountMismatch {
            expected: expected_chapters,
            actual: draft.chapters.len(),
        });
    }

    Ok(draft)
}

fn strip_code_fence(raw: &str) -> &str {
    CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
}

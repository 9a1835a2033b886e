use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_CHAPTERS: i64 = 1;
pub const MAX_CHAPTERS: i64 = 10;

/// Inbound `/generate` parameters, before validation.
///
/// `chapters` is a wide integer so out-of-range values reach `validate`
/// instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryRequest {
    pub genre: String,
    pub chapters: i64,
}

/// A request that passed the boundary checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryParams {
    pub genre: String,
    pub chapters: usize,
}

impl StoryRequest {
    pub fn validate(&self) -> Result<StoryParams, String> {
        let genre = self.genre.trim();
        if genre.is_empty() {
            return Err("Genre is required.".to_string());
        }
        if !(MIN_CHAPTERS..=MAX_CHAPTERS).contains(&self.chapters) {
            return Err(format!(
                "Chapters must be between {MIN_CHAPTERS} and {MAX_CHAPTERS}."
            ));
        }
        Ok(StoryParams {
            genre: genre.to_string(),
            chapters: self.chapters as usize,
        })
    }
}

/// Query-string variant of [`StoryRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct StoryQuery {
    #[serde(default = "default_genre")]
    pub genre: String,
    #[serde(default = "default_chapters")]
    pub chapters: i64,
}

fn default_genre() -> String {
    "fantasy".to_string()
}

fn default_chapters() -> i64 {
    3
}

impl From<StoryQuery> for StoryRequest {
    fn from(query: StoryQuery) -> Self {
        Self {
            genre: query.genre,
            chapters: query.chapters,
        }
    }
}

/// One chapter as the language model returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image_action_prompt: Option<String>,
    /// Older prompt layouts used this name.
    #[serde(default)]
    pub image_prompt: Option<String>,
}

/// The story as the language model returns it, without illustrations.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryDraft {
    pub title: String,
    #[serde(default)]
    pub moral: String,
    #[serde(default)]
    pub main_character_visual: Option<String>,
    pub chapters: Vec<ChapterDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub content: String,
    #[serde(
        rename = "imagePrompt",
        alias = "imageActionPrompt",
        alias = "image_prompt",
        default
    )]
    pub image_prompt: String,
    /// Data URI or placeholder URL; `None` until the assembler fills it in.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub title: String,
    #[serde(default)]
    pub moral: String,
    #[serde(
        default,
        alias = "main_character_visual",
        skip_serializing_if = "Option::is_none"
    )]
    pub main_character_visual: Option<String>,
    pub chapters: Vec<Chapter>,
}

/// A persisted story snapshot as returned by `/my_stories`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredStory {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub story: Story,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

/// OAuth2 password-grant form fields; `username` carries the email.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

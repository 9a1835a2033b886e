use crate::config::{ImageConfig, ImageProvider};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::Rng;
use reqwest::{Url, header::CONTENT_TYPE};
use serde_json::json;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::instrument;

const STYLE_PREAMBLE: &str =
    "Children's storybook illustration, soft watercolor, warm vibrant colors, whimsical, no text.";
const SEED_RANGE: RangeInclusive<u32> = 10_000..=99_999;
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Outcome of illustrating one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Illustration {
    Rendered { bytes: Vec<u8>, content_type: String },
    /// Every attempt failed.
    Unavailable,
}

impl Illustration {
    /// A `data:` URI for rendered images, otherwise the placeholder URL.
    pub fn to_image_ref(&self, placeholder_url: &str) -> String {
        match self {
            Illustration::Rendered {
                bytes,
                content_type,
            } => format!("data:{content_type};base64,{}", STANDARD.encode(bytes)),
            Illustration::Unavailable => placeholder_url.to_string(),
        }
    }
}

/// Turns a scene into a picture. Implementations never fail; they degrade
/// to [`Illustration::Unavailable`].
#[async_trait]
pub trait Illustrator: Send + Sync {
    async fn illustrate(&self, scene: &str, character: Option<&str>) -> Illustration;
}

pub fn compose_prompt(scene: &str, character: Option<&str>) -> String {
    let mut prompt = String::from(STYLE_PREAMBLE);
    if let Some(character) = character {
        prompt.push_str(&format!(" Main character: {}.", character.trim_end_matches('.')));
    }
    prompt.push_str(&format!(" Scene: {}.", scene.trim().trim_end_matches('.')));
    prompt
}

pub struct ImageClient {
    client: reqwest::Client,
    provider: ImageProvider,
    api_url: String,
    api_key: Option<String>,
    width: u32,
    height: u32,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ImageClient {
    pub fn new(config: &ImageConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(ImageClient {
            client,
            provider: config.provider,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            width: config.width,
            height: config.height,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
        })
    }

    fn request(&self, prompt: &str, seed: u32) -> Result<reqwest::RequestBuilder> {
        let request_builder = match self.provider {
            ImageProvider::Pollinations => {
                let mut url = Url::parse(&self.api_url)?;
                url.path_segments_mut()
                    .map_err(|_| anyhow!("image URL cannot take a path: {}", self.api_url))?
                    .pop_if_empty()
                    .push(prompt);
                url.query_pairs_mut()
                    .append_pair("width", &self.width.to_string())
                    .append_pair("height", &self.height.to_string())
                    .append_pair("seed", &seed.to_string())
                    .append_pair("nologo", "true");
                self.client.get(url)
            }
            ImageProvider::HuggingFace => self.client.post(&self.api_url).json(&json!({
                "inputs": prompt,
                "parameters": {
                    "width": self.width,
                    "height": self.height,
                    "seed": seed
                }
            })),
        };

        Ok(match &self.api_key {
            Some(api_key) => request_builder.bearer_auth(api_key),
            None => request_builder,
        })
    }

    async fn attempt(&self, prompt: &str, seed: u32) -> Result<Illustration> {
        let response = self.request(prompt, seed)?.send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("image endpoint returned {status}");
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        // Providers report errors as 200 JSON while a model warms up.
        if content_type.starts_with("application/json") || content_type.starts_with("text/") {
            bail!("image endpoint answered with {content_type}");
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            bail!("image endpoint returned an empty body");
        }

        Ok(Illustration::Rendered {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[async_trait]
impl Illustrator for ImageClient {
    #[instrument(skip(self, character))]
    async fn illustrate(&self, scene: &str, character: Option<&str>) -> Illustration {
        let prompt = compose_prompt(scene, character);

        for attempt in 1..=self.max_attempts {
            let seed = rand::thread_rng().gen_range(SEED_RANGE);
            match self.attempt(&prompt, seed).await {
                Ok(illustration) => {
                    tracing::debug!(attempt, seed, "image generated");
                    return illustration;
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts = self.max_attempts, error = %e, "image attempt failed");
                }
            }
            if attempt < self.max_attempts && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        tracing::warn!("image attempts exhausted, using placeholder");
        Illustration::Unavailable
    }
}

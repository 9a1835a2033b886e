use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_POLLINATIONS_URL: &str = "https://image.pollinations.ai/prompt";
const DEFAULT_HUGGINGFACE_URL: &str =
    "https://api-inference.huggingface.co/models/stabilityai/stable-diffusion-2";
const DEFAULT_PLACEHOLDER_URL: &str =
    "https://placehold.co/1024x1024/png?text=Illustration+unavailable";
const DEFAULT_SECRET_KEY: &str = "supersecretkey_change_this_in_production";
/// Ten years.
const MAX_TOKEN_TTL_MINUTES: i64 = 10 * 365 * 24 * 60;

/// Which request shape the image endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProvider {
    /// `GET {base}/{prompt}?width=&height=&seed=`, raw bytes back.
    Pollinations,
    /// `POST {base}` with an `inputs` field, raw bytes back.
    HuggingFace,
}

impl ImageProvider {
    fn default_url(self) -> &'static str {
        match self {
            ImageProvider::Pollinations => DEFAULT_POLLINATIONS_URL,
            ImageProvider::HuggingFace => DEFAULT_HUGGINGFACE_URL,
        }
    }
}

impl FromStr for ImageProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pollinations" => Ok(ImageProvider::Pollinations),
            "huggingface" | "hf" => Ok(ImageProvider::HuggingFace),
            other => anyhow::bail!("unknown image provider: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub provider: ImageProvider,
    pub api_url: String,
    pub api_key: Option<String>,
    pub width: u32,
    pub height: u32,
    pub max_attempts: u32,
    /// Fixed wait between attempts for one chapter.
    pub retry_delay: Duration,
    /// Fixed wait between chapters.
    pub pacing: Duration,
    pub timeout: Duration,
    pub placeholder_url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub token_ttl_minutes: i64,
}

/// Process-wide settings. Built once in `main`, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub llm: LlmConfig,
    pub image: ImageConfig,
    pub auth: AuthConfig,
    pub max_listed_stories: usize,
}

impl AppConfig {
    /// Reads the process environment. `main` loads `.env` beforehand.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Source(lookup);

        let host: IpAddr = env
            .parsed("HOST")
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port: u16 = env.parsed("PORT").unwrap_or(8080);

        let llm = LlmConfig {
            api_url: env.get_or("LLM_API_URL", DEFAULT_LLM_API_URL),
            api_key: env.get("LLM_API_KEY").or_else(|| env.get("GROQ_API_KEY")),
            model: env.get_or("LLM_MODEL", DEFAULT_LLM_MODEL),
            temperature: env.parsed("LLM_TEMPERATURE").unwrap_or(0.8),
            timeout: Duration::from_secs(env.parsed("LLM_TIMEOUT_SECS").unwrap_or(60)),
        };

        let provider = match env.get("IMAGE_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => ImageProvider::Pollinations,
        };
        let image = ImageConfig {
            provider,
            api_url: env.get_or("IMAGE_API_URL", provider.default_url()),
            api_key: env.get("IMAGE_API_KEY"),
            width: env.parsed("IMAGE_WIDTH").unwrap_or(1024),
            height: env.parsed("IMAGE_HEIGHT").unwrap_or(1024),
            max_attempts: env.parsed::<u32>("IMAGE_MAX_ATTEMPTS").unwrap_or(3).max(1),
            retry_delay: Duration::from_millis(env.parsed("IMAGE_RETRY_DELAY_MS").unwrap_or(2000)),
            pacing: Duration::from_millis(env.parsed("IMAGE_PACING_MS").unwrap_or(1000)),
            timeout: Duration::from_secs(env.parsed("IMAGE_TIMEOUT_SECS").unwrap_or(120)),
            placeholder_url: env.get_or("IMAGE_PLACEHOLDER_URL", DEFAULT_PLACEHOLDER_URL),
        };

        let secret_key = env.get("SECRET_KEY").unwrap_or_else(|| {
            tracing::warn!("SECRET_KEY not set, falling back to the built-in development key");
            DEFAULT_SECRET_KEY.to_string()
        });
        let auth = AuthConfig {
            secret_key,
            token_ttl_minutes: env
                .parsed::<i64>("ACCESS_TOKEN_EXPIRE_MINUTES")
                .unwrap_or(3000)
                .clamp(1, MAX_TOKEN_TTL_MINUTES),
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            llm,
            image,
            auth,
            max_listed_stories: env.parsed("MAX_LISTED_STORIES").unwrap_or(100),
        })
    }
}

/// Blank values count as unset; unparsable values fall back to the default.
struct Source<F>(F);

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}

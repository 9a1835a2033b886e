use async_trait::async_trait;
use axum::{
    Form, Json, Router,
    extract::{
        FromRef, FromRequest, Multipart, Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{
    LoginForm, SignupRequest, Story, StoredStory, StoryQuery, StoryRequest, TokenResponse,
};
use crate::services::assembler::assemble_story;
use crate::services::auth::{self, AuthUser, TokenKeys};
use crate::services::image::ImageClient;
use crate::services::llm::LLMClient;
use crate::services::store::{MemoryStore, StoreError};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub llm_client: Arc<LLMClient>,
    pub image_client: Arc<ImageClient>,
    pub store: Arc<MemoryStore>,
    pub tokens: TokenKeys,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        Ok(AppState {
            llm_client: Arc::new(LLMClient::new(&config.llm)?),
            image_client: Arc::new(ImageClient::new(&config.image)?),
            store: Arc::new(MemoryStore::new()),
            tokens: TokenKeys::new(&config.auth),
            config: Arc::new(config),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/generate", get(generate_from_query).post(generate))
        .route("/save_story", post(save_story))
        .route("/my_stories", get(my_stories))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(AllowMethods::any())
                .allow_headers(AllowHeaders::any()),
        )
}

async fn index() -> Json<Value> {
    Json(json!({ "status": "alive", "message": "The backend is running!" }))
}

async fn health_check() -> &'static str {
    "OK"
}

fn bad_json(rejection: JsonRejection) -> AppError {
    AppError::Validation(rejection.body_text())
}

async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(req) = payload.map_err(bad_json)?;
    let email = auth::normalize_email(&req.email);
    if !email.contains('@') {
        return Err(AppError::Validation("A valid email is required.".to_string()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }

    let hash = auth::hash_password(&req.password)?;
    state
        .store
        .insert_user(&email, hash)
        .await
        .map_err(|e: StoreError| AppError::Conflict(e.to_string()))?;

    tracing::info!(%email, "account created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully" })),
    ))
}

/// OAuth2 password form, sent either url-encoded or as multipart.
pub struct PasswordForm(pub LoginForm);

#[async_trait]
impl<S> FromRequest<S> for PasswordForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(form) = Form::<LoginForm>::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            return Ok(PasswordForm(form));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        let mut form = LoginForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
        {
            let name = field.name().unwrap_or("unknown").to_string();
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            match name.as_str() {
                "username" => form.username = value,
                "password" => form.password = value,
                _ => {}
            }
        }
        Ok(PasswordForm(form))
    }
}

async fn login(
    State(state): State<AppState>,
    PasswordForm(form): PasswordForm,
) -> Result<Json<TokenResponse>, AppError> {
    let email = auth::normalize_email(&form.username);
    let rejected = || AppError::Validation("Incorrect email or password".to_string());

    let Some(hash) = state.store.password_hash(&email).await else {
        return Err(rejected());
    };
    if !auth::verify_password(&hash, &form.password)? {
        return Err(rejected());
    }

    Ok(Json(TokenResponse {
        access_token: state.tokens.issue(&email)?,
        token_type: "bearer".to_string(),
    }))
}

async fn generate(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<StoryRequest>, JsonRejection>,
) -> Result<Json<Story>, AppError> {
    let Json(request) = payload.map_err(bad_json)?;
    run_generation(&state, &user, request).await.map(Json)
}

async fn generate_from_query(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    query: Result<Query<StoryQuery>, QueryRejection>,
) -> Result<Json<Story>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    run_generation(&state, &user, query.into()).await.map(Json)
}

/// Validation first, so rejected requests never reach an upstream.
async fn run_generation(
    state: &AppState,
    user: &str,
    request: StoryRequest,
) -> Result<Story, AppError> {
    let params = request.validate().map_err(AppError::Validation)?;
    tracing::info!(%user, genre = %params.genre, chapters = params.chapters, "generating story");

    let draft = state.llm_client.generate_draft(&params).await?;
    let image = &state.config.image;
    Ok(assemble_story(draft, state.image_client.as_ref(), image.pacing, &image.placeholder_url).await)
}

async fn save_story(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<Story>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(story) = payload.map_err(bad_json)?;
    if story.title.trim().is_empty() || story.chapters.is_empty() {
        return Err(AppError::Validation(
            "A story needs a title and at least one chapter.".to_string(),
        ));
    }

    let stored = state.store.save_story(&user, story).await;
    tracing::info!(%user, id = %stored.id, "story saved");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Story saved to library!", "id": stored.id })),
    ))
}

async fn my_stories(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Json<Vec<StoredStory>> {
    Json(
        state
            .store
            .list_stories(&user, state.config.max_listed_stories)
            .await,
    )
}

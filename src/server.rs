//! HTTP surface. Handlers authenticate, resolve the registry entry and delegate;
//! all behavior lives in the workflow modules.

use crate::config::Config;
use crate::contribute::{ContributionWorkflow, DraftResult, SubmitResult};
use crate::dashboard::{DashboardService, DashboardView, FileView};
use crate::error::{AppError, Result};
use crate::fork::{ForkManager, ForkStatus, SyncResult};
use crate::github::{GitHubClient, RateLimitMonitor};
use crate::init::{InitOptions, InitializationResult, LanguageInitializer};
use crate::metadata::MetadataStore;
use crate::rate_limit::RateLimiter;
use crate::registry::ProjectRegistry;
use crate::security::authorize_admin;
use crate::translation::DeepLTranslator;
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ProjectRegistry>,
    /// Elevated credential: metadata writes and initialization
    pub admin: GitHubClient,
    pub metadata: MetadataStore,
    pub translator: DeepLTranslator,
    pub init_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Load the registry named in `config` and build the service clients.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let registry = ProjectRegistry::from_file(&config.projects_file)?;
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Config, registry: ProjectRegistry) -> anyhow::Result<Self> {
        let admin = GitHubClient::new(
            &config.github_api_url,
            &config.github_token,
            config.request_timeout(),
        )?
        .with_rate_limit_monitor(RateLimitMonitor::new(config.rate_limit_warning_threshold));
        let metadata = MetadataStore::new(admin.clone(), config.metadata_write_attempts);
        let translator = DeepLTranslator::new(
            &config.deepl_api_url,
            &config.deepl_api_key,
            config.request_timeout(),
        )?;
        let init_limiter = Arc::new(RateLimiter::per_hour(config.init_rate_limit_per_hour));

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            admin,
            metadata,
            translator,
            init_limiter,
        })
    }

    /// Resolve the bearer token to a GitHub login. The returned client acts as
    /// that user.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<(String, GitHubClient)> {
        let token = bearer_token(headers)
            .ok_or_else(|| AppError::Unauthenticated("Missing bearer token".to_string()))?;
        let client = self.admin.with_token(token);
        let user = client.get_authenticated_user().await?;
        Ok((user.login, client))
    }

    fn respond<T>(&self, result: Result<T>) -> ApiResult<T> {
        result.map(Json).map_err(|error| ApiError {
            error,
            production: self.config.is_production(),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-api-key")?.to_str().ok()
}

/// An [`AppError`] rendered as JSON with the matching status code.
#[derive(Debug)]
pub struct ApiError {
    error: AppError,
    production: bool,
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Quota { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {:#}", self.error);
        } else {
            warn!("Request rejected: {}", self.error);
        }

        let mut body = serde_json::json!({
            "error": self.error.kind(),
            "message": self.error.public_message(self.production),
            "hint": self.error.hint(),
        });
        if let AppError::Quota {
            reset_at: Some(at), ..
        } = &self.error
        {
            body["resetAt"] = serde_json::json!(at.to_rfc3339());
        }

        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeRequest {
    commit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftRequest {
    filename: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    filename: String,
    content: String,
    #[serde(default)]
    message: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/projects/:project/languages/:lang/initialize",
            post(initialize_language),
        )
        .route(
            "/api/projects/:project/languages/:lang/dashboard",
            get(get_dashboard),
        )
        .route(
            "/api/projects/:project/languages/:lang/files/:filename",
            get(get_file),
        )
        .route("/api/projects/:project/languages/:lang/draft", post(save_draft))
        .route("/api/projects/:project/languages/:lang/submit", post(submit))
        .route(
            "/api/projects/:project/languages/:lang/sync",
            get(get_sync_status).post(trigger_sync),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn initialize_language(
    State(state): State<AppState>,
    Path((project, lang)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<InitializationResult> {
    let result = async {
        let presented_key = api_key(&headers);
        let login = if presented_key.is_some() {
            None
        } else {
            Some(state.authenticate(&headers).await?.0)
        };
        authorize_admin(login.as_deref(), presented_key, &state.config)?;

        let request: InitializeRequest = if body.is_empty() {
            InitializeRequest::default()
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| AppError::validation(format!("Malformed request body: {}", e)))?
        };

        state
            .init_limiter
            .check(login.as_deref().unwrap_or("api-key"))
            .await?;

        let (project, language) = state.registry.initializable_language(&project, &lang)?;
        let options = InitOptions {
            commit: request.commit,
            coordinator: login.clone(),
        };
        info!(
            "Initialization of {}/{} requested by {}",
            project.slug,
            lang,
            login.as_deref().unwrap_or("API key")
        );

        LanguageInitializer::new(
            &state.admin,
            &state.translator,
            &state.metadata,
            &state.config.github_web_url,
        )
        .run(project, &lang, language, &options)
        .await
    }
    .await;
    state.respond(result)
}

async fn get_dashboard(
    State(state): State<AppState>,
    Path((project, lang)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<DashboardView> {
    let result = async {
        let (user, _) = state.authenticate(&headers).await?;
        let (project, _) = state.registry.language(&project, &lang)?;
        DashboardService::new(&state.admin, &state.metadata)
            .get_dashboard(&user, project, &lang)
            .await
    }
    .await;
    state.respond(result)
}

async fn get_file(
    State(state): State<AppState>,
    Path((project, lang, filename)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<FileView> {
    let result = async {
        let (user, client) = state.authenticate(&headers).await?;
        let (project, _) = state.registry.language(&project, &lang)?;
        DashboardService::new(&state.admin, &state.metadata)
            .get_file(&client, &user, project, &lang, &filename)
            .await
    }
    .await;
    state.respond(result)
}

async fn save_draft(
    State(state): State<AppState>,
    Path((project, lang)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<DraftRequest>,
) -> ApiResult<DraftResult> {
    let result = async {
        let (user, client) = state.authenticate(&headers).await?;
        let (project, _) = state.registry.active_language(&project, &lang)?;
        ContributionWorkflow::new(client, &state.metadata, &state.config)
            .save_draft(&user, project, &lang, &request.filename, &request.content)
            .await
    }
    .await;
    state.respond(result)
}

async fn submit(
    State(state): State<AppState>,
    Path((project, lang)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<SubmitResult> {
    let result = async {
        let (user, client) = state.authenticate(&headers).await?;
        let (project, language) = state.registry.active_language(&project, &lang)?;
        ContributionWorkflow::new(client, &state.metadata, &state.config)
            .submit(
                &user,
                project,
                &lang,
                language,
                &request.filename,
                &request.content,
                request.message.as_deref(),
            )
            .await
    }
    .await;
    state.respond(result)
}

async fn get_sync_status(
    State(state): State<AppState>,
    Path((project, lang)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<ForkStatus> {
    let result = async {
        let (user, client) = state.authenticate(&headers).await?;
        let (project, _) = state.registry.language(&project, &lang)?;
        fork_manager(&state, client)
            .get_fork_status(&user, &project.owner, &project.repo, &lang)
            .await
    }
    .await;
    state.respond(result)
}

async fn trigger_sync(
    State(state): State<AppState>,
    Path((project, lang)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<SyncResult> {
    let result = async {
        let (user, client) = state.authenticate(&headers).await?;
        let (project, _) = state.registry.language(&project, &lang)?;
        fork_manager(&state, client)
            .sync_fork_with_upstream(
                &user,
                &project.owner,
                &project.repo,
                &project.translation_branch(&lang),
            )
            .await
    }
    .await;
    state.respond(result)
}

fn fork_manager(state: &AppState, client: GitHubClient) -> ForkManager {
    ForkManager::new(
        client,
        &state.config.github_web_url,
        state.config.fork_settle_delay(),
    )
}

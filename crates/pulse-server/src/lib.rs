//! Pulse Web Server
//!
//! Axum-based REST API for the Pulse engine.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Organization scoping from request headers on every route
//! - Audit logging for insight and action mutations
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use pulse_core::{
    AIBackend, AIClient, ActionPipeline, Database, DecisionCore, EngineConfig, OrgContext,
    Permission, PredictiveEngine, Responder,
};

mod handlers;
mod scheduler;

pub use scheduler::{start_cycle_scheduler, CycleScheduleConfig};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Tenant the request acts on (required)
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Acting user; defaults to 0 for service callers
pub const USER_HEADER: &str = "x-user-id";

/// Comma-separated permission grants, e.g. `manage_sales,view_reports`
pub const PERMISSIONS_HEADER: &str = "x-user-permissions";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys, sent as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
    /// Engine thresholds, forecast and renderer settings
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            engine: EngineConfig::default(),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub core: DecisionCore,
    pub predictor: PredictiveEngine,
    pub pipeline: Arc<ActionPipeline>,
    pub responder: Responder,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig, ai: Option<AIClient>) -> anyhow::Result<Self> {
        let shared = Arc::new(db.clone());
        let pipeline = Arc::new(ActionPipeline::with_defaults(shared.clone())?);
        let responder = Responder::new(shared, pipeline.clone(), ai, config.engine.clone())?;
        Ok(Self {
            core: DecisionCore::new(db.clone(), config.engine.clone()),
            predictor: PredictiveEngine::new(db.clone(), config.engine.forecast.clone()),
            db,
            config,
            pipeline,
            responder,
        })
    }
}

/// Authentication middleware - validates API keys
///
/// Keys are compared in constant time to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate API key using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    let mut found = false;
    // Check every key so timing does not reveal which one matched
    for key in valid_keys {
        if key.len() == provided.len() && bool::from(key.as_bytes().ct_eq(provided_bytes)) {
            found = true;
        }
    }
    found
}

/// Operation context built from the organization, user and permission headers
pub struct Org(pub OrgContext);

#[async_trait]
impl<S> FromRequestParts<S> for Org
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        org_context(&parts.headers).map(Org)
    }
}

fn org_context(headers: &HeaderMap) -> Result<OrgContext, AppError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let organization_id: i64 = header(ORGANIZATION_HEADER)
        .ok_or_else(|| AppError::bad_request("Missing x-organization-id header"))?
        .parse()
        .map_err(|_| AppError::bad_request("Invalid x-organization-id header"))?;

    let user_id: i64 = match header(USER_HEADER) {
        Some(v) => v
            .parse()
            .map_err(|_| AppError::bad_request("Invalid x-user-id header"))?,
        None => 0,
    };

    let permissions = match header(PERMISSIONS_HEADER) {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|p| p.parse::<Permission>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::bad_request(&e))?,
        None => Vec::new(),
    };

    Ok(OrgContext::new(organization_id, user_id).with_permissions(permissions))
}

/// Create the application router, using the renderer configured in the environment
pub fn create_router(db: Database, config: ServerConfig) -> anyhow::Result<Router> {
    create_router_with_ai(db, config, AIClient::from_env())
}

/// Create the application router with an explicit renderer
pub fn create_router_with_ai(
    db: Database,
    config: ServerConfig,
    ai: Option<AIClient>,
) -> anyhow::Result<Router> {
    let state = Arc::new(AppState::new(db, config.clone(), ai)?);

    let api_routes = Router::new()
        // State and cycles
        .route("/state", get(handlers::get_state))
        .route("/cycle", post(handlers::run_cycle))
        // Insights
        .route("/insights", get(handlers::list_insights))
        .route("/insights/:id/dismiss", post(handlers::dismiss_insight))
        .route("/insights/:id/complete", post(handlers::complete_insight))
        // Predictions
        .route("/predictions", get(handlers::list_predictions))
        .route("/predictions/generate", post(handlers::generate_predictions))
        .route("/predictions/:id/actual", post(handlers::record_actual))
        // Actions
        .route("/actions", get(handlers::list_actions))
        .route("/actions/:id", get(handlers::get_action))
        .route("/actions/:id/confirm", post(handlers::confirm_action))
        .route("/actions/:id/execute", post(handlers::execute_action))
        .route("/actions/:id/cancel", post(handlers::cancel_action))
        .route("/actions/:id/rate", post(handlers::rate_action))
        .route("/suggestions", get(handlers::list_suggestions))
        // Chat
        .route("/chat", post(handlers::chat));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ));

    Ok(app)
}

/// Start the server with the default configuration
pub async fn serve(db: Database, addr: &str) -> anyhow::Result<()> {
    serve_with_config(db, addr, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    addr: &str,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }

    let ai = AIClient::from_env();
    check_ai_connection(ai.as_ref()).await;

    // Start cycle scheduler if configured
    if let Some(schedule) = CycleScheduleConfig::from_env() {
        start_cycle_scheduler(db.clone(), config.engine.clone(), schedule);
    }

    let app = create_router_with_ai(db, config, ai)?;

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI renderer connection status
async fn check_ai_connection(ai: Option<&AIClient>) {
    match ai {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "✅ AI renderer connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "⚠️  AI renderer configured but not responding: {} (answers fall back to templates)",
                    client.host()
                );
            }
        }
        None => {
            info!("ℹ️  AI renderer not configured (set OLLAMA_HOST to enable phrased answers)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Client-facing status of an engine error, None for internal failures
fn engine_status(err: &pulse_core::Error) -> Option<StatusCode> {
    use pulse_core::Error;

    match err {
        Error::Validation(_) | Error::InvalidData(_) => Some(StatusCode::UNPROCESSABLE_ENTITY),
        Error::PermissionDenied(_) => Some(StatusCode::FORBIDDEN),
        Error::InvalidState(_) => Some(StatusCode::CONFLICT),
        Error::NotFound(_) => Some(StatusCode::NOT_FOUND),
        _ => None,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        if let Some(status) = err.downcast_ref::<pulse_core::Error>().and_then(engine_status) {
            return Self {
                status,
                message: err.to_string(),
                internal: None,
            };
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;

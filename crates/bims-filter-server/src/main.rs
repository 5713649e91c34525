use axum::{
    extract::{Json, Query, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use bims_filter_core::{
    catalog, tree, FilterBuilder, FilterConfig, FilterFieldCatalog, RestoreOutcome, RestoreReport,
    ScaleNode, SelectedLayers, SerializedGroup,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Clone)]
struct AppConfig {
    port: u16,
    host: String,
    log_level: String,
    catalog_path: String,
    cors_allow_origin: String,
    request_timeout_secs: u64,
    max_request_size_bytes: usize,
    autocomplete_limit: usize,
}

impl AppConfig {
    fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            catalog_path: std::env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "fixtures/catalog.json".to_string()),
            cors_allow_origin: std::env::var("CORS_ALLOW_ORIGIN")
                .unwrap_or_else(|_| "*".to_string()),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            max_request_size_bytes: std::env::var("MAX_REQUEST_SIZE_BYTES")
                .unwrap_or_else(|_| "1048576".to_string()) // 1MB
                .parse()
                .unwrap_or(1024 * 1024),
            autocomplete_limit: std::env::var("AUTOCOMPLETE_LIMIT")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .unwrap_or(25),
        }
    }

    fn cors_origin(&self) -> AllowOrigin {
        if self.cors_allow_origin == "*" {
            return AllowOrigin::from(Any);
        }
        match self.cors_allow_origin.parse::<HeaderValue>() {
            Ok(origin) => AllowOrigin::exact(origin),
            Err(_) => {
                warn!(
                    "Invalid CORS_ALLOW_ORIGIN {:?}, allowing any origin",
                    self.cors_allow_origin
                );
                AllowOrigin::from(Any)
            }
        }
    }
}

// =============================================================================
// Catalog store
// =============================================================================

/// The catalog fixture. Autocomplete nodes may carry their full value list
/// as the lookup corpus; the served payload omits it.
struct CatalogStore {
    payload: Vec<ScaleNode>,
    public: Vec<ScaleNode>,
    fields: usize,
}

impl CatalogStore {
    fn from_payload(payload: Vec<ScaleNode>) -> bims_filter_core::Result<Self> {
        let fields = FilterFieldCatalog::from_payload(&payload)?.len();
        let mut public = payload.clone();
        strip_autocomplete_values(&mut public);
        Ok(Self {
            payload,
            public,
            fields,
        })
    }

    fn search(&self, key: &str, term: &str, limit: usize) -> Option<Vec<AutocompleteItem>> {
        let node = tree::find(&self.payload, |n| n.key() == Some(key))?;
        let needle = term.to_lowercase();
        let mut seen = HashSet::new();
        Some(
            node.value
                .iter()
                .map(|v| v.query.as_str())
                .filter(|q| q.to_lowercase().contains(&needle))
                .filter(|q| seen.insert(*q))
                .take(limit)
                .map(|q| AutocompleteItem {
                    value: q.to_string(),
                })
                .collect(),
        )
    }
}

fn strip_autocomplete_values(nodes: &mut [ScaleNode]) {
    for node in nodes {
        if node.autocomplete {
            node.value.clear();
        }
        strip_autocomplete_values(&mut node.children);
    }
}

#[derive(Clone)]
struct AppState {
    catalog: Arc<CatalogStore>,
    config: AppConfig,
    start_time: Instant,
}

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct AutocompleteParams {
    /// Search term
    #[serde(default)]
    #[param(example = "berg")]
    q: String,
    #[serde(default, rename = "groupKey")]
    #[param(example = "sites")]
    group_key: String,
    #[serde(default, rename = "layerIdentifier")]
    #[param(example = "code")]
    layer_identifier: String,
}

impl AutocompleteParams {
    fn key(&self) -> String {
        if self.layer_identifier.is_empty() {
            self.group_key.clone()
        } else {
            format!("{}.{}", self.group_key, self.layer_identifier)
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
struct AutocompleteItem {
    #[schema(example = "BERG01")]
    value: String,
}

#[derive(Deserialize, ToSchema)]
struct PreviewRequest {
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    groups: Vec<SerializedGroup>,
}

#[derive(Serialize, ToSchema)]
struct PreviewResponse {
    expression: String,
    human: String,
    #[schema(value_type = Object)]
    layers: SelectedLayers,
    #[schema(value_type = Object)]
    restore: RestoreReport,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    fields: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// OpenAPI Documentation
// =============================================================================

#[derive(OpenApi)]
#[openapi(
    paths(health_check, catalog_list, location_autocomplete, filter_preview),
    components(
        schemas(
            AutocompleteItem, PreviewRequest, PreviewResponse, ErrorResponse, HealthResponse
        )
    ),
    tags(
        (name = "bims-filter", description = "Spatial filter development backend")
    )
)]
struct ApiDoc;

// =============================================================================
// Main Entry Point
// =============================================================================

fn app(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-csrftoken"),
        ]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/spatial-scale-filter-list/", get(catalog_list))
        .route(
            "/api/location-context-autocomplete/",
            get(location_autocomplete),
        )
        .route("/api/filter/preview", post(filter_preview))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(RequestBodyLimitLayer::new(config.max_request_size_bytes))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    fmt().with_env_filter(env_filter).with_target(false).init();

    info!("Starting BIMS filter backend v{}", env!("CARGO_PKG_VERSION"));

    let store = match catalog::read_payload(&config.catalog_path).and_then(CatalogStore::from_payload)
    {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to load catalog {}: {}", config.catalog_path, e);
            return Err(std::io::Error::other(e));
        }
    };
    info!(
        "Loaded {} filter fields from {}",
        store.fields, config.catalog_path
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        catalog: Arc::new(store),
        config,
        start_time: Instant::now(),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        fields: state.catalog.fields,
    })
}

#[utoipa::path(
    get,
    path = "/api/spatial-scale-filter-list/",
    responses(
        (status = 200, description = "Nested spatial scale catalog")
    )
)]
async fn catalog_list(State(state): State<AppState>) -> Json<Vec<ScaleNode>> {
    Json(state.catalog.public.clone())
}

#[utoipa::path(
    get,
    path = "/api/location-context-autocomplete/",
    params(AutocompleteParams),
    responses(
        (status = 200, description = "Matching values", body = [AutocompleteItem]),
        (status = 404, description = "No catalog node with that key", body = ErrorResponse)
    )
)]
async fn location_autocomplete(
    State(state): State<AppState>,
    Query(params): Query<AutocompleteParams>,
) -> Result<Json<Vec<AutocompleteItem>>, ApiError> {
    let key = params.key();
    match state
        .catalog
        .search(&key, &params.q, state.config.autocomplete_limit)
    {
        Some(items) => Ok(Json(items)),
        None => {
            warn!("Autocomplete for unknown key {:?}", key);
            Err(api_error(
                StatusCode::NOT_FOUND,
                format!("Unknown catalog key: {}", key),
            ))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/filter/preview",
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Rendered filter for the restored groups", body = PreviewResponse),
        (status = 500, description = "Catalog could not be loaded", body = ErrorResponse)
    )
)]
async fn filter_preview(
    State(state): State<AppState>,
    Json(payload): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let mut builder = FilterBuilder::with_catalog(FilterConfig::default(), &state.catalog.payload)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let restore = match builder.restore_groups(payload.groups) {
        RestoreOutcome::Restored(report) => report,
        RestoreOutcome::Deferred => {
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Catalog is not loaded",
            ))
        }
    };
    if !restore.is_lossless() {
        info!(
            "Preview dropped {} clauses",
            restore.dropped_clauses.len()
        );
    }

    Ok(Json(PreviewResponse {
        expression: builder.to_expr(),
        human: builder.to_human(),
        layers: builder.get_selected_layers(),
        restore,
    }))
}

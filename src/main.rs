mod config;
mod conversation;
mod drive;
mod extraction;
mod finalizer;
mod gateway;
mod http;
mod llm;
mod media;
mod metrics;
mod models;
mod naming;
mod outbox;
mod security;
mod storage;
mod store;
#[cfg(test)]
mod testing;

use axum::{
    Form, Json, Router,
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use config::AppConfig;
use conversation::{
    ConversationEngine, ConversationStore, EngineParts, MemoryConversationStore, OutboundReply,
    redis_store::RedisConversationStore,
};
use eyre::{WrapErr, eyre};
use gateway::{MessagingGateway, TwilioGateway};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, Listing, ListingQuery};
use outbox::Outbox;
use security::{AuthContext, AuthState, SIGNATURE_HEADER, SignatureVerifier, require_api_auth};
use serde_json::json;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use store::{ListingStore, StoreError, memory::MemoryListingStore, supabase::SupabaseListingStore};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const MAX_PAGE_SIZE: usize = 500;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "listing.api", "server crashed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env()?;
    let http = http::build_client(&config.http);

    let listings: Arc<dyn ListingStore> = match config.supabase.clone() {
        Some(supabase) => {
            info!(target = "listing.api", base_url = %supabase.base_url, "using Supabase listing store");
            Arc::new(SupabaseListingStore::new(supabase, http.clone()))
        }
        None => {
            warn!(target = "listing.api", "SUPABASE_URL not set; listings and sessions live in memory");
            Arc::new(MemoryListingStore::default())
        }
    };

    let states: Arc<dyn ConversationStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).wrap_err("invalid REDIS_URL")?;
            info!(target = "listing.api", ttl_secs = config.conversation_ttl_secs, "using Redis conversation store");
            Arc::new(RedisConversationStore::new(client, config.conversation_ttl_secs))
        }
        None => Arc::new(MemoryConversationStore::default()),
    };

    if config.drive.credentials.is_none() {
        warn!(target = "listing.api", "no Google Drive credentials configured; photo uploads will fail");
    }
    let storage = Arc::new(drive::DriveClient::new(config.drive.clone(), http.clone()));
    let extractor = Arc::new(extraction::LlmExtractor::new(llm::LlmClient::new(
        config.llm.clone(),
        http.clone(),
    )));
    let gateway: Arc<dyn MessagingGateway> =
        Arc::new(TwilioGateway::new(config.twilio.clone(), http.clone()));

    let (outbox, _sender) = Outbox::spawn(gateway.clone(), config.outbox_capacity);
    let engine = ConversationEngine::new(EngineParts {
        states,
        store: listings.clone(),
        storage,
        extractor,
        gateway,
        root_folder_id: config.root_folder_id.clone(),
        outbox: Some(outbox),
    });

    let verifier = config
        .webhook_public_url
        .as_ref()
        .map(|url| SignatureVerifier::new(config.twilio.auth_token.clone(), url.clone()));
    if verifier.is_none() {
        warn!(target = "listing.api", "WEBHOOK_PUBLIC_URL not set; webhook signatures are not checked");
    }

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| eyre!("prometheus recorder: {err}"))?;

    let state = AppState {
        engine,
        listings,
        verifier,
        openapi: Arc::new(load_openapi()),
        prometheus_handle: Some(prometheus_handle),
        docs_key: config::env_string("OPENAPI_KEY"),
        metrics_key: config::env_string("METRICS_KEY"),
    };
    let app = build_router(state, AuthState::from_env(), config.body_limit);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "listing.api", "listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    engine: ConversationEngine,
    listings: Arc<dyn ListingStore>,
    verifier: Option<SignatureVerifier>,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: Option<PrometheusHandle>,
    docs_key: Option<String>,
    metrics_key: Option<String>,
}

fn build_router(state: AppState, auth: AuthState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/listings", get(list_listings))
        .route("/listings/{id}", get(get_listing))
        .route_layer(middleware::from_fn_with_state(auth, require_api_auth));

    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

fn load_openapi() -> serde_json::Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
}

/// Inbound WhatsApp webhook.
///
/// - Method: `POST`
/// - Path: `/webhook`
/// - Body: gateway form fields (`From`, `Body`, `NumMedia`, `MediaUrl{i}`, ...)
/// - Response: TwiML; empty when the reply goes out as a separate message
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    crate::metrics::inc_requests("/webhook");

    if let Some(verifier) = &state.verifier {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if !verifier.verify(signature, &form) {
            warn!(target = "listing.api", "rejected webhook with bad signature");
            return (StatusCode::FORBIDDEN, "invalid signature").into_response();
        }
    }

    let Some((sender, event)) = gateway::event_from_form(&form) else {
        warn!(target = "listing.api", "webhook without sender");
        return twiml_response(StatusCode::BAD_REQUEST, None);
    };
    info!(
        target = "listing.api",
        sender = %sender,
        has_text = event.trimmed_text().is_some(),
        media = event.media.len(),
        "webhook received"
    );

    let reply = state.engine.handle(&sender, event).await;
    debug!(target = "listing.api", sender = %sender, reply = %reply.text(), "reply ready");
    match reply {
        OutboundReply::Inline(text) => twiml_response(StatusCode::OK, Some(&text)),
        // Already queued by the engine.
        OutboundReply::Notify(_) => twiml_response(StatusCode::OK, None),
    }
}

fn twiml_response(status: StatusCode, message: Option<&str>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/xml")],
        gateway::twiml(message),
    )
        .into_response()
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "listing-intake",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(key) = &state.docs_key {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::Unauthorized("docs"));
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Listing Intake API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.metrics_key {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    let body = state
        .prometheus_handle
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Stored listings, oldest first.
///
/// - Method: `GET`
/// - Path: `/listings?skip=0&limit=100`
/// - Auth: `Authorization: Bearer <key>` or `X-Listing-Key: <key>`
async fn list_listings(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Vec<Listing>>, AppError> {
    crate::metrics::inc_requests("/listings");
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    info!(
        target = "listing.api",
        client = %context.client_id,
        api_key = %context.api_key_id,
        skip = query.skip,
        limit,
        "listings requested"
    );
    let rows = state.listings.list_listings(query.skip, limit).await?;
    Ok(Json(rows))
}

async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Listing>, AppError> {
    crate::metrics::inc_requests("/listings/{id}");
    state
        .listings
        .get_listing(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound(id))
}

#[derive(Debug)]
enum AppError {
    Store(StoreError),
    NotFound(i64),
    Unauthorized(&'static str),
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            AppError::Store(err) => {
                error!(target = "listing.api", error = %err, "listing store failed");
                (StatusCode::BAD_GATEWAY, "store_failure", err.to_string())
            }
            AppError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("listing {id} not found"),
            ),
            AppError::Unauthorized(area) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                format!("{area} key required"),
            ),
        };
        let payload = ApiError {
            error: error.to_string(),
            detail: Some(detail),
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

use crate::cli::Args;
use crate::error::RelayError;
use crate::llm::chat::ChatClient;
use crate::models::chat::{ preview, ChatRequest, Message };
use crate::server::stats::RelayStats;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{ Duration, Instant };
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ State, Query, Request, rejection::{ JsonRejection, QueryRejection } },
    middleware::{ self, Next },
    response::Response,
};
use chrono::Utc;
use governor::{ DefaultDirectRateLimiter, Quota, RateLimiter };
use serde::Deserialize;
use serde_json::{ json, Value };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Deserialize)]
pub struct SimpleChatParams {
    pub message: String,
}

#[derive(Clone)]
pub struct AppState {
    client: Arc<dyn ChatClient>,
    stats: Arc<RelayStats>,
    api_key: Option<String>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    started_at: Instant,
}

impl AppState {
    pub fn new(client: Arc<dyn ChatClient>, stats: Arc<RelayStats>) -> Self {
        Self {
            client,
            stats,
            api_key: None,
            limiter: None,
            started_at: Instant::now(),
        }
    }

    pub fn from_args(args: &Args, client: Arc<dyn ChatClient>, stats: Arc<RelayStats>) -> Self {
        Self::new(client, stats)
            .with_api_key(args.api_key())
            .with_rate_limit(args.rate_limit_requests, Duration::from_secs(args.rate_limit_window))
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Allows bursts of `requests` chat calls, refilled evenly over `window`. Zero disables limiting.
    pub fn with_rate_limit(mut self, requests: u32, window: Duration) -> Self {
        self.limiter = NonZeroU32::new(requests).map(|burst| {
            let quota = Quota::with_period(window / burst.get())
                .unwrap_or_else(|| Quota::per_second(burst))
                .allow_burst(burst);
            Arc::new(RateLimiter::direct(quota))
        });
        self
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // route_layer order: the API key check runs before the rate limiter.
    let chat_routes = Router::new()
        .route("/chat", post(chat_handler))
        .route("/simple-chat", post(simple_chat_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .merge(chat_routes)
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    args: &Args,
    state: AppState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = args.http_addr().parse::<SocketAddr>()?;
    let app = router(state);

    if let Some((cert_path, key_path)) = args.tls_paths()? {
        info!("Loading TLS certificate from '{}' and key from '{}'", cert_path, key_path);
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        info!("HTTPS API listening on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("HTTP API listening on: http://{}", addr);
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    info!("HTTP API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, RelayError> {
    if let Some(required) = &state.api_key {
        let provided = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(required.as_str()) {
            warn!("Rejected {} {}: bad or missing API key", req.method(), req.uri().path());
            return Err(RelayError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}

async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, RelayError> {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Rate limit exceeded for {}", req.uri().path());
            return Err(RelayError::RateLimited);
        }
    }
    Ok(next.run(req).await)
}

async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    info!("Root endpoint accessed");
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "upstream": {
            "url": state.client.get_base_url(),
            "model": state.client.get_model(),
        },
        "endpoints": {
            "health": "/health",
            "chat": "/chat",
            "simple_chat": "/simple-chat",
        }
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    info!("Health check");
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "upstream": {
            "url": state.client.get_base_url(),
            "model": state.client.get_model(),
        },
        "metrics": state.stats.snapshot(),
    }))
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    info!("Chat request");
    let Json(request) = payload.map_err(|e| {
        warn!("Malformed chat request: {}", e.body_text());
        RelayError::InvalidRequest(e.body_text())
    })?;
    forward(&state, request).await.map(Json)
}

async fn simple_chat_handler(
    State(state): State<AppState>,
    params: Result<Query<SimpleChatParams>, QueryRejection>,
) -> Result<Json<Value>, RelayError> {
    let Query(params) = params.map_err(|e| RelayError::InvalidRequest(e.body_text()))?;
    if params.message.trim().is_empty() {
        return Err(RelayError::InvalidRequest("message must not be empty".to_string()));
    }
    info!("Simple chat - Message: {}", preview(&params.message, 50));

    forward(&state, ChatRequest::new(vec![Message::user(params.message)])).await.map(Json)
}

async fn forward(state: &AppState, request: ChatRequest) -> Result<Value, RelayError> {
    state.stats.record_chat_request();
    if let Err(e) = request.validate() {
        warn!("Rejected chat request: {}", e);
        return Err(e);
    }

    match state.client.complete(&request).await {
        Ok(completion) => {
            info!("Chat response sent");
            Ok(completion)
        }
        Err(e) => {
            if e.is_upstream() {
                state.stats.record_upstream_failure();
            }
            Err(e)
        }
    }
}

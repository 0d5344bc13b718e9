use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    Router,
    extract::State,
    extract::rejection::JsonRejection,
    http::{ Method, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
};
use governor::{ Quota, RateLimiter };
use governor::clock::DefaultClock;
use governor::state::{ InMemoryState, NotKeyed };
use log::{ error, info, warn };
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::cors::{ Any, CorsLayer };
use uuid::Uuid;

use crate::cli::Args;
use crate::config::persona::{ self, PersonaConfig };
use crate::error::ChatError;
use crate::llm::CompletionClient;
use crate::models::chat::{ ChatMessage, ChatReply, ChatRequest, ErrorBody, Role };

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Transcript-ready fallback carried in every error body so the widget never
/// has to invent one from a raw error.
const FALLBACK_REPLY: &str = "抱歉，服务暂时不可用。请稍后再试或直接联系我们。";

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn CompletionClient>,
    pub persona: Arc<RwLock<Arc<PersonaConfig>>>,
    pub persona_path: Option<String>,
    limiter: Arc<DirectLimiter>,
    pub credential_present: bool,
    pub history_window: usize,
    pub debug: bool,
}

impl AppState {
    pub fn new(
        args: &Args,
        client: Arc<dyn CompletionClient>,
        persona: Arc<PersonaConfig>,
    ) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(args.chat_rate_limit.max(1)).unwrap_or(NonZeroU32::MIN)
        );
        Self {
            client,
            persona: Arc::new(RwLock::new(persona)),
            persona_path: args.persona_path.clone(),
            limiter: Arc::new(RateLimiter::direct(quota)),
            credential_present: !args.chat_api_key.is_empty(),
            history_window: args.history_window,
            debug: args.debug,
        }
    }
}

pub struct ApiError {
    err: ChatError,
    debug: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.err.user_reply().to_string(),
            reply: FALLBACK_REPLY.to_string(),
            details: if self.debug { Some(self.err.to_string()) } else { None },
        };
        (self.err.status(), Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ServiceStatus {
    status: &'static str,
    service: &'static str,
    message: &'static str,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    details: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/", get(status_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/reload-persona", get(reload_persona_handler))
        .layer(cors)
        .with_state(state)
}

async fn status_handler() -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "运行中",
        service: "NeuraServe AI",
        message: "使用POST /api/chat聊天",
    })
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let request_id = Uuid::new_v4();
    match proxy_turn(&state, payload, request_id).await {
        Ok(reply) => Ok(Json(reply)),
        Err(err) => {
            error!("[{}] Chat turn failed: {}", request_id, err);
            Err(ApiError { err, debug: state.debug })
        }
    }
}

async fn proxy_turn(
    state: &AppState,
    payload: Result<Json<ChatRequest>, JsonRejection>,
    request_id: Uuid,
) -> Result<ChatReply, ChatError> {
    let Json(req) = payload.map_err(|_| ChatError::InvalidRequest)?;

    // Client-supplied system turns are discarded; the persona prompt is the
    // server's to control.
    let turns: Vec<ChatMessage> = req.messages
        .into_iter()
        .filter(|m| m.role != Role::System)
        .collect();

    if turns.is_empty() {
        return Err(ChatError::InvalidRequest);
    }
    let blank_last = turns
        .last()
        .map(|m| m.content.trim().is_empty())
        .unwrap_or(true);
    if blank_last {
        return Err(ChatError::InvalidRequest);
    }

    if !state.credential_present {
        // Configuration problem, not a client error. Only a masked message
        // leaves the server.
        error!("[{}] Upstream credential is not configured", request_id);
        return Err(ChatError::MissingCredential);
    }

    if state.limiter.check().is_err() {
        warn!("[{}] Chat rate limit exceeded", request_id);
        return Err(ChatError::TooManyRequests);
    }

    let persona_config = state.persona.read().await.clone();
    let start = turns.len().saturating_sub(state.history_window);
    let mut outbound = Vec::with_capacity(turns.len() - start + 1);
    outbound.push(ChatMessage::system(persona_config.system_prompt.clone()));
    outbound.extend_from_slice(&turns[start..]);

    info!(
        "[{}] Forwarding {} turn(s) to model {}",
        request_id,
        outbound.len() - 1,
        state.client.model()
    );

    let reply = state.client.complete(&outbound).await?;
    info!("[{}] Completed turn ({} chars)", request_id, reply.chars().count());

    Ok(ChatReply { reply, success: true })
}

async fn reload_persona_handler(State(state): State<AppState>) -> impl IntoResponse {
    let Some(path) = state.persona_path.as_deref() else {
        return (
            StatusCode::OK,
            Json(ReloadResponse {
                success: true,
                message: "Built-in persona active, nothing to reload".to_string(),
                details: None,
            }),
        );
    };

    let current = state.persona.read().await.clone();
    match persona::reload_persona_if_changed(path, &current) {
        Ok(Some(new_persona)) => {
            *state.persona.write().await = new_persona;
            info!("Persona reloaded from '{}'", path);
            (
                StatusCode::OK,
                Json(ReloadResponse {
                    success: true,
                    message: "Persona reloaded".to_string(),
                    details: None,
                }),
            )
        }
        Ok(None) =>
            (
                StatusCode::OK,
                Json(ReloadResponse {
                    success: true,
                    message: "Persona unchanged".to_string(),
                    details: None,
                }),
            ),
        Err(e) => {
            error!("Persona reload failed: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(ReloadResponse {
                    success: false,
                    message: "Persona reload failed".to_string(),
                    details: Some(e.to_string()),
                }),
            )
        }
    }
}

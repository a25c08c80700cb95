//! HTTP surface for docchat
//!
//! `POST /api/chat` answers a question against the ingested corpus.
//! `GET /api/profiles` lists the selectable domain profiles and
//! `GET /healthz` is a liveness probe.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use docchat_agents::{AgentError, ConversationalChain};
use docchat_core::profile::SELECT_FIELD_PLACEHOLDER;
use docchat_core::{AnswerResult, ConversationTurn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
    chain: Arc<ConversationalChain>,
}

/// Body of `POST /api/chat`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<ConversationTurn>>,
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSummary {
    name: String,
    thematic_question: String,
}

#[derive(Debug, Serialize)]
struct ProfilesResponse {
    profiles: Vec<ProfileSummary>,
    placeholder: &'static str,
}

/// Error reported to HTTP clients as `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let status = if err.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "chat request failed: {}", self.message);
        } else {
            warn!(status = %self.status, "chat request rejected: {}", self.message);
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Build the application router around a shared chain
pub fn router(chain: Arc<ConversationalChain>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/chat", post(chat).fallback(method_not_allowed))
        .route("/api/profiles", get(profiles))
        .with_state(AppState { chain })
}

/// Bind `addr` and serve until the process is stopped
pub async fn serve(chain: Arc<ConversationalChain>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("docchat listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(chain)).await
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody {
            error: "Method not allowed".to_string(),
        }),
    )
        .into_response()
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<AnswerResult>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let question = request
        .question
        .ok_or_else(|| ApiError::bad_request("No question in the request"))?;
    let history = request.history.unwrap_or_default();

    let answer = state
        .chain
        .answer(&question, &history, request.profile.as_deref())
        .await?;

    Ok(Json(answer))
}

async fn profiles(State(state): State<AppState>) -> Json<ProfilesResponse> {
    let profiles = state
        .chain
        .profiles()
        .iter()
        .map(|p| ProfileSummary {
            name: p.name.clone(),
            thematic_question: p.thematic_question.clone(),
        })
        .collect();

    Json(ProfilesResponse {
        profiles,
        placeholder: SELECT_FIELD_PLACEHOLDER,
    })
}

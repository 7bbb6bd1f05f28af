//! Local web chat.
//!
//! Serves a single chat page and a small JSON API over one shared
//! conversation. One turn runs at a time; a message that arrives while a
//! turn is in flight is answered with a `pending` status.

use crate::error_reply;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use journal_core::chart::{self, ChartError};
use journal_core::{ConversationState, JournalSession, Next, TurnStatus};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Shared server state.
pub struct AppState {
    session: JournalSession,
    conversation: Mutex<ConversationState>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(session: JournalSession) -> Self {
        Self {
            session,
            conversation: Mutex::new(ConversationState::Idle),
            shutdown: CancellationToken::new(),
        }
    }

    /// Fires when the server is asked to stop. Cancelling it also aborts an
    /// in-flight turn.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub status: &'static str,
    /// Absent while another turn holds the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    pub ended: bool,
    pub saved: bool,
    /// Set when this turn rendered the mood chart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
}

const BUSY_REPLY: &str = "Still working on your last message. Please wait a moment.";

#[derive(Debug, Serialize)]
pub struct ChartReply {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorReply {
            error: message.into(),
        }),
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/chat", post(chat))
        .route("/api/chart", post(render_chart))
        .route("/api/chart.svg", get(chart_svg))
        .route("/api/shutdown", post(shutdown))
        .with_state(state)
}

/// Serve until the shutdown token fires.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let token = state.shutdown_token();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}

async fn index() -> Html<&'static str> {
    const INDEX: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/index.html"));
    Html(INDEX)
}

async fn chat(State(app): State<Arc<AppState>>, Json(body): Json<ChatRequest>) -> Response {
    let message = body.message.trim();
    if message.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is empty");
    }

    let Ok(mut conversation) = app.conversation.try_lock() else {
        tracing::debug!("turn already in flight");
        let status = TurnStatus::Pending;
        return (
            StatusCode::CONFLICT,
            Json(ChatReply {
                reply: BUSY_REPLY.to_string(),
                status: status.label(),
                state: None,
                ended: false,
                saved: false,
                chart: None,
            }),
        )
            .into_response();
    };

    let result = app
        .session
        .handle_with_cancel(&conversation, message, &app.shutdown)
        .await;

    let reply = match &result {
        Ok(turn) => turn.reply.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "turn failed");
            error_reply(e).to_string()
        }
    };

    let status = TurnStatus::from(result);
    let mut ended = false;
    let mut saved = false;
    let mut chart = None;
    if let TurnStatus::Resolved(turn) = &status {
        saved = turn.saved.is_some();
        chart = turn.chart.as_ref().map(|p| p.display().to_string());
        match &turn.next {
            Next::Continue(next) => *conversation = next.clone(),
            Next::End => {
                *conversation = ConversationState::Idle;
                ended = true;
            }
        }
    }

    Json(ChatReply {
        reply,
        status: status.label(),
        state: Some(conversation.label()),
        ended,
        saved,
        chart,
    })
    .into_response()
}

async fn render_chart(State(app): State<Arc<AppState>>) -> Response {
    let store = app.session.store().path();
    match chart::render(store, app.session.chart_path()).await {
        Ok(path) => Json(ChartReply {
            path: path.display().to_string(),
        })
        .into_response(),
        Err(ChartError::Empty) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, ChartError::Empty.to_string())
        }
        Err(e) => {
            tracing::warn!(error = %e, "mood chart failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn chart_svg(State(app): State<Arc<AppState>>) -> Response {
    match tokio::fs::read(app.session.chart_path()).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/svg+xml")], bytes).into_response(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "no mood chart has been generated yet")
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn shutdown(State(app): State<Arc<AppState>>) -> StatusCode {
    tracing::info!("shutdown requested");
    app.shutdown.cancel();
    StatusCode::ACCEPTED
}

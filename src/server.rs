//! HTTP chat entry point.
//!
//! Exposes the retrieval engine to the UI collaborator over JSON HTTP.
//! A query with no good match is a **200-level modeled outcome**, never a
//! 5xx. Only genuine infrastructure failure (embedding provider down,
//! store unreadable) produces a 500, and vendor/subprocess detail is
//! logged rather than returned to the client.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a query: `{query_text, project_id}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-embedded
//! chat widgets can call the endpoint cross-origin.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::migrate;
use crate::retrieval::{self, AnswerOutcome, RetrievalOptions};
use crate::store::SqliteStore;

/// Shared application state passed to route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(SqliteStore::new(pool)),
        embedder,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Chat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Request/response bodies ============

#[derive(Deserialize)]
struct ChatRequest {
    query_text: String,
    project_id: String,
}

#[derive(Serialize)]
struct ChatResponse {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

fn error_response(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }),
    )
        .into_response()
}

// ============ Handlers ============

async fn handle_chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    if req.query_text.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "query_text must not be empty",
        );
    }
    if req.project_id.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "project_id must not be empty",
        );
    }

    let credential = match state.config.embedding_credential() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to resolve embedding credential");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "could not answer the query",
            );
        }
    };

    let options = RetrievalOptions {
        threshold: state.config.retrieval.threshold,
        decline_message: state.config.retrieval.decline_message.clone(),
        concurrency: state.config.embedding.concurrency,
        credential,
    };

    let outcome = retrieval::answer(
        state.store.as_ref(),
        state.embedder.as_ref(),
        &options,
        &req.query_text,
        &req.project_id,
    )
    .await;

    match outcome {
        AnswerOutcome::Answered {
            answer,
            document_id,
            ..
        } => Json(ChatResponse {
            outcome: "answered",
            answer: Some(answer),
            message: None,
            document_id: Some(document_id),
        })
        .into_response(),
        AnswerOutcome::NoConfidentMatch { message } => Json(ChatResponse {
            outcome: "declined",
            answer: None,
            message: Some(message),
            document_id: None,
        })
        .into_response(),
        AnswerOutcome::NoKnowledgeBase => Json(ChatResponse {
            outcome: "no_knowledge_base",
            answer: None,
            message: Some("This project has no documents yet.".to_string()),
            document_id: None,
        })
        .into_response(),
        AnswerOutcome::Failed(failure) => {
            // Infrastructure failure: log the detail, return a generic 500.
            error!(error = %failure, "retrieval failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "could not answer the query",
            )
        }
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

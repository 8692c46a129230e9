//! HTTP surface of the message module.
//!
//! Routes:
//! - `POST /messages/@edit`: edit a queued message
//! - `GET  /messages/{id}`: current snapshot (latest, else base)

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info_span;

use msgpush_core::{Context, ServiceError};

use crate::editor::Editor;
use crate::model::EditRequest;

type EditorState = Arc<Editor>;

pub fn router(editor: Arc<Editor>) -> Router {
    Router::new()
        .route("/messages/@edit", post(edit))
        .route("/messages/{id}", get(detail))
        .with_state(editor)
}

/// Run a blocking editor call off the async runtime under a fresh context.
async fn blocking<T, F>(editor: EditorState, method: &'static str, f: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce(&Editor, &Context) -> Result<T, ServiceError> + Send + 'static,
{
    let ctx = Context::background()
        .with_timeout(editor.config().timeout())
        .with_span(info_span!("message", method));
    tokio::task::spawn_blocking(move || f(&editor, &ctx))
        .await
        .map_err(|e| ServiceError::internal(format!("{method}: {e}")))?
}

/// POST /messages/@edit: apply an edit to a PENDING message.
///
/// A body that does not decode is reported through the taxonomy as
/// `Internal`, never as axum's plain-text rejection.
async fn edit(
    State(editor): State<EditorState>,
    body: Result<Json<EditRequest>, JsonRejection>,
) -> Result<StatusCode, ServiceError> {
    let Json(req) = body.map_err(|e| ServiceError::internal(e.body_text()))?;
    blocking(editor, "Edit", move |editor, ctx| editor.edit(ctx, req)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /messages/{id}: the freshest cached view of a message.
async fn detail(
    State(editor): State<EditorState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let view = blocking(editor, "Detail", move |editor, ctx| editor.detail(ctx, &id)).await?;
    Ok(Json(view))
}

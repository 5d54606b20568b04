//! Read-only HTTP service answering price lookups by map entity.
//!
//! The data root holds one or more generation folders, each laid out like
//! the output of a sync run (`<generation>/<kind>/<id>`). Every request
//! rescans the root, so a generation published while the service runs is
//! picked up immediately.

use crate::model::EntityKind;
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use regex::Regex;
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

static OBJECT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").unwrap());

#[derive(Debug, Clone)]
pub struct LookupState {
    data_dir: Arc<PathBuf>,
}

impl LookupState {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Arc::new(data_dir.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Invalid query URL")]
    InvalidQuery,

    #[error("Prices for {kind} {id} not known")]
    NotFound { kind: EntityKind, id: String },

    #[error("failed to read data directory: {0}")]
    Io(#[from] io::Error),
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidQuery => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            // Hide filesystem details from clients
            Self::Io(e) => {
                error!(error = %e, "Lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error, contact administrator for more details".to_string(),
                )
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            json!({ "err": message }).to_string(),
        )
            .into_response()
    }
}

pub fn router(state: LookupState) -> Router {
    Router::new()
        .route("/node/{id}", get(node_handler))
        .route("/way/{id}", get(way_handler))
        .fallback(fallback)
        .with_state(state)
}

/// Serves lookups over `data_dir` on `bind` until the process is stopped.
pub async fn serve(data_dir: PathBuf, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(
        addr = %listener.local_addr()?,
        data_dir = %data_dir.display(),
        "Lookup service listening"
    );

    axum::serve(listener, router(LookupState::new(data_dir)))
        .await
        .context("lookup service stopped")?;
    Ok(())
}

async fn node_handler(
    State(state): State<LookupState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Response, LookupError> {
    lookup(&state, EntityKind::Node, &id).await
}

async fn way_handler(
    State(state): State<LookupState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Response, LookupError> {
    lookup(&state, EntityKind::Way, &id).await
}

async fn fallback(uri: Uri) -> Response {
    let path = uri.path();
    if path.starts_with("/node/") || path.starts_with("/way/") {
        LookupError::InvalidQuery.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn lookup(state: &LookupState, kind: EntityKind, id: &str) -> Result<Response, LookupError> {
    if !OBJECT_ID.is_match(id) {
        return Err(LookupError::InvalidQuery);
    }

    match find_record(&state.data_dir, kind, id).await? {
        Some(data) => {
            debug!(%kind, id, "Prices found");
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                data,
            )
                .into_response())
        }
        None => Err(LookupError::NotFound {
            kind,
            id: id.to_string(),
        }),
    }
}

/// Returns the record of the first generation, in name order, that has one
/// for `kind`/`id`.
async fn find_record(data_dir: &Path, kind: EntityKind, id: &str) -> io::Result<Option<Vec<u8>>> {
    let mut generations = Vec::new();
    let mut entries = tokio::fs::read_dir(data_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            generations.push(entry.path());
        }
    }
    generations.sort();

    for generation in generations {
        let path = generation.join(kind.as_str()).join(id);
        if tokio::fs::metadata(&path).await.is_err() {
            continue;
        }
        return tokio::fs::read(&path).await.map(Some);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::fs;
    use tower::ServiceExt;

    fn publish(root: &Path, generation: &str, kind: &str, id: &str, content: &str) {
        let dir = root.join(generation).join(kind);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(id), content).unwrap();
    }

    async fn get(root: &Path, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = router(LookupState::new(root))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_returns_stored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let record = r#"{"id":"12345","prices":[]}"#;
        publish(dir.path(), "fr", "node", "98765", record);

        let (status, content_type, body) = get(dir.path(), "/node/98765").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(body, record);
    }

    #[tokio::test]
    async fn test_first_generation_in_name_order_wins() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), "b", "way", "7", "second");
        publish(dir.path(), "a", "way", "7", "first");
        publish(dir.path(), "c", "way", "8", "only");

        assert_eq!(get(dir.path(), "/way/7").await.2, "first");
        assert_eq!(get(dir.path(), "/way/8").await.2, "only");
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), "fr", "node", "1", "{}");

        let (status, _, body) = get(dir.path(), "/way/1").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, r#"{"err":"Prices for way 1 not known"}"#);
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        for uri in ["/node/abc", "/way/12a", "/node/1/2", "/way/"] {
            let (status, content_type, body) = get(dir.path(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(content_type.as_deref(), Some("application/json"));
            assert_eq!(body, r#"{"err":"Invalid query URL"}"#);
        }
    }

    #[tokio::test]
    async fn test_files_at_root_are_not_generations() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("node"), "not a folder").unwrap();

        let (status, _, _) = get(dir.path(), "/node/1").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_data_dir_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();

        let (status, _, body) = get(&dir.path().join("missing"), "/node/1").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            r#"{"err":"Internal server error, contact administrator for more details"}"#
        );
    }

    #[tokio::test]
    async fn test_unrelated_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();

        let (status, _, _) = get(dir.path(), "/relation/1").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

//! HTTP surface: `GET /api/s?id=<source>[&latest]`.
//!
//! Every request runs its own fetch invocation. The body is always the
//! [`FetchResult`] envelope; the HTTP status follows the envelope status.

use crate::models::{FetchResult, Status};
use crate::pipeline::NewsFetcher;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Clone)]
pub struct AppState {
    fetcher: Arc<NewsFetcher>,
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    id: Option<String>,
    /// Accepted for compatibility; every request fetches live.
    latest: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: Status,
    message: String,
}

pub fn router(fetcher: NewsFetcher) -> Router {
    let state = AppState {
        fetcher: Arc::new(fetcher),
    };
    Router::new()
        .route("/api/s", get(get_news))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, fetcher: NewsFetcher) -> Result<(), Box<dyn Error>> {
    let source_id = fetcher.source_id().to_string();
    let app = router(fetcher);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "News API listening on http://{addr}/api/s?id={source_id}&latest");
    axum::serve(listener, app).await?;
    Ok(())
}

fn http_status(status: Status) -> StatusCode {
    match status {
        Status::Success => StatusCode::OK,
        Status::Timeout => StatusCode::GATEWAY_TIMEOUT,
        Status::Failure => StatusCode::BAD_GATEWAY,
        Status::Error => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[instrument(level = "info", skip(state))]
async fn get_news(State(state): State<AppState>, Query(query): Query<NewsQuery>) -> Response {
    if query.id.as_deref() != Some(state.fetcher.source_id()) {
        warn!(id = ?query.id, "Rejected request for unknown source");
        let body = ErrorBody {
            status: Status::Error,
            message: "Invalid id".to_string(),
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    debug!(latest = query.latest.is_some(), "Fetching live listing");
    let result: FetchResult = state.fetcher.fetch().await;
    (http_status(result.status), Json(result)).into_response()
}

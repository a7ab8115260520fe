//! Audit endpoints — recent records, SSE stream, CSV export.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::Stream;
use serde::Deserialize;

use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "d_limit")]
    pub limit: usize,
}

fn d_limit() -> usize {
    100
}

pub async fn recent(
    State(state): State<GatewayState>,
    Query(query): Query<RecentQuery>,
) -> impl IntoResponse {
    let records = state.audit.recent(query.limit.min(1000));
    Json(serde_json::json!({
        "count": records.len(),
        "records": records,
    }))
}

/// Live decision stream. Each event is one audit record; slow consumers
/// that lag the broadcast buffer miss records rather than blocking the
/// decision path.
pub async fn stream(
    State(state): State<GatewayState>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let mut rx = state.audit.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(record) => {
                    if let Ok(json) = serde_json::to_string(&record) {
                        yield Ok(Event::default().event("decision").data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    };

    Sse::new(stream)
}

pub async fn export_csv(State(state): State<GatewayState>) -> impl IntoResponse {
    let csv = state.audit.export_csv();
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"sentinelgate-audit.csv\"",
            ),
        ],
        csv,
    )
}

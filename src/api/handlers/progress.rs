use crate::AppState;
use crate::api::error::AppError;
use crate::models::ProgressEvent;
use crate::services::transfer_identity;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;

fn event_name(event: &ProgressEvent) -> &'static str {
    match event {
        ProgressEvent::Progress { .. } => "progress",
        ProgressEvent::Complete => "complete",
        ProgressEvent::Error { .. } => "error",
    }
}

#[utoipa::path(
    get,
    path = "/google/progress/{token}",
    params(
        ("token" = String, Path, description = "Transfer token returned by /google/get")
    ),
    responses(
        (status = 200, description = "Server-sent progress events", content_type = "text/event-stream"),
        (status = 400, description = "Malformed token"),
        (status = 404, description = "Unknown or expired token")
    ),
    tag = "relay"
)]
pub async fn progress_events(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let token = transfer_identity::parse(&token)
        .ok_or_else(|| AppError::BadRequest("Invalid transfer token".to_string()))?;
    let topic = token.topic(state.relay.namespace());

    // The latest event is replayed first, so a late subscriber still sees
    // where the upload stands. The stream ends after a terminal event.
    let subscription = state
        .progress
        .subscribe_existing(&topic)
        .ok_or_else(|| AppError::NotFound(format!("No transfer for token {}", token)))?;
    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next().await?;
        let sse = Event::default()
            .event(event_name(&event))
            .json_data(event.to_wire());
        Some((sse, subscription))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

//! Live event stream endpoint
//!
//! One SSE connection per observer. On connect the stream greets with
//! `hello {ok, ts}`, then mirrors every bus event as one frame (`event:`
//! carries the wire name, `data:` the JSON payload) and interleaves
//! `ping {ts}` keepalives on a fixed interval even when no run is active.
//! Dropping the connection drops the subscription and the keepalive timer
//! with it.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use chrono::Utc;
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use super::ApiError;
use crate::middleware::auth::RequireAuth;
use crate::server::AppState;
use argus_core::RunEvent;

fn frame(event: &RunEvent) -> Event {
    Event::default()
        .event(event.name())
        .data(event.payload().to_string())
}

/// Subscribe to a conversation's event stream.
pub async fn subscribe(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // unknown conversations 404 before the stream opens
    state.store.get(id).await?;

    let session = state.registry.session(id);
    let mut rx = session.subscribe();
    let keepalive = state.keepalive;
    debug!(conversation_id = %id, observers = session.observer_count(), "observer connected");

    let stream = async_stream::stream! {
        yield Ok(frame(&RunEvent::Hello {
            ok: true,
            ts: Utc::now(),
        }));

        let mut ping = tokio::time::interval(keepalive);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately; the greeting covers it
        ping.tick().await;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(envelope) => yield Ok(frame(&envelope.event)),
                    Err(RecvError::Lagged(skipped)) => {
                        // observer fell behind; it resyncs via GET /chat/:id
                        warn!(conversation_id = %id, skipped, "observer lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = ping.tick() => {
                    yield Ok(frame(&RunEvent::Ping { ts: Utc::now() }));
                }
            }
        }
    };

    Ok(Sse::new(stream))
}

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::error::RelayError;
use crate::protocol::{extract_backend_request, parse_chat_request};
use crate::state::AppState;
use crate::stream::{spawn_relay, EventTranscoder};

/// `POST /api/agent/chat`: forward the latest user message to the agent
/// backend and stream its reply back in chat-client framing.
///
/// Everything that can fail before the first byte is answered as a JSON
/// error; after that, failures abort the streamed body.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match open_relay(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(status = err.status().as_u16(), error = %err, "chat request rejected");
            err.into_response()
        }
    }
}

async fn open_relay(state: &AppState, body: &[u8]) -> Result<Response, RelayError> {
    let backend = state.backend()?;
    let request = parse_chat_request(body)?;
    let backend_request = extract_backend_request(&request.messages)?;

    tracing::debug!(
        messages = request.messages.len(),
        message_len = backend_request.message.len(),
        "forwarding chat message to backend"
    );

    let backend_stream = backend.open_stream(&backend_request).await?;
    let relay = spawn_relay(backend_stream, EventTranscoder::new());
    Ok(sse_ok_response(Body::from_stream(relay)))
}

#[inline]
fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

//! Background relay task: drains the backend body, transcodes it and feeds
//! the client-facing response body through a bounded channel.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::StreamAbortError;
use crate::stream::sse::SseDemultiplexer;
use crate::stream::transcoder::{EventTranscoder, MessageIdSource};

pub const RELAY_CHANNEL_CAPACITY: usize = 64;

/// Client-facing body: transcoded chunks, ended by channel close on success or
/// by a single error item on abort.
pub type RelayBodyStream = ReceiverStream<Result<Bytes, StreamAbortError>>;

type RelaySender = mpsc::Sender<Result<Bytes, StreamAbortError>>;

/// How a relay task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    Aborted(StreamAbortError),
    ClientDisconnected,
}

/// Start relaying `backend` in a background task and return the body stream
/// immediately.
pub fn spawn_relay<S, E, I>(backend: S, transcoder: EventTranscoder<I>) -> RelayBodyStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    I: MessageIdSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let outcome = run_relay(backend, transcoder, tx).await;
        tracing::debug!(?outcome, "relay task finished");
    });
    ReceiverStream::new(rx)
}

/// Drive one relay to completion. The sender is dropped on return, which
/// closes the client body exactly once.
pub async fn run_relay<S, E, I>(
    backend: S,
    mut transcoder: EventTranscoder<I>,
    tx: RelaySender,
) -> RelayOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display,
    I: MessageIdSource,
{
    let mut backend = Box::pin(backend);
    let mut demux = SseDemultiplexer::new();
    let mut frames = Vec::with_capacity(8);
    let mut out = String::new();

    loop {
        let next = tokio::select! {
            biased;
            () = tx.closed() => return client_gone(),
            next = backend.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                return abort(&tx, StreamAbortError::Read(err.to_string())).await;
            }
            None => break,
        };

        if let Err(err) = demux.push_into(&chunk, &mut frames) {
            return abort(&tx, err).await;
        }
        for frame in frames.drain(..) {
            transcoder.transcode_frame_into(&frame, &mut out);
        }
        if !send_pending(&tx, &mut out).await {
            return client_gone();
        }
    }

    match demux.finish() {
        Ok(Some(frame)) => {
            transcoder.transcode_frame_into(&frame, &mut out);
        }
        Ok(None) => {}
        Err(err) => return abort(&tx, err).await,
    }
    if !send_pending(&tx, &mut out).await {
        return client_gone();
    }

    let stats = transcoder.stats();
    tracing::debug!(
        transcoded = stats.transcoded,
        passed_through = stats.passed_through,
        parse_failures = stats.parse_failures,
        "backend stream completed"
    );
    RelayOutcome::Completed
}

/// Send buffered output, if any. Returns `false` once the client is gone.
async fn send_pending(tx: &RelaySender, out: &mut String) -> bool {
    if out.is_empty() {
        return true;
    }
    let chunk = Bytes::from(std::mem::take(out));
    tx.send(Ok(chunk)).await.is_ok()
}

async fn abort(tx: &RelaySender, err: StreamAbortError) -> RelayOutcome {
    tracing::error!(error = %err, "aborting client stream");
    // The receiver may already be gone; either way nothing follows this item.
    let _ = tx.send(Err(err.clone())).await;
    RelayOutcome::Aborted(err)
}

fn client_gone() -> RelayOutcome {
    tracing::debug!("client disconnected, stopping backend read loop");
    RelayOutcome::ClientDisconnected
}

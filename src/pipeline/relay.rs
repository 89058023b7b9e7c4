//! Streaming relay from the inference event stream to the client.
//!
//! Client frames are `data: {json}\n\n` lines. A relay emits any number of
//! `chunk` frames followed by exactly one `complete` or `error` frame; the
//! terminal methods consume the sink so nothing can follow them.

use super::AnalyzeResponse;
use crate::inference::{EventStream, GenerateResponse, StreamEvent};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const PREMATURE_END_ERROR: &str = "Le flux de génération s'est interrompu avant la fin de la réponse";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayFrame {
    Chunk { content: String },
    Complete { success: bool, data: Box<AnalyzeResponse> },
    Error { success: bool, error: String },
}

impl RelayFrame {
    pub fn error(message: impl Into<String>) -> Self {
        RelayFrame::Error { success: false, error: message.into() }
    }

    pub fn to_sse(&self) -> Bytes {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            error!(error = %e, "Failed to serialize relay frame");
            r#"{"type":"error","success":false,"error":"Internal server error"}"#.to_string()
        });
        Bytes::from(format!("data: {}\n\n", json))
    }
}

/// The receiving side went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientGone;

/// Write half of one client stream
#[derive(Debug)]
pub struct RelaySink {
    tx: mpsc::Sender<RelayFrame>,
}

impl RelaySink {
    pub fn channel(capacity: usize) -> (RelaySink, mpsc::Receiver<RelayFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (RelaySink { tx }, rx)
    }

    /// The client stopped listening; nothing sent from now on reaches it
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn chunk(&self, content: String) -> Result<(), ClientGone> {
        self.tx.send(RelayFrame::Chunk { content }).await.map_err(|_| ClientGone)
    }

    pub async fn complete(self, data: AnalyzeResponse) {
        let frame = RelayFrame::Complete { success: true, data: Box::new(data) };
        if self.tx.send(frame).await.is_err() {
            debug!("Client gone before completion frame");
        }
    }

    pub async fn fail(self, message: impl Into<String>) {
        if self.tx.send(RelayFrame::error(message)).await.is_err() {
            debug!("Client gone before error frame");
        }
    }
}

/// Forward generation events until the upstream ends.
///
/// `start` is swallowed, `chunk` is forwarded, `end` becomes the completion
/// frame built by `finish`, `error` and transport failures become an error
/// frame. An upstream that closes without `end` is reported as an error. When
/// the client disconnects the upstream stream is dropped, which cancels the
/// request.
pub async fn relay_generation<F>(mut events: EventStream, sink: RelaySink, finish: F)
where
    F: FnOnce(GenerateResponse) -> AnalyzeResponse,
{
    let mut forwarded = 0usize;

    while let Some(event) = events.next().await {
        match event {
            Ok(StreamEvent::Start { nb_token_input, .. }) => {
                debug!(nb_token_input, "Generation started");
            }
            Ok(StreamEvent::Chunk { content }) => {
                forwarded += 1;
                if sink.chunk(content).await.is_err() {
                    info!(forwarded, "Client disconnected, aborting generation");
                    return;
                }
            }
            Ok(StreamEvent::End { time, text, nb_token_input, nb_token_output }) => {
                info!(forwarded, nb_token_output, "Generation stream completed");
                let generated = GenerateResponse { time, text, nb_token_input, nb_token_output };
                sink.complete(finish(generated)).await;
                return;
            }
            Ok(StreamEvent::Error { error }) => {
                warn!(error = %error, "Generation stream reported an error");
                sink.fail(error).await;
                return;
            }
            Err(e) => {
                error!(error = %e, "Generation stream failed");
                sink.fail(e.to_string()).await;
                return;
            }
        }
    }

    warn!(forwarded, "Generation stream closed without end event");
    sink.fail(PREMATURE_END_ERROR).await;
}

//! WebSocket push channel.
//!
//! Joins the board room, forwards outbound signals from the session, and
//! folds every inbound event into the shared session. `leaveBoard` is sent
//! before the socket closes on every exit path the client controls.

use std::future::Future;

use futures_util::{Sink, SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tessera_core::error::MutationError;
use tessera_core::reconcile::Reconciled;
use tessera_core::session::{lock_session, ExitReason, SharedSession};
use tessera_core::sync::{InboundEvent, OutboundSignal};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("WS connect failed: {0}")]
    Connect(String),

    #[error("WS transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Session(#[from] MutationError),
}

/// Why the push loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEnd {
    /// The server closed the socket.
    Closed,
    /// An event ended the session (removal or board deletion).
    SessionEnded(ExitReason),
    /// The caller asked to stop.
    Shutdown,
}

/// Push URL with the auth token as a query parameter.
pub fn push_url(config: &ClientConfig) -> String {
    match &config.token {
        Some(token) => {
            let sep = if config.push_url.contains('?') { '&' } else { '?' };
            format!(
                "{}{}token={}",
                config.push_url,
                sep,
                utf8_percent_encode(token, NON_ALPHANUMERIC)
            )
        }
        None => config.push_url.clone(),
    }
}

pub fn parse_event(text: &str) -> Option<InboundEvent> {
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("[tessera.push] Skipping malformed event: {}", e);
            None
        }
    }
}

/// Parse one text frame and apply it. `None` for frames that are not events.
pub fn apply_text(session: &SharedSession, text: &str) -> Option<Reconciled> {
    let event = parse_event(text)?;
    Some(lock_session(session).apply_event(event))
}

/// Run the push channel until the server closes it, an event ends the
/// session, or `shutdown` resolves.
pub async fn run_push_channel<F>(
    url: &str,
    session: SharedSession,
    shutdown: F,
) -> Result<PushEnd, PushError>
where
    F: Future<Output = ()>,
{
    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| PushError::Connect(e.to_string()))?;
    log::info!("[tessera.push] Connected to {}", url);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    lock_session(&session).join(out_tx)?;

    tokio::pin!(shutdown);
    let end = loop {
        tokio::select! {
            signal = out_rx.recv() => {
                // The session holds the sender until it leaves.
                let Some(signal) = signal else { break PushEnd::Closed };
                send_signal(&mut ws_tx, &signal).await?;
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        lock_session(&session).leave(ExitReason::Dropped);
                        return Err(PushError::Transport(e.to_string()));
                    }
                    None => break PushEnd::Closed,
                };
                match msg {
                    Message::Text(text) => {
                        if let Some(Reconciled::SessionEnded(reason)) = apply_text(&session, &text.to_string()) {
                            break PushEnd::SessionEnded(reason);
                        }
                    }
                    Message::Ping(data) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Message::Close(_) => break PushEnd::Closed,
                    _ => {}
                }
            }
            _ = &mut shutdown => {
                lock_session(&session).leave(ExitReason::Left);
                break PushEnd::Shutdown;
            }
        }
    };

    if end == PushEnd::Closed {
        lock_session(&session).leave(ExitReason::Dropped);
        log::info!("[tessera.push] Server closed the push channel");
    }
    // Typing stops and leaveBoard queued by the exit.
    while let Ok(signal) = out_rx.try_recv() {
        if let Err(e) = send_signal(&mut ws_tx, &signal).await {
            log::warn!("[tessera.push] Could not flush {:?}: {}", signal, e);
            break;
        }
    }
    let _ = ws_tx.close().await;
    Ok(end)
}

async fn send_signal<S>(ws_tx: &mut S, signal: &OutboundSignal) -> Result<(), PushError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(signal).map_err(|e| PushError::Transport(e.to_string()))?;
    ws_tx
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| PushError::Transport(e.to_string()))
}

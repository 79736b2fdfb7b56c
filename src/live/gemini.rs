//! Websocket connector for the Gemini live API

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::{Error, Result};

use super::wire::{RealtimeInputMessage, ServerMessage, SetupMessage};
use super::{AudioFrame, LiveConnector, LiveSession, ServerEvent, SessionSetup};

/// Default bidirectional streaming endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Messages handed to the socket writer task
enum Outgoing {
    Text(String),
    Close,
}

/// Opens live sessions against the Gemini streaming endpoint
pub struct GeminiConnector {
    endpoint: String,
    api_key: String,
}

impl GeminiConnector {
    /// Create a connector for the default endpoint
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key)
    }

    /// Create a connector for a custom endpoint (proxies, test servers)
    #[must_use]
    pub fn with_endpoint(endpoint: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl LiveConnector for GeminiConnector {
    async fn connect(
        &self,
        setup: SessionSetup,
    ) -> Result<(Box<dyn LiveSession>, mpsc::UnboundedReceiver<ServerEvent>)> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let setup_json = serde_json::to_string(&SetupMessage::new(&setup))?;
        write
            .send(WsMessage::Text(setup_json))
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        // The session is not usable until the server acknowledges the setup.
        loop {
            let msg = read
                .next()
                .await
                .ok_or_else(|| Error::Connection("closed during handshake".to_string()))?
                .map_err(|e| Error::Connection(e.to_string()))?;

            match message_text(msg) {
                Some(text) if text.is_empty() => {}
                Some(text) => {
                    if handshake_complete(&text) {
                        break;
                    }
                }
                None => {
                    return Err(Error::Connection(
                        "connection closed during handshake".to_string(),
                    ));
                }
            }
        }
        tracing::debug!(model = %setup.model, "live session established");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Writer task: drains outbound frames onto the socket.
        tokio::spawn(async move {
            while let Some(outgoing) = out_rx.recv().await {
                match outgoing {
                    Outgoing::Text(text) => {
                        if let Err(e) = write.send(WsMessage::Text(text)).await {
                            tracing::warn!(error = %e, "live session send failed");
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        });

        // Reader task: translates wire messages into session events.
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(msg) => {
                        let Some(text) = message_text(msg) else {
                            break;
                        };
                        if text.is_empty() {
                            continue;
                        }
                        match ServerMessage::parse(&text) {
                            Ok(parsed) => {
                                for event in parsed.into_events() {
                                    if event_tx.send(event).is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "ignoring unparseable live message");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "live session read error");
                        break;
                    }
                }
            }
            let _ = event_tx.send(ServerEvent::Closed);
        });

        Ok((Box::new(GeminiSession { out_tx }), event_rx))
    }
}

/// Check whether a handshake message is the setup acknowledgement
///
/// Unparseable messages are skipped, same as in the reader task; only a
/// dropped socket fails the handshake.
fn handshake_complete(text: &str) -> bool {
    match ServerMessage::parse(text) {
        Ok(parsed) => parsed.is_setup_complete(),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unparseable handshake message");
            false
        }
    }
}

/// Extract the JSON payload of a websocket message
///
/// The endpoint sends JSON in both text and binary frames. Returns `None`
/// for close frames, an empty string for control frames.
fn message_text(msg: WsMessage) -> Option<String> {
    match msg {
        WsMessage::Text(text) => Some(text),
        WsMessage::Binary(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        WsMessage::Close(_) => None,
        _ => Some(String::new()),
    }
}

/// Handle to one open Gemini live session
struct GeminiSession {
    out_tx: mpsc::UnboundedSender<Outgoing>,
}

#[async_trait]
impl LiveSession for GeminiSession {
    async fn send_audio(&self, frame: AudioFrame) -> Result<()> {
        let json = serde_json::to_string(&RealtimeInputMessage::new(frame))?;
        self.out_tx
            .send(Outgoing::Text(json))
            .map_err(|_| Error::Connection("live session closed".to_string()))
    }

    async fn close(&self) {
        let _ = self.out_tx.send(Outgoing::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_handles_frame_kinds() {
        assert_eq!(
            message_text(WsMessage::Text("{}".to_string())),
            Some("{}".to_string())
        );
        assert_eq!(
            message_text(WsMessage::Binary(b"{}".to_vec())),
            Some("{}".to_string())
        );
        assert_eq!(message_text(WsMessage::Close(None)), None);
    }

    #[test]
    fn handshake_accepts_setup_complete() {
        assert!(handshake_complete(r#"{"setupComplete":{}}"#));
    }

    #[test]
    fn handshake_skips_other_messages() {
        assert!(!handshake_complete("not json at all"));
        assert!(!handshake_complete(
            r#"{"serverContent":{"turnComplete":true}}"#
        ));
    }

    #[test]
    fn connector_builds_default_endpoint() {
        let connector = GeminiConnector::new("secret");
        assert_eq!(connector.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(connector.api_key, "secret");
    }
}

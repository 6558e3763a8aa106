use std::borrow::Cow;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;
use uuid::Uuid;

use crate::audio::EncodedFrame;
use crate::config::EndpointConfig;
use crate::error::SessionError;
use crate::protocol::{ServerMessage, SetupMessage, UplinkFrame};
use crate::session::SessionShared;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The single WebSocket a session talks to the endpoint over.
pub struct SessionTransport {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl SessionTransport {
    /// Open the socket, send the setup message and wait for `setupComplete`.
    ///
    /// Resolves only after the endpoint acknowledged the setup, so audio is
    /// never sent into a half-open channel.
    pub async fn connect(
        endpoint: &EndpointConfig,
        url: &Url,
        session_id: Uuid,
        setup: &SetupMessage,
    ) -> Result<Self, SessionError> {
        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", endpoint.api_key.trim()))
                .map_err(|e| SessionError::Configuration(format!("invalid api key: {}", e)))?,
        );
        headers.insert(
            "Session-Id",
            HeaderValue::from_str(&session_id.to_string())
                .map_err(|e| SessionError::Configuration(e.to_string()))?,
        );

        log::info!("Connecting to {} (session {})...", url, session_id);
        let limit = Duration::from_millis(endpoint.handshake_timeout_ms);
        match timeout(limit, Self::handshake(request, setup)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Transport(format!(
                "no setup acknowledgement within {}ms",
                endpoint.handshake_timeout_ms
            ))),
        }
    }

    async fn handshake(
        request: tokio_tungstenite::tungstenite::handshake::client::Request,
        setup: &SetupMessage,
    ) -> Result<Self, SessionError> {
        let (ws_stream, _) = connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let setup_json = serde_json::to_string(setup)?;
        log::debug!("Sending setup: {}", setup_json);
        write.send(Message::Text(setup_json.into())).await?;

        loop {
            match read.next().await {
                Some(Ok(Message::Close(frame))) => {
                    return Err(SessionError::Transport(format!(
                        "endpoint closed during setup: {:?}",
                        frame
                    )));
                }
                Some(Ok(msg)) => {
                    let Some(text) = frame_text(&msg) else {
                        continue;
                    };
                    match ServerMessage::parse(&text) {
                        Ok(ServerMessage::SetupComplete) => {
                            log::info!("Setup acknowledged");
                            return Ok(Self { write, read });
                        }
                        Ok(_) => log::debug!("Ignoring content received before setup completed"),
                        Err(e) => log::warn!("Unparseable message during setup: {}", e),
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(SessionError::Transport(
                        "connection closed during setup".into(),
                    ));
                }
            }
        }
    }

    /// Pump the socket until shutdown, remote close, or failure.
    ///
    /// Uplink frames are written in queue order. Remote close and errors both
    /// hand control to the session's teardown.
    pub(crate) async fn run(
        mut self,
        session: Arc<SessionShared>,
        mut uplink_rx: mpsc::Receiver<EncodedFrame>,
        mut faults_rx: mpsc::UnboundedReceiver<SessionError>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                msg = self.read.next() => {
                    match msg {
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Endpoint closed connection: {:?}", frame);
                            session.teardown(None);
                            break;
                        }
                        Some(Ok(msg)) => {
                            if let Some(text) = frame_text(&msg) {
                                session.handle_inbound(&text);
                            }
                        }
                        Some(Err(e)) => {
                            session.teardown(Some(e.into()));
                            break;
                        }
                        None => {
                            log::info!("Endpoint stream ended");
                            session.teardown(None);
                            break;
                        }
                    }
                }
                Some(frame) = uplink_rx.recv() => {
                    let json = match serde_json::to_string(&UplinkFrame::from(frame)) {
                        Ok(json) => json,
                        Err(e) => {
                            log::error!("Failed to serialize uplink frame: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = self.write.send(Message::Text(json.into())).await {
                        session.teardown(Some(e.into()));
                        break;
                    }
                }
                Some(fault) = faults_rx.recv() => {
                    session.teardown(Some(fault));
                    break;
                }
                _ = &mut shutdown_rx => {
                    if let Err(e) = self.write.send(Message::Close(None)).await {
                        log::debug!("Close frame not delivered: {}", e);
                    }
                    break;
                }
            }
        }
        log::info!("Transport task finished");
    }
}

/// Text payload of a data frame. Binary frames carry the same JSON envelope.
fn frame_text(msg: &Message) -> Option<Cow<'_, str>> {
    match msg {
        Message::Text(text) => Some(Cow::Borrowed(text.as_str())),
        Message::Binary(data) => Some(String::from_utf8_lossy(data)),
        _ => None,
    }
}

/// Handle to the running transport task, owned by the session.
pub(crate) struct TransportHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TransportHandle {
    pub(crate) fn new(shutdown: oneshot::Sender<()>, task: tokio::task::JoinHandle<()>) -> Self {
        Self {
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Ask the task to close the socket. Does not wait; sends already
    /// written are not retracted.
    pub(crate) fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_frame_text_accepts_both_data_frames() {
        let text = Message::Text(r#"{"turnComplete":true}"#.into());
        assert_eq!(frame_text(&text).unwrap(), r#"{"turnComplete":true}"#);

        let binary = Message::Binary(Bytes::from_static(br#"{"setupComplete":{}}"#));
        assert_eq!(frame_text(&binary).unwrap(), r#"{"setupComplete":{}}"#);

        assert!(frame_text(&Message::Ping(Bytes::new())).is_none());
    }
}

//! Websocket transport

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use haven_protocol::{ClientEvent, RetryPolicy, ServerEvent};

use crate::error::TransportError;
use crate::{Connection, EventSink, Result, Transport, TransportEvent};

/// Query parameter the identity is bound to.
const IDENTITY_PARAM: &str = "userId";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport {
    url: Url,
    retry: RetryPolicy,
}

impl WsTransport {
    pub fn new(url: &str, retry: RetryPolicy) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
        }

        Ok(Self { url, retry })
    }

    fn endpoint_for(&self, identity: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair(IDENTITY_PARAM, identity);
        url
    }
}

impl Transport for WsTransport {
    fn open(&self, identity: &str, events: EventSink) -> Result<Box<dyn Connection>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            host = self.url.host_str().unwrap_or_default(),
            identity = %identity,
            "Opening realtime connection"
        );

        runtime.spawn(run_connection(
            self.endpoint_for(identity),
            self.retry.clone(),
            outbound_rx,
            events,
            shutdown_rx,
        ));

        Ok(Box::new(WsConnection {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        }))
    }
}

struct WsConnection {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    shutdown: watch::Sender<bool>,
}

impl Connection for WsConnection {
    fn emit(&self, event: ClientEvent) -> Result<()> {
        self.outbound
            .send(event)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

enum PumpExit {
    Shutdown,
    Dropped(String),
}

/// Connect, pump frames until the socket drops, then reconnect with backoff.
async fn run_connection(
    endpoint: Url,
    retry: RetryPolicy,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    events: EventSink,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        let attempt = tokio::select! {
            result = connect_async(endpoint.as_str()) => result,
            _ = shutdown.changed() => return,
        };

        match attempt {
            Ok((stream, _)) => {
                failures = 0;
                tracing::info!("Realtime connection established");
                // must run before Connected: joins emitted after it are the replay
                let backlog = take_backlog(&mut outbound);
                if events.send(TransportEvent::Connected).is_err() {
                    return;
                }

                match pump(stream, backlog, &mut outbound, &events, &mut shutdown).await {
                    PumpExit::Shutdown => {
                        tracing::info!("Realtime connection closed");
                        return;
                    }
                    PumpExit::Dropped(reason) => {
                        tracing::warn!(reason = %reason, "Realtime connection dropped");
                        if events.send(TransportEvent::Dropped { reason }).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, failures, "Realtime connect failed");

                if !retry.should_retry(failures) {
                    tracing::error!(failures, "Giving up on realtime connection");
                    let _ = events.send(TransportEvent::Closed {
                        reason: format!("gave up after {failures} failed attempts: {e}"),
                    });
                    return;
                }
            }
        }

        let delay = retry.delay_for(failures.saturating_sub(1));
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Events queued while no socket was up. Room membership is dropped: the
/// server forgot it with the old socket and the owner replays it on
/// `Connected`.
fn take_backlog(outbound: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut backlog = Vec::new();
    while let Ok(event) = outbound.try_recv() {
        match event {
            ClientEvent::JoinRoom { .. } | ClientEvent::LeaveRoom { .. } => {
                tracing::debug!(event = event.name(), "Dropping membership event queued while offline");
            }
            event => backlog.push(event),
        }
    }
    backlog
}

/// Encode and write one event. Encoding failures are logged and skipped.
async fn forward(
    sink: &mut SplitSink<Socket, Message>,
    event: ClientEvent,
) -> std::result::Result<(), String> {
    let text = match event.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, event = event.name(), "Failed to encode event");
            return Ok(());
        }
    };
    sink.send(Message::Text(text))
        .await
        .map_err(|e| e.to_string())
}

async fn pump(
    stream: Socket,
    backlog: Vec<ClientEvent>,
    outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    events: &EventSink,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpExit {
    let (mut sink, mut source) = stream.split();

    for event in backlog {
        if let Err(reason) = forward(&mut sink, event).await {
            return PumpExit::Dropped(reason);
        }
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return PumpExit::Shutdown;
            }
            next = outbound.recv() => match next {
                Some(event) => {
                    if let Err(reason) = forward(&mut sink, event).await {
                        return PumpExit::Dropped(reason);
                    }
                }
                // every connection handle is gone
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpExit::Shutdown;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => match ServerEvent::decode(&text) {
                    Ok(event) => {
                        if events.send(TransportEvent::Server(event)).is_err() {
                            return PumpExit::Shutdown;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "Dropping malformed realtime frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return PumpExit::Dropped(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                None => return PumpExit::Dropped("stream ended".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_protocol::OutgoingMessage;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(20), max_retries)
    }

    async fn next_event(events: &mut crate::EventStream) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event stream closed")
    }

    #[test]
    fn test_rejects_non_websocket_urls() {
        assert!(matches!(
            WsTransport::new("http://localhost/ws", RetryPolicy::default()),
            Err(TransportError::UnsupportedScheme(_))
        ));
        assert!(WsTransport::new("not a url", RetryPolicy::default()).is_err());
        assert!(WsTransport::new("wss://chat.example.com/ws", RetryPolicy::default()).is_ok());
    }

    #[test]
    fn test_open_requires_runtime() {
        let transport = WsTransport::new("ws://127.0.0.1:9/ws", RetryPolicy::default()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            transport.open("u1", tx),
            Err(TransportError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_round_trip_with_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut uri = String::new();
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
                uri = req.uri().to_string();
                Ok::<_, ErrorResponse>(resp)
            })
            .await
            .unwrap();
            assert_eq!(uri, "/ws?userId=u1");

            let join = ws.next().await.unwrap().unwrap();
            assert_eq!(
                join.into_text().unwrap(),
                r#"{"event":"joinRoom","data":{"roomId":"p1::u1::u2"}}"#
            );

            ws.send(Message::Text("garbage".to_string())).await.unwrap();
            ws.send(Message::Text(
                r#"{"event":"receiveMessage","data":{"id":"m1","roomId":"p1::u1::u2","senderId":"u2","receiverId":"u1","message":"hi","createdAt":"2024-01-01T00:00:00Z"}}"#
                    .to_string(),
            ))
            .await
            .unwrap();

            // wait for the client to hang up
            while let Some(Ok(frame)) = ws.next().await {
                if frame.is_close() {
                    break;
                }
            }
        });

        let transport = WsTransport::new(&format!("ws://{addr}/ws"), fast_retry(3)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = transport.open("u1", tx).unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected);
        connection.emit(ClientEvent::join("p1::u1::u2")).unwrap();

        match next_event(&mut rx).await {
            TransportEvent::Server(ServerEvent::ReceiveMessage(message)) => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.receiver_id, "u1");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        connection.close();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        // grab a free port, then release it so nothing is listening
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let transport = WsTransport::new(&format!("ws://{addr}/ws"), fast_retry(1)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _connection = transport.open("u1", tx).unwrap();

        match next_event(&mut rx).await {
            TransportEvent::Closed { reason } => assert!(reason.contains("2 failed attempts")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reports_drop_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // first connection is closed right away, second one stays up
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
            drop(ws);

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let transport = WsTransport::new(&format!("ws://{addr}/ws"), fast_retry(3)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = transport.open("u1", tx).unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected);
        assert!(matches!(
            next_event(&mut rx).await,
            TransportEvent::Dropped { .. }
        ));
        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected);

        connection.close();
    }

    #[tokio::test]
    async fn test_membership_queued_while_down_is_not_flushed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
            drop(ws);

            // collect frames from the second socket up to the final leave
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let last = ClientEvent::leave("r2").encode().unwrap();
            let mut frames = Vec::new();
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    let done = text == last;
                    frames.push(text);
                    if done {
                        break;
                    }
                }
            }
            frames
        });

        // slow enough backoff for the emits below to land while the socket is down
        let retry = RetryPolicy::new(Duration::from_millis(200), Duration::from_millis(200), 3);
        let transport = WsTransport::new(&format!("ws://{addr}/ws"), retry).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = transport.open("u1", tx).unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected);
        assert!(matches!(
            next_event(&mut rx).await,
            TransportEvent::Dropped { .. }
        ));

        let message = ClientEvent::SendMessage(OutgoingMessage::new("r1", "u1", "u2", "hi"));
        connection.emit(ClientEvent::join("r1")).unwrap();
        connection.emit(message.clone()).unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected);
        // what the session replays on the acknowledgment
        connection.emit(ClientEvent::join("r1")).unwrap();
        connection.emit(ClientEvent::leave("r2")).unwrap();

        let frames = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            frames,
            vec![
                message.encode().unwrap(),
                ClientEvent::join("r1").encode().unwrap(),
                ClientEvent::leave("r2").encode().unwrap(),
            ]
        );

        connection.close();
    }
}

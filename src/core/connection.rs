//! The persistent duplex connection to the chat gateway.
//!
//! [`ConnectionManager`] owns one WebSocket per mounted conversation view.
//! Inbound frames are decoded into typed [`ChannelEvent`]s and forwarded,
//! tagged with a connection generation, over a single mpsc channel;
//! lifecycle transitions travel on the same channel so consumers observe
//! one ordered event stream. Events tagged with a stale generation are
//! discarded by the event loop, which is what makes teardown safe while
//! I/O is still in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{CreateMessageRequest, JoinChatRoomRequest, MessagePart};
use crate::auth::Credential;

/// Inbound events, decoded into one typed enum carrying an explicit
/// conversation id instead of the gateway's per-conversation event names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    /// A model reply begins; the id is the conversation it belongs to
    /// (server-assigned for a brand-new conversation).
    MessageStart { conversation_id: u64 },
    /// One reply fragment.
    Fragment { conversation_id: u64, part: String },
    /// The reply is complete. The wire payload's `part` is a sentinel
    /// string, not content, and is dropped at decode.
    MessageEnd { conversation_id: u64 },
    /// Transport or protocol error reported by the gateway.
    TransportError { message: String },
}

/// Outbound commands, encoded to the gateway's wire frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinRoom { conversation_id: u64 },
    CreateMessage {
        conversation_id: Option<u64>,
        message: String,
    },
}

#[derive(serde::Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(serde::Serialize)]
struct OutboundFrame<T> {
    event: &'static str,
    data: T,
}

/// The gateway wraps message payloads as JSON-encoded strings inside the
/// frame; accept both that and a plain object.
fn part_payload(data: &Value) -> Option<MessagePart> {
    match data {
        Value::String(text) => serde_json::from_str(text).ok(),
        _ => serde_json::from_value(data.clone()).ok(),
    }
}

/// Decode one inbound text frame. Returns `None` for frames that carry no
/// event for the engine (acks, unknown names, undecodable payloads).
pub fn decode_frame(text: &str) -> Option<ChannelEvent> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            debug!("undecodable frame: {error}");
            return None;
        }
    };

    // Legacy scoped names (`message_chat_<id>`) normalize to the same
    // fragment event; the payload's own chat_id is authoritative.
    let event = if frame.event.starts_with("message_chat_") {
        "message"
    } else {
        frame.event.as_str()
    };

    match event {
        "message_start" => part_payload(&frame.data).map(|part| ChannelEvent::MessageStart {
            conversation_id: part.chat_id,
        }),
        "message" => part_payload(&frame.data).map(|part| ChannelEvent::Fragment {
            conversation_id: part.chat_id,
            part: part.part,
        }),
        "message_end" => part_payload(&frame.data).map(|part| ChannelEvent::MessageEnd {
            conversation_id: part.chat_id,
        }),
        "error" => {
            let message = match &frame.data {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            Some(ChannelEvent::TransportError { message })
        }
        other => {
            debug!(event = other, "ignoring unknown frame");
            None
        }
    }
}

/// Encode one outbound command to its wire frame.
pub fn encode_frame(event: &OutboundEvent) -> String {
    let encoded = match event {
        OutboundEvent::JoinRoom { conversation_id } => serde_json::to_string(&OutboundFrame {
            event: "join_chat_room",
            data: JoinChatRoomRequest {
                chat_id: *conversation_id,
            },
        }),
        OutboundEvent::CreateMessage {
            conversation_id,
            message,
        } => serde_json::to_string(&OutboundFrame {
            event: "create_message",
            data: CreateMessageRequest {
                chat_id: *conversation_id,
                message: message.clone(),
            },
        }),
    };
    // Both frame shapes serialize infallibly.
    encoded.unwrap_or_default()
}

/// Owns the duplex connection's lifecycle.
///
/// `connect` may be re-invoked with a new credential (e.g. after refresh):
/// it replaces the live transport and its auth context while leaving the
/// consumer's event receiver registered, so nothing has to be torn down
/// twice. `shutdown` releases the transport; with the generation check on
/// the consumer side, no event from a dead connection is ever applied.
pub struct ConnectionManager {
    events_tx: mpsc::UnboundedSender<(ChannelEvent, u64)>,
    outbound_tx: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    generation: u64,
}

impl ConnectionManager {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ChannelEvent, u64)>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                events_tx,
                outbound_tx: None,
                cancel: CancellationToken::new(),
                connected: Arc::new(AtomicBool::new(false)),
                generation: 0,
            },
            events_rx,
        )
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Generation of the current transport; consumers drop events tagged
    /// with anything older.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Open (or replace) the authenticated transport. The access token is
    /// attached as a query parameter so the gateway can authorize the
    /// upgrade without a separate handshake call.
    pub fn connect(&mut self, socket_url: &str, credential: &Credential) -> u64 {
        self.teardown_transport();

        self.generation += 1;
        let generation = self.generation;
        let url = format!("{}?token={}", socket_url, credential.access_token);
        let events_tx = self.events_tx.clone();
        let connected = Arc::clone(&self.connected);
        let cancel = self.cancel.clone();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        self.outbound_tx = Some(outbound_tx);

        tokio::spawn(async move {
            let ws_stream = tokio::select! {
                result = connect_async(&url) => match result {
                    Ok((ws_stream, _)) => ws_stream,
                    Err(error) => {
                        warn!("connection failed: {error}");
                        let _ = events_tx.send((
                            ChannelEvent::TransportError {
                                message: error.to_string(),
                            },
                            generation,
                        ));
                        let _ = events_tx.send((ChannelEvent::Disconnected, generation));
                        return;
                    }
                },
                _ = cancel.cancelled() => return,
            };

            connected.store(true, Ordering::SeqCst);
            let _ = events_tx.send((ChannelEvent::Connected, generation));
            let (mut sink, mut stream) = ws_stream.split();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    outbound = outbound_rx.recv() => match outbound {
                        Some(text) => {
                            if let Err(error) = sink.send(WsMessage::Text(text)).await {
                                warn!("send failed: {error}");
                                let _ = events_tx.send((
                                    ChannelEvent::TransportError {
                                        message: error.to_string(),
                                    },
                                    generation,
                                ));
                                break;
                            }
                        }
                        None => break,
                    },
                    frame = stream.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(event) = decode_frame(&text) {
                                let _ = events_tx.send((event, generation));
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            warn!("read failed: {error}");
                            let _ = events_tx.send((
                                ChannelEvent::TransportError {
                                    message: error.to_string(),
                                },
                                generation,
                            ));
                            break;
                        }
                    },
                }
            }

            connected.store(false, Ordering::SeqCst);
            let _ = events_tx.send((ChannelEvent::Disconnected, generation));
        });

        generation
    }

    /// Queue one outbound command. Returns false when no transport is up.
    pub fn send(&self, event: &OutboundEvent) -> bool {
        match &self.outbound_tx {
            Some(outbound_tx) => outbound_tx.send(encode_frame(event)).is_ok(),
            None => false,
        }
    }

    /// Release the transport. The consumer's receiver stays registered;
    /// the generation check makes any still-queued event inert.
    pub fn shutdown(&mut self) {
        self.teardown_transport();
    }

    fn teardown_transport(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.outbound_tx = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_frames_decode_from_object_payloads() {
        let event = decode_frame(
            r#"{"event":"message","data":{"chat_id":42,"part":"Hi","status":2}}"#,
        );
        assert_eq!(
            event,
            Some(ChannelEvent::Fragment {
                conversation_id: 42,
                part: "Hi".to_string(),
            })
        );
    }

    #[test]
    fn fragment_frames_decode_from_string_wrapped_payloads() {
        // The gateway emits payloads as JSON-encoded strings.
        let event = decode_frame(
            r#"{"event":"message","data":"{\"chat_id\":42,\"part\":\" there\",\"status\":2}"}"#,
        );
        assert_eq!(
            event,
            Some(ChannelEvent::Fragment {
                conversation_id: 42,
                part: " there".to_string(),
            })
        );
    }

    #[test]
    fn legacy_scoped_event_names_normalize_to_fragments() {
        let event = decode_frame(
            r#"{"event":"message_chat_42","data":{"chat_id":42,"part":"!","status":2}}"#,
        );
        assert_eq!(
            event,
            Some(ChannelEvent::Fragment {
                conversation_id: 42,
                part: "!".to_string(),
            })
        );
    }

    #[test]
    fn lifecycle_frames_carry_the_conversation_id_and_drop_sentinels() {
        let start = decode_frame(
            r#"{"event":"message_start","data":{"chat_id":7,"part":"Starting chat...","status":1}}"#,
        );
        assert_eq!(start, Some(ChannelEvent::MessageStart { conversation_id: 7 }));

        let end = decode_frame(
            r#"{"event":"message_end","data":{"chat_id":7,"part":"Chat ended.","status":3}}"#,
        );
        assert_eq!(end, Some(ChannelEvent::MessageEnd { conversation_id: 7 }));
    }

    #[test]
    fn error_frames_surface_the_gateway_message() {
        let event = decode_frame(r#"{"event":"error","data":"Unauthorized"}"#);
        assert_eq!(
            event,
            Some(ChannelEvent::TransportError {
                message: "Unauthorized".to_string(),
            })
        );
    }

    #[test]
    fn unknown_and_undecodable_frames_are_dropped() {
        assert_eq!(decode_frame(r#"{"event":"typing","data":{}}"#), None);
        assert_eq!(decode_frame("not json"), None);
        // Join ack: a "message" frame whose payload is not a MessagePart.
        assert_eq!(
            decode_frame(r#"{"event":"message","data":"Joined chat room 42"}"#),
            None
        );
    }

    #[test]
    fn outbound_frames_encode_the_wire_names() {
        let join = encode_frame(&OutboundEvent::JoinRoom { conversation_id: 42 });
        assert_eq!(join, r#"{"event":"join_chat_room","data":{"chat_id":42}}"#);

        let create = encode_frame(&OutboundEvent::CreateMessage {
            conversation_id: None,
            message: "hello".to_string(),
        });
        assert_eq!(
            create,
            r#"{"event":"create_message","data":{"message":"hello"}}"#
        );

        let create = encode_frame(&OutboundEvent::CreateMessage {
            conversation_id: Some(42),
            message: "hello".to_string(),
        });
        assert_eq!(
            create,
            r#"{"event":"create_message","data":{"chat_id":42,"message":"hello"}}"#
        );
    }

    #[tokio::test]
    async fn shutdown_drops_the_outbound_channel() {
        let (mut manager, _events_rx) = ConnectionManager::new();
        assert!(!manager.connected());
        assert!(!manager.send(&OutboundEvent::JoinRoom { conversation_id: 1 }));

        manager.shutdown();
        assert!(!manager.connected());
        assert_eq!(manager.generation(), 0);
    }

    #[tokio::test]
    async fn connect_replaces_the_transport_and_bumps_the_generation() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let socket_url = format!("ws://{addr}");

        // Minimal gateway: accept upgrades and push one fragment frame.
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream)
                        .await
                        .expect("handshake");
                    ws.send(WsMessage::Text(
                        r#"{"event":"message","data":{"chat_id":1,"part":"hi","status":2}}"#
                            .to_string(),
                    ))
                    .await
                    .expect("send");
                    // Keep the connection open until the client goes away.
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let credential = Credential {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        };

        let (mut manager, mut events_rx) = ConnectionManager::new();
        let first = manager.connect(&socket_url, &credential);
        assert_eq!(first, 1);

        assert_eq!(
            events_rx.recv().await,
            Some((ChannelEvent::Connected, first))
        );
        assert_eq!(
            events_rx.recv().await,
            Some((
                ChannelEvent::Fragment {
                    conversation_id: 1,
                    part: "hi".to_string(),
                },
                first
            ))
        );
        assert!(manager.connected());

        // Reconnecting (e.g. with a refreshed credential) starts a new
        // generation on the same event channel.
        let second = manager.connect(&socket_url, &credential);
        assert_eq!(second, 2);
        loop {
            let (event, generation) = events_rx.recv().await.expect("event");
            if generation == second && event == ChannelEvent::Connected {
                break;
            }
            // Events from the first generation are stale by contract.
            assert_eq!(generation, first);
        }

        manager.shutdown();
        assert!(!manager.connected());
    }
}

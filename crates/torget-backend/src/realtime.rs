use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace, warn};
use url::Url;
use uuid::Uuid;

use torget_types::events::ChangeEvent;
use torget_types::models::Message;

use crate::error::{BackendError, Result};
use crate::BackendClient;

/// Client sends a heartbeat frame every 30 seconds. The channel is
/// considered dead after 2 unanswered heartbeats and the event stream
/// closes.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MAX_MISSED_HEARTBEATS: u8 = 2;

/// Handle to a live change-notification subscription.
///
/// Dropping the handle (or calling [`Subscription::close`]) tears the
/// socket down. There is deliberately no auto-reconnect: a dropped
/// connection closes the event stream and stops delivering until the
/// consumer subscribes again.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Next change event; `None` once the channel is closed (socket
    /// dropped or subscription torn down).
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.teardown();
    }

    /// In-process subscription pair: the returned sender feeds events
    /// straight to the handle. Used by test doubles standing in for the
    /// hosted backend.
    pub fn channel(capacity: usize) -> (mpsc::Sender<ChangeEvent>, Subscription) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Subscription { events: rx, pump: None })
    }

    fn teardown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// One frame on the multiplexed realtime socket.
#[derive(Debug, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl BackendClient {
    /// Open a change-notification subscription scoped by table and an
    /// optional row filter (e.g. `receiver_id=eq.<id>`). Events arrive on
    /// the returned handle until it is dropped or the socket dies.
    pub async fn subscribe(&self, table: &str, filter: Option<&str>) -> Result<Subscription> {
        let url = self.realtime_url()?;
        let (socket, _) = connect_async(url.as_str()).await?;
        let (mut sink, stream) = socket.split();

        let topic = match filter {
            Some(f) => format!("realtime:public:{table}:{f}"),
            None => format!("realtime:public:{table}"),
        };
        let join = json!({
            "topic": topic,
            "event": "phx_join",
            "payload": {},
            "ref": "1",
        });
        sink.send(WsMessage::Text(join.to_string())).await?;
        debug!(%topic, "realtime subscription joined");

        let (tx, rx) = mpsc::channel(64);
        let pump = tokio::spawn(pump(sink, stream, tx, topic));
        Ok(Subscription { events: rx, pump: Some(pump) })
    }

    fn realtime_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| BackendError::Protocol(format!("invalid backend url: {e}")))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(BackendError::Protocol(format!(
                    "unsupported backend url scheme: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| BackendError::Protocol("invalid backend url".into()))?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.config.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }
}

type Sink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;
type Stream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Socket pump: forwards decoded change events to the subscription handle
/// and keeps the heartbeat going. Exits (closing the event channel) when
/// the socket drops, the heartbeat goes unanswered, or the consumer goes
/// away. No reconnect is attempted on any exit path.
async fn pump(mut sink: Sink, mut stream: Stream, tx: mpsc::Sender<ChangeEvent>, topic: String) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut heartbeat_ref: u64 = 1;
    let mut missed: u8 = 0;
    let mut answered = true;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if answered {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= MAX_MISSED_HEARTBEATS {
                        warn!("heartbeat unanswered {} times, closing subscription", missed);
                        break;
                    }
                }
                answered = false;
                heartbeat_ref += 1;
                let frame = json!({
                    "topic": "phoenix",
                    "event": "heartbeat",
                    "payload": {},
                    "ref": heartbeat_ref.to_string(),
                });
                if sink.send(WsMessage::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    WsMessage::Text(text) => {
                        let Ok(frame) = serde_json::from_str::<Frame>(&text) else {
                            trace!("undecodable realtime frame: {}", &text[..text.len().min(200)]);
                            continue;
                        };
                        if frame.topic == "phoenix" {
                            answered = true;
                            continue;
                        }
                        if frame.topic != topic {
                            continue;
                        }
                        if let Some(event) = parse_change(&frame) {
                            if tx.send(event).await.is_err() {
                                // Consumer dropped the handle
                                break;
                            }
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
    debug!(%topic, "realtime pump stopped");
}

/// Decode a row-change frame. Non-change frames (join replies, presence
/// diffs) come back as `None`.
fn parse_change(frame: &Frame) -> Option<ChangeEvent> {
    match frame.event.as_str() {
        "INSERT" => {
            let record: Message =
                serde_json::from_value(frame.payload.get("record")?.clone()).ok()?;
            Some(ChangeEvent::Insert(record))
        }
        "UPDATE" => {
            let record: Message =
                serde_json::from_value(frame.payload.get("record")?.clone()).ok()?;
            Some(ChangeEvent::Update(record))
        }
        "DELETE" => {
            let id: Uuid = serde_json::from_value(
                frame.payload.get("old_record")?.get("id")?.clone(),
            )
            .ok()?;
            Some(ChangeEvent::Delete { id })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, payload: serde_json::Value) -> Frame {
        Frame {
            topic: "realtime:public:messages".into(),
            event: event.into(),
            payload,
        }
    }

    fn record() -> serde_json::Value {
        json!({
            "id": "8c7f1cbb-38d7-4b39-8d28-60b6d7efcf6f",
            "sender_id": "2a3e2f6e-7cb9-4f27-9c0f-1b6a3ec2a111",
            "receiver_id": "5b1d9d2c-4a9f-4f7e-a9a0-77f4c0de2222",
            "content": "Er jobben fortsatt ledig?",
            "read": false,
            "created_at": "2025-11-02T12:30:00Z",
        })
    }

    #[test]
    fn decodes_insert_frames() {
        let f = frame("INSERT", json!({ "record": record() }));
        let Some(ChangeEvent::Insert(m)) = parse_change(&f) else {
            panic!("expected insert");
        };
        assert_eq!(m.content, "Er jobben fortsatt ledig?");
        assert!(!m.read);
    }

    #[test]
    fn decodes_delete_frames_from_the_old_record() {
        let f = frame("DELETE", json!({ "old_record": { "id": "8c7f1cbb-38d7-4b39-8d28-60b6d7efcf6f" } }));
        let Some(ChangeEvent::Delete { id }) = parse_change(&f) else {
            panic!("expected delete");
        };
        assert_eq!(id.to_string(), "8c7f1cbb-38d7-4b39-8d28-60b6d7efcf6f");
    }

    #[test]
    fn ignores_join_replies() {
        let f = frame("phx_reply", json!({ "status": "ok" }));
        assert!(parse_change(&f).is_none());
    }

    #[test]
    fn ignores_change_frames_with_missing_records() {
        let f = frame("INSERT", json!({}));
        assert!(parse_change(&f).is_none());
    }
}

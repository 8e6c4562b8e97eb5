//! Pushed change events over the server's WebSocket.
//!
//! A dropped connection or an `unavailable` error from the server surfaces
//! as [`ClientError::Unavailable`]. Callers should then reconnect and
//! reconcile from the HTTP API. Anything published in between is lost.

use anonimku_shared::protocol::{
    ChangeEvent, ClientMessage, ErrorCode, ServerMessage, Table, Topic,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{ClientError, Result};

pub struct EventStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl EventStream {
    /// Connect to a `/ws` endpoint, e.g. the one from [`crate::ApiClient::ws_url`].
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _) = connect_async(url).await?;
        info!(url, "Event stream connected");
        Ok(Self { socket })
    }

    /// Subscribe to `topic`. An empty `tables` means every table.
    pub async fn subscribe(&mut self, topic: Topic, tables: Vec<Table>) -> Result<()> {
        self.send(&ClientMessage::Subscribe { topic, tables }).await
    }

    pub async fn unsubscribe(&mut self, topic: Topic) -> Result<()> {
        self.send(&ClientMessage::Unsubscribe { topic }).await
    }

    /// Keep the connection and any user-topic presence lease alive.
    pub async fn ping(&mut self) -> Result<()> {
        self.send(&ClientMessage::Ping).await
    }

    /// Wait for the next change event. Acknowledgements are skipped.
    pub async fn next_event(&mut self) -> Result<ChangeEvent> {
        loop {
            let frame = match self.socket.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(ClientError::Unavailable(e.to_string())),
                None => return Err(ClientError::Unavailable("connection closed".into())),
            };

            let text = match frame {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => {
                    return Err(ClientError::Unavailable("server closed the connection".into()))
                }
                _ => continue,
            };

            match serde_json::from_str::<ServerMessage>(&text)? {
                ServerMessage::Change { event } => return Ok(event),
                ServerMessage::Error {
                    code: ErrorCode::Unavailable,
                    message,
                } => return Err(ClientError::Unavailable(message)),
                ServerMessage::Error {
                    code: ErrorCode::BadRequest,
                    message,
                } => return Err(ClientError::Rejected(message)),
                ack => debug!(?ack, "Subscription acknowledged"),
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.socket.send(WsMessage::Text(json)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anonimku_shared::models::Message;
    use anonimku_shared::protocol::Record;
    use anonimku_shared::types::{MatchId, MessageId, UserId};
    use chrono::Utc;
    use tokio::net::TcpListener;

    /// Accept one connection, wait for a subscribe, then play back `script`.
    async fn scripted_server(script: Vec<ServerMessage>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            let subscribe: ClientMessage = serde_json::from_str(first.to_text().unwrap()).unwrap();
            let ClientMessage::Subscribe { topic, .. } = subscribe else {
                panic!("expected subscribe, got {subscribe:?}");
            };
            ws.send(WsMessage::Text(
                serde_json::to_string(&ServerMessage::Subscribed { topic }).unwrap(),
            ))
            .await
            .unwrap();
            for msg in script {
                ws.send(WsMessage::Text(serde_json::to_string(&msg).unwrap()))
                    .await
                    .unwrap();
            }
            let _ = ws.close(None).await;
        });
        format!("ws://{addr}/ws")
    }

    fn hello(match_id: MatchId) -> ChangeEvent {
        ChangeEvent::insert(Record::Messages(Message {
            id: MessageId::new(),
            match_id,
            sender_id: UserId::new(),
            content: "hello".into(),
            is_read: false,
            created_at: Utc::now(),
        }))
    }

    #[tokio::test]
    async fn yields_changes_then_reports_close() {
        let id = MatchId::new();
        let event = hello(id);
        let url = scripted_server(vec![ServerMessage::Change { event: event.clone() }]).await;

        let mut stream = EventStream::connect(&url).await.unwrap();
        stream.subscribe(Topic::Match(id), vec![]).await.unwrap();

        assert_eq!(stream.next_event().await.unwrap(), event);
        assert!(matches!(
            stream.next_event().await,
            Err(ClientError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn eviction_surfaces_as_unavailable() {
        let url = scripted_server(vec![ServerMessage::Error {
            code: ErrorCode::Unavailable,
            message: "Subscriber fell behind".into(),
        }])
        .await;

        let mut stream = EventStream::connect(&url).await.unwrap();
        stream.subscribe(Topic::User(UserId::new()), vec![]).await.unwrap();

        let err = stream.next_event().await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, ClientError::Unavailable(m) if m.contains("fell behind")));
    }
}

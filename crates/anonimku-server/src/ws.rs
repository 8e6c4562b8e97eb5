//! WebSocket subscriptions.
//!
//! A connection registers one subscriber on the bus and may subscribe it to
//! any number of topics. Change events are forwarded as they arrive. If the
//! bus evicts the subscriber for falling behind, the client gets an
//! `unavailable` error and the socket is closed. The client then
//! resubscribes on a new connection and re-fetches.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use anonimku_shared::protocol::{ClientMessage, ErrorCode, ServerMessage, Topic};
use anonimku_shared::types::UserId;

use crate::api::AppState;
use crate::bus::Subscriber;
use crate::service::Matchmaker;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.matchmaker))
}

async fn handle_socket(socket: WebSocket, matchmaker: Matchmaker) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscriber = matchmaker.subscribe();
    let eviction = subscriber.eviction();
    let id = subscriber.id();

    info!(subscriber = id, "WebSocket connected");

    loop {
        tokio::select! {
            Some(event) = subscriber.recv() => {
                if send(&mut ws_sender, &ServerMessage::Change { event }).await.is_err() {
                    break;
                }
            }
            _ = eviction.notified() => {
                let err = ServerMessage::Error {
                    code: ErrorCode::Unavailable,
                    message: "Subscriber fell behind; resubscribe and re-fetch".to_string(),
                };
                let _ = send(&mut ws_sender, &err).await;
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
            incoming = ws_receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(subscriber = id, error = %e, "WebSocket error");
                        break;
                    }
                    // Ping/Pong are answered by the protocol layer; binary is ignored.
                    Some(Ok(_)) => continue,
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => handle_client_message(&matchmaker, &mut subscriber, msg).await,
                    Err(e) => {
                        warn!(subscriber = id, error = %e, "Failed to parse client message");
                        ServerMessage::Error {
                            code: ErrorCode::BadRequest,
                            message: format!("Invalid message format: {e}"),
                        }
                    }
                };
                if send(&mut ws_sender, &reply).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(subscriber = id, "WebSocket disconnected");
}

async fn handle_client_message(
    matchmaker: &Matchmaker,
    subscriber: &mut Subscriber,
    msg: ClientMessage,
) -> ServerMessage {
    match msg {
        ClientMessage::Subscribe { topic, tables } => {
            subscriber.subscribe(topic, tables);
            if let Topic::User(user) = topic {
                renew_presence(matchmaker, vec![user]).await;
            }
            ServerMessage::Subscribed { topic }
        }
        ClientMessage::Unsubscribe { topic } => {
            subscriber.unsubscribe(&topic);
            ServerMessage::Unsubscribed { topic }
        }
        ClientMessage::Ping => {
            let users = subscriber
                .topics()
                .filter_map(|topic| match topic {
                    Topic::User(user) => Some(*user),
                    Topic::Match(_) => None,
                })
                .collect();
            renew_presence(matchmaker, users).await;
            ServerMessage::Pong
        }
    }
}

/// A ping on a user topic keeps that user's presence lease alive.
async fn renew_presence(matchmaker: &Matchmaker, users: Vec<UserId>) {
    if users.is_empty() {
        return;
    }
    let mm = matchmaker.clone();
    let result = tokio::task::spawn_blocking(move || {
        for user in users {
            if let Err(e) = mm.touch_presence(user) {
                debug!(user = %user, error = %e, "Presence renewal skipped");
            }
        }
    })
    .await;
    if let Err(e) = result {
        warn!(error = %e, "Presence renewal task failed");
    }
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sink.send(Message::Text(json)).await
}

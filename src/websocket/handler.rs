use std::sync::Arc;
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Extension, State},
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::auth::auth::Principal;
use crate::error::CollabError;
use crate::models::{ConnectionId, ReceivedMessage, SendMessage};
use crate::websocket::msg_edit_handler::{handle_ack_message, handle_edit_message, handle_resync_message};
use crate::websocket::msg_exec_handler::{handle_cancel_message, handle_execute_message};
use crate::websocket::msg_join_handler::handle_join_message;
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::AppState;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Serialize and write one frame. Returns false if the socket is gone.
pub async fn send_message(sender: &WsSender, msg: &SendMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize outgoing message: {}", e);
            return false;
        }
    };
    sender.lock().await.send(Message::Text(text)).await.is_ok()
}

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Response {
    info!("New WebSocket connection attempt from {}", principal.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, principal))
}

/// The room membership of a socket after a successful join
struct Session {
    connection_id: ConnectionId,
    project_id: String,
    forward_task: tokio::task::JoinHandle<()>,
}

enum Flow {
    Continue,
    Close,
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, principal: Principal) {
    // Split the socket into sender and receiver
    let (sender, mut receiver) = socket.split();

    // Shared by the reader loop, the outbox forwarder and result relays
    let sender: WsSender = Arc::new(Mutex::new(sender));
    let mut session: Option<Session> = None;

    loop {
        let frame = match &mut session {
            Some(s) => tokio::select! {
                frame = receiver.next() => frame,
                _ = &mut s.forward_task => {
                    info!("Connection {} was removed from project {}", s.connection_id, s.project_id);
                    break;
                }
            },
            None => receiver.next().await,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("WebSocket receive error: {}", e);
                break;
            }
        };

        // Parse the incoming message as JSON
        let msg: ReceivedMessage = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to parse message from {}: {}", principal.user_id, e);
                send_message(&sender, &SendMessage::error("badMessage", e.to_string(), None)).await;
                continue;
            }
        };

        let (flow, joined) = match &session {
            Some(s) => (handle_joined_message(msg, s, &app_state, &principal, &sender).await, None),
            None => handle_unjoined_message(msg, &app_state, &principal, &sender).await,
        };
        if joined.is_some() {
            session = joined;
        }

        if let Flow::Close = flow {
            break;
        }
    }

    if let Some(s) = session {
        app_state.registry.leave(s.connection_id).await;
        s.forward_task.abort();
    }
    info!("WebSocket connection of {} terminated", principal.user_id);
}

async fn handle_unjoined_message(
    msg: ReceivedMessage,
    app_state: &Arc<AppState>,
    principal: &Principal,
    sender: &WsSender,
) -> (Flow, Option<Session>) {
    match msg {
        ReceivedMessage::Join(join_msg) => {
            let session = handle_join_message(&join_msg, app_state, principal, sender)
                .await
                .map(|joined| Session {
                    connection_id: joined.connection_id,
                    project_id: joined.project_id,
                    forward_task: tokio::spawn(forward_outbox(joined.outbox, sender.clone())),
                });
            (Flow::Continue, session)
        }
        ReceivedMessage::Ping => {
            handle_ping_message(sender, None).await;
            (Flow::Continue, None)
        }
        ReceivedMessage::Leave => (Flow::Close, None),
        _ => {
            send_message(sender, &SendMessage::error("notJoined", "join a project first", None)).await;
            (Flow::Continue, None)
        }
    }
}

async fn handle_joined_message(
    msg: ReceivedMessage,
    session: &Session,
    app_state: &Arc<AppState>,
    principal: &Principal,
    sender: &WsSender,
) -> Flow {
    let connection_id = session.connection_id;

    // Any frame counts as liveness
    if let Err(e) = app_state.registry.heartbeat(connection_id).await {
        return stale(e, sender).await;
    }

    let result = match msg {
        ReceivedMessage::Edit(edit_msg) => handle_edit_message(edit_msg, connection_id, &app_state.relay).await,
        ReceivedMessage::Ack(ack_msg) => handle_ack_message(&ack_msg, connection_id, &app_state.registry).await,
        ReceivedMessage::Resync => handle_resync_message(connection_id, &app_state.registry).await,
        ReceivedMessage::Ping => {
            handle_ping_message(sender, Some(&session.project_id)).await;
            Ok(())
        }
        ReceivedMessage::Execute(exec_msg) => {
            handle_execute_message(exec_msg, &session.project_id, &principal.user_id, app_state, sender).await;
            Ok(())
        }
        ReceivedMessage::Cancel(cancel_msg) => {
            handle_cancel_message(cancel_msg, &principal.user_id, app_state, sender).await;
            Ok(())
        }
        ReceivedMessage::Join(_) => {
            send_message(sender, &SendMessage::error("alreadyJoined", format!("already joined project {}", session.project_id), None)).await;
            Ok(())
        }
        ReceivedMessage::Leave => return Flow::Close,
    };

    match result {
        Ok(()) => Flow::Continue,
        Err(e) => stale(e, sender).await,
    }
}

/// The registry no longer knows this connection, most likely reaped. The
/// client reconnects and rejoins from a fresh snapshot.
async fn stale(e: CollabError, sender: &WsSender) -> Flow {
    debug!("Dropping operation: {}", e);
    send_message(sender, &SendMessage::error(e.code(), e.to_string(), None)).await;
    Flow::Close
}

/// Writes everything the room queued for this connection, in order, until
/// the member is removed or the socket fails.
async fn forward_outbox(mut outbox: mpsc::Receiver<SendMessage>, sender: WsSender) {
    while let Some(msg) = outbox.recv().await {
        if !send_message(&sender, &msg).await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::project_store_client::MemoryProjectStore;
    use crate::config::Config;
    use crate::exec::queue::tests::StubRunner;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_app() -> String {
        let store = MemoryProjectStore::default().with_project("P1", "# start");
        let state = Arc::new(AppState::new(Config::default(), Arc::new(store), Arc::new(StubRunner::default())));
        let app = crate::routes::create_routes(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("ws://{}/ws", addr)
    }

    async fn send(client: &mut Client, value: Value) {
        client.send(tungstenite::Message::Text(value.to_string().into())).await.unwrap();
    }

    async fn recv(client: &mut Client) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for a frame")
                .unwrap()
                .unwrap();
            if msg.is_text() {
                return serde_json::from_str(msg.to_text().unwrap()).unwrap();
            }
        }
    }

    async fn join(url: &str, project: &str) -> (Client, Value) {
        let (mut client, _) = connect_async(url).await.unwrap();
        send(&mut client, json!({"type": "join", "projectId": project})).await;
        let joined = recv(&mut client).await;
        (client, joined)
    }

    #[tokio::test]
    async fn two_clients_exchange_ordered_edits_without_echo() {
        let url = spawn_app().await;
        let (mut a, joined_a) = join(&url, "P1").await;
        assert_eq!(joined_a["type"], "joined");
        assert_eq!(joined_a["content"], "# start");
        let (mut b, _) = join(&url, "P1").await;

        send(&mut a, json!({"type": "edit", "content": "print(1)"})).await;
        assert_eq!(recv(&mut a).await, json!({"type": "editAccepted", "sequence": 1}));
        let at_b = recv(&mut b).await;
        assert_eq!((at_b["type"].as_str(), at_b["sequence"].as_u64(), at_b["content"].as_str()), (Some("editBroadcast"), Some(1), Some("print(1)")));

        send(&mut b, json!({"type": "edit", "content": "print(2)"})).await;
        assert_eq!(recv(&mut b).await, json!({"type": "editAccepted", "sequence": 2}));
        let at_a = recv(&mut a).await;
        assert_eq!((at_a["type"].as_str(), at_a["sequence"].as_u64(), at_a["content"].as_str()), (Some("editBroadcast"), Some(2), Some("print(2)")));

        let (_c, joined_c) = join(&url, "P1").await;
        assert_eq!((joined_c["sequence"].as_u64(), joined_c["content"].as_str()), (Some(2), Some("print(2)")));
    }

    #[tokio::test]
    async fn unknown_project_and_early_edits_are_refused() {
        let url = spawn_app().await;
        let (mut client, _) = connect_async(url.as_str()).await.unwrap();

        send(&mut client, json!({"type": "edit", "content": "x"})).await;
        assert_eq!(recv(&mut client).await["code"], "notJoined");

        send(&mut client, json!({"type": "join", "projectId": "nope"})).await;
        assert_eq!(recv(&mut client).await["code"], "roomUnavailable");

        send(&mut client, json!({"type": "ping"})).await;
        assert_eq!(recv(&mut client).await["type"], "pong");
    }

    #[tokio::test]
    async fn execution_result_follows_queued_ack() {
        let url = spawn_app().await;
        let (mut client, _) = join(&url, "P1").await;

        send(&mut client, json!({"type": "execute", "code": "print('hi')", "requestId": "r-1"})).await;
        assert_eq!(recv(&mut client).await, json!({"type": "executionQueued", "requestId": "r-1"}));
        let result = recv(&mut client).await;
        assert_eq!(result["type"], "executionResult");
        assert_eq!(result["requestId"], "r-1");
        assert_eq!(result["status"], "completed");
        assert_eq!(result["stdout"], "hi\n");
    }

    #[tokio::test]
    async fn resync_returns_current_snapshot() {
        let url = spawn_app().await;
        let (mut a, _) = join(&url, "P1").await;
        send(&mut a, json!({"type": "edit", "content": "v1"})).await;
        recv(&mut a).await;

        send(&mut a, json!({"type": "resync"})).await;
        assert_eq!(recv(&mut a).await, json!({"type": "snapshot", "sequence": 1, "content": "v1"}));
    }
}

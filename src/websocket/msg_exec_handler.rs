use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::models::{CancelMessage, ExecuteMessage, ExecutionQueuedMessage, SendMessage};
use crate::websocket::handler::{send_message, WsSender};
use crate::AppState;

/// Handle ExecuteMessage - queue the code of the joined project and relay
/// the result to this socket when it arrives
pub async fn handle_execute_message(
    exec_msg: ExecuteMessage,
    project_id: &str,
    user_id: &str,
    app_state: &Arc<AppState>,
    sender: &WsSender,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let requested_id = exec_msg.request_id.clone();
    let enqueued = match app_state.gateway.submit(project_id, user_id, exec_msg.code, exec_msg.request_id, Some(tx)).await {
        Ok(enqueued) => enqueued,
        Err(e) => {
            error!("Execution request for project {} refused: {}", project_id, e);
            send_message(sender, &SendMessage::error(e.code(), e.to_string(), requested_id)).await;
            return;
        }
    };

    info!("Execution {} queued for project {}", enqueued.request_id, project_id);
    let queued = SendMessage::ExecutionQueued(ExecutionQueuedMessage { request_id: enqueued.request_id.clone() });
    send_message(sender, &queued).await;

    let sender = sender.clone();
    tokio::spawn(async move {
        if let Some(result) = rx.recv().await {
            if !send_message(&sender, &SendMessage::ExecutionResult(result)).await {
                debug!("Client left before result of {} arrived", enqueued.request_id);
            }
        }
    });
}

/// Handle CancelMessage
pub async fn handle_cancel_message(cancel_msg: CancelMessage, user_id: &str, app_state: &Arc<AppState>, sender: &WsSender) {
    match app_state.gateway.cancel(&cancel_msg.request_id, user_id) {
        Ok(status) => debug!("Cancel of {} left it {:?}", cancel_msg.request_id, status),
        Err(e) => {
            send_message(sender, &SendMessage::error(e.code(), e.to_string(), Some(cancel_msg.request_id))).await;
        }
    }
}

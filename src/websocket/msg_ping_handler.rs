use chrono::Utc;
use tracing::{debug, error};

use crate::models::{PongMessage, SendMessage};
use crate::websocket::handler::{send_message, WsSender};

/// Handle PingMessage
pub async fn handle_ping_message(sender: &WsSender, project_id: Option<&str>) {
    debug!("Ping message received for project {:?}", project_id);

    // Reply with pong
    let pong = SendMessage::Pong(PongMessage { date: Utc::now().to_rfc3339() });
    if !send_message(sender, &pong).await {
        error!("Failed to send Pong message for project {:?}", project_id);
    }
}

use std::sync::Arc;
use axum::{
    extract::{Path, Query, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::AppState;
use crate::models::{ClientEvent, ServerEvent, UserRef};
use crate::ws::connection::Connection;

/// Identity of the attaching client. Session-cookie handling lives in
/// the gateway; by the time a socket reaches this service the user is
/// already resolved.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachParams {
    pub user_id: String,
    pub email: String,
}

/// WebSocket handler: one socket per (project, user) attach
pub async fn websocket_handler(
    Path(project_id): Path<String>,
    Query(params): Query<AttachParams>,
    ws: WebSocketUpgrade,
    app_state: State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt for project {}", project_id);
    ws.on_upgrade(move |socket| handle_socket(socket, project_id, params, app_state.0))
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    project_id: String,
    params: AttachParams,
    app_state: Arc<AppState>,
) {
    // Generate unique connection ID to identify this client
    let connection_id = Uuid::new_v4().to_string();
    info!(
        "WebSocket connection established for project {} with connection_id {}",
        project_id, connection_id
    );

    // Split the socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Events for this connection are queued on a channel; a dedicated
    // task pumps them onto the socket so broadcasts never block a room
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = Connection::new(
        connection_id,
        project_id.clone(),
        UserRef { id: params.user_id, email: params.email },
        tx,
    );
    app_state.broadcaster.registry().attach(conn.clone()).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_conn = conn.clone();
    let recv_state = app_state.clone();
    let mut recv_task = tokio::spawn(async move {
        // Only text frames carry events; anything else is skipped until
        // the stream ends
        while let Some(Ok(Message::Text(msg))) = ws_receiver.next().await {
            let event: ClientEvent = match serde_json::from_str(&msg) {
                Ok(event) => event,
                Err(e) => {
                    debug!("Unparseable message from {}: {}", recv_conn.id, e);
                    recv_conn.send(ServerEvent::Error {
                        message: format!("Unrecognized message: {}", e),
                    });
                    continue;
                }
            };
            recv_state.broadcaster.handle_event(&recv_conn, event).await;
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    app_state.broadcaster.handle_disconnect(&conn).await;
    info!("WebSocket connection terminated for {}", conn.id);
}

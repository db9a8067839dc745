// WebSocket endpoint that bridges a browser terminal to a server's SSH shell

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api_models::ShellQuery;
use crate::authz;
use crate::error::ApiError;
use crate::middleware::{AppState, CurrentUser};
use crate::models::Server;
use crate::shell::{relay, RemoteShell, RemoteTarget, ShellError, ShellOptions};

/// Browsers cannot set headers on a WebSocket handshake, so the token travels
/// in the query string. Every check happens before the upgrade; access is not
/// re-evaluated during the session.
pub async fn ssh_bridge(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
    Query(query): Query<ShellQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Token required"))?;
    let current_user = state.authenticate(&token).await?;

    let server = state
        .stores
        .servers
        .get(&server_id)
        .await
        .map_err(ApiError::store("Server"))?;
    authz::require_server_access(&state.stores, &current_user, &server.id).await?;

    let ws = ws.ok_or_else(|| ApiError::validation("WebSocket upgrade required"))?;
    let options = state.shell.clone();

    Ok(ws
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| run_session(socket, server, current_user, options))
        .into_response())
}

async fn run_session(mut socket: WebSocket, server: Server, user: CurrentUser, options: ShellOptions) {
    let opened = match RemoteTarget::from_server(&server) {
        Ok(target) => RemoteShell::open(&target, &options).await,
        Err(e) => Err(e),
    };

    let (shell, streams) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            warn!(server_id = %server.id, user_id = %user.id, "Shell session not started: {}", e);
            let _ = socket.send(Message::Text(error_frame(&e))).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    info!(server_id = %server.id, user_id = %user.id, "Shell session started");

    let (sink, stream) = socket.split();
    let (end, mut sink) = relay(sink, stream, streams.stdout, streams.stderr, streams.stdin).await;

    info!(server_id = %server.id, user_id = %user.id, reason = ?end, "Shell session ended");

    // Remote session and connection first, then the WebSocket.
    shell.close().await;
    let _ = sink.close().await;
}

fn error_frame(err: &ShellError) -> String {
    match err {
        ShellError::MissingUsername => format!("Error: {}", err),
        _ => format!("Error: Failed to connect to SSH server: {}", err),
    }
}

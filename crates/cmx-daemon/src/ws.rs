//! Realtime session over a WebSocket.
//!
//! The handshake is gated before the upgrade: no valid bearer token, no
//! socket. After upgrade, one task per connection multiplexes client frames
//! and the connection's hub queue. Room joins run the `JoinRoom` policy
//! before touching the hub.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, info, warn};

use cmx_auth::IdentityContext;
use cmx_hub::{ClientFrame, ConnectionId, HubClosed, ServerFrame};

use crate::{
    api_types::ErrorBody,
    error::{public_message, status_for},
    state::AppState,
};

/// GET /v1/ws
pub async fn ws_handler(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let identity = match st.gate.admit(authorization) {
        Ok(identity) => identity,
        Err(rejection) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody {
                    error: rejection.to_string(),
                    kind: "unauthorized".to_string(),
                }),
            )
                .into_response();
        }
    };

    let Some(upgrade) = upgrade else {
        return (
            StatusCode::UPGRADE_REQUIRED,
            Json(ErrorBody {
                error: "websocket upgrade required".to_string(),
                kind: "bad_request".to_string(),
            }),
        )
            .into_response();
    };

    upgrade.on_upgrade(move |socket| run_session(st, socket, identity))
}

async fn run_session(st: Arc<AppState>, mut socket: WebSocket, identity: IdentityContext) {
    let (conn, mut outbound) = match st.hub.register(identity).await {
        Ok(registered) => registered,
        Err(e) => {
            warn!(error = %e, "refusing realtime session");
            let _ = send_frame(&mut socket, &ServerFrame::Shutdown).await;
            return;
        }
    };
    info!(connection = %conn, user_id = %identity.user_id(), "realtime session opened");

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(frame) = queued else { break };
                let last = matches!(frame, ServerFrame::Shutdown);
                if send_frame(&mut socket, &frame).await.is_err() || last {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = handle_text(&st, conn, &identity, &text).await;
                        if send_frame(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        debug!(connection = %conn, bytes = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(connection = %conn, error = %e, "socket error");
                        break;
                    }
                }
            }
        }
    }

    st.hub.on_disconnect(conn).await;
    let _ = socket.close().await;
    info!(connection = %conn, "realtime session closed");
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    socket.send(WsMessage::Text(frame.to_json())).await
}

/// Apply one client frame and return the direct reply.
async fn handle_text(
    st: &AppState,
    conn: ConnectionId,
    identity: &IdentityContext,
    text: &str,
) -> ServerFrame {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            debug!(connection = %conn, error = %e, "unparseable client frame");
            return ServerFrame::error(400, format!("invalid frame: {e}"));
        }
    };

    match frame {
        ClientFrame::JoinRoom { room_id } => {
            match st.desk.authorize_join(&identity.actor, room_id).await {
                Ok(_) => {
                    if st.hub.join(conn, room_id).await {
                        ServerFrame::JoinedRoom { room_id }
                    } else {
                        // Registration is gone: the hub shut down under us.
                        ServerFrame::error(503, HubClosed.to_string())
                    }
                }
                Err(e) => ServerFrame::error(status_for(&e).as_u16(), public_message(&e)),
            }
        }
        ClientFrame::LeaveRoom { room_id } => {
            st.hub.leave(conn, room_id).await;
            ServerFrame::LeftRoom { room_id }
        }
        ClientFrame::SendMessage { room_id, content } => {
            match st.desk.post_message(&identity.actor, room_id, &content).await {
                Ok(message) => {
                    st.hub.broadcast_message(&message).await;
                    ServerFrame::MessageSent { message }
                }
                Err(e) => ServerFrame::error(status_for(&e).as_u16(), public_message(&e)),
            }
        }
    }
}

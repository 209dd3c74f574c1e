//! WebSocket upgrade and per-connection event dispatch.
//!
//! Each connection runs two tasks: a writer draining the connection's
//! bounded outbound queue into JSON text frames, and the read loop below
//! parsing client events and dispatching them to the services.  A failure
//! while handling one event is isolated to that event; the connection and
//! the server keep running.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ferry_shared::identity::VerifiedIdentity;
use ferry_shared::protocol::{ClientEvent, ServerEvent};
use ferry_shared::types::{ConnectionId, UserId};

use crate::api::AppState;
use crate::error::ServerError;
use crate::registry::{ConnectionHandle, OUTBOUND_QUEUE_CAPACITY};

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// `GET /ws` upgrade handler.
///
/// When an identity provider is configured the upgrade requires a bearer
/// token (Authorization header or `?token=` for browser clients) and the
/// connection is bound to the verified identity; otherwise registration
/// trusts the client-supplied user id.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Result<Response, ServerError> {
    let identity = match &state.identity {
        Some(provider) => {
            let token = bearer_token(&headers)
                .or(query.token.as_deref())
                .ok_or(ServerError::MissingToken)?;
            Some(provider.verify(token)?)
        }
        None => None,
    };

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, identity)))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    identity: Option<VerifiedIdentity>,
) {
    let connection_id = ConnectionId::new();
    info!(connection = %connection_id.short(), "connection opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE_CAPACITY);
    let handle = ConnectionHandle::new(connection_id, tx);

    // Writer task: drain queued events into JSON text frames.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to encode outbound event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // The user id this connection registered, used as the sender identity
    // for chunk events.
    let mut registered: Option<UserId> = None;

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!(connection = %connection_id.short(), error = %e, "socket error");
                break;
            }
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    dispatch_event(&state, &handle, &mut registered, identity.as_ref(), event)
                        .await;
                }
                Err(e) => {
                    debug!(
                        connection = %connection_id.short(),
                        error = %e,
                        "dropping malformed event"
                    );
                }
            },
            Message::Close(_) => break,
            // Pings are answered by the protocol layer.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {
                debug!(connection = %connection_id.short(), "dropping unexpected binary frame");
            }
        }
    }

    writer.abort();

    // Registry eviction and negotiation purge happen together with the
    // connection's destruction.
    if let Some(user_id) = state.registry.remove_by_connection(connection_id).await {
        info!(connection = %connection_id.short(), user = %user_id, "user disconnected");
        state.negotiation.purge_user(&user_id).await;
    } else {
        info!(connection = %connection_id.short(), "connection closed");
    }
}

async fn dispatch_event(
    state: &AppState,
    conn: &ConnectionHandle,
    registered: &mut Option<UserId>,
    identity: Option<&VerifiedIdentity>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::Register(user_id) => {
            // A connection bound to a verified identity may only register
            // as that identity.
            if let Some(identity) = identity {
                if identity.id != user_id {
                    warn!(
                        claimed = %user_id,
                        verified = %identity.id,
                        "rejecting register for mismatched identity"
                    );
                    return;
                }
            }
            state.registry.register(user_id.clone(), conn.clone()).await;
            *registered = Some(user_id);
        }

        ClientEvent::SendLinkRequest(proposal) => {
            state
                .negotiation
                .request_link(&proposal.from, &proposal.to, &proposal.link)
                .await;
        }

        ClientEvent::SendLinkResponse(response) => {
            state
                .negotiation
                .respond_to_link(&response.from, &response.to, response.accepted)
                .await;
        }

        ClientEvent::SendFileChunk(chunk) => {
            // The sender identity comes from this connection's
            // registration, not from the payload.
            let Some(sender_id) = registered.as_ref() else {
                debug!(
                    connection = %conn.id().short(),
                    "dropping chunk from unregistered connection"
                );
                return;
            };
            state.relay.send_chunk(sender_id, chunk).await;
        }

        ClientEvent::CompleteFileTransfer(complete) => {
            state
                .relay
                .complete_transfer(&complete.recipient_id, &complete.file_name)
                .await;
        }

        ClientEvent::CheckFileTransfer(recipient_id, sender_id) => {
            state
                .relay
                .check_resume(&recipient_id, &sender_id, conn)
                .await;
        }
    }
}

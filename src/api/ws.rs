//! WebSocket endpoint for live order execution updates.
//!
//! Upgrade, then a `tokio::select!` between reading client frames and
//! forwarding pushes from a per-connection channel, so neither
//! direction blocks the other.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;

use crate::api::state::AppState;
use crate::events::DomainEvent;
use crate::notify::{WsClientAction, WsPush};

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut current_rx: Option<tokio::sync::mpsc::UnboundedReceiver<WsPush>> = None;

    loop {
        tokio::select! {
            biased;

            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else {
                    break;
                };
                let Message::Text(text) = msg else {
                    continue;
                };
                match serde_json::from_str::<WsClientAction>(&text) {
                    Ok(WsClientAction::Ping) => {
                        let pong = WsPush::Ack { message: "pong".to_string() };
                        if let Ok(payload) = serde_json::to_string(&pong) {
                            if socket.send(Message::Text(payload.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(WsClientAction::Execute { order }) => {
                        match state.store.create(order).await {
                            Ok(order) => {
                                current_rx = Some(state.hub.subscribe(order.id));

                                state.events.publish(DomainEvent::OrderCreated {
                                    order_id: order.id,
                                });
                                if let Err(e) = state
                                    .store
                                    .append_audit(
                                        order.id,
                                        "order:created",
                                        serde_json::json!({
                                            "tokenIn": order.token_in,
                                            "tokenOut": order.token_out,
                                            "amount": order.amount,
                                        }),
                                    )
                                    .await
                                {
                                    tracing::warn!(order_id = %order.id, error = %e, "failed to append audit record");
                                }

                                if let Err(e) = state.orchestrator.requeue(order.id).await {
                                    tracing::warn!(order_id = %order.id, error = %e, "failed to enqueue execution job from websocket");
                                } else if let Err(e) = state.store.mark_enqueued(order.id).await {
                                    tracing::warn!(order_id = %order.id, error = %e, "failed to mark order as enqueued");
                                }
                            }
                            Err(e) => {
                                let error = WsPush::Error {
                                    order_id: uuid::Uuid::nil(),
                                    message: format!("failed to create order: {e}"),
                                };
                                if let Ok(payload) = serde_json::to_string(&error) {
                                    let _ = socket.send(Message::Text(payload.into())).await;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let error = WsPush::Error {
                            order_id: uuid::Uuid::nil(),
                            message: format!("unrecognized client message: {e}"),
                        };
                        if let Ok(payload) = serde_json::to_string(&error) {
                            let _ = socket.send(Message::Text(payload.into())).await;
                        }
                    }
                }
            }

            message = recv_from_hub(&mut current_rx) => {
                if let Ok(payload) = serde_json::to_string(&message) {
                    if socket.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Awaits the next push once a subscription exists; before that, never
/// resolves, so this branch of the `select!` simply stays parked
/// rather than busy-looping.
async fn recv_from_hub(
    rx: &mut Option<tokio::sync::mpsc::UnboundedReceiver<WsPush>>,
) -> WsPush {
    match rx {
        Some(receiver) => match receiver.recv().await {
            Some(message) => message,
            None => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

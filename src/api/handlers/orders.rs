//! Order HTTP handlers: validate, persist, enqueue, respond 202 —
//! rolling the order back out if the enqueue step fails rather than
//! leaving an orphaned `pending` row.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::error::AppError;
use crate::events::DomainEvent;
use crate::notify::WsPush;
use crate::order::{CreateOrderInput, Order, OrderFilters, OrderStatus};

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order: Order,
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let order = state.store.create(input).await?;

    if let Err(e) = state.queue.enqueue(order.id).await {
        // The order never had a job enqueued, so the delete-gating
        // invariant permits rolling it back here.
        let _ = state.store.delete(order.id).await;
        return Err(e);
    }
    state.store.mark_enqueued(order.id).await?;

    state.events.publish(DomainEvent::OrderCreated { order_id: order.id });
    state
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
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateOrderResponse {
            success: true,
            order,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListOrdersQuery {
    fn into_filters(self) -> Result<OrderFilters, AppError> {
        let status = self
            .status
            .map(|s| {
                OrderStatus::from_str(&s)
                    .ok_or_else(|| AppError::Validation(format!("unknown status `{s}`")))
            })
            .transpose()?;
        Ok(OrderFilters {
            status,
            token_in: self.token_in,
            token_out: self.token_out,
            limit: self.limit,
            offset: self.offset,
            ..Default::default()
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub success: bool,
    pub orders: Vec<Order>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ListOrdersResponse>, AppError> {
    let filters = query.into_filters()?;
    let orders = state.store.find_all(&filters).await?;
    Ok(Json(ListOrdersResponse {
        success: true,
        orders,
    }))
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub success: bool,
    pub count: i64,
}

pub async fn count_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<CountResponse>, AppError> {
    let filters = query.into_filters()?;
    let count = state.store.count(&filters).await?;
    Ok(Json(CountResponse {
        success: true,
        count,
    }))
}

#[derive(Debug, Serialize)]
pub struct GetOrderResponse {
    pub success: bool,
    pub order: Order,
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GetOrderResponse>, AppError> {
    let order = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(GetOrderResponse {
        success: true,
        order,
    }))
}

#[derive(Debug, Serialize)]
pub struct CancelOrderResponse {
    pub success: bool,
    pub order: Order,
}

/// Cancels a non-terminal order. Returns 409 (via `AppError::Conflict`
/// from the store) if the order has already reached a terminal status.
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelOrderResponse>, AppError> {
    let previous = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?
        .status;
    let order = state.store.cancel(id).await?;

    state.events.publish(DomainEvent::OrderStatusChanged {
        order_id: order.id,
        from: previous.as_str().to_string(),
        to: "cancelled".to_string(),
    });
    state
        .store
        .append_audit(
            order.id,
            "order:cancelled",
            serde_json::json!({ "to": "cancelled" }),
        )
        .await?;
    state.hub.push(
        order.id,
        WsPush::Status {
            order_id: order.id,
            status: "cancelled".to_string(),
            attempt: None,
        },
    );
    state.hub.clear(order.id);

    Ok(Json(CancelOrderResponse {
        success: true,
        order,
    }))
}

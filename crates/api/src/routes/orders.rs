//! Order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, NaiveDate, Utc};
use common::{CustomerId, OrderId, PhoneNumber, StaffId, VehicleId};
use domain::{EvidencePhase, Order, OrderItem, OrderNumber, ReturnReport, ReturnedLine};
use engine::{
    ApproveOrder, CancelOrder, DeliverOrder, IssuedCode, NewOrder, NotificationGateway,
    OrderLifecycleEngine, ReturnOrder,
};
use serde::{Deserialize, Serialize};
use store::SupplyStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, N> {
    pub engine: OrderLifecycleEngine<S, N>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    /// Optional caller-supplied number; generated when omitted.
    pub order_number: Option<String>,
    pub customer_id: Option<String>,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub supervisor_phone: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub staff_id: Option<String>,
    pub vehicle_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub approved_by: String,
    pub approver_name: Option<String>,
    /// Present for customer self-approval, absent for staff approval.
    pub code: Option<String>,
}

#[derive(Deserialize)]
pub struct DeliverRequest {
    pub code: String,
    pub recipient_name: String,
    pub confirmed_by: String,
}

#[derive(Deserialize)]
pub struct ReturnLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ReturnRequest {
    #[serde(default)]
    pub lines: Vec<ReturnLineRequest>,
    pub damaged_items: Option<String>,
    pub missing_items: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct PhotoRequest {
    pub phase: String,
    pub blob_ref: String,
    pub uploaded_by: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity_requested: u32,
    pub quantity_dispatched: u32,
    pub quantity_returned: u32,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub status: String,
    pub assigned_staff: Option<String>,
    pub assigned_vehicle: Option<String>,
    pub supervisor_phone: String,
    pub recipient_name: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub damaged_items: Option<String>,
    pub missing_items: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let report = order.return_report.as_ref();
        Self {
            id: order.id.to_string(),
            order_number: order.order_number.to_string(),
            customer_id: order.customer.to_string(),
            event_name: order.event_name.clone(),
            event_date: order.event_date,
            status: order.status.to_string(),
            assigned_staff: order.assigned_staff.map(|s| s.to_string()),
            assigned_vehicle: order.assigned_vehicle.map(|v| v.to_string()),
            supervisor_phone: order.supervisor_phone.to_string(),
            recipient_name: order.recipient_name.clone(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name.clone(),
                    quantity_requested: item.quantity_requested,
                    quantity_dispatched: item.quantity_dispatched,
                    quantity_returned: item.quantity_returned,
                })
                .collect(),
            damaged_items: report.and_then(|r| r.damaged_items.clone()),
            missing_items: report.and_then(|r| r.missing_items.clone()),
            cancel_reason: order.cancel_reason.clone(),
            created_at: order.created_at,
            approved_at: order.timestamps.approved_at,
            dispatched_at: order.timestamps.dispatched_at,
            delivered_at: order.timestamps.delivered_at,
            returned_at: order.timestamps.returned_at,
        }
    }
}

/// Issued-code metadata; the code itself only travels over the messaging
/// channel.
#[derive(Serialize)]
pub struct CodeIssuedResponse {
    pub credential_id: String,
    pub expires_at: DateTime<Utc>,
    pub delivered: bool,
}

impl From<IssuedCode> for CodeIssuedResponse {
    fn from(issued: IssuedCode) -> Self {
        Self {
            credential_id: issued.credential_id.to_string(),
            expires_at: issued.expires_at,
            delivered: issued.delivered,
        }
    }
}

#[derive(Serialize)]
pub struct PhotoResponse {
    pub id: String,
    pub order_id: String,
    pub phase: String,
    pub blob_ref: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct ConfirmationResponse {
    pub order_id: String,
    pub phase: String,
    pub confirmed_by: String,
    pub recipient_name: String,
    pub credential_id: String,
    pub recorded_at: DateTime<Utc>,
}

// -- Handlers --

/// POST /orders — create a new pending order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderResponse>), ApiError> {
    let customer = match &req.customer_id {
        Some(id) => CustomerId::from_uuid(parse_uuid(id, "customer_id")?),
        None => CustomerId::new(),
    };
    let supervisor_phone = PhoneNumber::parse(&req.supervisor_phone)
        .map_err(|e| ApiError::BadRequest(format!("Invalid supervisor_phone: {e}")))?;
    let order_number = match req.order_number {
        Some(number) => OrderNumber::new(number),
        None => OrderNumber::generate(req.event_date),
    };
    let items = req
        .items
        .iter()
        .map(|item| {
            OrderItem::new(
                item.product_id.as_str(),
                item.product_name.as_str(),
                item.quantity,
            )
        })
        .collect();

    let order = state
        .engine
        .create_order(NewOrder {
            order_number,
            customer,
            event_name: req.event_name,
            event_date: req.event_date,
            supervisor_phone,
            items,
        })
        .await?;

    Ok((axum::http::StatusCode::CREATED, Json(order.into())))
}

/// GET /orders — list all orders.
#[tracing::instrument(skip(state))]
pub async fn list<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.engine.list_orders().await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /orders/:id — load an order by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .engine
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order.into()))
}

/// GET /orders/number/:number — load an order by its unique number.
#[tracing::instrument(skip(state))]
pub async fn get_by_number<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .engine
        .find_order(&OrderNumber::new(number.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {number} not found")))?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/assign — set staff/vehicle assignments.
#[tracing::instrument(skip(state, req))]
pub async fn assign<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let staff = req
        .staff_id
        .as_deref()
        .map(|s| parse_uuid(s, "staff_id").map(StaffId::from_uuid))
        .transpose()?;
    let vehicle = req
        .vehicle_id
        .as_deref()
        .map(|v| parse_uuid(v, "vehicle_id").map(VehicleId::from_uuid))
        .transpose()?;

    let order = state.engine.assign(order_id, staff, vehicle).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/approval-code — issue an approval code.
#[tracing::instrument(skip(state))]
pub async fn approval_code<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<CodeIssuedResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let issued = state.engine.request_approval_code(order_id).await?;
    Ok(Json(issued.into()))
}

/// POST /orders/:id/approval-code/resend — re-issue an approval code.
#[tracing::instrument(skip(state))]
pub async fn approval_code_resend<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<CodeIssuedResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let issued = state.engine.resend_approval_code(order_id).await?;
    Ok(Json(issued.into()))
}

/// POST /orders/:id/approve — approve the order.
#[tracing::instrument(skip(state, req))]
pub async fn approve<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .engine
        .approve(
            order_id,
            ApproveOrder {
                approved_by: req.approved_by,
                approver_name: req.approver_name,
                code: req.code,
            },
        )
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/prepare — start preparation.
#[tracing::instrument(skip(state))]
pub async fn prepare<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.engine.start_preparing(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/ready — mark packed and ready.
#[tracing::instrument(skip(state))]
pub async fn ready<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.engine.mark_ready(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/dispatch — dispatch, deducting inventory.
#[tracing::instrument(skip(state))]
pub async fn dispatch<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.engine.dispatch(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/delivery-code — issue a delivery confirmation code.
#[tracing::instrument(skip(state))]
pub async fn delivery_code<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<CodeIssuedResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let issued = state.engine.request_delivery_code(order_id).await?;
    Ok(Json(issued.into()))
}

/// POST /orders/:id/delivery-code/resend — re-issue a delivery code.
#[tracing::instrument(skip(state))]
pub async fn delivery_code_resend<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<CodeIssuedResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let issued = state.engine.resend_delivery_code(order_id).await?;
    Ok(Json(issued.into()))
}

/// POST /orders/:id/deliver — confirm delivery with a claimed credential.
#[tracing::instrument(skip(state, req))]
pub async fn deliver<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<DeliverRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .engine
        .deliver(
            order_id,
            DeliverOrder {
                code: req.code,
                recipient_name: req.recipient_name,
                confirmed_by: req.confirmed_by,
            },
        )
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/return — record returned goods.
#[tracing::instrument(skip(state, req))]
pub async fn mark_returned<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<ReturnRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let lines = req
        .lines
        .iter()
        .map(|line| ReturnedLine {
            product_id: line.product_id.as_str().into(),
            quantity: line.quantity,
        })
        .collect();

    let order = state
        .engine
        .mark_returned(
            order_id,
            ReturnOrder {
                lines,
                report: ReturnReport {
                    damaged_items: req.damaged_items,
                    missing_items: req.missing_items,
                },
            },
        )
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/cancel — cancel before dispatch.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .engine
        .cancel(order_id, CancelOrder { reason: req.reason })
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/photos — attach an evidence photo reference.
#[tracing::instrument(skip(state, req))]
pub async fn attach_photo<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<PhotoRequest>,
) -> Result<(axum::http::StatusCode, Json<PhotoResponse>), ApiError> {
    let order_id = parse_order_id(&id)?;
    let phase: EvidencePhase = req
        .phase
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid phase: {e}")))?;

    let photo = state
        .engine
        .attach_photo(order_id, phase, req.blob_ref, req.uploaded_by)
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(PhotoResponse {
            id: photo.id.to_string(),
            order_id: photo.order_id.to_string(),
            phase: photo.phase.to_string(),
            blob_ref: photo.blob_ref,
            uploaded_by: photo.uploaded_by,
            uploaded_at: photo.uploaded_at,
        }),
    ))
}

/// GET /orders/:id/photos — list evidence photo references.
#[tracing::instrument(skip(state))]
pub async fn photos<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PhotoResponse>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let photos = state.engine.photos(order_id).await?;
    Ok(Json(
        photos
            .into_iter()
            .map(|photo| PhotoResponse {
                id: photo.id.to_string(),
                order_id: photo.order_id.to_string(),
                phase: photo.phase.to_string(),
                blob_ref: photo.blob_ref,
                uploaded_by: photo.uploaded_by,
                uploaded_at: photo.uploaded_at,
            })
            .collect(),
    ))
}

/// GET /orders/:id/confirmations — list confirmation records.
#[tracing::instrument(skip(state))]
pub async fn confirmations<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ConfirmationResponse>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let records = state.engine.confirmations(order_id).await?;
    Ok(Json(
        records
            .into_iter()
            .map(|record| ConfirmationResponse {
                order_id: record.order_id.to_string(),
                phase: record.phase.to_string(),
                confirmed_by: record.confirmed_by,
                recipient_name: record.recipient_name,
                credential_id: record.credential_id.to_string(),
                recorded_at: record.recorded_at,
            })
            .collect(),
    ))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    Ok(OrderId::from_uuid(parse_uuid(id, "order id")?))
}

fn parse_uuid(raw: &str, what: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}

//! Inventory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use engine::NotificationGateway;
use serde::{Deserialize, Serialize};
use store::{InventoryLine, SupplyStore};

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct InventoryLineResponse {
    pub product_id: String,
    pub available_quantity: u32,
}

#[derive(Deserialize)]
pub struct SetStockRequest {
    pub available_quantity: u32,
}

/// GET /inventory — list tracked stock levels.
#[tracing::instrument(skip(state))]
pub async fn list<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
) -> Result<Json<Vec<InventoryLineResponse>>, ApiError> {
    let lines = state.engine.stock_levels().await?;
    Ok(Json(
        lines
            .into_iter()
            .map(|line| InventoryLineResponse {
                product_id: line.product_id.to_string(),
                available_quantity: line.available_quantity,
            })
            .collect(),
    ))
}

/// PUT /inventory/:product_id — set the stock level for a product.
#[tracing::instrument(skip(state, req))]
pub async fn set<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(product_id): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<InventoryLineResponse>, ApiError> {
    let line = InventoryLine {
        product_id: ProductId::new(product_id),
        available_quantity: req.available_quantity,
    };
    state.engine.set_stock_level(line.clone()).await?;

    Ok(Json(InventoryLineResponse {
        product_id: line.product_id.to_string(),
        available_quantity: line.available_quantity,
    }))
}

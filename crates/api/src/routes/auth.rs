//! Login credential endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::PhoneNumber;
use domain::CredentialPurpose;
use engine::NotificationGateway;
use serde::{Deserialize, Serialize};
use store::SupplyStore;

use crate::error::ApiError;
use crate::routes::orders::{AppState, CodeIssuedResponse};

#[derive(Deserialize)]
pub struct LoginCodeRequest {
    pub phone: String,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct VerifiedResponse {
    pub credential_id: String,
}

fn parse_phone(raw: &str) -> Result<PhoneNumber, ApiError> {
    PhoneNumber::parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid phone: {e}")))
}

/// POST /auth/code — issue a login code to a phone number.
#[tracing::instrument(skip(state, req))]
pub async fn request_code<
    S: SupplyStore + Clone + 'static,
    N: NotificationGateway + Clone + 'static,
>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<LoginCodeRequest>,
) -> Result<Json<CodeIssuedResponse>, ApiError> {
    let phone = parse_phone(&req.phone)?;
    let issued = state
        .engine
        .credentials()
        .issue(&phone, CredentialPurpose::Login)
        .await?;
    Ok(Json(issued.into()))
}

/// POST /auth/verify — claim a login code.
///
/// Success authenticates the actor; the session mechanics beyond that
/// belong to the surrounding system.
#[tracing::instrument(skip(state, req))]
pub async fn verify<S: SupplyStore + Clone + 'static, N: NotificationGateway + Clone + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let phone = parse_phone(&req.phone)?;
    let credential_id = state
        .engine
        .credentials()
        .verify(&phone, CredentialPurpose::Login, &req.code)
        .await?;
    Ok(Json(VerifiedResponse {
        credential_id: credential_id.to_string(),
    }))
}

//! Institutions, consent (requisition) flow and balances.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;
use famledger_core::bank::{Balance, Institution, NewRequisition, Requisition};

#[derive(Deserialize)]
struct InstitutionsQuery {
    country: Option<String>,
}

async fn list_institutions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InstitutionsQuery>,
) -> ApiResult<Json<Vec<Institution>>> {
    let country = query.country.as_deref().map(str::trim).filter(|c| !c.is_empty());
    Ok(Json(state.bank_client.list_institutions(country).await?))
}

/// Requisitions known locally, oldest first.
async fn list_requisitions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Requisition>>> {
    Ok(Json(state.requisitions.list()?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequisitionRequest {
    institution_id: String,
    /// Defaults to this server's consent callback
    redirect_url: Option<String>,
}

/// Start the consent flow; the response carries the link the user opens.
async fn create_requisition(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRequisitionRequest>,
) -> ApiResult<(StatusCode, Json<Requisition>)> {
    let institution_id = body.institution_id.trim().to_string();
    if institution_id.is_empty() {
        return Err(ApiError::BadRequest("institutionId is required".to_string()));
    }

    let request = NewRequisition {
        institution_id,
        redirect_url: body
            .redirect_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| state.callback_url.clone()),
        reference: uuid::Uuid::new_v4().to_string(),
    };
    let created = state.bank_client.create_requisition(&request).await?;
    let stored = state.requisitions.upsert(created).await?;
    info!(
        "Created requisition {} for {} (reference {})",
        stored.id, stored.institution_id, request.reference
    );
    Ok((StatusCode::CREATED, Json(stored)))
}

#[derive(Deserialize)]
struct CallbackQuery {
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackResponse {
    requisition: Requisition,
    sync_triggered: bool,
}

/// Where the bank sends the user back after consent.
async fn consent_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<CallbackResponse>> {
    let known = state
        .requisitions
        .get_by_reference(&query.reference)?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No requisition with reference {}", query.reference))
        })?;

    let fresh = state.bank_client.get_requisition(&known.id).await?;
    if !fresh.is_linked() {
        warn!(
            "Consent callback for requisition {} but status is {}",
            fresh.id, fresh.status
        );
    }
    let sync_triggered = state.scheduler.notify_accounts_linked(fresh.clone()).await?;

    Ok(Json(CallbackResponse {
        requisition: fresh,
        sync_triggered,
    }))
}

async fn account_balances(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> ApiResult<Json<Vec<Balance>>> {
    Ok(Json(state.bank_client.get_balances(&account_id).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bank/institutions", get(list_institutions))
        .route(
            "/bank/requisitions",
            get(list_requisitions).post(create_requisition),
        )
        .route("/bank/callback", get(consent_callback))
        .route("/bank/accounts/{id}/balances", get(account_balances))
}

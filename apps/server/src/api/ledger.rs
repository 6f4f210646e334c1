//! Read access to the ledger and management of category rules.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::main_lib::AppState;
use famledger_core::ledger::LedgerTransaction;
use famledger_storage_sqlite::categories::{CategoryRule, NewCategoryRule};

#[derive(Deserialize)]
struct TransactionsQuery {
    limit: Option<i64>,
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<Json<Vec<LedgerTransaction>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(state.ledger.list_recent(limit)?))
}

async fn list_category_rules(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<CategoryRule>>> {
    Ok(Json(state.category_rules.list_rules()?))
}

async fn add_category_rule(
    State(state): State<Arc<AppState>>,
    Json(rule): Json<NewCategoryRule>,
) -> ApiResult<(StatusCode, Json<CategoryRule>)> {
    let created = state.category_rules.add_rule(rule).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ledger/transactions", get(list_transactions))
        .route(
            "/ledger/category-rules",
            get(list_category_rules).post(add_category_rule),
        )
}

//! Maps provider transactions into ledger rows and upserts them by external id.
//!
//! This module handles:
//! - Deriving flow and amounts from the signed provider amount
//! - Building a non-empty description from remittance data
//! - Applying the category suggestion with a low-confidence fallback
//! - Inserting or updating exactly one ledger row per external id

use chrono::Utc;
use log::{debug, warn};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::bank::{ExternalAccount, ExternalTransaction};
use crate::constants::{DESCRIPTION_PLACEHOLDER, LOW_CONFIDENCE_FLOOR, UNKNOWN_CATEGORY_ID};
use crate::errors::{Error, Result};
use crate::ledger::ledger_model::{
    AccountContext, CategoryRequest, Flow, IdentityHint, LedgerTransaction, NewLedgerTransaction,
    ReconcileOutcome,
};
use crate::ledger::ledger_traits::{
    CategoryResolverTrait, IdentityResolverTrait, LedgerRepositoryTrait,
};

/// Split a signed amount into flow, income and outgoing columns.
///
/// Returns `(flow, income_amount, outgoing_amount)`; exactly one amount is set.
pub fn split_amount(amount: Decimal) -> (Flow, Option<Decimal>, Option<Decimal>) {
    let magnitude = amount.abs();
    match Flow::from_signed(amount) {
        Flow::In => (Flow::In, Some(magnitude), None),
        Flow::Out => (Flow::Out, None, Some(magnitude)),
    }
}

/// Human-readable description, never empty.
///
/// Falls back through structured remittance, unstructured remittance,
/// counterparty name and finally a generic placeholder.
pub fn build_description(transaction: &ExternalTransaction) -> String {
    [
        transaction.remittance_structured.as_deref(),
        transaction.remittance_unstructured.as_deref(),
        transaction.counterparty_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
    .find(|text| !text.is_empty())
    .unwrap_or_else(|| DESCRIPTION_PLACEHOLDER.to_string())
}

/// Category fields after applying the low-confidence floor.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedCategory {
    category_id: String,
    confidence: f64,
    is_system_generated: bool,
}

impl ResolvedCategory {
    fn unknown(confidence: f64) -> Self {
        Self {
            category_id: UNKNOWN_CATEGORY_ID.to_string(),
            confidence,
            is_system_generated: false,
        }
    }
}

/// Reconciles provider transactions into the ledger.
pub struct TransactionReconciler {
    ledger: Arc<dyn LedgerRepositoryTrait>,
    categories: Arc<dyn CategoryResolverTrait>,
    identities: Arc<dyn IdentityResolverTrait>,
}

impl TransactionReconciler {
    pub fn new(
        ledger: Arc<dyn LedgerRepositoryTrait>,
        categories: Arc<dyn CategoryResolverTrait>,
        identities: Arc<dyn IdentityResolverTrait>,
    ) -> Self {
        Self {
            ledger,
            categories,
            identities,
        }
    }

    /// Resolve the bank/origin identity for an account once per sync.
    pub async fn account_context(&self, account: &ExternalAccount) -> Result<AccountContext> {
        let hint = IdentityHint {
            institution_id: account.institution_id.clone(),
            iban: account.iban.clone(),
            owner_name: account.owner_name.clone(),
        };
        let identity = self.identities.resolve(&hint).await?;
        debug!(
            "Account {} resolved to bank {} / origin {}",
            account.id, identity.bank_id, identity.origin_id
        );
        Ok(AccountContext {
            account_id: account.id.clone(),
            identity,
        })
    }

    /// Map one transaction and upsert it by external id.
    pub async fn reconcile(
        &self,
        transaction: &ExternalTransaction,
        context: &AccountContext,
    ) -> Result<ReconcileOutcome> {
        if transaction.transaction_id.trim().is_empty() {
            return Err(Error::Mapping(
                "transaction id must not be empty".to_string(),
            ));
        }

        let (flow, income_amount, outgoing_amount) = split_amount(transaction.amount);
        let description = build_description(transaction);
        let category = self
            .resolve_category(transaction, &description, flow)
            .await;

        let candidate = NewLedgerTransaction {
            id: None,
            date: transaction.booking_date,
            origin_id: context.identity.origin_id.clone(),
            bank_id: context.identity.bank_id.clone(),
            flow,
            category_id: category.category_id,
            description,
            income_amount,
            outgoing_amount,
            external_id: transaction.transaction_id.clone(),
            raw_payload: transaction.raw_payload.clone(),
            confidence: category.confidence,
            is_system_generated: category.is_system_generated,
            is_validated: false,
        };

        if let Some(existing) = self.ledger.find_by_external_id(&candidate.external_id)? {
            self.ledger.update(merge_existing(existing, candidate)).await?;
            return Ok(ReconcileOutcome::Updated);
        }

        match self.ledger.insert(candidate.clone()).await {
            Ok(_) => Ok(ReconcileOutcome::Created),
            Err(err) if err.is_unique_violation() => {
                // A concurrent run inserted the same external id first.
                debug!(
                    "Insert raced on external id {}, updating instead",
                    candidate.external_id
                );
                let existing = self
                    .ledger
                    .find_by_external_id(&candidate.external_id)?
                    .ok_or(err)?;
                self.ledger.update(merge_existing(existing, candidate)).await?;
                Ok(ReconcileOutcome::Updated)
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve_category(
        &self,
        transaction: &ExternalTransaction,
        description: &str,
        flow: Flow,
    ) -> ResolvedCategory {
        let request = CategoryRequest {
            description: description.to_string(),
            amount: transaction.amount,
            counterparty: transaction.counterparty_name.clone(),
            flow,
            date: transaction.booking_date,
        };

        match self.categories.suggest(&request).await {
            Ok(suggestion) => match suggestion.category_id {
                Some(category_id)
                    if !category_id.trim().is_empty()
                        && suggestion.confidence >= LOW_CONFIDENCE_FLOOR =>
                {
                    ResolvedCategory {
                        category_id,
                        confidence: suggestion.confidence,
                        is_system_generated: true,
                    }
                }
                _ => ResolvedCategory::unknown(suggestion.confidence.clamp(0.0, 1.0)),
            },
            Err(err) => {
                warn!(
                    "Category suggestion failed for {}: {}",
                    transaction.transaction_id, err
                );
                ResolvedCategory::unknown(0.0)
            }
        }
    }
}

/// Apply freshly mapped fields onto an existing row.
///
/// Provider facts (date, amounts, flow, payload, bank) always win. A row a
/// family member has validated keeps its category, origin and description.
fn merge_existing(existing: LedgerTransaction, mapped: NewLedgerTransaction) -> LedgerTransaction {
    let keep_user_fields = existing.is_validated;
    LedgerTransaction {
        id: existing.id,
        date: mapped.date,
        origin_id: if keep_user_fields {
            existing.origin_id
        } else {
            mapped.origin_id
        },
        bank_id: mapped.bank_id,
        flow: mapped.flow,
        category_id: if keep_user_fields {
            existing.category_id
        } else {
            mapped.category_id
        },
        description: if keep_user_fields {
            existing.description
        } else {
            mapped.description
        },
        income_amount: mapped.income_amount,
        outgoing_amount: mapped.outgoing_amount,
        external_id: existing.external_id,
        raw_payload: mapped.raw_payload,
        confidence: if keep_user_fields {
            existing.confidence
        } else {
            mapped.confidence
        },
        is_system_generated: if keep_user_fields {
            existing.is_system_generated
        } else {
            mapped.is_system_generated
        },
        is_validated: existing.is_validated,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    }
}

//! Bank data module - requisitions, provider accounts and raw transactions.

mod bank_model;
mod bank_traits;

#[cfg(test)]
mod bank_model_tests;

pub use bank_model::{
    decimal_value, AccountTransactions, Balance, ExternalAccount, ExternalTransaction,
    Institution, NewRequisition, Requisition, RequisitionStatus,
};
pub use bank_traits::RequisitionRepositoryTrait;

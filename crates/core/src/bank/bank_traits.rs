use crate::bank::bank_model::{Requisition, RequisitionStatus};
use crate::errors::Result;
use async_trait::async_trait;

/// Trait for the local mirror of provider requisitions
#[async_trait]
pub trait RequisitionRepositoryTrait: Send + Sync {
    fn list(&self) -> Result<Vec<Requisition>>;
    fn list_by_status(&self, status: RequisitionStatus) -> Result<Vec<Requisition>>;
    fn get_by_id(&self, requisition_id: &str) -> Result<Option<Requisition>>;
    fn get_by_reference(&self, reference: &str) -> Result<Option<Requisition>>;
    async fn upsert(&self, requisition: Requisition) -> Result<Requisition>;
}

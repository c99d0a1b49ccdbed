use async_trait::async_trait;

use fleetops_listing::{ListQuery, Page};
use fleetops_requisitions::{Action, Requisition, RequisitionId};

use crate::api::ApiClient;
use crate::error::ClientError;

/// What the requisition workflow needs from the server.
#[async_trait]
pub trait RequisitionBackend: Send + Sync {
    async fn fetch(&self, id: RequisitionId) -> Result<Requisition, ClientError>;

    async fn list(&self, query: &ListQuery) -> Result<Page<Requisition>, ClientError>;

    async fn transition(&self, id: RequisitionId, action: &Action)
    -> Result<Requisition, ClientError>;
}

#[async_trait]
impl RequisitionBackend for ApiClient {
    async fn fetch(&self, id: RequisitionId) -> Result<Requisition, ClientError> {
        self.requisition(id).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<Requisition>, ClientError> {
        self.list_requisitions(query).await
    }

    async fn transition(
        &self,
        id: RequisitionId,
        action: &Action,
    ) -> Result<Requisition, ClientError> {
        ApiClient::transition(self, id, action).await
    }
}

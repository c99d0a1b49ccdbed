//! Runs requisition actions from the client.
//!
//! The shared state machine is evaluated locally first so illegal actions
//! never reach the network. A refusal against a cached copy is re-checked
//! once against a fresh fetch, since another user may have moved the
//! requisition since it was cached. On success the affected cache entries are
//! dropped and a success toast is raised; any failure raises exactly one
//! error toast and leaves the cache as it was.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use fleetops_core::Actor;
use fleetops_listing::{ListQuery, Page};
use fleetops_requisitions::{Action, Requisition, RequisitionId, TransitionError, transition};

use crate::backend::RequisitionBackend;
use crate::cache::QueryCache;
use crate::error::ClientError;
use crate::notify::{Notifier, Toast};
use crate::view::RequisitionView;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Refused locally; nothing was sent.
    #[error(transparent)]
    Refused(#[from] TransitionError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl WorkflowError {
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Refused(e) => e.to_string(),
            WorkflowError::Client(e) => e.user_message(),
        }
    }
}

pub fn requisition_key(id: RequisitionId) -> String {
    format!("requisitions/{id}")
}

fn list_key(query: &ListQuery) -> String {
    let filters: Vec<String> = query
        .filters
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    format!(
        "requisitions?search={}&{}&page={}&page_size={}",
        query.search,
        filters.join("&"),
        query.page,
        query.page_size
    )
}

pub struct WorkflowService<B, N> {
    backend: B,
    cache: Arc<QueryCache>,
    notifier: N,
    actor: Actor,
}

impl<B, N> WorkflowService<B, N>
where
    B: RequisitionBackend,
    N: Notifier,
{
    pub fn new(backend: B, cache: Arc<QueryCache>, notifier: N, actor: Actor) -> Self {
        Self {
            backend,
            cache,
            notifier,
            actor,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Cached requisition, fetched on a miss.
    pub async fn load(&self, id: RequisitionId) -> Result<Requisition, ClientError> {
        let key = requisition_key(id);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let requisition = self.backend.fetch(id).await?;
        self.cache.put(key, &requisition);
        Ok(requisition)
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<Requisition>, ClientError> {
        let key = list_key(query);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let page = self.backend.list(query).await?;
        self.cache.put(key, &page);
        Ok(page)
    }

    pub async fn view(&self, id: RequisitionId) -> Result<RequisitionView, ClientError> {
        let requisition = self.load(id).await?;
        Ok(RequisitionView::project(&requisition, &self.actor))
    }

    pub async fn perform(
        &self,
        id: RequisitionId,
        action: Action,
    ) -> Result<Requisition, WorkflowError> {
        let kind = action.kind();
        match self.try_perform(id, &action).await {
            Ok(updated) => {
                self.notifier.notify(Toast::success(
                    format!("{} done", kind.label()),
                    format!(
                        "Requisition {} is now {}",
                        updated.requisition_no(),
                        updated.status().label().to_lowercase()
                    ),
                ));
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(requisition_id = %id, action = %kind, error = %err, "requisition action failed");
                self.notifier
                    .notify(Toast::error(format!("{} failed", kind.label()), err.user_message()));
                Err(err)
            }
        }
    }

    async fn try_perform(
        &self,
        id: RequisitionId,
        action: &Action,
    ) -> Result<Requisition, WorkflowError> {
        let key = requisition_key(id);
        match self.cache.get::<Requisition>(&key) {
            Some(cached) => {
                if transition(&cached, action.clone(), self.actor, Utc::now()).is_err() {
                    let fresh = self.backend.fetch(id).await?;
                    self.cache.put(key, &fresh);
                    transition(&fresh, action.clone(), self.actor, Utc::now())?;
                }
            }
            None => {
                let current = self.backend.fetch(id).await?;
                self.cache.put(key, &current);
                transition(&current, action.clone(), self.actor, Utc::now())?;
            }
        }

        let updated = self.backend.transition(id, action).await?;

        self.cache.invalidate_prefix("requisitions");
        // Receipts move stock.
        self.cache.invalidate_prefix("inventory");
        self.cache.put(requisition_key(id), &updated);
        Ok(updated)
    }
}

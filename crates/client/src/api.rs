//! Typed HTTP bindings for the FleetOps API.
//!
//! One request per call: no retries and no timeout beyond reqwest's
//! defaults. Non-success answers become [`ClientError::Api`] carrying the
//! server's `{error, message}` body.

use std::path::{Path, PathBuf};

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use fleetops_core::{ItemId, SiteId};
use fleetops_listing::{ListQuery, Page};
use fleetops_machines::{
    LogbookEntry, MachineTransfer, NewLogbookEntry, RequestTransfer, TransferDecision, TransferId,
};
use fleetops_purchasing::{NewPaymentSlip, PaymentId, PaymentSlip, Procurement, ProcurementId};
use fleetops_requisitions::{Action, NewRequisition, Requisition, RequisitionId};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Stock level as listed by the inventory screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub site_id: SiteId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub minimum_level: i64,
    pub below_minimum: bool,
}

/// Identity of the bearer token, as reported by `/whoami`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmI {
    pub user_id: fleetops_core::UserId,
    pub name: String,
    pub site_id: Option<SiteId>,
    pub roles: Vec<String>,
    pub admin: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::new(base_url).token(token)
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let client = Self::new(config.api_url.clone());
        match &config.token {
            Some(token) => client.token(token.clone()),
            None => client,
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.message.unwrap_or_default()),
            Err(_) => (None, text),
        };
        tracing::debug!(status = status.as_u16(), code = ?code, %message, "API call failed");
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.send(self.request(Method::GET, path)).await?;
        Self::decode(resp).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        Self::decode(resp).await
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListQuery,
    ) -> Result<Page<T>, ClientError> {
        let resp = self
            .send(self.request(Method::GET, path).query(&query_pairs(query)))
            .await?;
        Self::decode(resp).await
    }

    /// True when `/health` answers at all.
    pub async fn check_connectivity(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    pub async fn whoami(&self) -> Result<WhoAmI, ClientError> {
        self.get("/whoami").await
    }

    // -------------------------
    // Requisitions
    // -------------------------

    pub async fn list_requisitions(&self, query: &ListQuery) -> Result<Page<Requisition>, ClientError> {
        self.list("/requisitions", query).await
    }

    pub async fn requisition(&self, id: RequisitionId) -> Result<Requisition, ClientError> {
        self.get(&format!("/requisitions/{id}")).await
    }

    pub async fn create_requisition(&self, new: &NewRequisition) -> Result<Requisition, ClientError> {
        self.post("/requisitions", new).await
    }

    pub async fn transition(
        &self,
        id: RequisitionId,
        action: &Action,
    ) -> Result<Requisition, ClientError> {
        let segment = action.kind().path_segment();
        self.post(&format!("/requisitions/{id}/{segment}"), action)
            .await
    }

    pub async fn stock(&self, site_id: SiteId, item_id: ItemId) -> Result<StockLevel, ClientError> {
        self.get(&format!("/inventory/{site_id}/{item_id}")).await
    }

    // -------------------------
    // Machines
    // -------------------------

    pub async fn record_logbook(&self, entry: &NewLogbookEntry) -> Result<LogbookEntry, ClientError> {
        self.post("/logbook", entry).await
    }

    pub async fn request_transfer(
        &self,
        request: &RequestTransfer,
    ) -> Result<MachineTransfer, ClientError> {
        self.post("/transfers", request).await
    }

    /// `step` is `approve`, `reject` or `complete`.
    pub async fn advance_transfer(
        &self,
        id: TransferId,
        step: &str,
        decision: &TransferDecision,
    ) -> Result<MachineTransfer, ClientError> {
        self.post(&format!("/transfers/{id}/{step}"), decision).await
    }

    // -------------------------
    // Purchasing
    // -------------------------

    pub async fn procurement(&self, id: ProcurementId) -> Result<Procurement, ClientError> {
        self.get(&format!("/procurements/{id}")).await
    }

    /// `step` is `approve` or `receive`.
    pub async fn advance_procurement(
        &self,
        id: ProcurementId,
        step: &str,
        notes: Option<&str>,
    ) -> Result<Procurement, ClientError> {
        self.post(
            &format!("/procurements/{id}/{step}"),
            &serde_json::json!({ "notes": notes }),
        )
        .await
    }

    pub async fn record_payment(&self, new: &NewPaymentSlip) -> Result<PaymentSlip, ClientError> {
        self.post("/payments", new).await
    }

    /// Fetch the slip blob and write it to `dest`. When `dest` is a directory
    /// the server-suggested file name is used inside it.
    pub async fn download_payment_slip(
        &self,
        id: PaymentId,
        dest: &Path,
    ) -> Result<PathBuf, ClientError> {
        let resp = self
            .send(self.request(Method::GET, &format!("/payments/{id}/download")))
            .await?;
        let suggested = resp
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_file_name)
            .unwrap_or_else(|| format!("payment-slip-{id}.txt"));
        let bytes = resp.bytes().await?;

        let target = if tokio::fs::metadata(dest).await.is_ok_and(|m| m.is_dir()) {
            dest.join(suggested)
        } else {
            dest.to_path_buf()
        };
        tokio::fs::write(&target, &bytes).await?;

        tracing::info!(payment_id = %id, path = %target.display(), bytes = bytes.len(), "payment slip saved");
        Ok(target)
    }
}

fn query_pairs(query: &ListQuery) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(query.filters.len() + 3);
    if !query.search.is_empty() {
        pairs.push(("search".to_string(), query.search.clone()));
    }
    for (name, value) in &query.filters {
        pairs.push((name.clone(), value.clone()));
    }
    pairs.push(("page".to_string(), query.page.to_string()));
    pairs.push(("page_size".to_string(), query.page_size.to_string()));
    pairs
}

/// `attachment; filename="x.txt"` -> `x.txt`
fn attachment_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty() && !name.contains(['/', '\\']))
}

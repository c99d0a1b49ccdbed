use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{ItemId, SiteId};
use fleetops_inventory::InventoryRecord;
use fleetops_listing::{DEFAULT_PAGE_SIZE, ListQuery, Listable};
use fleetops_purchasing::NewProcurementLine;
use fleetops_requisitions::RequisitionId;

// -------------------------
// Request DTOs
// -------------------------

/// Query string accepted by every list endpoint. Each endpoint reads the
/// filters that apply to it and ignores the rest.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub site: Option<String>,
    pub machine: Option<String>,
    pub method: Option<String>,
    pub procurement: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl ListParams {
    /// Search and pager, no filters.
    pub fn query(&self) -> ListQuery {
        ListQuery::default()
            .with_search(self.search.clone().unwrap_or_default())
            .with_page(
                self.page.unwrap_or(1),
                self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            )
    }

    /// Search and pager plus the named filters that were supplied.
    pub fn query_with(&self, filters: &[(&str, &Option<String>)]) -> ListQuery {
        filters
            .iter()
            .fold(self.query(), |query, (name, value)| match value {
                Some(value) => query.with_filter(*name, value.clone()),
                None => query,
            })
    }
}

#[derive(Debug, Deserialize)]
pub struct PutStockRequest {
    pub quantity: i64,
    #[serde(default)]
    pub minimum_level: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

/// Body of approve/receive style endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProcurement {
    pub procurement_no: String,
    pub vendor: String,
    pub site_id: SiteId,
    #[serde(default)]
    pub requisition_id: Option<RequisitionId>,
    #[serde(default)]
    pub lines: Vec<NewProcurementLine>,
    #[serde(default)]
    pub notes: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

/// Stock record joined with the names shown in the inventory list.
#[derive(Debug, Clone, Serialize)]
pub struct StockRow {
    pub site_id: SiteId,
    pub site_name: String,
    pub item_id: ItemId,
    pub item_name: String,
    pub item_code: String,
    pub quantity: i64,
    pub minimum_level: i64,
    pub below_minimum: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StockRow {
    pub fn new(record: &InventoryRecord, site_name: Option<&str>, item: Option<(&str, &str)>) -> Self {
        let key = record.key();
        let (item_name, item_code) = item.unwrap_or_default();
        Self {
            site_id: key.site_id,
            site_name: site_name.unwrap_or_default().to_string(),
            item_id: key.item_id,
            item_name: item_name.to_string(),
            item_code: item_code.to_string(),
            quantity: record.quantity(),
            minimum_level: record.minimum_level(),
            below_minimum: record.is_below_minimum(),
            updated_at: record.updated_at(),
        }
    }
}

impl Listable for StockRow {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.item_name.as_str()),
            Cow::Borrowed(self.item_code.as_str()),
            Cow::Borrowed(self.site_name.as_str()),
        ]
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "site" => Some(Cow::Owned(self.site_id.to_string())),
            "status" => Some(Cow::Borrowed(if self.below_minimum {
                "below_minimum"
            } else {
                "ok"
            })),
            _ => None,
        }
    }
}

//! HTTP API: the system of record for requisitions, stock, logbooks,
//! transfers, procurements and reference data.

pub mod app;
pub mod authz;
pub mod config;
pub mod middleware;

pub use app::build_app;
pub use config::ApiConfig;

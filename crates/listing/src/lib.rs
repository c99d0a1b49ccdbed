//! Filtering, search and pagination for list screens.
//!
//! Every list in the back office follows the same contract: a full
//! collection plus `{search, filters, page, page_size}` yields one page and
//! the totals needed to render the pager.

pub mod page;
pub mod state;

pub use page::{ALL, DEFAULT_PAGE_SIZE, ListQuery, Listable, Page, matches, paginate};
pub use state::ListState;

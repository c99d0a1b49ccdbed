//! UI-side list state (search box, filter dropdowns, pager).

use std::collections::BTreeMap;

use crate::page::{DEFAULT_PAGE_SIZE, ListQuery, Listable, Page, paginate};

/// Mutable list state behind one list screen.
///
/// Changing the search term, a filter or the page size sends the user back
/// to page 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListState {
    search: String,
    filters: BTreeMap<String, String>,
    page: usize,
    page_size: usize,
}

impl Default for ListState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl ListState {
    pub fn new(page_size: usize) -> Self {
        Self {
            search: String::new(),
            filters: BTreeMap::new(),
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        let search = search.into();
        if search != self.search {
            self.search = search;
            self.page = 1;
        }
    }

    pub fn set_filter(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        if self.filters.get(&field) != Some(&value) {
            self.filters.insert(field, value);
            self.page = 1;
        }
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        let page_size = page_size.max(1);
        if page_size != self.page_size {
            self.page_size = page_size;
            self.page = 1;
        }
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn query(&self) -> ListQuery {
        ListQuery {
            search: self.search.clone(),
            filters: self.filters.clone(),
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Run the current query and remember the clamped page.
    pub fn apply<T: Listable>(&mut self, items: impl IntoIterator<Item = T>) -> Page<T> {
        let page = paginate(items, &self.query());
        self.page = page.page;
        page
    }
}

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Filter value that disables a filter.
pub const ALL: &str = "all";

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// A record that can be shown in a filterable list.
pub trait Listable {
    /// Values searched by the free-text box.
    fn search_fields(&self) -> Vec<Cow<'_, str>>;

    /// Value of a filterable field (`None` if the record has no such field).
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// Search/filter/pager input for one list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub search: String,
    pub filters: BTreeMap<String, String>,
    /// 1-based page index.
    pub page: usize,
    pub page_size: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            filters: BTreeMap::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListQuery {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

/// One page of a filtered collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub total_pages: usize,
    /// The page actually returned, after clamping.
    pub page: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            total_pages: self.total_pages,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

fn is_bypass(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case(ALL)
}

/// Whether a record passes the search box and every active filter.
pub fn matches<T: Listable>(record: &T, query: &ListQuery) -> bool {
    let needle = query.search.trim().to_lowercase();
    if !needle.is_empty()
        && !record
            .search_fields()
            .iter()
            .any(|f| f.to_lowercase().contains(&needle))
    {
        return false;
    }

    query
        .filters
        .iter()
        .filter(|(_, value)| !is_bypass(value))
        .all(|(name, value)| record.field(name).is_some_and(|v| v == value.as_str()))
}

/// Filter, then cut out the requested page.
///
/// The page index clamps to `[1, max(total_pages, 1)]`, so a page that no
/// longer exists after filtering yields the last one instead of nothing.
pub fn paginate<T: Listable>(items: impl IntoIterator<Item = T>, query: &ListQuery) -> Page<T> {
    let page_size = query.page_size.max(1);
    let matching: Vec<T> = items.into_iter().filter(|r| matches(r, query)).collect();

    let total_count = matching.len();
    let total_pages = total_count.div_ceil(page_size);
    let page = query.page.clamp(1, total_pages.max(1));

    let items = matching
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Page {
        items,
        total_count,
        total_pages,
        page,
        page_size,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Machine {
        pub name: String,
        pub code: String,
        pub status: &'static str,
    }

    impl Listable for Machine {
        fn search_fields(&self) -> Vec<Cow<'_, str>> {
            vec![Cow::Borrowed(&self.name), Cow::Borrowed(&self.code)]
        }

        fn field(&self, name: &str) -> Option<Cow<'_, str>> {
            match name {
                "status" => Some(Cow::Borrowed(self.status)),
                _ => None,
            }
        }
    }

    pub(crate) fn fleet(n: usize) -> Vec<Machine> {
        (0..n)
            .map(|i| Machine {
                name: format!("Machine {i}"),
                code: format!("M-{i:03}"),
                status: if i % 2 == 0 { "active" } else { "idle" },
            })
            .collect()
    }

    #[test]
    fn twenty_five_items_make_three_pages_of_ten() {
        let page = paginate(fleet(25), &ListQuery::default());
        assert_eq!(page.total_count, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 10);

        let last = paginate(fleet(25), &ListQuery::default().with_page(3, 10));
        assert_eq!(last.items.len(), 5);
        assert_eq!(last.items[0].code, "M-020");
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let mut items = fleet(3);
        items.push(Machine {
            name: "Excavator XL2000".to_string(),
            code: "EX-1".to_string(),
            status: "active",
        });

        let page = paginate(items, &ListQuery::default().with_search("exca"));
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].name, "Excavator XL2000");
    }

    #[test]
    fn all_sentinel_bypasses_filter() {
        let all = paginate(fleet(6), &ListQuery::default().with_filter("status", "all"));
        assert_eq!(all.total_count, 6);

        let all_upper = paginate(fleet(6), &ListQuery::default().with_filter("status", "ALL"));
        assert_eq!(all_upper.total_count, 6);

        let idle = paginate(fleet(6), &ListQuery::default().with_filter("status", "idle"));
        assert_eq!(idle.total_count, 3);
        assert!(idle.items.iter().all(|m| m.status == "idle"));
    }

    #[test]
    fn unknown_filter_field_matches_nothing() {
        let page = paginate(fleet(4), &ListQuery::default().with_filter("site", "north"));
        assert_eq!(page.total_count, 0);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.page, 1);
        assert!(page.items.is_empty());
    }

    #[test]
    fn page_clamps_when_filters_shrink_results() {
        let q = ListQuery::default()
            .with_filter("status", "idle")
            .with_page(3, 10);
        let page = paginate(fleet(25), &q);
        // 12 idle machines -> 2 pages; page 3 clamps to 2.
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 2);
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn zero_page_size_behaves_as_one() {
        let page = paginate(fleet(3), &ListQuery::default().with_page(2, 0));
        assert_eq!(page.page_size, 1);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items[0].code, "M-001");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the returned page is always within range and never
        /// larger than the page size.
        #[test]
        fn page_is_always_in_range(
            n in 0usize..120,
            page in 0usize..20,
            page_size in 0usize..30,
        ) {
            let result = paginate(fleet(n), &ListQuery::default().with_page(page, page_size));
            let size = page_size.max(1);

            prop_assert_eq!(result.total_count, n);
            prop_assert_eq!(result.total_pages, n.div_ceil(size));
            prop_assert!(result.page >= 1);
            prop_assert!(result.page <= result.total_pages.max(1));
            prop_assert!(result.items.len() <= size);
        }
    }
}

//! Free-text and category narrowing of the reconciled view.
use std::sync::Arc;

use crate::catalog::CatalogView;
use crate::model::{CategoryFilter, ListingRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CatalogQuery {
    pub text: String,
    pub category: CategoryFilter,
}

impl CatalogQuery {
    pub fn new(text: impl Into<String>, category: CategoryFilter) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }

    pub fn matches(&self, record: &ListingRecord) -> bool {
        let category_ok = match self.category {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => record.category == c,
        };
        category_ok && title_matches(&record.title, &self.text)
    }
}

fn title_matches(title: &str, text: &str) -> bool {
    if text.is_empty() {
        return true;
    }
    if title.is_empty() {
        return false;
    }
    title.to_lowercase().contains(&text.to_lowercase())
}

/// Ordered subsequence of `catalog` that passes `query`.
pub fn filter<'a>(catalog: &'a [ListingRecord], query: &CatalogQuery) -> Vec<&'a ListingRecord> {
    catalog.iter().filter(|r| query.matches(r)).collect()
}

/// Caches the last result keyed on (view generation, query).
#[derive(Debug)]
pub struct MemoFilter {
    key: Option<(u64, CatalogQuery)>,
    result: Arc<[ListingRecord]>,
}

impl Default for MemoFilter {
    fn default() -> Self {
        Self {
            key: None,
            result: Arc::from(Vec::new()),
        }
    }
}

impl MemoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, view: &CatalogView, query: &CatalogQuery) -> Arc<[ListingRecord]> {
        if let Some((generation, cached)) = &self.key {
            if *generation == view.generation() && cached == query {
                return Arc::clone(&self.result);
            }
        }
        let result: Arc<[ListingRecord]> = filter(view.records(), query)
            .into_iter()
            .cloned()
            .collect();
        self.key = Some((view.generation(), query.clone()));
        self.result = Arc::clone(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    fn rec(id: &str, title: &str, category: Category) -> ListingRecord {
        ListingRecord {
            id: id.into(),
            owner_handle: String::new(),
            owner_id: None,
            title: title.into(),
            description: String::new(),
            category,
            price: 1,
            images: vec![],
            created_at: 0,
            qa_note: None,
        }
    }

    fn catalog() -> Vec<ListingRecord> {
        vec![
            rec("1", "Nike Alphafly", Category::Running),
            rec("2", "Giro Helmet", Category::Cycling),
            rec("3", "NIKE Pegasus", Category::Running),
            rec("4", "", Category::Running),
        ]
    }

    #[test]
    fn empty_query_returns_catalog_unchanged() {
        let cat = catalog();
        let out = filter(&cat, &CatalogQuery::default());
        let expected: Vec<&ListingRecord> = cat.iter().collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn category_only_keeps_matching_records() {
        let cat = catalog();
        let out = filter(&cat, &CatalogQuery::new("", CategoryFilter::Only(Category::Running)));
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r.category == Category::Running));
    }

    #[test]
    fn text_is_case_insensitive_substring_of_title() {
        let cat = catalog();
        let out = filter(&cat, &CatalogQuery::new("nike", CategoryFilter::All));
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn empty_title_never_matches_text() {
        let cat = catalog();
        let out = filter(&cat, &CatalogQuery::new("a", CategoryFilter::All));
        assert!(out.iter().all(|r| !r.title.is_empty()));
    }

    #[test]
    fn text_and_category_combine() {
        let cat = catalog();
        let out = filter(&cat, &CatalogQuery::new("helmet", CategoryFilter::Only(Category::Running)));
        assert!(out.is_empty());
    }

    #[test]
    fn memo_filter_matches_plain_filter() {
        let view = CatalogView::new(7, catalog());
        let query = CatalogQuery::new("nike", CategoryFilter::All);
        let mut memo = MemoFilter::new();

        let first = memo.apply(&view, &query);
        let second = memo.apply(&view, &query);
        assert!(Arc::ptr_eq(&first, &second));

        let plain: Vec<ListingRecord> = filter(view.records(), &query).into_iter().cloned().collect();
        assert_eq!(&*first, plain.as_slice());

        let other = memo.apply(&view, &CatalogQuery::default());
        assert_eq!(other.len(), 4);
    }
}

//! Row filtering over the record store.
//!
//! [`FilterCriteria`] is an immutable bundle of optional constraints. The
//! builder methods consume and return a new value, so a criteria value is
//! replaced rather than edited. [`apply`] evaluates every active constraint
//! and keeps a row only when all of them pass. The result is a
//! [`FilteredView`] that borrows the store and lists matching row positions in
//! their original order.
//!
//! An absent set constraint means "no restriction", while a present but empty
//! set matches nothing. Deselecting every category must empty the view, not
//! reset it.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::debug;
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::store::{RecordStore, Transaction};

/// Inclusive range with optionally open ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValueRange<T> {
    pub start: Option<T>,
    pub end: Option<T>,
}

impl<T: PartialOrd> ValueRange<T> {
    pub fn new(start: Option<T>, end: Option<T>) -> Self {
        Self { start, end }
    }

    pub fn between(start: T, end: T) -> Self {
        Self::new(Some(start), Some(end))
    }

    pub fn at_least(start: T) -> Self {
        Self::new(Some(start), None)
    }

    pub fn at_most(end: T) -> Self {
        Self::new(None, Some(end))
    }

    /// An inverted range (`start > end`) contains nothing.
    pub fn contains(&self, value: &T) -> bool {
        self.start.as_ref().is_none_or(|start| value >= start)
            && self.end.as_ref().is_none_or(|end| value <= end)
    }
}

/// Case-insensitive literal substring match against product detail.
#[derive(Debug, Clone)]
pub struct SearchTerm {
    term: String,
    matcher: Option<Regex>,
}

impl SearchTerm {
    pub fn new(term: impl Into<String>) -> Self {
        let term = term.into();
        let matcher = if term.is_empty() {
            None
        } else {
            RegexBuilder::new(&regex::escape(&term))
                .case_insensitive(true)
                .build()
                .ok()
        };
        Self { term, matcher }
    }

    pub fn as_str(&self) -> &str {
        &self.term
    }

    pub fn matches(&self, haystack: Option<&str>) -> bool {
        if self.term.is_empty() {
            return true;
        }
        let Some(haystack) = haystack else {
            return false;
        };
        match &self.matcher {
            Some(regex) => regex.is_match(haystack),
            None => haystack
                .to_lowercase()
                .contains(&self.term.to_lowercase()),
        }
    }
}

impl PartialEq for SearchTerm {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    dates: Option<ValueRange<NaiveDate>>,
    categories: Option<BTreeSet<String>>,
    product_types: Option<BTreeSet<String>>,
    store_ids: Option<BTreeSet<String>>,
    price: Option<ValueRange<Decimal>>,
    quantity: Option<ValueRange<i64>>,
    search: Option<SearchTerm>,
}

fn to_set<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

impl FilterCriteria {
    /// No restrictions at all.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_range(self, start: NaiveDate, end: NaiveDate) -> Self {
        self.with_dates(ValueRange::between(start, end))
    }

    pub fn with_dates(self, range: ValueRange<NaiveDate>) -> Self {
        Self {
            dates: Some(range),
            ..self
        }
    }

    pub fn with_categories<I, S>(self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: Some(to_set(categories)),
            ..self
        }
    }

    pub fn with_product_types<I, S>(self, product_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            product_types: Some(to_set(product_types)),
            ..self
        }
    }

    pub fn with_store_ids<I, S>(self, store_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store_ids: Some(to_set(store_ids)),
            ..self
        }
    }

    pub fn with_price_range(self, range: ValueRange<Decimal>) -> Self {
        Self {
            price: Some(range),
            ..self
        }
    }

    pub fn with_quantity_range(self, range: ValueRange<i64>) -> Self {
        Self {
            quantity: Some(range),
            ..self
        }
    }

    pub fn with_search(self, term: impl Into<String>) -> Self {
        Self {
            search: Some(SearchTerm::new(term)),
            ..self
        }
    }

    pub fn dates(&self) -> Option<&ValueRange<NaiveDate>> {
        self.dates.as_ref()
    }

    pub fn categories(&self) -> Option<&BTreeSet<String>> {
        self.categories.as_ref()
    }

    pub fn product_types(&self) -> Option<&BTreeSet<String>> {
        self.product_types.as_ref()
    }

    pub fn store_ids(&self) -> Option<&BTreeSet<String>> {
        self.store_ids.as_ref()
    }

    pub fn price(&self) -> Option<&ValueRange<Decimal>> {
        self.price.as_ref()
    }

    pub fn quantity(&self) -> Option<&ValueRange<i64>> {
        self.quantity.as_ref()
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_ref().map(SearchTerm::as_str)
    }

    pub fn is_unrestricted(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.dates
            .as_ref()
            .is_none_or(|range| range.contains(&transaction.date()))
            && member(&self.categories, transaction.product_category())
            && member(&self.product_types, transaction.product_type())
            && member(&self.store_ids, transaction.store_id())
            && self
                .price
                .as_ref()
                .is_none_or(|range| range.contains(&transaction.unit_price()))
            && self
                .quantity
                .as_ref()
                .is_none_or(|range| range.contains(&transaction.quantity()))
            && self
                .search
                .as_ref()
                .is_none_or(|term| term.matches(transaction.product_detail()))
    }
}

fn member(allowed: &Option<BTreeSet<String>>, value: Option<&str>) -> bool {
    match allowed {
        None => true,
        Some(set) => value.is_some_and(|v| set.contains(v)),
    }
}

/// The rows of a store that satisfy some criteria, in store order.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    store: &'a RecordStore,
    rows: Vec<usize>,
}

pub fn apply<'a>(store: &'a RecordStore, criteria: &FilterCriteria) -> FilteredView<'a> {
    FilteredView::all(store).refine(criteria)
}

impl<'a> FilteredView<'a> {
    pub fn all(store: &'a RecordStore) -> Self {
        Self {
            store,
            rows: (0..store.len()).collect(),
        }
    }

    /// Applies further criteria on top of this view.
    pub fn refine(&self, criteria: &FilterCriteria) -> Self {
        if criteria.is_unrestricted() {
            return self.clone();
        }
        let view = self.subset(|transaction| criteria.matches(transaction));
        debug!("Filter kept {} of {} row(s)", view.len(), self.len());
        view
    }

    pub fn subset(&self, predicate: impl Fn(&Transaction) -> bool) -> Self {
        let transactions = self.store.transactions();
        Self {
            store: self.store,
            rows: self
                .rows
                .iter()
                .copied()
                .filter(|idx| predicate(&transactions[*idx]))
                .collect(),
        }
    }

    pub fn store(&self) -> &'a RecordStore {
        self.store
    }

    /// Positions of the kept rows within the store, ascending.
    pub fn positions(&self) -> &[usize] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Transaction> + '_ {
        let transactions = self.store.transactions();
        self.rows.iter().map(move |idx| &transactions[*idx])
    }
}

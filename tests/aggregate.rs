mod common;

use coffee_analytics::{
    aggregate::{self, Aggregation, Reducer, group_aggregate, group_reduce},
    columns::Column,
    data::Value,
    error::AnalyticsError,
    filter::{self, FilterCriteria, FilteredView},
};
use proptest::prelude::*;

use common::{csv_from_rows, sample_store, store_from_csv};

const CATEGORIES: [&str; 3] = ["Coffee", "Tea", "Bakery"];

fn rows_strategy() -> impl Strategy<Value = Vec<(u32, i64, u32, &'static str)>> {
    proptest::collection::vec(
        (1u32..=7, 1i64..=5, 50u32..=500, proptest::sample::select(CATEGORIES.to_vec())),
        1..30,
    )
}

proptest! {
    #[test]
    fn counts_sum_to_the_view_size(rows in rows_strategy()) {
        let store = store_from_csv(&csv_from_rows(&rows));
        let view = FilteredView::all(&store);
        for keys in [
            vec![Column::ProductCategory],
            vec![Column::TransactionDate, Column::ProductCategory],
            vec![Column::Weekday],
        ] {
            let table = group_reduce(&view, &keys, Column::TransactionQty, Reducer::Count).unwrap();
            prop_assert_eq!(table.total(0).unwrap() as usize, view.len());
        }
    }

    #[test]
    fn results_do_not_depend_on_row_order(
        (rows, shuffled) in rows_strategy().prop_flat_map(|rows| {
            let shuffled = Just(rows.clone()).prop_shuffle();
            (Just(rows), shuffled)
        })
    ) {
        let original = store_from_csv(&csv_from_rows(&rows));
        let permuted = store_from_csv(&csv_from_rows(&shuffled));
        let request = [
            Aggregation::sum(Column::TransactionQty),
            Aggregation::count(Column::TransactionId),
            Aggregation::nunique(Column::UnitPrice),
            Aggregation::new(Column::UnitPrice, Reducer::Max),
        ];
        let keys = [Column::ProductCategory, Column::Month];
        let left = group_aggregate(&FilteredView::all(&original), &keys, &request).unwrap();
        let right = group_aggregate(&FilteredView::all(&permuted), &keys, &request).unwrap();
        prop_assert_eq!(left, right);
    }
}

#[test]
fn top_n_with_ties_is_stable_across_calls() {
    let store = sample_store();
    let view = FilteredView::all(&store);
    let by_type = group_reduce(&view, &[Column::ProductType], Column::TransactionQty, Reducer::Sum)
        .unwrap();
    let first = aggregate::top_n(&by_type, 3, 0).unwrap();
    for _ in 0..5 {
        assert_eq!(aggregate::top_n(&by_type, 3, 0).unwrap(), first);
    }
    assert_eq!(aggregate::top_n(&by_type, 100, 0).unwrap().len(), by_type.len());
}

#[test]
fn headline_groups_match_the_fixture() {
    let store = sample_store();
    let view = FilteredView::all(&store);
    let categories =
        group_reduce(&view, &[Column::ProductCategory], Column::TransactionQty, Reducer::Sum)
            .unwrap();
    let top = aggregate::idxmax_group(&categories, 0).unwrap();
    assert_eq!(top.keys, vec![Value::text("Coffee")]);
    assert_eq!(top.value(), 17.0);

    let stores =
        group_reduce(&view, &[Column::StoreId], Column::TransactionQty, Reducer::Sum).unwrap();
    let top_store = aggregate::idxmax_group(&stores, 0).unwrap();
    assert_eq!(top_store.keys, vec![Value::text("5")]);
    assert_eq!(top_store.value(), 13.0);
}

#[test]
fn missing_key_values_are_dropped_not_counted() {
    let store = sample_store();
    let view = FilteredView::all(&store);
    let products =
        group_reduce(&view, &[Column::ProductId], Column::TransactionQty, Reducer::Count).unwrap();
    assert_eq!(products.total(0).unwrap(), 19.0);
    let details = group_reduce(&view, &[Column::ProductDetail], Column::ProductId, Reducer::NUnique)
        .unwrap();
    assert!(details.rows.iter().all(|row| row.value() == 1.0));
}

#[test]
fn empty_views_produce_empty_tables_and_idxmax_errors() {
    let store = sample_store();
    let view = filter::apply(&store, &FilterCriteria::new().with_store_ids(["99"]));
    let table = group_reduce(&view, &[Column::StoreId], Column::TransactionQty, Reducer::Sum)
        .unwrap();
    assert!(table.is_empty());
    assert!(matches!(
        aggregate::idxmax_group(&table, 0),
        Err(AnalyticsError::EmptyView(_))
    ));
    assert!(matches!(
        aggregate::share_of_total(&table, 0),
        Err(AnalyticsError::DivisionUndefined(_))
    ));
}

#[test]
fn text_metrics_reject_numeric_reducers() {
    let store = sample_store();
    let view = FilteredView::all(&store);
    for reducer in [Reducer::Sum, Reducer::Mean, Reducer::Max, Reducer::Min] {
        let err = group_reduce(&view, &[Column::StoreId], Column::ProductDetail, reducer)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Aggregation(_)), "{reducer}");
    }
}

#[test]
fn absent_source_columns_are_aggregation_errors() {
    let store = store_from_csv(&csv_from_rows(&[(2, 1, 300, "Coffee")]));
    let view = FilteredView::all(&store);
    let err = group_reduce(&view, &[Column::StoreLocation], Column::TransactionQty, Reducer::Sum)
        .unwrap_err();
    assert_eq!(
        err,
        AnalyticsError::aggregation("column 'store_location' is not present in the source")
    );
}

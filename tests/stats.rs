mod common;

use chrono::NaiveDate;
use coffee_analytics::{
    columns::Column,
    data::Value,
    error::AnalyticsError,
    filter::{self, FilterCriteria, FilteredView},
    stats::{self, ColumnSample},
};

use common::{csv_from_rows, sample_store, store_from_csv};

const TOLERANCE: f64 = 1e-9;

fn worked_example() -> coffee_analytics::RecordStore {
    store_from_csv(&csv_from_rows(&[
        (2, 2, 300, "Coffee"),
        (2, 1, 500, "Tea"),
        (3, 4, 100, "Coffee"),
    ]))
}

#[test]
fn worked_example_is_reproducible() {
    let store = worked_example();
    let view = FilteredView::all(&store);
    assert_eq!(stats::total(&view, Column::Revenue).unwrap(), 15.0);

    let qty = ColumnSample::from_view(&view, Column::TransactionQty).unwrap();
    let mean = qty.mean().unwrap();
    let std_dev = qty.std_dev().unwrap();
    assert!((mean - 7.0 / 3.0).abs() < TOLERANCE);
    assert!((std_dev - (7.0_f64 / 3.0).sqrt()).abs() < TOLERANCE);
    assert!((std_dev - 1.527_525_231_651_947).abs() < TOLERANCE);
    let z = stats::z_score(4.0, mean, std_dev).unwrap();
    assert!((z - 1.091_089_451_179_962).abs() < TOLERANCE);
}

#[test]
fn zero_variance_column_has_undefined_z_scores() {
    let store = store_from_csv(&csv_from_rows(&[(2, 3, 100, "Tea"), (3, 3, 200, "Tea")]));
    let view = FilteredView::all(&store);
    let qty = ColumnSample::from_view(&view, Column::TransactionQty).unwrap();
    assert_eq!(qty.std_dev().unwrap(), 0.0);
    assert!(matches!(
        qty.z_scores(),
        Err(AnalyticsError::DivisionUndefined(_))
    ));
    assert!(matches!(
        stats::correlation(&view, Column::TransactionQty, Column::UnitPrice),
        Err(AnalyticsError::DivisionUndefined(_))
    ));
}

#[test]
fn identical_fractional_prices_have_no_spread() {
    let store = store_from_csv(&csv_from_rows(&[
        (2, 1, 10, "Tea"),
        (3, 2, 10, "Tea"),
        (4, 3, 10, "Tea"),
    ]));
    let view = FilteredView::all(&store);
    let price = ColumnSample::from_view(&view, Column::UnitPrice).unwrap();
    assert_eq!(price.variance().unwrap(), 0.0);
    assert_eq!(price.summary().unwrap().std_dev, Some(0.0));
    assert!(matches!(
        price.z_scores(),
        Err(AnalyticsError::DivisionUndefined(_))
    ));
    assert!(matches!(
        stats::correlation(&view, Column::UnitPrice, Column::TransactionQty),
        Err(AnalyticsError::DivisionUndefined(_))
    ));
    assert!(matches!(
        stats::linear_trend(&view, Column::UnitPrice, Column::TransactionQty),
        Err(AnalyticsError::DivisionUndefined(_))
    ));
}

#[test]
fn single_day_growth_is_undefined() {
    let store = store_from_csv(&csv_from_rows(&[(4, 2, 100, "Tea"), (4, 5, 100, "Tea")]));
    let view = FilteredView::all(&store);
    let points =
        stats::daily_growth(&view, &[], Column::TransactionDate, Column::TransactionQty).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].total, 7.0);
    assert_eq!(points[0].growth, None);
    let totals = stats::growth_by_group(&points, &[]).unwrap();
    assert!(totals.is_empty());
}

#[test]
fn growth_restarts_for_every_location() {
    let store = sample_store();
    let view = FilteredView::all(&store);
    let points = stats::daily_growth(
        &view,
        &[Column::StoreLocation],
        Column::TransactionDate,
        Column::TransactionQty,
    )
    .unwrap();
    let astoria = points
        .iter()
        .filter(|p| p.group == vec![Value::text("Astoria")])
        .map(|p| (p.date, p.growth))
        .collect::<Vec<_>>();
    let day = |d| NaiveDate::from_ymd_opt(2023, 1, d).unwrap();
    assert_eq!(
        astoria,
        vec![
            (day(3), None),
            (day(4), Some(-2.0)),
            (day(5), Some(-1.0)),
            (day(6), Some(2.0)),
        ]
    );

    let totals = stats::growth_by_group(&points, &["store_location"]).unwrap();
    let order = totals
        .rows
        .iter()
        .map(|row| (row.keys[0].as_display(), row.value()))
        .collect::<Vec<_>>();
    assert_eq!(
        order,
        vec![
            ("Astoria".to_string(), -1.0),
            ("Hell's Kitchen".to_string(), -1.0),
            ("Lower Manhattan".to_string(), -6.0),
        ]
    );
}

#[test]
fn empty_views_fail_instead_of_returning_nan() {
    let store = sample_store();
    let view = filter::apply(&store, &FilterCriteria::new().with_search("no such product"));
    let qty = ColumnSample::from_view(&view, Column::TransactionQty).unwrap();
    assert!(matches!(qty.mean(), Err(AnalyticsError::EmptyView(_))));
    assert!(matches!(qty.median(), Err(AnalyticsError::EmptyView(_))));
    assert!(matches!(
        stats::correlation(&view, Column::TransactionQty, Column::UnitPrice),
        Err(AnalyticsError::InsufficientData(_))
    ));
    assert_eq!(stats::total(&view, Column::TransactionQty).unwrap(), 0.0);
}

#[test]
fn fixture_summary_and_correlation() {
    let store = sample_store();
    let view = FilteredView::all(&store);
    let summary = ColumnSample::from_view(&view, Column::TransactionQty)
        .unwrap()
        .summary()
        .unwrap();
    assert_eq!(summary.count, 20);
    assert_eq!((summary.min, summary.max), (1.0, 4.0));
    assert!((summary.mean - 1.7).abs() < TOLERANCE);
    assert_eq!(summary.median, 1.5);
    assert!((summary.std_dev.unwrap() - 0.864_504_725_870_617_6).abs() < TOLERANCE);

    let r = stats::correlation(&view, Column::TransactionQty, Column::UnitPrice).unwrap();
    assert!((r - -0.086_729_651_952_501_32).abs() < TOLERANCE);
    assert_eq!(
        ColumnSample::from_view(&view, Column::TransactionQty)
            .unwrap()
            .mode()
            .unwrap(),
        1.0
    );
}

#[test]
fn trend_line_fits_exact_data() {
    let store = store_from_csv(&csv_from_rows(&[
        (2, 1, 100, "Tea"),
        (2, 3, 200, "Tea"),
        (2, 5, 300, "Tea"),
    ]));
    let view = FilteredView::all(&store);
    let trend = stats::linear_trend(&view, Column::UnitPrice, Column::TransactionQty).unwrap();
    assert!((trend.slope - 2.0).abs() < TOLERANCE);
    assert!((trend.intercept + 1.0).abs() < TOLERANCE);
    assert_eq!(trend.observations, 3);
    assert!((trend.predict(4.0) - 7.0).abs() < TOLERANCE);
}

#[test]
fn non_numeric_columns_are_rejected() {
    let store = sample_store();
    let view = FilteredView::all(&store);
    assert!(matches!(
        ColumnSample::from_view(&view, Column::StoreLocation),
        Err(AnalyticsError::Aggregation(_))
    ));
}

mod common;

use coffee_analytics::{
    FilterCriteria, Page, ViewOptions,
    views::{self, ResultValue, Session, ViewOutcome},
};

use common::{csv_from_rows, sample_store, store_from_csv};

#[test]
fn every_page_assembles_without_diagnostics_on_a_full_source() {
    let store = sample_store();
    for page in Page::ALL {
        let results = views::assemble(&store, &FilterCriteria::new(), page, &ViewOptions::default());
        assert_eq!(results.rows_in_view, 20);
        assert_eq!(results.dropped_rows, 1);
        assert!(
            results.diagnostics.is_empty(),
            "{page:?}: {:?}",
            results.diagnostics
        );
        assert!(!results.views.is_empty());
    }
}

#[test]
fn minimal_source_degrades_view_by_view() {
    let store = store_from_csv(&csv_from_rows(&[
        (2, 2, 300, "Coffee"),
        (3, 1, 500, "Tea"),
        (4, 4, 100, "Coffee"),
    ]));
    let results = views::assemble(&store, &FilterCriteria::new(), Page::Home, &ViewOptions::default());
    assert!(matches!(results.ready("total_revenue"), Some(ResultValue::Scalar(v)) if *v == 15.0));
    assert!(results.ready("top_category").is_some());
    assert_eq!(
        results.get("top_store").map(|v| &v.outcome),
        Some(&ViewOutcome::Unavailable("missing column".to_string()))
    );
    let flagged = results
        .diagnostics
        .iter()
        .map(|d| d.view.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        flagged,
        vec![
            "top_store",
            "top_products",
            "type_sales_by_category",
            "location_product_sales"
        ]
    );
}

#[test]
fn top_products_honours_the_option() {
    let store = sample_store();
    let options = ViewOptions {
        top_products: 2,
        ..ViewOptions::default()
    };
    let results = views::assemble(&store, &FilterCriteria::new(), Page::Home, &options);
    let Some(ResultValue::Table(table)) = results.ready("top_products") else {
        panic!("top products missing");
    };
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows[0].keys[0].as_display(), "Ethiopia Rg");
    assert_eq!(table.rows[0].value(), 7.0);
}

#[test]
fn empty_selection_reports_no_data_without_aborting() {
    let store = sample_store();
    let mut session = Session::new(&store);
    session.set_criteria(FilterCriteria::new().with_store_ids(Vec::<String>::new()));
    for page in Page::ALL {
        session.set_page(page);
        let results = session.assemble();
        assert_eq!(results.rows_in_view, 0);
        assert!(!results.views.is_empty());
    }
    session.set_page(Page::Home);
    let results = session.assemble();
    assert_eq!(
        results.get("top_category").map(|v| &v.outcome),
        Some(&ViewOutcome::Unavailable("no data".to_string()))
    );
    assert!(matches!(results.ready("category_sales"), Some(ResultValue::Table(t)) if t.is_empty()));
}

#[test]
fn per_location_views_respect_top_categories() {
    let store = sample_store();
    let options = ViewOptions {
        top_categories: 1,
        location: Some("Astoria".to_string()),
        ..ViewOptions::default()
    };
    let results = views::assemble(&store, &FilterCriteria::new(), Page::Level2, &options);
    let Some(ResultValue::Table(table)) = results.ready("top_categories_per_location") else {
        panic!("per-location categories missing");
    };
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows[0].keys[1].as_display(), "Coffee");
    assert_eq!(table.rows[0].value(), 8.0);
}

#[test]
fn daily_volume_statistics_use_transaction_counts() {
    let store = sample_store();
    let results = views::assemble(&store, &FilterCriteria::new(), Page::Home, &ViewOptions::default());
    let Some(ResultValue::Metrics(metrics)) = results.ready("daily_volume_stats") else {
        panic!("daily stats missing");
    };
    let values = metrics.iter().map(|m| (m.name.as_str(), m.value)).collect::<Vec<_>>();
    assert_eq!(values[1], ("median", 3.0));
    assert_eq!(values[2], ("mode", 1.0));
    assert!((values[0].1 - 20.0 / 7.0).abs() < 1e-9);
}

#[test]
fn category_distribution_counts_transactions_not_units() {
    let store = store_from_csv(&csv_from_rows(&[
        (2, 4, 300, "Coffee"),
        (3, 1, 500, "Tea"),
        (4, 1, 500, "Tea"),
    ]));
    let results = views::assemble(&store, &FilterCriteria::new(), Page::Home, &ViewOptions::default());
    let Some(ResultValue::Table(table)) = results.ready("category_distribution") else {
        panic!("category distribution missing");
    };
    assert_eq!(table.metric_names[1], "percent_of_total");
    let coffee = &table.rows[0];
    let tea = &table.rows[1];
    assert_eq!(coffee.keys[0].as_display(), "Coffee");
    assert_eq!(coffee.values[0], 1.0);
    assert_eq!(tea.values[0], 2.0);
    assert!((coffee.values[1] - 100.0 / 3.0).abs() < 1e-9);
    assert!((tea.values[1] - 200.0 / 3.0).abs() < 1e-9);
}

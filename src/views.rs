//! Per-page composition of filter, aggregate and statistics results.
//!
//! Every named view is computed in isolation. A view whose source columns are
//! absent, or whose computation fails, becomes [`ViewOutcome::Unavailable`]
//! plus a [`Diagnostic`]; the remaining views on the page are unaffected.
//! Nothing here renders anything.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{
        self, AggregateRow, AggregateTable, Aggregation, Matrix, Reducer, group_aggregate,
        group_reduce,
    },
    columns::Column,
    data::{Value, WEEK},
    error::Result,
    filter::{self, FilterCriteria, FilteredView},
    stats::{self, ColumnSample, GrowthPoint, HistogramBin, LinearTrend},
    store::RecordStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Home,
    Level1,
    Level2,
    Level3,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Home, Page::Level1, Page::Level2, Page::Level3];

    pub fn title(self) -> &'static str {
        match self {
            Page::Home => "Sales summary",
            Page::Level1 => "Level 1: statistical analysis",
            Page::Level2 => "Level 2: temporal breakdowns",
            Page::Level3 => "Level 3: exploratory insights",
        }
    }
}

/// Per-view knobs that are not row filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewOptions {
    pub top_products: usize,
    /// Categories kept per location, clamped to `1..=5`.
    pub top_categories: usize,
    /// Restricts the growth and per-location category views to one location.
    pub location: Option<String>,
    pub z_score_bins: usize,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            top_products: 10,
            top_categories: 3,
            location: None,
            z_score_bins: 20,
        }
    }
}

const TOP_CATEGORIES_BY_REVENUE: usize = 3;
const PEAK_HOUR_CATEGORIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
}

impl Metric {
    fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResultValue {
    Scalar(f64),
    /// A winning group, e.g. the top category, with its reduced value.
    Highlight { label: String, value: f64 },
    Table(AggregateTable),
    Matrix(Matrix),
    Metrics(Vec<Metric>),
    Growth(Vec<GrowthPoint>),
    Trend(LinearTrend),
    Histogram(Vec<HistogramBin>),
}

impl ResultValue {
    fn highlight(row: &AggregateRow) -> Self {
        ResultValue::Highlight {
            label: row
                .keys
                .iter()
                .map(Value::as_display)
                .collect::<Vec<_>>()
                .join(" / "),
            value: row.value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum ViewOutcome {
    Ready(ResultValue),
    /// Short reason such as "no data" or "undefined".
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedResult {
    pub name: &'static str,
    pub title: String,
    pub outcome: ViewOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub view: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub page: Page,
    pub rows_in_view: usize,
    pub dropped_rows: usize,
    pub views: Vec<NamedResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResultSet {
    pub fn get(&self, name: &str) -> Option<&NamedResult> {
        self.views.iter().find(|view| view.name == name)
    }

    /// The computed value of a view, if it is available.
    pub fn ready(&self, name: &str) -> Option<&ResultValue> {
        match &self.get(name)?.outcome {
            ViewOutcome::Ready(value) => Some(value),
            ViewOutcome::Unavailable(_) => None,
        }
    }
}

struct Assembler<'v, 'a> {
    view: &'v FilteredView<'a>,
    options: &'v ViewOptions,
    results: Vec<NamedResult>,
    diagnostics: Vec<Diagnostic>,
}

impl<'v, 'a> Assembler<'v, 'a> {
    fn new(view: &'v FilteredView<'a>, options: &'v ViewOptions) -> Self {
        Self {
            view,
            options,
            results: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn add<F>(&mut self, name: &'static str, title: impl Into<String>, requires: &[Column], compute: F)
    where
        F: FnOnce(&FilteredView<'a>, &ViewOptions) -> Result<ResultValue>,
    {
        let missing = self.view.store().columns().missing(requires);
        let outcome = if !missing.is_empty() {
            let names = missing
                .iter()
                .map(|c| c.source().name())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>();
            self.diagnose(name, format!("missing column(s): {}", names.join(", ")));
            ViewOutcome::Unavailable("missing column".to_string())
        } else {
            match compute(self.view, self.options) {
                Ok(value) => ViewOutcome::Ready(value),
                Err(err) => {
                    self.diagnose(name, err.to_string());
                    ViewOutcome::Unavailable(err.display_label().to_string())
                }
            }
        };
        self.results.push(NamedResult {
            name,
            title: title.into(),
            outcome,
        });
    }

    fn diagnose(&mut self, view: &str, message: String) {
        debug!("View '{view}' unavailable: {message}");
        self.diagnostics.push(Diagnostic {
            view: view.to_string(),
            message,
        });
    }
}

/// Filters `store` with `criteria` and computes every view of `page`.
pub fn assemble(
    store: &RecordStore,
    criteria: &FilterCriteria,
    page: Page,
    options: &ViewOptions,
) -> ResultSet {
    let view = filter::apply(store, criteria);
    assemble_view(&view, page, options)
}

pub fn assemble_view(view: &FilteredView<'_>, page: Page, options: &ViewOptions) -> ResultSet {
    let mut assembler = Assembler::new(view, options);
    match page {
        Page::Home => home(&mut assembler),
        Page::Level1 => level1(&mut assembler),
        Page::Level2 => level2(&mut assembler),
        Page::Level3 => level3(&mut assembler),
    }
    info!(
        "Assembled {} view(s) for {:?} over {} row(s), {} diagnostic(s)",
        assembler.results.len(),
        page,
        view.len(),
        assembler.diagnostics.len()
    );
    ResultSet {
        page,
        rows_in_view: view.len(),
        dropped_rows: view.store().dropped_row_count(),
        views: assembler.results,
        diagnostics: assembler.diagnostics,
    }
}

/// One user's filter and page selection over a shared store.
#[derive(Debug, Clone)]
pub struct Session<'a> {
    store: &'a RecordStore,
    criteria: FilterCriteria,
    page: Page,
    options: ViewOptions,
}

impl<'a> Session<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self {
            store,
            criteria: FilterCriteria::default(),
            page: Page::default(),
            options: ViewOptions::default(),
        }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
    }

    pub fn set_page(&mut self, page: Page) {
        self.page = page;
    }

    pub fn set_options(&mut self, options: ViewOptions) {
        self.options = options;
    }

    pub fn assemble(&self) -> ResultSet {
        assemble(self.store, &self.criteria, self.page, &self.options)
    }
}

fn qty_by(view: &FilteredView<'_>, keys: &[Column]) -> Result<AggregateTable> {
    group_reduce(view, keys, Column::TransactionQty, Reducer::Sum)
}

fn hourly_volume(view: &FilteredView<'_>) -> Result<AggregateTable> {
    qty_by(view, &[Column::Hour])
}

fn peak_hour(view: &FilteredView<'_>) -> Result<AggregateRow> {
    let hourly = hourly_volume(view)?;
    aggregate::idxmax_group(&hourly, 0).cloned()
}

/// Narrows to one store location when the options name one.
fn at_location<'a>(view: &FilteredView<'a>, options: &ViewOptions) -> FilteredView<'a> {
    match &options.location {
        Some(location) => {
            view.subset(|t| t.store_location() == Some(location.as_str()))
        }
        None => view.clone(),
    }
}

fn home(asm: &mut Assembler<'_, '_>) {
    asm.add("total_revenue", "Total revenue", &[], |view, _| {
        stats::total(view, Column::Revenue).map(ResultValue::Scalar)
    });
    asm.add("total_sales_volume", "Total sales volume", &[], |view, _| {
        stats::total(view, Column::TransactionQty).map(ResultValue::Scalar)
    });
    asm.add(
        "top_category",
        "Top product category",
        &[Column::ProductCategory],
        |view, _| {
            let table = qty_by(view, &[Column::ProductCategory])?;
            aggregate::idxmax_group(&table, 0).map(ResultValue::highlight)
        },
    );
    asm.add("top_store", "Top store", &[Column::StoreId], |view, _| {
        let table = qty_by(view, &[Column::StoreId])?;
        aggregate::idxmax_group(&table, 0).map(ResultValue::highlight)
    });
    let top_products = asm.options.top_products;
    asm.add(
        "top_products",
        format!("Top {top_products} products by sales volume"),
        &[Column::ProductDetail],
        |view, options| {
            let table = qty_by(view, &[Column::ProductDetail])?;
            aggregate::top_n(&table, options.top_products, 0).map(ResultValue::Table)
        },
    );
    asm.add(
        "category_distribution",
        "Share of transactions by category",
        &[Column::ProductCategory],
        |view, _| {
            let table = group_reduce(
                view,
                &[Column::ProductCategory],
                Column::TransactionId,
                Reducer::Count,
            )?;
            aggregate::share_of_total(&table, 0).map(ResultValue::Table)
        },
    );
    asm.add(
        "daily_volume_stats",
        "Mean, median and mode of daily transaction counts",
        &[],
        |view, _| {
            let daily = group_reduce(
                view,
                &[Column::TransactionDate],
                Column::TransactionId,
                Reducer::Count,
            )?;
            let sample = ColumnSample::from_table(&daily, 0)?;
            Ok(ResultValue::Metrics(vec![
                Metric::new("mean", sample.mean()?),
                Metric::new("median", sample.median()?),
                Metric::new("mode", sample.mode()?),
            ]))
        },
    );
    asm.add(
        "category_sales",
        "Sales volume by category",
        &[Column::ProductCategory],
        |view, _| qty_by(view, &[Column::ProductCategory]).map(ResultValue::Table),
    );
    asm.add(
        "type_sales_by_category",
        "Sales volume by product type within each category",
        &[Column::ProductCategory, Column::ProductType],
        |view, _| {
            qty_by(view, &[Column::ProductCategory, Column::ProductType]).map(ResultValue::Table)
        },
    );
    asm.add(
        "location_product_sales",
        "Sales volume by location and product",
        &[Column::StoreLocation, Column::ProductDetail],
        |view, _| {
            let table = qty_by(view, &[Column::StoreLocation, Column::ProductDetail])?;
            aggregate::pivot(&table, 0, 1, 0).map(ResultValue::Matrix)
        },
    );
}

fn level1(asm: &mut Assembler<'_, '_>) {
    asm.add(
        "qty_z_score_distribution",
        "Z-score distribution of transaction quantities",
        &[],
        |view, options| {
            let sample = ColumnSample::from_view(view, Column::TransactionQty)?;
            let scores = ColumnSample::from_values("z_score", sample.z_scores()?);
            stats::histogram(&scores, options.z_score_bins).map(ResultValue::Histogram)
        },
    );
    asm.add(
        "top_categories_by_revenue",
        format!("Top {TOP_CATEGORIES_BY_REVENUE} categories by volume, with revenue"),
        &[Column::ProductCategory],
        |view, _| {
            let table = group_aggregate(
                view,
                &[Column::ProductCategory],
                &[
                    Aggregation::sum(Column::TransactionQty),
                    Aggregation::sum(Column::Revenue),
                ],
            )?;
            aggregate::top_n(&table, TOP_CATEGORIES_BY_REVENUE, 0).map(ResultValue::Table)
        },
    );
    asm.add(
        "qty_dispersion",
        "Variance and standard deviation of quantity",
        &[],
        |view, _| {
            let sample = ColumnSample::from_view(view, Column::TransactionQty)?;
            Ok(ResultValue::Metrics(vec![
                Metric::new("variance", sample.variance()?),
                Metric::new("std_dev", sample.std_dev()?),
            ]))
        },
    );
    asm.add(
        "category_revenue",
        "Revenue by category",
        &[Column::ProductCategory],
        |view, _| {
            group_reduce(view, &[Column::ProductCategory], Column::Revenue, Reducer::Sum)
                .map(ResultValue::Table)
        },
    );
    let top_products = asm.options.top_products;
    asm.add(
        "top_products_by_revenue",
        format!("Top {top_products} products by revenue"),
        &[Column::ProductDetail],
        |view, options| {
            let table =
                group_reduce(view, &[Column::ProductDetail], Column::Revenue, Reducer::Sum)?;
            aggregate::top_n(&table, options.top_products, 0).map(ResultValue::Table)
        },
    );
    asm.add(
        "location_avg_qty",
        "Average quantity per transaction by location",
        &[Column::StoreLocation],
        |view, _| {
            group_reduce(view, &[Column::StoreLocation], Column::TransactionQty, Reducer::Mean)
                .map(ResultValue::Table)
        },
    );
    asm.add(
        "location_sales_share",
        "Share of sales volume by location",
        &[Column::StoreLocation],
        |view, _| {
            let table = qty_by(view, &[Column::StoreLocation])?;
            aggregate::share_of_total(&table, 0).map(ResultValue::Table)
        },
    );
    asm.add(
        "location_daily_unique_products",
        "Average daily unique products by location",
        &[Column::StoreLocation, Column::ProductId],
        |view, _| {
            let daily = group_reduce(
                view,
                &[Column::TransactionDate, Column::StoreLocation],
                Column::ProductId,
                Reducer::NUnique,
            )?;
            daily.regroup(&[1], 0, Reducer::Mean).map(ResultValue::Table)
        },
    );
    asm.add(
        "location_avg_transaction_value",
        "Average transaction value by location",
        &[Column::StoreLocation],
        |view, _| {
            group_reduce(view, &[Column::StoreLocation], Column::Revenue, Reducer::Mean)
                .map(ResultValue::Table)
        },
    );
    asm.add(
        "hourly_sales",
        "Sales volume by hour",
        &[Column::Hour],
        |view, _| hourly_volume(view).map(ResultValue::Table),
    );
    asm.add("peak_hour", "Peak sales hour", &[Column::Hour], |view, _| {
        peak_hour(view).map(|row| ResultValue::highlight(&row))
    });
    asm.add(
        "peak_hour_categories",
        "Transactions per category during the peak hour",
        &[Column::Hour, Column::ProductCategory],
        |view, _| {
            let peak = peak_hour(view)?.keys[0].clone();
            let at_peak = view.subset(|t| {
                t.hour()
                    .is_some_and(|hour| Value::Integer(i64::from(hour)) == peak)
            });
            let counts = group_reduce(
                &at_peak,
                &[Column::ProductCategory],
                Column::TransactionId,
                Reducer::Count,
            )?;
            aggregate::top_n(&counts, PEAK_HOUR_CATEGORIES, 0).map(ResultValue::Table)
        },
    );
}

fn level2(asm: &mut Assembler<'_, '_>) {
    asm.add(
        "day_hour_heatmap",
        "Sales volume by weekday and hour",
        &[Column::Hour],
        |view, _| {
            let table = qty_by(view, &[Column::Weekday, Column::Hour])?;
            let matrix: Matrix = aggregate::pivot(&table, 0, 1, 0)?;
            Ok(ResultValue::Matrix(
                matrix.reindex_rows(WEEK.iter().copied().map(Value::Weekday).collect()),
            ))
        },
    );
    asm.add(
        "category_avg_price",
        "Average unit price by category",
        &[Column::ProductCategory],
        |view, _| {
            group_reduce(view, &[Column::ProductCategory], Column::UnitPrice, Reducer::Mean)
                .map(ResultValue::Table)
        },
    );
    asm.add(
        "qty_price_correlation",
        "Correlation of quantity and unit price",
        &[],
        |view, _| {
            stats::correlation(view, Column::TransactionQty, Column::UnitPrice)
                .map(ResultValue::Scalar)
        },
    );
    asm.add(
        "qty_price_trend",
        "Trend of unit price over quantity",
        &[],
        |view, _| {
            stats::linear_trend(view, Column::TransactionQty, Column::UnitPrice)
                .map(ResultValue::Trend)
        },
    );
    let scope = match &asm.options.location {
        Some(location) => format!(" in {location}"),
        None => String::new(),
    };
    asm.add(
        "store_growth",
        format!("Daily sales growth by location{scope}"),
        &[Column::StoreLocation],
        |view, options| {
            let scoped = at_location(view, options);
            stats::daily_growth(
                &scoped,
                &[Column::StoreLocation],
                Column::TransactionDate,
                Column::TransactionQty,
            )
            .map(ResultValue::Growth)
        },
    );
    asm.add(
        "store_growth_totals",
        format!("Net sales growth over the period by location{scope}"),
        &[Column::StoreLocation],
        |view, options| {
            let scoped = at_location(view, options);
            let points = stats::daily_growth(
                &scoped,
                &[Column::StoreLocation],
                Column::TransactionDate,
                Column::TransactionQty,
            )?;
            stats::growth_by_group(&points, &[Column::StoreLocation.name()])
                .map(ResultValue::Table)
        },
    );
    let top_categories = asm.options.top_categories.clamp(1, 5);
    asm.add(
        "top_categories_per_location",
        format!("Top {top_categories} categories per location{scope}"),
        &[Column::StoreLocation, Column::ProductCategory],
        move |view, options| {
            let scoped = at_location(view, options);
            let table = qty_by(&scoped, &[Column::StoreLocation, Column::ProductCategory])?;
            aggregate::top_n_per_group(&table, top_categories, 0).map(ResultValue::Table)
        },
    );
    asm.add("daily_trend", "Daily sales volume", &[], |view, _| {
        qty_by(view, &[Column::TransactionDate]).map(ResultValue::Table)
    });
    asm.add("monthly_trend", "Monthly sales volume", &[], |view, _| {
        qty_by(view, &[Column::Month]).map(ResultValue::Table)
    });
    asm.add(
        "category_volume",
        "Sales volume by category",
        &[Column::ProductCategory],
        |view, _| qty_by(view, &[Column::ProductCategory]).map(ResultValue::Table),
    );
    asm.add(
        "avg_sales_price_trend",
        "Average sales price per unit by day",
        &[],
        |view, _| {
            let table = group_aggregate(
                view,
                &[Column::TransactionDate],
                &[
                    Aggregation::sum(Column::Revenue),
                    Aggregation::sum(Column::TransactionQty),
                ],
            )?;
            table
                .with_ratio(0, 1, "avg_sales_price")
                .map(ResultValue::Table)
        },
    );
}

fn level3(asm: &mut Assembler<'_, '_>) {
    asm.add(
        "location_type_volume",
        "Sales volume by location and product type",
        &[Column::StoreLocation, Column::ProductType],
        |view, _| {
            qty_by(view, &[Column::StoreLocation, Column::ProductType]).map(ResultValue::Table)
        },
    );
    asm.add(
        "hourly_type_volume",
        "Sales volume by hour and product type",
        &[Column::Hour, Column::ProductType],
        |view, _| qty_by(view, &[Column::Hour, Column::ProductType]).map(ResultValue::Table),
    );
    asm.add(
        "category_price_volume",
        "Sales volume and average price by category",
        &[Column::ProductCategory],
        |view, _| {
            group_aggregate(
                view,
                &[Column::ProductCategory],
                &[
                    Aggregation::sum(Column::TransactionQty),
                    Aggregation::mean(Column::UnitPrice),
                ],
            )
            .map(ResultValue::Table)
        },
    );
    asm.add(
        "location_avg_volume",
        "Average sales volume per transaction by location",
        &[Column::StoreLocation],
        |view, _| {
            group_reduce(view, &[Column::StoreLocation], Column::TransactionQty, Reducer::Mean)
                .map(ResultValue::Table)
        },
    );
    asm.add(
        "traffic_day_volume",
        "Product type volume on high and low traffic days",
        &[Column::ProductType],
        |view, _| traffic_day_volume(view).map(ResultValue::Table),
    );
    asm.add(
        "location_hour_volume",
        "Sales volume by location and hour",
        &[Column::StoreLocation, Column::Hour],
        |view, _| {
            let table = qty_by(view, &[Column::StoreLocation, Column::Hour])?;
            aggregate::pivot(&table, 0, 1, 0).map(ResultValue::Matrix)
        },
    );
    asm.add(
        "location_variety",
        "Sales volume and product variety by location",
        &[Column::StoreLocation, Column::ProductId],
        |view, _| {
            group_aggregate(
                view,
                &[Column::StoreLocation],
                &[
                    Aggregation::sum(Column::TransactionQty),
                    Aggregation::nunique(Column::ProductId),
                ],
            )
            .map(ResultValue::Table)
        },
    );
    asm.add(
        "location_type_avg",
        "Average quantity by location and product type",
        &[Column::StoreLocation, Column::ProductType],
        |view, _| {
            let table = group_reduce(
                view,
                &[Column::StoreLocation, Column::ProductType],
                Column::TransactionQty,
                Reducer::Mean,
            )?;
            aggregate::pivot(&table, 0, 1, 0).map(ResultValue::Matrix)
        },
    );
}

/// Days whose total volume is above the median daily volume are "High",
/// every other day is "Low".
fn traffic_day_volume(view: &FilteredView<'_>) -> Result<AggregateTable> {
    let daily = qty_by(view, &[Column::TransactionDate])?;
    let threshold = ColumnSample::from_table(&daily, 0)?.median()?;
    let busy: BTreeSet<NaiveDate> = daily
        .rows
        .iter()
        .filter(|row| row.value() > threshold)
        .filter_map(|row| row.keys.first().and_then(Value::as_date))
        .collect();

    let high = view.subset(|t| busy.contains(&t.date()));
    let low = view.subset(|t| !busy.contains(&t.date()));
    let mut table = qty_by(&high, &[Column::ProductType])?
        .with_leading_key("traffic_day", Value::text("High"));
    table.append(
        qty_by(&low, &[Column::ProductType])?.with_leading_key("traffic_day", Value::text("Low")),
    )?;
    Ok(table)
}

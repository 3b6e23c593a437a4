use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;

use crate::{
    cli::{DomainArgs, OutputFormat, StatsArgs, ViewArgs},
    columns::Column,
    config::{DashboardConfig, ResolvedSource},
    data::format_number,
    filter::{self, FilteredView},
    io_utils, printable_delimiter, render,
    stats::{ColumnSample, Summary},
    store::{Bounds, LoadOptions, RecordStore},
    table,
    views,
};

fn load_config(path: Option<&Path>) -> Result<DashboardConfig> {
    match path {
        Some(path) => DashboardConfig::load(path),
        None => Ok(DashboardConfig::default()),
    }
}

fn load_store(source: &ResolvedSource) -> Result<RecordStore> {
    let delimiter = io_utils::resolve_input_delimiter(&source.input, source.delimiter);
    info!(
        "Loading transactions from '{}' with delimiter '{}'",
        source.input.display(),
        printable_delimiter(delimiter)
    );
    let options = LoadOptions {
        delimiter: Some(delimiter),
        encoding: io_utils::resolve_encoding(source.input_encoding.as_deref())?,
    };
    RecordStore::load(&source.input, &options)
        .with_context(|| format!("Loading transactions from {:?}", source.input))
}

pub fn handle_view(config_path: Option<&Path>, args: &ViewArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let store = load_store(&config.resolve_source(&args.source)?)?;
    let page = config.resolve_page(args);
    let options = config.resolve_view_options(args);
    let criteria = args.filters.to_criteria();
    debug!("View criteria: {criteria:?}, options: {options:?}");

    let results = views::assemble(&store, &criteria, page, &options);
    match args.format {
        OutputFormat::Table => print!("{}", render::render_text(&results)),
        OutputFormat::Json => println!("{}", render::render_json(&results)?),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct Domain {
    rows: usize,
    dropped_rows: usize,
    dates: Option<Bounds<String>>,
    unit_price: Option<Bounds<String>>,
    transaction_qty: Option<Bounds<i64>>,
    categories: Vec<String>,
    product_types: Vec<String>,
    store_ids: Vec<String>,
    store_locations: Vec<String>,
}

impl Domain {
    fn of(store: &RecordStore) -> Self {
        Self {
            rows: store.len(),
            dropped_rows: store.dropped_row_count(),
            dates: store.date_bounds().map(|b| Bounds {
                min: b.min.format("%Y-%m-%d").to_string(),
                max: b.max.format("%Y-%m-%d").to_string(),
            }),
            unit_price: store.price_bounds().map(|b| Bounds {
                min: b.min.normalize().to_string(),
                max: b.max.normalize().to_string(),
            }),
            transaction_qty: store.quantity_bounds(),
            categories: store.categories(),
            product_types: store.product_types(),
            store_ids: store.store_ids(),
            store_locations: store.store_locations(),
        }
    }

    fn rows(&self) -> Vec<Vec<String>> {
        let bounds = |b: &Option<Bounds<String>>| match b {
            Some(b) => format!("{} .. {}", b.min, b.max),
            None => "-".to_string(),
        };
        vec![
            vec!["rows".into(), self.rows.to_string()],
            vec!["dropped_rows".into(), self.dropped_rows.to_string()],
            vec!["transaction_date".into(), bounds(&self.dates)],
            vec!["unit_price".into(), bounds(&self.unit_price)],
            vec![
                "transaction_qty".into(),
                bounds(&self.transaction_qty.map(|b| Bounds {
                    min: b.min.to_string(),
                    max: b.max.to_string(),
                })),
            ],
            vec!["product_category".into(), self.categories.join(", ")],
            vec!["product_type".into(), self.product_types.join(", ")],
            vec!["store_id".into(), self.store_ids.join(", ")],
            vec!["store_location".into(), self.store_locations.join(", ")],
        ]
    }
}

pub fn handle_domain(config_path: Option<&Path>, args: &DomainArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let store = load_store(&config.resolve_source(&args.source)?)?;
    let domain = Domain::of(&store);
    match args.format {
        OutputFormat::Table => {
            let headers = vec!["domain".to_string(), "values".to_string()];
            table::print_table(&headers, &domain.rows());
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&domain).context("Serializing domains to JSON")?
        ),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ColumnSummary {
    column: Column,
    #[serde(flatten)]
    summary: Option<Summary>,
}

fn summarize(view: &FilteredView<'_>, columns: &[Column]) -> Result<Vec<ColumnSummary>> {
    columns
        .iter()
        .map(|column| {
            let sample = ColumnSample::from_view(view, *column)
                .with_context(|| format!("Summarizing column '{column}'"))?;
            Ok(ColumnSummary {
                column: *column,
                summary: sample.summary().ok(),
            })
        })
        .collect()
}

pub fn handle_stats(config_path: Option<&Path>, args: &StatsArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let store = load_store(&config.resolve_source(&args.source)?)?;
    let columns = if args.columns.is_empty() {
        Column::ALL
            .into_iter()
            .filter(|c| c.is_numeric() && store.has_column(*c))
            .collect::<Vec<_>>()
    } else {
        args.columns.clone()
    };
    let view = filter::apply(&store, &args.filters.to_criteria());
    info!(
        "Summarizing {} column(s) over {} of {} row(s)",
        columns.len(),
        view.len(),
        store.len()
    );
    let summaries = summarize(&view, &columns)?;

    match args.format {
        OutputFormat::Table => {
            let headers = ["column", "count", "min", "max", "mean", "median", "std_dev"]
                .map(String::from)
                .to_vec();
            let rows = summaries
                .iter()
                .map(|entry| match &entry.summary {
                    Some(s) => vec![
                        entry.column.name().to_string(),
                        s.count.to_string(),
                        format_number(s.min),
                        format_number(s.max),
                        format_number(s.mean),
                        format_number(s.median),
                        s.std_dev.map(format_number).unwrap_or_else(|| "-".into()),
                    ],
                    None => {
                        let mut row = vec![entry.column.name().to_string(), "0".to_string()];
                        row.extend(std::iter::repeat_n("-".to_string(), 5));
                        row
                    }
                })
                .collect::<Vec<_>>();
            table::print_table(&headers, &rows);
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&summaries).context("Serializing statistics to JSON")?
        ),
    }
    Ok(())
}

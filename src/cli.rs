use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use crate::{
    columns::Column,
    data::{parse_naive_date, parse_price},
    filter::{FilterCriteria, ValueRange},
    views::Page,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Filter and summarize coffee shop sales transactions", long_about = None)]
pub struct Cli {
    /// YAML file supplying defaults for input, page and view options
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Assemble the views of one analysis page over the filtered transactions
    View(ViewArgs),
    /// Print filter domains: date, price and quantity bounds plus distinct values
    Domain(DomainArgs),
    /// Produce summary statistics for numeric columns of the filtered transactions
    Stats(StatsArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Transaction CSV file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// First transaction date to include (inclusive)
    #[arg(long = "from", value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Last transaction date to include (inclusive)
    #[arg(long = "to", value_parser = parse_date)]
    pub to: Option<NaiveDate>,
    /// Product categories to keep (repeatable)
    #[arg(long = "category", action = clap::ArgAction::Append)]
    pub categories: Vec<String>,
    /// Keep no categories at all, yielding an empty view
    #[arg(long = "no-categories", conflicts_with = "categories")]
    pub no_categories: bool,
    /// Product types to keep (repeatable)
    #[arg(long = "type", action = clap::ArgAction::Append)]
    pub product_types: Vec<String>,
    /// Keep no product types at all
    #[arg(long = "no-types", conflicts_with = "product_types")]
    pub no_types: bool,
    /// Store ids to keep (repeatable)
    #[arg(long = "store", action = clap::ArgAction::Append)]
    pub stores: Vec<String>,
    /// Keep no stores at all
    #[arg(long = "no-stores", conflicts_with = "stores")]
    pub no_stores: bool,
    /// Lowest unit price to include
    #[arg(long = "min-price", value_parser = parse_price_arg)]
    pub min_price: Option<Decimal>,
    /// Highest unit price to include
    #[arg(long = "max-price", value_parser = parse_price_arg)]
    pub max_price: Option<Decimal>,
    /// Smallest transaction quantity to include
    #[arg(long = "min-qty")]
    pub min_qty: Option<i64>,
    /// Largest transaction quantity to include
    #[arg(long = "max-qty")]
    pub max_qty: Option<i64>,
    /// Case-insensitive text to find in product detail
    #[arg(long)]
    pub search: Option<String>,
}

fn set_filter(values: &[String], none: bool) -> Option<Vec<String>> {
    if none {
        Some(Vec::new())
    } else if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

impl FilterArgs {
    pub fn to_criteria(&self) -> FilterCriteria {
        let mut criteria = FilterCriteria::new();
        if self.from.is_some() || self.to.is_some() {
            criteria = criteria.with_dates(ValueRange::new(self.from, self.to));
        }
        if let Some(categories) = set_filter(&self.categories, self.no_categories) {
            criteria = criteria.with_categories(categories);
        }
        if let Some(types) = set_filter(&self.product_types, self.no_types) {
            criteria = criteria.with_product_types(types);
        }
        if let Some(stores) = set_filter(&self.stores, self.no_stores) {
            criteria = criteria.with_store_ids(stores);
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            criteria = criteria.with_price_range(ValueRange::new(self.min_price, self.max_price));
        }
        if self.min_qty.is_some() || self.max_qty.is_some() {
            criteria = criteria.with_quantity_range(ValueRange::new(self.min_qty, self.max_qty));
        }
        if let Some(term) = &self.search {
            criteria = criteria.with_search(term.clone());
        }
        criteria
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ViewArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Analysis page to assemble
    #[arg(long, value_enum)]
    pub page: Option<Page>,
    /// Number of products in the top-product views (defaults to 10)
    #[arg(long = "top-products")]
    pub top_products: Option<usize>,
    /// Categories kept per location, 1 to 5 (defaults to 3)
    #[arg(long = "top-categories", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub top_categories: Option<u8>,
    /// Store location for the growth and per-location category views
    #[arg(long)]
    pub location: Option<String>,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct DomainArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Columns to summarize (defaults to every numeric column)
    #[arg(short = 'C', long = "columns", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub columns: Vec<Column>,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    parse_naive_date(value).ok_or_else(|| format!("Unrecognized date '{value}'"))
}

fn parse_price_arg(value: &str) -> Result<Decimal, String> {
    parse_price(value).ok_or_else(|| format!("Invalid price '{value}'"))
}

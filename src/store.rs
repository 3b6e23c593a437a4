//! The in-memory transaction table.
//!
//! A [`RecordStore`] is built once from a CSV source and never mutated
//! afterwards. Derived columns (revenue, hour, weekday, month) are computed
//! during load so every later filter and aggregate reads the same values.
//!
//! Loading is strict about structure and lenient about content: a source
//! missing one of the required headers fails with
//! [`AnalyticsError::DataLoad`], while individual rows that cannot be parsed
//! are dropped and counted in [`RecordStore::dropped_row_count`].

use std::{io::Read, path::Path};

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    columns::{Column, ColumnSet, normalize_header},
    data::{Value, decimal_to_f64, parse_naive_date, parse_naive_time, parse_price, parse_quantity},
    error::{AnalyticsError, Result},
    io_utils,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: String,
    date: NaiveDate,
    time: Option<NaiveTime>,
    store_id: Option<String>,
    store_location: Option<String>,
    product_id: Option<String>,
    product_category: Option<String>,
    product_type: Option<String>,
    product_detail: Option<String>,
    quantity: i64,
    unit_price: Decimal,
    revenue: Decimal,
}

impl Transaction {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time
    }

    pub fn store_id(&self) -> Option<&str> {
        self.store_id.as_deref()
    }

    pub fn store_location(&self) -> Option<&str> {
        self.store_location.as_deref()
    }

    pub fn product_id(&self) -> Option<&str> {
        self.product_id.as_deref()
    }

    pub fn product_category(&self) -> Option<&str> {
        self.product_category.as_deref()
    }

    pub fn product_type(&self) -> Option<&str> {
        self.product_type.as_deref()
    }

    pub fn product_detail(&self) -> Option<&str> {
        self.product_detail.as_deref()
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    /// Always `quantity × unit_price`, fixed at load.
    pub fn revenue(&self) -> Decimal {
        self.revenue
    }

    pub fn hour(&self) -> Option<u32> {
        self.time.map(|t| t.hour())
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn month(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }

    pub fn value(&self, column: Column) -> Option<Value> {
        let text = |v: &Option<String>| v.as_ref().map(|s| Value::Text(s.clone()));
        match column {
            Column::TransactionId => Some(Value::Text(self.id.clone())),
            Column::TransactionDate => Some(Value::Date(self.date)),
            Column::TransactionTime => self.time.map(Value::Time),
            Column::StoreId => text(&self.store_id),
            Column::StoreLocation => text(&self.store_location),
            Column::ProductId => text(&self.product_id),
            Column::ProductCategory => text(&self.product_category),
            Column::ProductType => text(&self.product_type),
            Column::ProductDetail => text(&self.product_detail),
            Column::TransactionQty => Some(Value::Integer(self.quantity)),
            Column::UnitPrice => Some(Value::Decimal(self.unit_price)),
            Column::Revenue => Some(Value::Decimal(self.revenue)),
            Column::Hour => self.hour().map(|h| Value::Integer(i64::from(h))),
            Column::Weekday => Some(Value::Weekday(self.weekday())),
            Column::Month => Some(Value::Text(self.month())),
        }
    }

    /// Numeric reading of a measure column; `None` for text columns and nulls.
    pub fn numeric(&self, column: Column) -> Option<f64> {
        match column {
            Column::TransactionQty => Some(self.quantity as f64),
            Column::UnitPrice => decimal_to_f64(self.unit_price),
            Column::Revenue => decimal_to_f64(self.revenue),
            Column::Hour => self.hour().map(f64::from),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

/// Inclusive min/max over the unfiltered store, used as a slider domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    transactions: Vec<Transaction>,
    columns: ColumnSet,
    dropped_row_count: usize,
}

impl RecordStore {
    pub fn load(path: &Path, options: &LoadOptions) -> Result<Self> {
        let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
        let reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        let store = Self::read(reader, options.encoding)?;
        info!(
            "Loaded {} transaction(s) from {:?} ({} row(s) dropped)",
            store.len(),
            path,
            store.dropped_row_count
        );
        Ok(store)
    }

    pub fn from_reader<R: Read>(reader: R, options: &LoadOptions) -> Result<Self> {
        let delimiter = options.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
        Self::read(io_utils::open_csv_reader(reader, delimiter), options.encoding)
    }

    fn read<R: Read>(mut reader: csv::Reader<R>, encoding: &'static Encoding) -> Result<Self> {
        let headers = io_utils::reader_headers(&mut reader, encoding)?;
        let layout = HeaderLayout::resolve(&headers)?;

        let mut transactions = Vec::new();
        let mut dropped_row_count = 0usize;
        for (idx, record) in reader.byte_records().enumerate() {
            let row_number = idx + 1;
            let record = record.map_err(|err| {
                AnalyticsError::data_load(format!("reading row {}: {err}", row_number + 1))
            })?;
            let parsed = io_utils::decode_record(&record, encoding)
                .ok_or_else(|| format!("not valid {} text", encoding.name()))
                .and_then(|fields| layout.parse_row(&fields, row_number));
            match parsed {
                Ok(transaction) => transactions.push(transaction),
                Err(reason) => {
                    debug!("Dropping data row {row_number}: {reason}");
                    dropped_row_count += 1;
                }
            }
        }

        Ok(Self {
            transactions,
            columns: layout.column_set(),
            dropped_row_count,
        })
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(column)
    }

    /// Rows skipped during load because a required field did not parse.
    pub fn dropped_row_count(&self) -> usize {
        self.dropped_row_count
    }

    pub fn date_bounds(&self) -> Option<Bounds<NaiveDate>> {
        bounds(self.transactions.iter().map(Transaction::date))
    }

    pub fn price_bounds(&self) -> Option<Bounds<Decimal>> {
        bounds(self.transactions.iter().map(Transaction::unit_price))
    }

    pub fn quantity_bounds(&self) -> Option<Bounds<i64>> {
        bounds(self.transactions.iter().map(Transaction::quantity))
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        self.distinct(Transaction::product_category)
    }

    pub fn product_types(&self) -> Vec<String> {
        self.distinct(Transaction::product_type)
    }

    pub fn store_locations(&self) -> Vec<String> {
        self.distinct(Transaction::store_location)
    }

    /// Distinct store ids: integer ids first in numeric order, then the rest as text.
    pub fn store_ids(&self) -> Vec<String> {
        let mut ids = self.distinct(Transaction::store_id);
        ids.sort_by_cached_key(|id| store_id_key(id));
        ids
    }

    fn distinct<'s>(&'s self, field: impl Fn(&'s Transaction) -> Option<&'s str>) -> Vec<String> {
        self.transactions
            .iter()
            .filter_map(field)
            .unique()
            .map(str::to_string)
            .collect()
    }
}

fn bounds<T: Ord + Copy>(values: impl Iterator<Item = T>) -> Option<Bounds<T>> {
    values
        .minmax()
        .into_option()
        .map(|(min, max)| Bounds { min, max })
}

fn store_id_key(id: &str) -> (bool, i64, String) {
    match id.parse::<i64>() {
        Ok(number) => (false, number, id.to_string()),
        Err(_) => (true, 0, id.to_string()),
    }
}

/// Field positions for every recognised header.
struct HeaderLayout {
    positions: Vec<(Column, usize)>,
}

impl HeaderLayout {
    fn resolve(headers: &[String]) -> Result<Self> {
        let normalized = headers.iter().map(|h| normalize_header(h)).collect::<Vec<_>>();
        let positions = Column::REQUIRED
            .into_iter()
            .chain(Column::OPTIONAL)
            .filter_map(|column| {
                normalized
                    .iter()
                    .position(|h| h == column.name())
                    .map(|idx| (column, idx))
            })
            .collect::<Vec<_>>();

        let missing = Column::REQUIRED
            .into_iter()
            .filter(|column| !positions.iter().any(|(c, _)| c == column))
            .map(Column::name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(AnalyticsError::data_load(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }
        Ok(Self { positions })
    }

    fn position(&self, column: Column) -> Option<usize> {
        self.positions
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, idx)| *idx)
    }

    fn column_set(&self) -> ColumnSet {
        // Ids fall back to row numbers, so the column is always present.
        ColumnSet::new(
            self.positions
                .iter()
                .map(|(column, _)| *column)
                .chain([Column::TransactionId]),
        )
    }

    fn field<'r>(&self, fields: &'r [String], column: Column) -> Option<&'r str> {
        self.position(column)
            .and_then(|idx| fields.get(idx))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn parse_row(&self, fields: &[String], row_number: usize) -> Result<Transaction, String> {
        let raw_date = self
            .field(fields, Column::TransactionDate)
            .ok_or("empty transaction_date")?;
        let date =
            parse_naive_date(raw_date).ok_or_else(|| format!("unparsable date '{raw_date}'"))?;

        let raw_qty = self
            .field(fields, Column::TransactionQty)
            .ok_or("empty transaction_qty")?;
        let quantity = parse_quantity(raw_qty)
            .filter(|q| *q > 0)
            .ok_or_else(|| format!("invalid quantity '{raw_qty}'"))?;

        let raw_price = self
            .field(fields, Column::UnitPrice)
            .ok_or("empty unit_price")?;
        let unit_price = parse_price(raw_price)
            .filter(|p| !p.is_sign_negative())
            .ok_or_else(|| format!("invalid unit price '{raw_price}'"))?;
        let revenue = unit_price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| format!("revenue overflow for {quantity} × {unit_price}"))?;

        let text = |column| self.field(fields, column).map(str::to_string);
        Ok(Transaction {
            id: text(Column::TransactionId).unwrap_or_else(|| row_number.to_string()),
            date,
            time: self
                .field(fields, Column::TransactionTime)
                .and_then(parse_naive_time),
            store_id: text(Column::StoreId),
            store_location: text(Column::StoreLocation),
            product_id: text(Column::ProductId),
            product_category: text(Column::ProductCategory),
            product_type: text(Column::ProductType),
            product_detail: text(Column::ProductDetail),
            quantity,
            unit_price,
            revenue,
        })
    }
}

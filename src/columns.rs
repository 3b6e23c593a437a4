//! The closed set of columns a transaction exposes.
//!
//! Source columns map one-to-one onto CSV headers. Derived columns
//! (`revenue`, `hour`, `weekday`, `month`) are computed once at load and are
//! available whenever the source column they derive from is.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    TransactionId,
    TransactionDate,
    TransactionTime,
    StoreId,
    StoreLocation,
    ProductId,
    ProductCategory,
    ProductType,
    ProductDetail,
    TransactionQty,
    UnitPrice,
    Revenue,
    Hour,
    Weekday,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
    Date,
    Time,
}

impl Column {
    pub const REQUIRED: [Column; 3] = [
        Column::TransactionQty,
        Column::UnitPrice,
        Column::TransactionDate,
    ];

    pub const OPTIONAL: [Column; 8] = [
        Column::TransactionId,
        Column::TransactionTime,
        Column::StoreId,
        Column::StoreLocation,
        Column::ProductId,
        Column::ProductCategory,
        Column::ProductType,
        Column::ProductDetail,
    ];

    pub const ALL: [Column; 15] = [
        Column::TransactionId,
        Column::TransactionDate,
        Column::TransactionTime,
        Column::StoreId,
        Column::StoreLocation,
        Column::ProductId,
        Column::ProductCategory,
        Column::ProductType,
        Column::ProductDetail,
        Column::TransactionQty,
        Column::UnitPrice,
        Column::Revenue,
        Column::Hour,
        Column::Weekday,
        Column::Month,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::TransactionId => "transaction_id",
            Column::TransactionDate => "transaction_date",
            Column::TransactionTime => "transaction_time",
            Column::StoreId => "store_id",
            Column::StoreLocation => "store_location",
            Column::ProductId => "product_id",
            Column::ProductCategory => "product_category",
            Column::ProductType => "product_type",
            Column::ProductDetail => "product_detail",
            Column::TransactionQty => "transaction_qty",
            Column::UnitPrice => "unit_price",
            Column::Revenue => "revenue",
            Column::Hour => "hour",
            Column::Weekday => "weekday",
            Column::Month => "month",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::TransactionQty | Column::UnitPrice | Column::Revenue | Column::Hour => {
                ColumnKind::Numeric
            }
            Column::TransactionDate => ColumnKind::Date,
            Column::TransactionTime => ColumnKind::Time,
            _ => ColumnKind::Text,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.kind() == ColumnKind::Numeric
    }

    /// The CSV column this one is read or derived from.
    pub fn source(self) -> Column {
        match self {
            Column::Revenue => Column::TransactionQty,
            Column::Hour => Column::TransactionTime,
            Column::Weekday | Column::Month => Column::TransactionDate,
            other => other,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_header(value);
        let alias = match normalized.as_str() {
            "transaction_hour" => Some(Column::Hour),
            "day_of_week" => Some(Column::Weekday),
            "transaction_month" => Some(Column::Month),
            "transaction_value" | "sales_value" => Some(Column::Revenue),
            _ => None,
        };
        alias
            .or_else(|| {
                Column::ALL
                    .into_iter()
                    .find(|column| column.name() == normalized)
            })
            .ok_or_else(|| format!("Unknown column '{value}'"))
    }
}

/// Lowercases and replaces separators so `Unit Price` matches `unit_price`.
pub fn normalize_header(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

/// Which source columns a loaded dataset actually carried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnSet {
    present: BTreeSet<Column>,
}

impl ColumnSet {
    pub fn new(columns: impl IntoIterator<Item = Column>) -> Self {
        Self {
            present: columns.into_iter().map(Column::source).collect(),
        }
    }

    pub fn contains(&self, column: Column) -> bool {
        self.present.contains(&column.source())
    }

    /// Columns from `required` that this dataset cannot provide.
    pub fn missing(&self, required: &[Column]) -> Vec<Column> {
        required
            .iter()
            .copied()
            .filter(|column| !self.contains(*column))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Column> + '_ {
        self.present.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_spellings_and_aliases() {
        assert_eq!("unit_price".parse::<Column>(), Ok(Column::UnitPrice));
        assert_eq!(" Unit Price ".parse::<Column>(), Ok(Column::UnitPrice));
        assert_eq!("day_of_week".parse::<Column>(), Ok(Column::Weekday));
        assert!("colour".parse::<Column>().is_err());
    }

    #[test]
    fn derived_columns_follow_their_source() {
        let set = ColumnSet::new([Column::TransactionDate, Column::TransactionQty]);
        assert!(set.contains(Column::Weekday));
        assert!(set.contains(Column::Revenue));
        assert!(!set.contains(Column::Hour));
        assert_eq!(
            set.missing(&[Column::Hour, Column::Month, Column::StoreId]),
            vec![Column::Hour, Column::StoreId]
        );
    }

    #[test]
    fn only_measures_are_numeric() {
        assert!(Column::Revenue.is_numeric());
        assert!(Column::Hour.is_numeric());
        assert!(!Column::StoreId.is_numeric());
        assert_eq!(Column::TransactionDate.kind(), ColumnKind::Date);
    }
}
